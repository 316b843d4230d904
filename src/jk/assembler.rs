use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::jk::message::{MIN_FRAME_SIZE, START_MARKER};
use crate::controller::FrameAssembly;
use crate::RawFrame;

/// Upper bound for the declared frame size. A corrupted length field would
/// otherwise keep the assembler buffering forever.
pub const MAX_FRAME_SIZE: usize = 512;

const START_MARKER_HIGH: u8 = (START_MARKER >> 8) as u8;
const START_MARKER_LOW: u8 = (START_MARKER & 0xff) as u8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadState {
    /// Nothing requested, still accepts unsolicited frames.
    #[default]
    Idle,
    WaitingForFrameStart,
    FrameStartReceived,
    StartMarkerReceived,
    FrameLengthMsbReceived,
    ReadingFrame,
}

/// Byte-at-a-time framing of JK BMS responses.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    state: ReadState,
    buffer: Vec<u8>,
    frame_length_msb: u8,
    remaining: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ReadState::Idle
    }

    /// Called after a request went out.
    pub fn expect_response(&mut self) {
        if self.state == ReadState::Idle {
            self.state = ReadState::WaitingForFrameStart;
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReadState::Idle;
    }

    /// Feeds one byte, returns the raw frame once its last byte arrived.
    pub fn push(&mut self, byte: u8) -> Option<RawFrame> {
        match self.state {
            ReadState::Idle | ReadState::WaitingForFrameStart => {
                self.start_frame(byte);
            }
            ReadState::FrameStartReceived => {
                if byte == START_MARKER_LOW {
                    self.buffer.push(byte);
                    self.state = ReadState::StartMarkerReceived;
                } else {
                    trace!("unexpected byte 0x{:02x} after frame start, resync", byte);
                    self.reset();
                    self.start_frame(byte);
                }
            }
            ReadState::StartMarkerReceived => {
                self.buffer.push(byte);
                self.frame_length_msb = byte;
                self.state = ReadState::FrameLengthMsbReceived;
            }
            ReadState::FrameLengthMsbReceived => {
                self.buffer.push(byte);
                let frame_length = u16::from_be_bytes([self.frame_length_msb, byte]) as usize;
                if frame_length < MIN_FRAME_SIZE - 2 || frame_length + 2 > MAX_FRAME_SIZE {
                    debug!("implausible frame length {}, discarding", frame_length);
                    self.reset();
                    return None;
                }
                // the length field itself is already in
                self.remaining = frame_length - 2;
                self.state = ReadState::ReadingFrame;
            }
            ReadState::ReadingFrame => {
                self.buffer.push(byte);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = ReadState::Idle;
                    return Some(std::mem::take(&mut self.buffer));
                }
            }
        }

        None
    }

    fn start_frame(&mut self, byte: u8) {
        if byte == START_MARKER_HIGH {
            self.buffer.clear();
            self.buffer.push(byte);
            self.state = ReadState::FrameStartReceived;
        }
    }
}

impl Decoder for FrameAssembler {
    type Item = RawFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            if let Some(frame) = self.push(src.get_u8()) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl FrameAssembly for FrameAssembler {
    fn push(&mut self, byte: u8) -> Option<RawFrame> {
        FrameAssembler::push(self, byte)
    }

    fn reset(&mut self) {
        FrameAssembler::reset(self)
    }

    fn is_idle(&self) -> bool {
        FrameAssembler::is_idle(self)
    }

    fn expect_response(&mut self) {
        FrameAssembler::expect_response(self)
    }
}
