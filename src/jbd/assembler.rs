use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::jbd::message::{END_MARKER, START_MARKER};
use crate::controller::FrameAssembly;
use crate::RawFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadState {
    /// Nothing requested, still accepts unsolicited frames.
    #[default]
    Idle,
    WaitingForFrameStart,
    FrameStartReceived,
    StateReceived,
    CommandCodeReceived,
    ReadingDataContent,
    DataContentReceived,
    ReadingCheckSum,
    CheckSumReceived,
}

/// Byte-at-a-time framing of JBD BMS responses. The data length byte is
/// the only length information, so frames never exceed 262 bytes.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    state: ReadState,
    buffer: Vec<u8>,
    remaining: u8,
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

    pub fn expect_response(&mut self) {
        if self.state == ReadState::Idle {
            self.state = ReadState::WaitingForFrameStart;
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReadState::Idle;
    }

    pub fn push(&mut self, byte: u8) -> Option<RawFrame> {
        if matches!(self.state, ReadState::Idle | ReadState::WaitingForFrameStart) {
            if byte == START_MARKER {
                self.buffer.clear();
                self.buffer.push(byte);
                self.state = ReadState::FrameStartReceived;
            }
            return None;
        }

        self.buffer.push(byte);

        let state = self.state;
        self.state = match state {
            ReadState::FrameStartReceived => ReadState::StateReceived,
            ReadState::StateReceived => ReadState::CommandCodeReceived,
            ReadState::CommandCodeReceived => {
                self.remaining = byte;
                if byte == 0 {
                    ReadState::DataContentReceived
                } else {
                    ReadState::ReadingDataContent
                }
            }
            ReadState::ReadingDataContent => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    ReadState::DataContentReceived
                } else {
                    ReadState::ReadingDataContent
                }
            }
            ReadState::DataContentReceived => ReadState::ReadingCheckSum,
            ReadState::ReadingCheckSum => ReadState::CheckSumReceived,
            ReadState::CheckSumReceived => {
                if byte == END_MARKER {
                    self.state = ReadState::Idle;
                    return Some(std::mem::take(&mut self.buffer));
                }
                warn!("[JBD BMS] Invalid frame: end marker not found (got 0x{:02x})", byte);
                self.reset();
                return None;
            }
            ReadState::Idle | ReadState::WaitingForFrameStart => state,
        };

        None
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
