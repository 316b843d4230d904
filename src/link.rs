use crate::prelude::*;

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

/// Bus direction of a half-duplex transceiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

/// Byte link to a BMS.
///
/// Reads never block: a controller only consumes bytes that are already
/// buffered.
pub trait Link: Send {
    /// Number of bytes that can be read right away.
    fn available(&mut self) -> usize;

    fn read(&mut self) -> Option<u8>;

    /// Queues `frame` for transmission, returns the number of bytes accepted.
    fn write_frame(&mut self, frame: &[u8]) -> usize;

    fn is_ready_for_write(&mut self) -> bool;

    /// Blocks until everything queued went out on the wire.
    fn flush(&mut self) -> Result<()>;

    /// Drives the transceiver enable lines. Links without direction
    /// control refuse, which keeps them out of transceiver mode.
    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        bail!("link cannot switch bus direction to {:?}", direction)
    }
}

// bytes pending in the OS transmit queue beyond which we stop writing
const TX_QUEUE_LIMIT: u32 = 256;

/// [`Link`] over a local serial port.
///
/// In transceiver mode RTS drives the transmit enable line and DTR the
/// receive enable line. Both are raised while a request goes out.
pub struct SerialLink {
    path: String,
    port: Box<dyn serialport::SerialPort>,
    rx: VecDeque<u8>,
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|err| file_error_with_source!(err, "failed to open serial port {}", path))?;

        debug!("opened {} at {} baud", path, baud_rate);

        Ok(Self {
            path: path.to_string(),
            port,
            rx: VecDeque::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fill(&mut self) {
        let pending = match self.port.bytes_to_read() {
            Ok(pending) => pending as usize,
            Err(err) => {
                warn!("{}: cannot query receive queue: {}", self.path, err);
                return;
            }
        };
        if pending == 0 {
            return;
        }

        let mut buf = vec![0; pending];
        match self.port.read(&mut buf) {
            Ok(read) => self.rx.extend(&buf[..read]),
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
            Err(err) => warn!("{}: read failed: {}", self.path, err),
        }
    }
}

impl Link for SerialLink {
    fn available(&mut self) -> usize {
        self.fill();
        self.rx.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.fill();
        }
        self.rx.pop_front()
    }

    fn write_frame(&mut self, frame: &[u8]) -> usize {
        match self.port.write(frame) {
            Ok(written) => written,
            Err(err) => {
                warn!("{}: write failed: {}", self.path, err);
                0
            }
        }
    }

    fn is_ready_for_write(&mut self) -> bool {
        match self.port.bytes_to_write() {
            Ok(pending) => pending < TX_QUEUE_LIMIT,
            Err(err) => {
                warn!("{}: cannot query transmit queue: {}", self.path, err);
                false
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.port
            .flush()
            .map_err(|err| file_error_with_source!(err, "{}: flush failed", self.path))
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let transmit = direction == Direction::Transmit;

        // receiver first, we must not read back our own request
        self.port
            .write_data_terminal_ready(transmit)
            .map_err(|err| file_error_with_source!(err, "{}: cannot set DTR", self.path))?;
        self.port
            .write_request_to_send(transmit)
            .map_err(|err| file_error_with_source!(err, "{}: cannot set RTS", self.path))?;

        Ok(())
    }
}
