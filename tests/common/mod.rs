#![allow(dead_code)]

use bms_bridge::controller::Interface;
use bms_bridge::prelude::*;
use bms_bridge::{jbd, jk};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

// MockLink {{{
#[derive(Debug)]
pub struct LinkState {
    pub rx: VecDeque<u8>,
    pub written: Vec<Vec<u8>>,
    pub ready: bool,
    pub directions: Vec<Direction>,
    pub flushes: usize,
    pub direction_control: bool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            ready: true,
            directions: Vec::new(),
            flushes: 0,
            direction_control: true,
        }
    }
}

/// In-memory link. Clones share their state, so a test keeps one handle
/// while the controller owns another.
#[derive(Clone, Debug, Default)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_direction_control() -> Self {
        let link = Self::new();
        link.state.lock().unwrap().direction_control = false;
        link
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes);
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().unwrap().ready = ready;
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn directions(&self) -> Vec<Direction> {
        self.state.lock().unwrap().directions.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().unwrap().flushes
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().rx.len()
    }

    pub fn boxed(&self) -> Box<dyn Link> {
        Box::new(self.clone())
    }
}

impl Link for MockLink {
    fn available(&mut self) -> usize {
        self.state.lock().unwrap().rx.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.state.lock().unwrap().rx.pop_front()
    }

    fn write_frame(&mut self, frame: &[u8]) -> usize {
        self.state.lock().unwrap().written.push(frame.to_vec());
        frame.len()
    }

    fn is_ready_for_write(&mut self) -> bool {
        self.state.lock().unwrap().ready
    }

    fn flush(&mut self) -> Result<()> {
        self.state.lock().unwrap().flushes += 1;
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.direction_control {
            bail!("no direction control");
        }
        state.directions.push(direction);
        Ok(())
    }
} // }}}

// ManualClock {{{
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u32) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
} // }}}

pub fn battery(provider: &str, poll_interval: u32, interface: Interface) -> config::Battery {
    let interface = match interface {
        Interface::Uart => "uart",
        Interface::Transceiver => "transceiver",
    };
    let yaml = format!(
        "batteries:\n  - provider: {}\n    port: /dev/ttyUSB0\n    poll_interval: {}\n    interface: {}\n",
        provider, poll_interval, interface
    );
    Config::from_yaml(&yaml).unwrap().batteries.remove(0)
}

// JK BMS frames {{{
/// Wraps a variable section into a complete, valid JK BMS response.
pub fn jk_response(section: &[u8]) -> Vec<u8> {
    let size = jk::message::MIN_FRAME_SIZE + section.len();

    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&[0x4e, 0x57]);
    frame.extend_from_slice(&((size - 2) as u16).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // terminal id
    frame.extend_from_slice(&[0x06, 0x00, 0x01]); // ReadAll from BMS, response
    frame.extend_from_slice(section);
    frame.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]); // record number
    frame.push(0x68);
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let checksum = jk::message::checksum(&frame);
    frame[size - 2..].copy_from_slice(&checksum.to_be_bytes());
    frame
}

/// Variable section of a 16 cell pack as captured from a JK-B2A24S15P.
pub fn jk_sample_section() -> Vec<u8> {
    let mut section = vec![0x79, 0x30];
    for idx in 1..=16u8 {
        section.push(idx);
        section.extend_from_slice(&[0x0c, 0xfb]);
    }
    section.extend_from_slice(&[
        0x80, 0x00, 0x16, // BMS temperature
        0x81, 0x00, 0x15, // battery temperature 1
        0x82, 0x00, 0x15, // battery temperature 2
        0x83, 0x14, 0xc0, // 53.12 V
        0x84, 0x80, 0xfa, // 2.5 A charging (protocol version 1)
        0x85, 0x57, // 87 %
        0x86, 0x02,
        0x87, 0x00, 0x2a, // 42 cycles
        0x89, 0x00, 0x00, 0x04, 0x4e,
        0x8a, 0x00, 0x10, // 16 cells
        0x8b, 0x00, 0x00,
        0x8c, 0x00, 0x07,
        0xab, 0x01,
        0xac, 0x01,
        0xb4, b'I', b'n', b'p', b'u', b't', b'U', b's', b'e',
        0xc0, 0x01,
    ]);
    section
}
// }}}

// JBD BMS frames {{{
/// Builds a valid JBD BMS response to `command`.
pub fn jbd_response(command: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xdd, command, 0x00, data.len() as u8];
    frame.extend_from_slice(data);
    frame.extend_from_slice(&[0x00, 0x00, 0x77]);

    let checksum = jbd::message::checksum(&frame);
    let size = frame.len();
    frame[size - 3..size - 1].copy_from_slice(&checksum.to_be_bytes());
    frame
}

/// Basic information payload of a 4 cell pack.
pub fn jbd_basic_information() -> Vec<u8> {
    vec![
        0x05, 0x2c, // 13.24 V
        0xff, 0x38, // -2.00 A
        0x27, 0x10, // 100.00 Ah remaining
        0x2e, 0xe0, // 120.00 Ah nominal
        0x00, 0x0c, // 12 cycles
        0x2c, 0x7f, // 31.03.2022
        0x00, 0x00, 0x00, 0x00, // balancing
        0x00, 0x00, // protection
        0x21, // 1.2
        0x53, // 83 %
        0x03, // charge and discharge FET on
        0x04, // 4 cells
        0x02, // 2 NTCs
        0x0b, 0xa5, // 25.0 °C
        0x0b, 0x9b, // 24.0 °C
    ]
}
// }}}
