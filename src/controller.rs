use crate::prelude::*;

use enum_dispatch::*;
use serde::Deserialize;
use std::fmt;

use crate::clock;
use crate::jbd::Controller as JbdController;
use crate::jk::Controller as JkController;
use crate::port_manager::SharedPortManager;
use crate::stats::BatteryStats;
use crate::RawFrame;

// Status {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Timeout,
    WaitingForPollInterval,
    HwSerialNotAvailableForWrite,
    BusyReading,
    RequestSent,
    FrameCompleted,
}

impl Status {
    pub fn text(self) -> &'static str {
        match self {
            Status::Timeout => "timeout wating for response from BMS",
            Status::WaitingForPollInterval => "waiting for poll interval to elapse",
            Status::HwSerialNotAvailableForWrite => "UART is not available for writing",
            Status::BusyReading => "busy waiting for or reading a message from the BMS",
            Status::RequestSent => "request for data sent",
            Status::FrameCompleted => "a whole frame was received",
        }
    }
}

/// Repeats of the same status are logged at most this often.
pub const STATUS_REPEAT_INTERVAL_MS: u32 = 10 * 1000;

/// Logs controller status changes without flooding the log with
/// conditions that persist over many ticks.
#[derive(Debug)]
pub struct StatusAnnouncer {
    prefix: &'static str,
    last: Option<(Status, u32)>,
}

impl StatusAnnouncer {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, last: None }
    }

    /// Returns whether the status was actually logged.
    pub fn announce(&mut self, status: Status, now: u32) -> bool {
        if let Some((last, printed)) = self.last {
            if last == status && clock::elapsed(now, printed) < STATUS_REPEAT_INTERVAL_MS {
                return false;
            }
        }

        match status {
            Status::Timeout | Status::HwSerialNotAvailableForWrite => {
                warn!("{} {}", self.prefix, status.text())
            }
            _ => debug!("{} {}", self.prefix, status.text()),
        }

        self.last = Some((status, now));
        true
    }

    pub fn last_status(&self) -> Option<Status> {
        self.last.map(|(status, _)| status)
    }
}
// }}}

/// How the BMS is wired to the serial port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    #[default]
    Uart,
    /// Half-duplex RS485 transceiver with explicit direction control.
    Transceiver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    poll_interval_ms: u32,
}

impl Timing {
    pub fn from_secs(poll_interval: u32) -> Self {
        Self {
            poll_interval_ms: poll_interval.saturating_mul(1000),
        }
    }

    pub fn poll_interval_ms(&self) -> u32 {
        self.poll_interval_ms
    }

    /// Two poll cycles plus some slack for the transfer itself.
    pub fn timeout_ms(&self) -> u32 {
        self.poll_interval_ms.saturating_mul(2).saturating_add(250)
    }
}

/// Byte-at-a-time framing shared by the vendor assemblers.
pub trait FrameAssembly: Default + Send {
    fn push(&mut self, byte: u8) -> Option<RawFrame>;
    fn reset(&mut self);
    fn is_idle(&self) -> bool;
    fn expect_response(&mut self);
}

// LinkStats {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub requests_sent: u64,
    pub frames_completed: u64,
    pub frames_invalid: u64,
    pub frames_discarded: u64,
    pub timeouts: u64,
}

impl LinkStats {
    pub fn print_summary(&self, prefix: &str) {
        info!("{} Link Statistics:", prefix);
        info!("  Requests sent: {}", self.requests_sent);
        info!("  Frames received: {}", self.frames_completed);
        info!("  Invalid frames: {}", self.frames_invalid);
        info!("  Incomplete frames discarded: {}", self.frames_discarded);
        info!("  Timeouts: {}", self.timeouts);
    }
} // }}}

/// Logs `data` as hex, 16 bytes per line.
pub fn hex_dump(prefix: &str, data: &[u8]) {
    info!("{} raw data ({} Bytes):", prefix, data.len());
    for chunk in data.chunks(16) {
        let line: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        info!("{} {}", prefix, line.join(" "));
    }
}

/// The vendor independent half of a controller: link ownership, request
/// pacing, framing and timeout supervision.
pub struct LinkDriver<A: FrameAssembly> {
    prefix: &'static str,
    interface: Interface,
    timing: Timing,
    verbose_logging: bool,
    link: Option<Box<dyn Link>>,
    assembler: A,
    last_request: Option<u32>,
    // arrival of the most recent byte
    last_byte: Option<u32>,
    awaiting_response: bool,
    announcer: StatusAnnouncer,
    stats: LinkStats,
}

impl<A: FrameAssembly> LinkDriver<A> {
    pub fn new(prefix: &'static str, interface: Interface, timing: Timing, verbose_logging: bool) -> Self {
        Self {
            prefix,
            interface,
            timing,
            verbose_logging,
            link: None,
            assembler: A::default(),
            last_request: None,
            last_byte: None,
            awaiting_response: false,
            announcer: StatusAnnouncer::new(prefix),
            stats: LinkStats::default(),
        }
    }

    /// Takes ownership of `link`. In transceiver mode the bus is switched
    /// to receive right away, a link without direction control fails here.
    pub fn attach(&mut self, mut link: Box<dyn Link>) -> Result<()> {
        if self.interface == Interface::Transceiver {
            link.set_direction(Direction::Receive)?;
        }

        self.reset_state();
        self.link = Some(link);
        Ok(())
    }

    /// Drops the link and every bit of in-flight state.
    pub fn detach(&mut self) -> Option<Box<dyn Link>> {
        self.reset_state();
        self.link.take()
    }

    fn reset_state(&mut self) {
        self.assembler.reset();
        self.last_request = None;
        self.last_byte = None;
        self.awaiting_response = false;
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    pub fn last_status(&self) -> Option<Status> {
        self.announcer.last_status()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Feeds every byte the link has buffered to the assembler and returns
    /// the frames completed on the way.
    pub fn poll_frames(&mut self, now: u32) -> Vec<RawFrame> {
        let mut frames = Vec::new();

        let link = match self.link.as_mut() {
            Some(link) => link,
            None => return frames,
        };

        while link.available() > 0 {
            let byte = match link.read() {
                Some(byte) => byte,
                None => break,
            };
            self.last_byte = Some(now);
            if let Some(frame) = self.assembler.push(byte) {
                frames.push(frame);
            }
        }

        for frame in &frames {
            self.stats.frames_completed += 1;
            self.announcer.announce(Status::FrameCompleted, now);
            if self.verbose_logging {
                hex_dump(self.prefix, frame);
            }
        }

        frames
    }

    /// A completed frame decoded fine, the pending request is answered.
    pub fn frame_accepted(&mut self) {
        self.awaiting_response = false;
    }

    pub fn frame_rejected(&mut self) {
        self.stats.frames_invalid += 1;
    }

    /// Whether a new request may go out now. Announces the reason if not.
    pub fn may_send(&mut self, now: u32) -> bool {
        if !self.assembler.is_idle() {
            self.announcer.announce(Status::BusyReading, now);
            return false;
        }

        if let Some(last) = self.last_request {
            if clock::elapsed(now, last) < self.timing.poll_interval_ms() {
                self.announcer.announce(Status::WaitingForPollInterval, now);
                return false;
            }
        }

        let ready = self.link.as_mut().map_or(false, |link| link.is_ready_for_write());
        if !ready {
            self.announcer.announce(Status::HwSerialNotAvailableForWrite, now);
        }

        ready
    }

    pub fn transmit(&mut self, frame: &[u8], now: u32) -> Result<()> {
        let transceiver = self.interface == Interface::Transceiver;
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| anyhow!("{} no link attached", self.prefix))?;

        if transceiver {
            link.set_direction(Direction::Transmit)?;
        }

        let written = link.write_frame(frame);

        if transceiver {
            link.flush()?;
            link.set_direction(Direction::Receive)?;
        }

        if written != frame.len() {
            warn!("{} only {} of {} request bytes written", self.prefix, written, frame.len());
        }

        self.last_request = Some(now);
        self.awaiting_response = true;
        self.assembler.expect_response();
        self.stats.requests_sent += 1;
        self.announcer.announce(Status::RequestSent, now);

        Ok(())
    }

    /// Resets the assembler once the response is overdue. Fires at most
    /// once per request. A partial frame no request waits for is dropped
    /// after the same period of silence, without counting as a timeout.
    pub fn check_timeout(&mut self, now: u32) -> bool {
        self.discard_stalled_frame(now);

        let last = match self.last_request {
            Some(last) if self.awaiting_response => last,
            _ => return false,
        };

        if clock::elapsed(now, last) <= self.timing.timeout_ms() {
            return false;
        }

        self.assembler.reset();
        self.awaiting_response = false;
        self.stats.timeouts += 1;
        self.announcer.announce(Status::Timeout, now);
        true
    }

    fn discard_stalled_frame(&mut self, now: u32) {
        if self.awaiting_response || self.assembler.is_idle() {
            return;
        }

        let silence = match self.last_byte {
            Some(last) => clock::elapsed(now, last),
            None => return,
        };
        if silence <= self.timing.timeout_ms() {
            return;
        }

        warn!(
            "{} discarding incomplete frame, no data for {}ms",
            self.prefix, silence
        );
        self.assembler.reset();
        self.stats.frames_discarded += 1;
    }
}

// BmsController {{{
/// The vendor half of a controller: what to ask for and how to read the
/// answer.
pub trait BmsProtocol: Default + Send {
    /// Log prefix, also names the port owner.
    const NAME: &'static str;

    type Assembler: FrameAssembly;
    type Labels: LabelSet;
    type Stats: BatteryStats + Default + 'static;
    type Request: Copy + fmt::Debug;

    /// Forgets what was learned during an earlier session.
    fn reset(&mut self);

    fn next_request(&self) -> Self::Request;

    fn encode(&self, request: Self::Request) -> RawFrame;

    /// The request went out on the wire.
    fn request_sent(&mut self, _request: Self::Request) {}

    fn decode(&self, frame: RawFrame, now: u32) -> Result<DataPointContainer<Self::Labels>, FrameError>;

    /// Sees every accepted registry before it replaces the current one.
    fn frame_decoded(&mut self, _data_points: &DataPointContainer<Self::Labels>) {}

    fn update_stats(stats: &mut Self::Stats, data_points: &DataPointContainer<Self::Labels>, now: u32);
}

/// Polls one BMS on one port: claims the port, paces requests, decodes
/// responses and merges them into the battery stats.
pub struct BmsController<P: BmsProtocol> {
    port: String,
    owner: String,
    verbose_logging: bool,
    clock: Arc<dyn Clock>,
    port_manager: SharedPortManager,
    driver: LinkDriver<P::Assembler>,
    protocol: P,
    data_points: DataPointContainer<P::Labels>,
    stats: Arc<Mutex<P::Stats>>,
}

impl<P: BmsProtocol> BmsController<P> {
    pub fn new(battery: &config::Battery, clock: Arc<dyn Clock>, port_manager: SharedPortManager) -> Self {
        Self {
            port: battery.port().to_string(),
            owner: format!("{} {}", P::NAME, battery.port()),
            verbose_logging: battery.verbose_logging(),
            clock,
            port_manager,
            driver: LinkDriver::new(
                P::NAME,
                battery.interface(),
                battery.timing(),
                battery.verbose_logging(),
            ),
            protocol: P::default(),
            data_points: DataPointContainer::new(),
            stats: Arc::new(Mutex::new(P::Stats::default())),
        }
    }

    /// Registry decoded from the most recent valid frame.
    pub fn data_points(&self) -> &DataPointContainer<P::Labels> {
        &self.data_points
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn driver(&self) -> &LinkDriver<P::Assembler> {
        &self.driver
    }

    pub fn battery_stats(&self) -> Arc<Mutex<P::Stats>> {
        self.stats.clone()
    }

    fn frame_complete(&mut self, frame: RawFrame, now: u32) {
        match self.protocol.decode(frame, now) {
            Ok(data_points) => {
                self.driver.frame_accepted();
                self.process_data_points(data_points, now);
            }
            Err(err) => {
                self.driver.frame_rejected();
                warn!("{} {}", P::NAME, err);
            }
        }
    }

    fn process_data_points(&mut self, data_points: DataPointContainer<P::Labels>, now: u32) {
        if let Ok(mut stats) = self.stats.lock() {
            P::update_stats(&mut stats, &data_points, now);
        }

        self.protocol.frame_decoded(&data_points);

        if self.verbose_logging {
            let mut entries: Vec<_> = data_points.iter().collect();
            entries.sort_by_key(|(label, _)| **label);
            for (_, data_point) in entries {
                info!("{} {}", P::NAME, data_point);
            }
        }

        self.data_points = data_points;
    }

    fn send_request(&mut self, now: u32) {
        if !self.driver.may_send(now) {
            return;
        }

        let request = self.protocol.next_request();
        let frame = self.protocol.encode(request);
        match self.driver.transmit(&frame, now) {
            Ok(()) => self.protocol.request_sent(request),
            Err(err) => warn!("{} failed to send {:?} request: {}", P::NAME, request, err),
        }
    }
}

impl<P: BmsProtocol> BatteryProvider for BmsController<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn port(&self) -> &str {
        &self.port
    }

    fn init(&mut self, link: Box<dyn Link>) -> Result<()> {
        info!("{} Initialize interface on {}...", P::NAME, self.port);

        let allocated = self
            .port_manager
            .lock()
            .map_err(|_| file_error!("failed to lock port manager"))?
            .allocate(&self.port, &self.owner);
        if !allocated {
            bail!("{} cannot allocate serial port {}", P::NAME, self.port);
        }

        if let Err(err) = self.driver.attach(link) {
            if let Ok(mut port_manager) = self.port_manager.lock() {
                port_manager.free(&self.owner);
            }
            return Err(err);
        }
        self.protocol.reset();

        info!("{} Interface initialized on {}", P::NAME, self.port);
        Ok(())
    }

    fn deinit(&mut self) {
        if self.driver.detach().is_none() {
            return;
        }

        match self.port_manager.lock() {
            Ok(mut port_manager) => port_manager.free(&self.owner),
            Err(_) => error!("{} failed to lock port manager", P::NAME),
        }

        info!("{} Interface on {} released", P::NAME, self.port);
    }

    fn tick(&mut self) {
        if !self.driver.is_attached() {
            return;
        }

        let now = self.clock.millis();

        for frame in self.driver.poll_frames(now) {
            self.frame_complete(frame, now);
        }

        self.send_request(now);

        self.driver.check_timeout(now);
    }

    fn stats(&self) -> Arc<Mutex<dyn BatteryStats>> {
        self.stats.clone()
    }

    fn link_stats(&self) -> LinkStats {
        self.driver.stats()
    }
}
// }}}

// BatteryProvider {{{
#[enum_dispatch]
pub trait BatteryProvider {
    /// Log prefix and port owner name.
    fn name(&self) -> &'static str;

    fn port(&self) -> &str;

    /// Claims the port and takes ownership of `link`.
    fn init(&mut self, link: Box<dyn Link>) -> Result<()>;

    fn deinit(&mut self);

    /// One scheduler step: drain, request, supervise.
    fn tick(&mut self);

    fn stats(&self) -> Arc<Mutex<dyn BatteryStats>>;

    fn link_stats(&self) -> LinkStats;
}

#[enum_dispatch(BatteryProvider)]
pub enum Provider {
    JkBms(JkController),
    JbdBms(JbdController),
}

impl Provider {
    pub fn new(
        battery: &config::Battery,
        clock: Arc<dyn Clock>,
        port_manager: SharedPortManager,
    ) -> Self {
        match battery.provider() {
            config::ProviderKind::JkBms => {
                Provider::JkBms(JkController::new(battery, clock, port_manager))
            }
            config::ProviderKind::JbdBms => {
                Provider::JbdBms(JbdController::new(battery, clock, port_manager))
            }
        }
    }
}
// }}}
