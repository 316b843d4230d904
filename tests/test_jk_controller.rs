mod common;
use common::*;

use bms_bridge::controller::{BatteryProvider, Interface, Status};
use bms_bridge::jk::datapoints::label;
use bms_bridge::jk::message::{Command, SerialCommand};
use bms_bridge::jk::Controller;
use bms_bridge::port_manager::PortManager;
use bms_bridge::prelude::*;
use bms_bridge::stats::BatteryStats;

fn controller(poll_interval: u32, interface: Interface) -> (Controller, MockLink, Arc<ManualClock>) {
    let clock = ManualClock::new();
    let link = MockLink::new();
    let mut controller = Controller::new(
        &battery("jk_bms", poll_interval, interface),
        clock.clone(),
        PortManager::shared(),
    );
    controller.init(link.boxed()).unwrap();
    (controller, link, clock)
}

#[test]
fn first_tick_sends_read_all() {
    let (mut controller, link, _clock) = controller(5, Interface::Uart);

    controller.tick();

    assert_eq!(link.written(), vec![SerialCommand::new(Command::ReadAll).into_bytes()]);
    assert_eq!(controller.driver().last_status(), Some(Status::RequestSent));
    assert_eq!(controller.link_stats().requests_sent, 1);
    assert!(link.directions().is_empty());
}

#[test]
fn response_updates_stats_and_learns_protocol_version() {
    let (mut controller, link, clock) = controller(5, Interface::Uart);
    controller.tick();

    clock.set(300);
    link.feed(&jk_response(&jk_sample_section()));
    controller.tick();

    assert_eq!(controller.protocol_version(), Some(1));
    assert_eq!(controller.data_points().get::<label::BatteryCellAmount>(), Some(16));
    // not decodable before the version was known
    assert_eq!(controller.data_points().get::<label::BatteryCurrentMilliAmps>(), None);

    {
        let stats = controller.battery_stats();
        let stats = stats.lock().unwrap();
        assert!(stats.is_valid());
        assert_eq!(stats.soc(), 87);
        assert_eq!(stats.last_update_soc(), Some(300));
        assert!((stats.voltage().unwrap() - 53.12).abs() < 0.001);
        assert_eq!(stats.current(), None);
        assert_eq!(stats.cell_diff_milli_volt(), Some(0));
    }

    clock.set(5_300);
    controller.tick();
    assert_eq!(link.written().len(), 2);

    clock.set(5_500);
    link.feed(&jk_response(&jk_sample_section()));
    controller.tick();

    let stats = controller.stats();
    let stats = stats.lock().unwrap();
    assert_eq!(stats.current(), Some(2.5));
    // SoC unchanged, timestamp kept
    assert_eq!(stats.last_update_soc(), Some(300));
    assert!(stats.update_available(5_000));
    assert_eq!(stats.age_seconds(7_500), Some(2));
}

#[test]
fn timeout_fires_once() {
    let (mut controller, link, clock) = controller(1, Interface::Uart);

    controller.tick();
    assert_eq!(controller.link_stats().requests_sent, 1);

    for now in (100..=2_250).step_by(50) {
        clock.set(now);
        controller.tick();
        assert_eq!(controller.link_stats().timeouts, 0, "early timeout at {}", now);
    }
    assert_eq!(controller.driver().last_status(), Some(Status::BusyReading));

    link.set_ready(false);
    clock.set(2_251);
    controller.tick();
    assert_eq!(controller.link_stats().timeouts, 1);
    assert_eq!(controller.driver().last_status(), Some(Status::Timeout));
    assert!(controller.driver().assembler().is_idle());

    // no new request went out, so no further timeouts either
    for now in (2_300..10_000).step_by(100) {
        clock.set(now);
        controller.tick();
    }
    assert_eq!(controller.link_stats().timeouts, 1);
    assert_eq!(controller.link_stats().requests_sent, 1);
    assert_eq!(
        controller.driver().last_status(),
        Some(Status::HwSerialNotAvailableForWrite)
    );

    link.set_ready(true);
    clock.set(10_000);
    controller.tick();
    assert_eq!(controller.link_stats().requests_sent, 2);
}

#[test]
fn invalid_frame_keeps_previous_data() {
    let (mut controller, link, clock) = controller(5, Interface::Uart);
    controller.tick();

    link.feed(&jk_response(&jk_sample_section()));
    clock.set(100);
    controller.tick();

    let mut corrupt = jk_response(&[0x85, 0x10]);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x55;
    link.feed(&corrupt);
    clock.set(200);
    controller.tick();

    assert_eq!(controller.link_stats().frames_completed, 2);
    assert_eq!(controller.link_stats().frames_invalid, 1);
    assert_eq!(controller.data_points().get::<label::BatterySoCPercent>(), Some(87));
    assert_eq!(controller.battery_stats().lock().unwrap().soc(), 87);
}

#[test]
fn waits_for_poll_interval() {
    let (mut controller, link, clock) = controller(5, Interface::Uart);
    controller.tick();

    link.feed(&jk_response(&[0x85, 0x50]));
    clock.set(1_000);
    controller.tick();
    assert_eq!(controller.driver().last_status(), Some(Status::WaitingForPollInterval));

    clock.set(4_999);
    controller.tick();
    assert_eq!(link.written().len(), 1);

    clock.set(5_000);
    controller.tick();
    assert_eq!(link.written().len(), 2);
}

#[test]
fn transceiver_toggles_direction_around_request() {
    let (mut controller, link, _clock) = controller(5, Interface::Transceiver);
    controller.tick();

    assert_eq!(
        link.directions(),
        vec![Direction::Receive, Direction::Transmit, Direction::Receive]
    );
    assert_eq!(link.flushes(), 1);
}

#[test]
fn transceiver_without_direction_control_fails_init() {
    let port_manager = PortManager::shared();
    let mut controller = Controller::new(
        &battery("jk_bms", 5, Interface::Transceiver),
        ManualClock::new(),
        port_manager.clone(),
    );

    assert!(controller.init(MockLink::without_direction_control().boxed()).is_err());
    assert!(port_manager.lock().unwrap().is_empty());
}

#[test]
fn port_is_exclusive() {
    let port_manager = PortManager::shared();
    let battery = battery("jk_bms", 5, Interface::Uart);

    let mut first = Controller::new(&battery, ManualClock::new(), port_manager.clone());
    let mut second = Controller::new(&battery, ManualClock::new(), port_manager.clone());

    first.init(MockLink::new().boxed()).unwrap();
    assert!(second.init(MockLink::new().boxed()).is_err());

    first.deinit();
    assert!(port_manager.lock().unwrap().is_empty());
    second.init(MockLink::new().boxed()).unwrap();
}

#[test]
fn deinit_stops_polling() {
    let (mut controller, link, clock) = controller(1, Interface::Uart);
    controller.tick();
    controller.deinit();

    link.feed(&jk_response(&[0x85, 0x50]));
    clock.set(5_000);
    controller.tick();

    assert_eq!(link.written().len(), 1);
    assert_eq!(link.pending(), 22);
    assert!(!controller.battery_stats().lock().unwrap().is_valid());
}

#[test]
fn stray_start_byte_does_not_stall_polling() {
    let (mut controller, link, clock) = controller(1, Interface::Uart);
    controller.tick();

    link.feed(&jk_response(&[0x85, 0x50]));
    clock.set(100);
    controller.tick();

    link.feed(&[0x4e]);
    clock.set(200);
    controller.tick();
    assert!(!controller.driver().assembler().is_idle());

    for now in (300..=2_450).step_by(50) {
        clock.set(now);
        controller.tick();
    }
    assert_eq!(controller.link_stats().requests_sent, 1);

    clock.set(2_451);
    controller.tick();
    assert!(controller.driver().assembler().is_idle());
    assert_eq!(controller.link_stats().frames_discarded, 1);

    clock.set(2_500);
    controller.tick();
    assert_eq!(controller.link_stats().requests_sent, 2);
    assert_eq!(controller.link_stats().timeouts, 0);
}

#[test]
fn late_partial_response_after_timeout_is_dropped() {
    let (mut controller, link, clock) = controller(1, Interface::Uart);
    controller.tick();

    clock.set(2_251);
    controller.tick();
    assert_eq!(controller.link_stats().timeouts, 1);

    link.feed(&[0x4e, 0x57, 0x00, 0x40, 0x00]);
    clock.set(2_300);
    controller.tick();
    assert_eq!(controller.driver().last_status(), Some(Status::BusyReading));

    clock.set(4_550);
    controller.tick();
    assert_eq!(controller.link_stats().requests_sent, 1);

    clock.set(4_551);
    controller.tick();
    clock.set(4_600);
    controller.tick();

    assert_eq!(controller.link_stats().requests_sent, 2);
    assert_eq!(controller.link_stats().frames_discarded, 1);
    // reported once for the first request only
    assert_eq!(controller.link_stats().timeouts, 1);
}

/// A link with no direction control of its own.
struct PlainLink;

impl Link for PlainLink {
    fn available(&mut self) -> usize {
        0
    }

    fn read(&mut self) -> Option<u8> {
        None
    }

    fn write_frame(&mut self, frame: &[u8]) -> usize {
        frame.len()
    }

    fn is_ready_for_write(&mut self) -> bool {
        true
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn plain_link_only_works_as_uart() {
    let port_manager = PortManager::shared();

    let mut controller = Controller::new(
        &battery("jk_bms", 5, Interface::Transceiver),
        ManualClock::new(),
        port_manager.clone(),
    );
    assert!(controller.init(Box::new(PlainLink)).is_err());
    assert!(port_manager.lock().unwrap().is_empty());

    let mut controller = Controller::new(
        &battery("jk_bms", 5, Interface::Uart),
        ManualClock::new(),
        port_manager.clone(),
    );
    controller.init(Box::new(PlainLink)).unwrap();
    controller.tick();
    assert_eq!(controller.link_stats().requests_sent, 1);
}
