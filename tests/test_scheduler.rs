mod common;
use common::*;

use bms_bridge::controller::{BatteryProvider, Provider};
use bms_bridge::port_manager::PortManager;
use bms_bridge::prelude::*;
use bms_bridge::scheduler::Scheduler;

const CONFIG: &str = "
tick_interval_ms: 10
batteries:
  - provider: jk_bms
    port: /dev/ttyUSB0
    poll_interval: 1
  - provider: jbd_bms
    port: /dev/ttyUSB1
    poll_interval: 1
";

#[tokio::test]
async fn ticks_providers_until_shutdown() -> Result<()> {
    let config = ConfigWrapper::from_config(Config::from_yaml(CONFIG)?);
    let clock = ManualClock::new();
    let port_manager = PortManager::shared();

    let jk_link = MockLink::new();
    let jbd_link = MockLink::new();

    let mut providers = Vec::new();
    for (battery, link) in config.enabled_batteries()?.iter().zip([&jk_link, &jbd_link]) {
        let mut provider = Provider::new(battery, clock.clone(), port_manager.clone());
        provider.init(link.boxed())?;
        providers.push(provider);
    }
    assert_eq!(port_manager.lock().unwrap().len(), 2);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let _ = shutdown_tx.send(());
    });

    let scheduler = Scheduler::new(config);
    scheduler.start(&mut providers, shutdown_rx).await?;

    // the clock never moved, so one request each
    assert_eq!(jk_link.written().len(), 1);
    assert_eq!(jbd_link.written().len(), 1);
    assert!(providers.iter().all(|p| p.link_stats().requests_sent == 1));

    bms_bridge::shutdown(&mut providers, clock.millis());
    assert!(port_manager.lock().unwrap().is_empty());

    Ok(())
}

#[test]
fn provider_names() {
    let config = Config::from_yaml(CONFIG).unwrap();
    let names: Vec<_> = config
        .batteries
        .iter()
        .map(|b| Provider::new(b, ManualClock::new(), PortManager::shared()))
        .map(|p| (p.name(), p.port().to_string()))
        .collect();

    assert_eq!(
        names,
        vec![
            ("[JK BMS]", "/dev/ttyUSB0".to_string()),
            ("[JBD BMS]", "/dev/ttyUSB1".to_string()),
        ]
    );
}
