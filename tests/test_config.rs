use bms_bridge::config::ProviderKind;
use bms_bridge::controller::Interface;
use bms_bridge::prelude::*;

use std::io::Write;

const CONFIG: &str = "
loglevel: debug
tick_interval_ms: 50
batteries:
  - provider: jk_bms
    port: /dev/ttyUSB0
    interface: transceiver
    poll_interval: 2
    verbose_logging: true
  - provider: jbd_bms
    port: /dev/ttyUSB1
    baud_rate: 19200
  - provider: jbd_bms
    port: /dev/ttyUSB2
    enabled: false
";

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn reads_config_file() -> Result<()> {
    let file = write_config(CONFIG);
    let config = ConfigWrapper::new(file.path().to_string_lossy().into_owned())?;

    assert_eq!(config.loglevel()?, "debug");
    assert_eq!(config.tick_interval()?, std::time::Duration::from_millis(50));
    assert_eq!(config.batteries()?.len(), 3);

    let enabled = config.enabled_batteries()?;
    assert_eq!(enabled.len(), 2);

    let jk = &enabled[0];
    assert_eq!(jk.provider(), ProviderKind::JkBms);
    assert_eq!(jk.interface(), Interface::Transceiver);
    assert_eq!(jk.baud_rate(), 115200);
    assert_eq!(jk.timing().poll_interval_ms(), 2_000);
    assert_eq!(jk.timing().timeout_ms(), 4_250);
    assert!(jk.verbose_logging());

    let jbd = &enabled[1];
    assert_eq!(jbd.provider(), ProviderKind::JbdBms);
    assert_eq!(jbd.port(), "/dev/ttyUSB1");
    assert_eq!(jbd.baud_rate(), 19200);
    assert_eq!(jbd.poll_interval(), 5);
    Ok(())
}

#[test]
fn missing_file() {
    let err = ConfigWrapper::new("/nonexistent/bms-bridge.yaml".to_string())
        .err()
        .unwrap();
    assert!(err.to_string().contains("/nonexistent/bms-bridge.yaml"));
}

#[test]
fn invalid_yaml() {
    let file = write_config("batteries: [\n");
    assert!(ConfigWrapper::new(file.path().to_string_lossy().into_owned()).is_err());
}

#[test]
fn rejects_zero_tick_interval() {
    let err = Config::from_yaml("tick_interval_ms: 0\n").unwrap_err();
    assert!(err.to_string().contains("tick_interval_ms"));
}

#[test]
fn rejects_empty_port() {
    let err = Config::from_yaml("batteries:\n  - provider: jk_bms\n    port: \"\"\n").unwrap_err();
    assert!(err.to_string().contains("port cannot be empty"));
}
