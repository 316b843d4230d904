use crate::prelude::*;

use serde::Deserialize;
use std::collections::HashSet;

use crate::controller::{Interface, Timing};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// How often every controller is ticked.
    #[serde(default = "Config::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "Vec::new")]
    pub batteries: Vec<Battery>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    JkBms,
    JbdBms,
}

impl ProviderKind {
    pub fn default_baud_rate(self) -> u32 {
        match self {
            ProviderKind::JkBms => 115200,
            ProviderKind::JbdBms => 9600,
        }
    }
}

// Battery {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Battery {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub provider: ProviderKind,
    pub port: String,

    #[serde(default)]
    pub interface: Interface,

    /// Seconds between two requests.
    pub poll_interval: Option<u32>,
    pub baud_rate: Option<u32>,
    pub verbose_logging: Option<bool>,
}

impl Battery {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }

    pub fn poll_interval(&self) -> u32 {
        self.poll_interval.unwrap_or(5)
    }

    pub fn timing(&self) -> Timing {
        Timing::from_secs(self.poll_interval())
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
            .unwrap_or_else(|| self.provider.default_baud_rate())
    }

    pub fn verbose_logging(&self) -> bool {
        self.verbose_logging == Some(true)
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn with_config<T>(&self, f: impl FnOnce(&Config) -> T) -> Result<T> {
        let config = self
            .config
            .lock()
            .map_err(|_| file_error!("failed to lock config"))?;
        Ok(f(&config))
    }

    pub fn batteries(&self) -> Result<Vec<Battery>> {
        self.with_config(|config| config.batteries.clone())
    }

    pub fn enabled_batteries(&self) -> Result<Vec<Battery>> {
        Ok(self
            .batteries()?
            .into_iter()
            .filter(|b| b.enabled())
            .collect())
    }

    pub fn loglevel(&self) -> Result<String> {
        self.with_config(|config| config.loglevel.clone())
    }

    pub fn tick_interval(&self) -> Result<std::time::Duration> {
        self.with_config(|config| std::time::Duration::from_millis(config.tick_interval_ms))
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| file_error_with_source!(err, "error reading {}", file))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!(
            "  Batteries: {} configured, {} enabled",
            config.batteries.len(),
            config.batteries.iter().filter(|b| b.enabled).count()
        );
        for (i, battery) in config.batteries.iter().enumerate() {
            info!("    Battery[{}]:", i);
            info!("      Enabled: {}", battery.enabled);
            info!("      Provider: {:?}", battery.provider);
            info!("      Port: {}", battery.port);
            info!("      Interface: {:?}", battery.interface);
            info!("      Baud Rate: {}", battery.baud_rate());
            info!("      Poll Interval: {}s", battery.poll_interval());
            info!("      Verbose Logging: {}", battery.verbose_logging());
        }
        info!("  Tick Interval: {}ms", config.tick_interval_ms);
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than 0");
        }

        let mut ports = HashSet::new();
        for (i, battery) in self.batteries.iter().enumerate() {
            if battery.port.is_empty() {
                return Err(anyhow!("battery[{}].port cannot be empty", i));
            }
            if battery.poll_interval() == 0 {
                bail!("battery[{}].poll_interval must be at least 1 second", i);
            }
            if battery.baud_rate() == 0 {
                bail!("battery[{}].baud_rate must be greater than 0", i);
            }
            if battery.enabled && !ports.insert(battery.port.as_str()) {
                bail!("battery[{}]: port {} is used by another battery", i, battery.port);
            }
        }

        Ok(())
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_tick_interval_ms() -> u64 {
        100
    }
}
