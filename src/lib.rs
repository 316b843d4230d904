pub mod clock;
pub mod config;
pub mod controller;
pub mod datapoints;
pub mod error;
pub mod jbd;
pub mod jk;
pub mod link;
pub mod options;
pub mod port_manager;
pub mod prelude;
pub mod reader;
pub mod scheduler;
pub mod stats;

use crate::controller::{BatteryProvider, Provider};
use crate::link::SerialLink;
use crate::options::Options;
use crate::port_manager::PortManager;
use crate::prelude::*;
use crate::scheduler::Scheduler;

use std::io::Write;
use std::time::Duration;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One wire message as it came off (or goes onto) the serial link.
pub type RawFrame = Vec<u8>;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();

    // RUST_LOG wins, otherwise info until the config file says otherwise
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

fn apply_loglevel(loglevel: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }

    match loglevel.parse::<log::LevelFilter>() {
        Ok(level) => log::set_max_level(level),
        Err(_) => warn!("ignoring invalid loglevel {}", loglevel),
    }
}

/// Main application entry point: reads options and configuration, then
/// polls every configured battery until `shutdown_tx` fires.
pub async fn app(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let shutdown_rx = shutdown_tx.subscribe();
    let options = Options::new();

    init_logging();

    info!("bms-bridge {} starting with config file: {}", CARGO_PKG_VERSION, options.config_file);

    let config = ConfigWrapper::new(options.config_file.clone())?;
    apply_loglevel(&config.loglevel()?);

    if let Some(runtime) = options.runtime {
        info!("Runtime limited to {}s", runtime);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(runtime)).await;
            info!("Runtime limit reached");
            let _ = shutdown_tx.send(());
        });
    }

    run(config, shutdown_rx).await
}

/// Opens and initializes one provider per enabled battery, runs the
/// scheduler and tears everything down again.
pub async fn run(config: ConfigWrapper, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let port_manager = PortManager::shared();

    info!("Initializing battery providers...");
    let mut providers = Vec::new();
    for battery in config.enabled_batteries()? {
        let mut provider = Provider::new(&battery, clock.clone(), port_manager.clone());

        let link = match SerialLink::open(battery.port(), battery.baud_rate()) {
            Ok(link) => link,
            Err(err) => {
                error!("{} disabled: {}", provider.name(), err);
                continue;
            }
        };

        if let Err(err) = provider.init(Box::new(link)) {
            error!("{} disabled: {}", provider.name(), err);
            continue;
        }

        providers.push(provider);
    }

    if providers.is_empty() {
        warn!("No battery provider available, waiting for shutdown");
    }

    let scheduler = Scheduler::new(config);
    scheduler.start(&mut providers, shutdown_rx).await?;

    shutdown(&mut providers, clock.millis());
    Ok(())
}

/// Releases every provider's link and logs what each battery looked like
/// last.
pub fn shutdown(providers: &mut [Provider], now: u32) {
    info!("Initiating shutdown sequence");

    for provider in providers.iter_mut() {
        provider.deinit();
        provider.link_stats().print_summary(provider.name());

        let stats = provider.stats();
        if let Ok(stats) = stats.lock() {
            stats.print_summary(now);
        };
    }

    info!("Shutdown complete");
}
