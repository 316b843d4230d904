use crate::prelude::*;

use tokio::time::MissedTickBehavior;

use crate::controller::{BatteryProvider, Provider};

/// Ticks every provider at the configured interval until shutdown.
pub struct Scheduler {
    config: ConfigWrapper,
}

impl Scheduler {
    pub fn new(config: ConfigWrapper) -> Self {
        Self { config }
    }

    pub async fn start(
        &self,
        providers: &mut [Provider],
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let tick_interval = self.config.tick_interval()?;
        let mut interval = tokio::time::interval(tick_interval);
        // a slow serial port must not cause a burst of catch-up ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Scheduler started, ticking {} provider(s) every {}ms",
            providers.len(),
            tick_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for provider in providers.iter_mut() {
                        provider.tick();
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}
