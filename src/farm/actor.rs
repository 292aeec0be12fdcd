use crate::bus::types::Bus;
use crate::config::config::{AccountCfg, FarmCfg};
use crate::core::types::Actor;
use crate::game::client::GameApiClient;
use crate::upgrades::scheduler::{CycleReport, PurchaseScheduler};
use anyhow::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outer driver for one account: runs a farming cycle, sleeps, repeats.
pub struct FarmActor {
    pub bus: Bus,
    pub client: Arc<dyn GameApiClient>,
    pub account: AccountCfg,
    pub farm_cfg: FarmCfg,
    pub shutdown: CancellationToken,
}

impl FarmActor {
    pub fn new(
        bus: Bus,
        client: Arc<dyn GameApiClient>,
        account: AccountCfg,
        farm_cfg: FarmCfg,
        shutdown: CancellationToken,
    ) -> FarmActor {
        Self {
            bus,
            client,
            account,
            farm_cfg,
            shutdown,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        PurchaseScheduler::new(
            &self.account.name,
            self.client.clone(),
            self.bus.clone(),
            self.account.upgrades.clone(),
        )
        .run()
        .await
    }

    /// Pause before the next cycle, or `None` when the account runs once.
    fn next_delay(&self) -> Option<Duration> {
        let max_jitter = self.farm_cfg.max_random_delay;
        if self.farm_cfg.recheck.is_zero() && max_jitter == 0 {
            return None;
        }
        let jitter = if max_jitter > 0 {
            rand::thread_rng().gen_range(1..=max_jitter)
        } else {
            0
        };
        Some(self.farm_cfg.recheck + Duration::from_secs(jitter))
    }
}

#[async_trait::async_trait]
impl Actor for FarmActor {
    async fn run(self) -> Result<()> {
        info!("FarmActor started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("FarmActor: shutdown requested");
                    break;
                }
                report = self.run_cycle() => {
                    let bought: Vec<&str> = report.bought.iter().map(|c| c.name.as_str()).collect();
                    info!(
                        "Cycle ended with {} after {} purchases {:?}",
                        report.reason, report.state.purchases, bought
                    );
                }
            }

            let Some(delay) = self.next_delay() else {
                info!("No recheck configured, account done");
                break;
            };
            info!("Rechecking in {} seconds", delay.as_secs());

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("FarmActor: shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("FarmActor stopped cleanly");
        Ok(())
    }
}
