use crate::game::client::{AccountBalance, GameApiClient, GameApiError, PurchaseOutcome};
use crate::upgrades::catalog::RawUpgrade;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SimState {
    pub balance: i64,
    pub passive_per_hour: i64,
    pub catalog: Vec<RawUpgrade>,
    pub purchases: Vec<String>,
    pub catalog_fetches: u32,
    pub failing_ids: HashSet<String>,
    pub fail_catalog: bool,
    clock: Instant,
}

impl SimState {
    /// Run cooldowns down by the time elapsed since the last call.
    fn tick(&mut self) {
        let elapsed = self.clock.elapsed().as_secs_f64();
        self.clock = Instant::now();
        if elapsed <= 0.0 {
            return;
        }
        for entry in &mut self.catalog {
            if let Some(cd) = entry.cooldown_seconds.as_mut() {
                *cd = (*cd - elapsed).max(0.0);
            }
        }
    }
}

/// In-memory game. Buying a card raises its level and its price by
/// `price_growth_pct`, halves its profit delta, then puts it on
/// `cooldown_after_buy` seconds of cooldown. Cooldowns follow the tokio
/// clock, so paused-time tests see them expire.
pub struct SimGameClient {
    pub state: Mutex<SimState>,
    price_growth_pct: i64,
    cooldown_after_buy: u64,
}

impl SimGameClient {
    pub fn new(balance: i64, catalog: Vec<RawUpgrade>) -> Self {
        Self {
            state: Mutex::new(SimState {
                balance,
                passive_per_hour: 0,
                catalog,
                purchases: Vec::new(),
                catalog_fetches: 0,
                failing_ids: HashSet::new(),
                fail_catalog: false,
                clock: Instant::now(),
            }),
            price_growth_pct: 50,
            cooldown_after_buy: 0,
        }
    }

    pub fn with_cooldown_after_buy(mut self, secs: u64) -> Self {
        self.cooldown_after_buy = secs;
        self
    }

    pub fn with_price_growth_pct(mut self, pct: i64) -> Self {
        self.price_growth_pct = pct;
        self
    }

    pub async fn fail_purchase_of(&self, upgrade_id: &str) {
        self.state
            .lock()
            .await
            .failing_ids
            .insert(upgrade_id.to_string());
    }

    pub async fn fail_catalog(&self) {
        self.state.lock().await.fail_catalog = true;
    }

    pub async fn purchases(&self) -> Vec<String> {
        self.state.lock().await.purchases.clone()
    }

    pub async fn balance(&self) -> i64 {
        self.state.lock().await.balance
    }

    pub async fn catalog_fetches(&self) -> u32 {
        self.state.lock().await.catalog_fetches
    }
}

#[async_trait]
impl GameApiClient for SimGameClient {
    async fn fetch_catalog(&self) -> Result<Vec<RawUpgrade>, GameApiError> {
        let mut state = self.state.lock().await;
        state.tick();
        state.catalog_fetches += 1;
        if state.fail_catalog {
            return Err(GameApiError::Status {
                endpoint: "upgrades-for-buy".to_string(),
                status: 503,
                body: "simulated outage".to_string(),
            });
        }
        Ok(state.catalog.clone())
    }

    async fn purchase(&self, upgrade_id: &str) -> Result<PurchaseOutcome, GameApiError> {
        let mut state = self.state.lock().await;
        state.tick();
        if state.failing_ids.contains(upgrade_id) {
            return Err(GameApiError::Rejected {
                upgrade_id: upgrade_id.to_string(),
                reason: "simulated failure".to_string(),
            });
        }

        let balance = state.balance;
        let entry = state
            .catalog
            .iter_mut()
            .find(|u| u.id.as_deref() == Some(upgrade_id))
            .ok_or_else(|| GameApiError::Rejected {
                upgrade_id: upgrade_id.to_string(),
                reason: "unknown upgrade".to_string(),
            })?;

        let price = entry.price.unwrap_or_default();
        let profit = entry.profit_per_hour_delta.unwrap_or_default();
        if entry.cooldown_seconds.unwrap_or_default() > 0.0 {
            return Ok(PurchaseOutcome {
                success: false,
                new_balance: Some(balance),
            });
        }
        if price > balance as f64 {
            return Ok(PurchaseOutcome {
                success: false,
                new_balance: Some(balance),
            });
        }

        entry.level = Some(entry.level.unwrap_or(1) + 1);
        entry.price = Some((price * (100 + self.price_growth_pct) as f64 / 100.0).ceil());
        entry.profit_per_hour_delta = Some((profit / 2.0).floor());
        if self.cooldown_after_buy > 0 {
            entry.cooldown_seconds = Some(self.cooldown_after_buy as f64);
        }

        state.balance -= price as i64;
        state.passive_per_hour = state.passive_per_hour.saturating_add(profit as i64);
        state.purchases.push(upgrade_id.to_string());

        Ok(PurchaseOutcome {
            success: true,
            new_balance: Some(state.balance),
        })
    }

    async fn fetch_balance(&self) -> Result<AccountBalance, GameApiError> {
        let state = self.state.lock().await;
        Ok(AccountBalance {
            balance_coins: state.balance,
            passive_per_hour: Some(state.passive_per_hour),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrades::catalog::tests::raw;

    #[tokio::test]
    async fn test_sim_purchase_updates_state() {
        let sim = SimGameClient::new(1_000, vec![raw("A", 100.0, 10.0)]);

        let outcome = sim.purchase("A").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.new_balance, Some(900));

        let catalog = sim.fetch_catalog().await.unwrap();
        assert_eq!(catalog[0].price, Some(150.0));
        assert_eq!(catalog[0].level, Some(2));

        let balance = sim.fetch_balance().await.unwrap();
        assert_eq!(balance.passive_per_hour, Some(10));
        assert_eq!(sim.purchases().await, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_sim_rejects_unknown_and_unaffordable() {
        let sim = SimGameClient::new(50, vec![raw("A", 100.0, 10.0)]);
        assert!(matches!(
            sim.purchase("missing").await,
            Err(GameApiError::Rejected { .. })
        ));
        let outcome = sim.purchase("A").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(sim.balance().await, 50);
    }

    #[tokio::test]
    async fn test_sim_cooldown_after_buy() {
        let sim = SimGameClient::new(1_000, vec![raw("A", 100.0, 10.0)]).with_cooldown_after_buy(600);
        assert!(sim.purchase("A").await.unwrap().success);

        let catalog = sim.fetch_catalog().await.unwrap();
        assert!(catalog[0].cooldown_seconds.unwrap() > 590.0);
        assert!(!sim.purchase("A").await.unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_cooldown_expires_with_clock() {
        let mut card = raw("A", 100.0, 10.0);
        card.cooldown_seconds = Some(30.0);
        let sim = SimGameClient::new(1_000, vec![card]);

        assert!(!sim.purchase("A").await.unwrap().success);

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert!(sim.purchase("A").await.unwrap().success);
        assert_eq!(sim.balance().await, 900);
    }
}
