use crate::bus::types::Bus;
use crate::config::config::UpgradePolicyCfg;
use crate::core::types::{FarmEvent, FarmEventKind, UpgradeCandidate, format_coins};
use crate::game::client::{GameApiClient, PurchaseOutcome};
use crate::upgrades::catalog::filter_eligible;
use crate::upgrades::selector::{UNBOUNDED_BUDGET, coefficient, rank};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseMode {
    /// Buy the best affordable ready card until the budget floor.
    BudgetBounded,
    /// Wait for the overall best card, optionally buying others while it cools down.
    WaitForBestCard,
}

/// Why a farming cycle ended. Every cycle ends with exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Disabled,
    BalanceSyncFailed,
    BalanceTooLow,
    NoEligibleUpgrades,
    CatalogFetchFailed,
    PurchaseFailed,
    BudgetFloorReached,
    BestCardOnCooldown,
    CoefficientTooHigh,
    AllOnCooldown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Disabled => "disabled",
            StopReason::BalanceSyncFailed => "balance_sync_failed",
            StopReason::BalanceTooLow => "balance_too_low",
            StopReason::NoEligibleUpgrades => "no_eligible_upgrades",
            StopReason::CatalogFetchFailed => "catalog_fetch_failed",
            StopReason::PurchaseFailed => "purchase_failed",
            StopReason::BudgetFloorReached => "budget_floor_reached",
            StopReason::BestCardOnCooldown => "best_card_on_cooldown",
            StopReason::CoefficientTooHigh => "coefficient_too_high",
            StopReason::AllOnCooldown => "all_on_cooldown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseSessionState {
    pub balance_coins: i64,
    pub passive_per_hour: Option<i64>,
    pub profit_per_hour_accumulated: i64,
    pub coins_spent_accumulated: i64,
    pub budget_floor: i64,
    pub parallel_mode_enabled: bool,
    pub parallel_coefficient_ceiling: Decimal,
    pub purchases: u32,
}

impl PurchaseSessionState {
    fn from_policy(policy: &UpgradePolicyCfg) -> Self {
        Self {
            balance_coins: 0,
            passive_per_hour: None,
            profit_per_hour_accumulated: 0,
            coins_spent_accumulated: 0,
            budget_floor: policy.budget_floor,
            parallel_mode_enabled: policy.parallel_upgrades,
            parallel_coefficient_ceiling: policy.parallel_max_coefficient,
            purchases: 0,
        }
    }

    /// Debit optimistically; a balance reported by the game wins.
    fn record_purchase(&mut self, card: &UpgradeCandidate, reported_balance: Option<i64>) {
        self.balance_coins = reported_balance.unwrap_or(self.balance_coins - card.price);
        self.profit_per_hour_accumulated = self
            .profit_per_hour_accumulated
            .saturating_add(card.profit_per_hour_delta);
        self.coins_spent_accumulated = self.coins_spent_accumulated.saturating_add(card.price);
        self.passive_per_hour = self
            .passive_per_hour
            .map(|p| p.saturating_add(card.profit_per_hour_delta));
        self.purchases += 1;
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub reason: StopReason,
    pub bought: Vec<UpgradeCandidate>,
    pub state: PurchaseSessionState,
}

/// Runs one farming cycle for one account. Purchases are strictly
/// sequential; the scheduler is consumed by `run`.
pub struct PurchaseScheduler {
    account: String,
    client: Arc<dyn GameApiClient>,
    bus: Bus,
    policy: UpgradePolicyCfg,
    state: PurchaseSessionState,
    bought: Vec<UpgradeCandidate>,
}

impl PurchaseScheduler {
    pub fn new(
        account: &str,
        client: Arc<dyn GameApiClient>,
        bus: Bus,
        policy: UpgradePolicyCfg,
    ) -> Self {
        let state = PurchaseSessionState::from_policy(&policy);
        Self {
            account: account.to_string(),
            client,
            bus,
            policy,
            state,
            bought: Vec::new(),
        }
    }

    pub fn mode(&self) -> PurchaseMode {
        if self.policy.wait_for_best_card {
            PurchaseMode::WaitForBestCard
        } else {
            PurchaseMode::BudgetBounded
        }
    }

    pub async fn run(mut self) -> CycleReport {
        if !self.policy.auto_upgrade {
            info!("Auto upgrade is disabled");
            return self.report(StopReason::Disabled);
        }

        if !self.sync_balance().await {
            return self.finish(StopReason::BalanceSyncFailed).await;
        }

        let reason = match self.mode() {
            PurchaseMode::BudgetBounded => self.run_budget_bounded().await,
            PurchaseMode::WaitForBestCard => self.run_wait_for_best_card().await,
        };
        self.finish(reason).await
    }

    async fn run_budget_bounded(&mut self) -> StopReason {
        if self.state.balance_coins < self.policy.budget_start {
            warn!(
                "Balance {} is too low to start buying upgrades (needs {})",
                format_coins(self.state.balance_coins),
                format_coins(self.policy.budget_start)
            );
            self.publish(FarmEventKind::BalanceTooLow {
                balance: self.state.balance_coins,
                best_card: None,
            })
            .await;
            return StopReason::BalanceTooLow;
        }

        loop {
            if self.state.balance_coins < self.state.budget_floor {
                return StopReason::BudgetFloorReached;
            }

            info!("Checking for upgrades...");
            let Some(eligible) = self.fetch_eligible().await else {
                return StopReason::CatalogFetchFailed;
            };
            let balance = self.state.balance_coins;
            let ready: Vec<UpgradeCandidate> = eligible
                .into_iter()
                .filter(|c| c.is_purchasable_with(balance))
                .collect();

            let ranked = rank(&ready, balance);
            let Some(best) = ranked.into_iter().next() else {
                warn!("No upgrades available");
                return StopReason::NoEligibleUpgrades;
            };
            info!("Best upgrade is {}", best.describe());

            if self.state.balance_coins - best.price < self.state.budget_floor {
                info!(
                    "Buying {} would leave {} below the floor of {}",
                    best.name,
                    format_coins(self.state.balance_coins - best.price),
                    format_coins(self.state.budget_floor)
                );
                return StopReason::BudgetFloorReached;
            }

            if !self.buy(&best).await {
                return StopReason::PurchaseFailed;
            }
        }
    }

    async fn run_wait_for_best_card(&mut self) -> StopReason {
        loop {
            info!("Checking for best card...");
            let Some(eligible) = self.fetch_eligible().await else {
                return StopReason::CatalogFetchFailed;
            };

            let ranked = rank(&eligible, UNBOUNDED_BUDGET);
            if ranked.is_empty() {
                warn!("No upgrades available");
                return StopReason::NoEligibleUpgrades;
            }
            info!("Best upgrade is {}", ranked[0].describe());

            let target = match self.pick_wait_target(&ranked).await {
                Ok(target) => target,
                Err(reason) => return reason,
            };

            if self.state.balance_coins < target.price {
                warn!(
                    "Balance {} is too low to buy {}",
                    format_coins(self.state.balance_coins),
                    target.describe()
                );
                self.publish(FarmEventKind::BalanceTooLow {
                    balance: self.state.balance_coins,
                    best_card: Some(target.describe()),
                })
                .await;
                return StopReason::BalanceTooLow;
            }

            if !self.buy(&target).await {
                return StopReason::PurchaseFailed;
            }
        }
    }

    /// Walk the ranking best-first. Short cooldowns are waited out, long ones
    /// end the cycle unless parallel buying lets us move on to the next card.
    /// With parallel buying on, the first ready card above the coefficient
    /// ceiling ends the cycle; cheaper cards further down are not considered.
    async fn pick_wait_target(
        &self,
        ranked: &[UpgradeCandidate],
    ) -> Result<UpgradeCandidate, StopReason> {
        let parallel = self.state.parallel_mode_enabled;

        for card in ranked {
            if card.cooldown_seconds > 0 {
                let cooldown = Duration::from_secs(card.cooldown_seconds);
                if cooldown < self.policy.short_cooldown {
                    info!(
                        "{} is on cooldown, waiting {} seconds",
                        card.name, card.cooldown_seconds
                    );
                    tokio::time::sleep(cooldown).await;
                } else if !parallel {
                    warn!(
                        "Best card is on cooldown for {} seconds: {}",
                        card.cooldown_seconds,
                        card.describe()
                    );
                    return Err(StopReason::BestCardOnCooldown);
                } else {
                    info!(
                        "{} is on cooldown for {} seconds, looking for a parallel buy",
                        card.name, card.cooldown_seconds
                    );
                    continue;
                }
            }

            if parallel {
                let coef = coefficient(card);
                if coef > self.state.parallel_coefficient_ceiling {
                    info!(
                        "{} costs {} coins per hourly coin, above the parallel ceiling {}",
                        card.name, coef, self.state.parallel_coefficient_ceiling
                    );
                    return Err(StopReason::CoefficientTooHigh);
                }
            }
            return Ok(card.clone());
        }

        warn!("No more cards for parallel buy");
        Err(StopReason::AllOnCooldown)
    }

    async fn fetch_eligible(&self) -> Option<Vec<UpgradeCandidate>> {
        match self.client.fetch_catalog().await {
            Ok(raw) => Some(filter_eligible(raw)),
            Err(e) => {
                error!("Failed to get upgrades list: {}", e);
                self.publish(FarmEventKind::CatalogFetchFailed {
                    error: e.to_string(),
                })
                .await;
                None
            }
        }
    }

    async fn buy(&mut self, card: &UpgradeCandidate) -> bool {
        info!("Attempting to buy {}", card.describe());

        let failure = match self.client.purchase(&card.id).await {
            Ok(PurchaseOutcome {
                success: true,
                new_balance,
            }) => {
                self.state.record_purchase(card, new_balance);
                self.bought.push(card.clone());
                metrics::counter!("upgrades_purchased_total").increment(1);
                metrics::counter!("coins_spent").increment(card.price.max(0) as u64);
                info!(
                    "Upgrade bought successfully, balance {}, profit per hour +{}, spent {}",
                    format_coins(self.state.balance_coins),
                    format_coins(self.state.profit_per_hour_accumulated),
                    format_coins(self.state.coins_spent_accumulated)
                );
                self.publish(FarmEventKind::Purchased {
                    name: card.name.clone(),
                    price: card.price,
                    profit_per_hour_delta: card.profit_per_hour_delta,
                    level: card.level,
                })
                .await;
                self.maybe_resync().await;
                return true;
            }
            Ok(PurchaseOutcome { success: false, .. }) => "purchase rejected by game".to_string(),
            Err(e) => e.to_string(),
        };

        metrics::counter!("upgrades_purchase_failures_total").increment(1);
        warn!("Failed to buy {}: {}", card.name, failure);
        self.publish(FarmEventKind::PurchaseFailed {
            name: card.name.clone(),
            price: card.price,
            profit_per_hour_delta: card.profit_per_hour_delta,
            level: card.level,
            error: failure,
        })
        .await;
        false
    }

    async fn maybe_resync(&mut self) {
        let every = self.policy.balance_resync_every;
        if every > 0 && self.state.purchases % every == 0 {
            self.sync_balance().await;
        }
    }

    async fn sync_balance(&mut self) -> bool {
        match self.client.fetch_balance().await {
            Ok(balance) => {
                self.state.balance_coins = balance.balance_coins;
                if balance.passive_per_hour.is_some() {
                    self.state.passive_per_hour = balance.passive_per_hour;
                }
                true
            }
            Err(e) => {
                error!("Unable to get account data: {}", e);
                false
            }
        }
    }

    async fn finish(mut self, reason: StopReason) -> CycleReport {
        if reason != StopReason::BalanceSyncFailed && self.state.purchases > 0 {
            self.sync_balance().await;
        }
        metrics::counter!("farm_cycles_total", "reason" => reason.as_str()).increment(1);
        info!(
            "Cycle finished ({}): balance {}, profit per hour +{}, spent {}, {} purchases",
            reason,
            format_coins(self.state.balance_coins),
            format_coins(self.state.profit_per_hour_accumulated),
            format_coins(self.state.coins_spent_accumulated),
            self.state.purchases
        );
        self.publish(FarmEventKind::CycleSummary {
            balance: self.state.balance_coins,
            passive_per_hour: self.state.passive_per_hour,
            profit_gained: self.state.profit_per_hour_accumulated,
            coins_spent: self.state.coins_spent_accumulated,
            purchases: self.state.purchases,
            reason: reason.to_string(),
        })
        .await;
        self.report(reason)
    }

    fn report(self, reason: StopReason) -> CycleReport {
        CycleReport {
            reason,
            bought: self.bought,
            state: self.state,
        }
    }

    async fn publish(&self, kind: FarmEventKind) {
        let event = FarmEvent::new(&self.account, kind);
        if let Err(e) = self.bus.farm_events.publish(event).await {
            error!("Failed to publish farm event: {:?}", e);
        }
    }
}
