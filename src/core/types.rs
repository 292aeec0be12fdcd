use anyhow::Result;
use serde::{Deserialize, Serialize};

#[async_trait::async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn run(self) -> Result<()>;
}

// ----------- Domain types -----------------

/// One purchasable card as seen in a single catalog snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCandidate {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub profit_per_hour_delta: i64,
    pub level: i64,
    pub is_available: bool,
    pub is_expired: bool,
    pub cooldown_seconds: u64,
    /// Unlock requirement as sent by the game. Never inspected.
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
}

impl UpgradeCandidate {
    pub fn is_eligible(&self) -> bool {
        !self.is_expired && self.is_available && self.profit_per_hour_delta > 0
    }

    pub fn is_purchasable_with(&self, budget: i64) -> bool {
        self.is_eligible() && self.cooldown_seconds == 0 && self.price <= budget
    }

    /// Short human form used in logs and notifications.
    pub fn describe(&self) -> String {
        format!(
            "{} with profit {} and price {}, Level: {}",
            self.name,
            self.profit_per_hour_delta,
            format_coins(self.price),
            self.level
        )
    }
}

// ----------- Notification messages -----------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FarmEventKind {
    Purchased {
        name: String,
        price: i64,
        profit_per_hour_delta: i64,
        level: i64,
    },
    PurchaseFailed {
        name: String,
        price: i64,
        profit_per_hour_delta: i64,
        level: i64,
        error: String,
    },
    BalanceTooLow {
        balance: i64,
        best_card: Option<String>,
    },
    CatalogFetchFailed {
        error: String,
    },
    CycleSummary {
        balance: i64,
        passive_per_hour: Option<i64>,
        profit_gained: i64,
        coins_spent: i64,
        purchases: u32,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FarmEvent {
    pub account: String,
    pub kind: FarmEventKind,
    pub ts_ms: i64,
}

impl FarmEvent {
    pub fn new(account: &str, kind: FarmEventKind) -> Self {
        Self {
            account: account.to_string(),
            kind,
            ts_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn render(&self) -> String {
        match &self.kind {
            FarmEventKind::Purchased {
                name,
                price,
                profit_per_hour_delta,
                level,
            } => format!(
                "[{}] Bought {} with profit {} and price {}, Level: {}",
                self.account,
                name,
                profit_per_hour_delta,
                format_coins(*price),
                level
            ),
            FarmEventKind::PurchaseFailed {
                name, price, error, ..
            } => format!(
                "[{}] Failed to buy {} for {}: {}",
                self.account,
                name,
                format_coins(*price),
                error
            ),
            FarmEventKind::BalanceTooLow { balance, best_card } => match best_card {
                Some(card) => format!(
                    "[{}] Balance {} is too low to buy the best card, Best card: {}",
                    self.account,
                    format_coins(*balance),
                    card
                ),
                None => format!(
                    "[{}] Balance {} is too low to start buying upgrades",
                    self.account,
                    format_coins(*balance)
                ),
            },
            FarmEventKind::CatalogFetchFailed { error } => {
                format!("[{}] Failed to get upgrades list: {}", self.account, error)
            }
            FarmEventKind::CycleSummary {
                balance,
                passive_per_hour,
                profit_gained,
                coins_spent,
                purchases,
                reason,
            } => {
                let passive = passive_per_hour
                    .map(format_coins)
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "[{}] Final account balance: {} coins, Your profit per hour is {} (+{}), Spent: {}, Purchases: {}, Stopped: {}",
                    self.account,
                    format_coins(*balance),
                    passive,
                    format_coins(*profit_gained),
                    format_coins(*coins_spent),
                    purchases,
                    reason
                )
            }
        }
    }
}

/// Render a coin amount with k/m/b/t suffixes, two decimals.
pub fn format_coins(amount: i64) -> String {
    let abs = amount.unsigned_abs() as f64;
    let sign = if amount < 0 { "-" } else { "" };
    let (value, suffix) = if abs < 1_000.0 {
        return amount.to_string();
    } else if abs < 1_000_000.0 {
        (abs / 1_000.0, "k")
    } else if abs < 1_000_000_000.0 {
        (abs / 1_000_000.0, "m")
    } else if abs < 1_000_000_000_000.0 {
        (abs / 1_000_000_000.0, "b")
    } else {
        (abs / 1_000_000_000_000.0, "t")
    };
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{sign}{trimmed}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str) -> UpgradeCandidate {
        UpgradeCandidate {
            id: id.to_string(),
            name: id.to_string(),
            price: 100,
            profit_per_hour_delta: 10,
            level: 1,
            is_available: true,
            is_expired: false,
            cooldown_seconds: 0,
            condition: None,
        }
    }

    #[test]
    fn test_format_coins_suffixes() {
        assert_eq!(format_coins(999), "999");
        assert_eq!(format_coins(1_500), "1.5k");
        assert_eq!(format_coins(2_000_000), "2m");
        assert_eq!(format_coins(1_234_567_890), "1.23b");
        assert_eq!(format_coins(7_000_000_000_000), "7t");
        assert_eq!(format_coins(-2_500), "-2.5k");
    }

    #[test]
    fn test_purchasable_requires_budget_and_no_cooldown() {
        let mut c = card("A");
        assert!(c.is_purchasable_with(100));
        assert!(!c.is_purchasable_with(99));

        c.cooldown_seconds = 5;
        assert!(c.is_eligible());
        assert!(!c.is_purchasable_with(1_000));

        c.cooldown_seconds = 0;
        c.profit_per_hour_delta = 0;
        assert!(!c.is_eligible());
    }

    #[test]
    fn test_purchase_event_render() {
        let ev = FarmEvent::new(
            "main",
            FarmEventKind::Purchased {
                name: "CEO".to_string(),
                price: 12_500,
                profit_per_hour_delta: 340,
                level: 4,
            },
        );
        assert_eq!(
            ev.render(),
            "[main] Bought CEO with profit 340 and price 12.5k, Level: 4"
        );
    }

    #[test]
    fn test_event_is_stamped_at_creation() {
        let before = chrono::Utc::now().timestamp_millis();
        let ev = FarmEvent::new("main", FarmEventKind::CatalogFetchFailed { error: "x".into() });
        let after = chrono::Utc::now().timestamp_millis();
        assert!(before <= ev.ts_ms && ev.ts_ms <= after);
    }
}
