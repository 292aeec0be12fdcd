use crate::upgrades::catalog::RawUpgrade;
use anyhow::{Context, Result};
use config::{Config, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub game: GameCfg,
    #[serde(default)]
    pub telegram: TelegramCfg,
    #[serde(default)]
    pub farm: FarmCfg,
    pub accounts: Vec<AccountCfg>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpCfg {
    #[serde(rename = "userAgent", default = "default_ua")]
    pub user_agent: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(
        rename = "poolIdleTimeout",
        with = "humantime_serde",
        default = "default_pool_idle"
    )]
    pub pool_idle_timeout: Duration,
    #[serde(rename = "poolMaxIdlePerHost", default = "default_pool")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            user_agent: default_ua(),
            timeout: default_timeout(),
            pool_idle_timeout: default_pool_idle(),
            pool_max_idle_per_host: default_pool(),
        }
    }
}
fn default_ua() -> String {
    "card-farmer/0.1".into()
}
fn default_timeout() -> Duration {
    Duration::from_secs(15)
}
fn default_pool_idle() -> Duration {
    Duration::from_secs(90)
}
fn default_pool() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameCfg {
    #[serde(rename = "baseUrl", default = "default_game_url")]
    pub base_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Delay before every API call.
    #[serde(with = "humantime_serde", default = "default_pacing")]
    pub pacing: Duration,
    #[serde(default = "default_true")]
    pub preflight: bool,
    #[serde(default)]
    pub simulate: bool,
    #[serde(rename = "simulatedBalance", default)]
    pub simulated_balance: i64,
    #[serde(rename = "simulatedCatalog", default)]
    pub simulated_catalog: Vec<RawUpgrade>,
}

impl Default for GameCfg {
    fn default() -> Self {
        Self {
            base_url: default_game_url(),
            origin: default_origin(),
            pacing: default_pacing(),
            preflight: true,
            simulate: false,
            simulated_balance: 0,
            simulated_catalog: Vec::new(),
        }
    }
}
fn default_game_url() -> String {
    "https://api.hamsterkombatgame.io".to_string()
}
fn default_origin() -> String {
    "https://hamsterkombatgame.io".to_string()
}
fn default_pacing() -> Duration {
    Duration::from_secs(2)
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramCfg {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(rename = "apiUrl", default = "default_telegram_url")]
    pub api_url: String,
    #[serde(default)]
    pub messages: TelegramMessagesCfg,
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramMessagesCfg {
    #[serde(default = "default_true")]
    pub upgrades: bool,
    #[serde(rename = "accountInfo", default = "default_true")]
    pub account_info: bool,
    #[serde(rename = "otherErrors", default)]
    pub other_errors: bool,
}

impl Default for TelegramMessagesCfg {
    fn default() -> Self {
        Self {
            upgrades: true,
            account_info: true,
            other_errors: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FarmCfg {
    /// Pause between two farming cycles of the same account.
    #[serde(with = "humantime_serde", default = "default_recheck")]
    pub recheck: Duration,
    /// Upper bound, in seconds, of the random delay added to `recheck`.
    #[serde(rename = "maxRandomDelay", default = "default_random_delay")]
    pub max_random_delay: u64,
}

impl Default for FarmCfg {
    fn default() -> Self {
        Self {
            recheck: default_recheck(),
            max_random_delay: default_random_delay(),
        }
    }
}
fn default_recheck() -> Duration {
    Duration::from_secs(300)
}
fn default_random_delay() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccountCfg {
    pub name: String,
    #[serde(default)]
    pub authorization: String,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(rename = "telegramChatId", default)]
    pub telegram_chat_id: String,
    #[serde(default)]
    pub upgrades: UpgradePolicyCfg,
}

/// Per-account purchase policy.
#[derive(Debug, Deserialize, Clone)]
pub struct UpgradePolicyCfg {
    #[serde(rename = "autoUpgrade", default = "default_true")]
    pub auto_upgrade: bool,
    /// Minimum balance needed to start buying at all.
    #[serde(rename = "budgetStart", default = "default_budget_start")]
    pub budget_start: i64,
    /// Buying never leaves the balance below this.
    #[serde(rename = "budgetFloor", default = "default_budget_floor")]
    pub budget_floor: i64,
    #[serde(rename = "waitForBestCard", default)]
    pub wait_for_best_card: bool,
    #[serde(rename = "parallelUpgrades", default = "default_true")]
    pub parallel_upgrades: bool,
    #[serde(
        rename = "parallelMaxCoefficient",
        default = "default_parallel_max_coefficient"
    )]
    pub parallel_max_coefficient: Decimal,
    /// Cooldowns shorter than this are waited out in place.
    #[serde(
        rename = "shortCooldown",
        with = "humantime_serde",
        default = "default_short_cooldown"
    )]
    pub short_cooldown: Duration,
    #[serde(rename = "balanceResyncEvery", default)]
    pub balance_resync_every: u32,
}

impl Default for UpgradePolicyCfg {
    fn default() -> Self {
        Self {
            auto_upgrade: true,
            budget_start: default_budget_start(),
            budget_floor: default_budget_floor(),
            wait_for_best_card: false,
            parallel_upgrades: true,
            parallel_max_coefficient: default_parallel_max_coefficient(),
            short_cooldown: default_short_cooldown(),
            balance_resync_every: 0,
        }
    }
}
fn default_budget_start() -> i64 {
    2_000_000
}
fn default_budget_floor() -> i64 {
    100_000
}
fn default_parallel_max_coefficient() -> Decimal {
    Decimal::from(6_000_000)
}
fn default_short_cooldown() -> Duration {
    Duration::from_secs(300)
}

impl AppCfg {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name(path))
            .add_source(config::Environment::default().separator("__"))
            .build()
            .context("building config")?;

        let app: AppCfg = cfg.try_deserialize().context("deserializing config")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.accounts.is_empty(), "accounts must not be empty");
        anyhow::ensure!(!self.game.base_url.is_empty(), "game.baseUrl missing");
        for account in &self.accounts {
            anyhow::ensure!(!account.name.is_empty(), "account name missing");
            anyhow::ensure!(
                self.game.simulate || !account.authorization.is_empty(),
                "accounts[{}].authorization required unless game.simulate is set",
                account.name
            );
            let policy = &account.upgrades;
            anyhow::ensure!(
                policy.budget_floor >= 0,
                "accounts[{}].upgrades.budgetFloor must be >= 0",
                account.name
            );
            anyhow::ensure!(
                policy.budget_start >= policy.budget_floor,
                "accounts[{}].upgrades.budgetStart must be >= budgetFloor",
                account.name
            );
            anyhow::ensure!(
                policy.parallel_max_coefficient > Decimal::ZERO,
                "accounts[{}].upgrades.parallelMaxCoefficient must be > 0",
                account.name
            );
        }
        if self.telegram.enabled {
            anyhow::ensure!(
                !self.telegram.bot_token.is_empty(),
                "telegram.bot_token required when telegram.enabled"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::env;

    const SAMPLE: &str = r#"
game:
  pacing: 1s
  preflight: false
farm:
  recheck: 10m
  maxRandomDelay: 0
accounts:
  - name: main
    authorization: Bearer abc
    userAgent: Mozilla/5.0 (Linux; Android 14)
    upgrades:
      budgetStart: 5000
      budgetFloor: 1000
      waitForBestCard: true
      parallelMaxCoefficient: 2500.5
      shortCooldown: 2m
"#;

    fn from_str(src: &str) -> Result<AppCfg> {
        let cfg = Config::builder()
            .add_source(File::from_str(src, FileFormat::Yaml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    #[test]
    fn test_parse_sample() {
        let cfg = from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.game.pacing, Duration::from_secs(1));
        assert!(!cfg.game.preflight);
        assert_eq!(cfg.game.base_url, "https://api.hamsterkombatgame.io");
        assert_eq!(cfg.farm.recheck, Duration::from_secs(600));

        let policy = &cfg.accounts[0].upgrades;
        assert!(policy.auto_upgrade);
        assert!(policy.wait_for_best_card);
        assert!(policy.parallel_upgrades);
        assert_eq!(policy.budget_start, 5000);
        assert_eq!(policy.parallel_max_coefficient, Decimal::new(25005, 1));
        assert_eq!(policy.short_cooldown, Duration::from_secs(120));
    }

    #[test]
    fn test_validate_rejects_inverted_budget() {
        let mut cfg = from_str(SAMPLE).unwrap();
        cfg.accounts[0].upgrades.budget_start = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_requires_authorization_unless_simulated() {
        let mut cfg = from_str(SAMPLE).unwrap();
        cfg.accounts[0].authorization.clear();
        assert!(cfg.validate().is_err());
        cfg.game.simulate = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_var_override() {
        unsafe {
            env::set_var("TELEGRAM__BOT_TOKEN", "env-token-123");
        }

        let cfg = Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()
            .unwrap();

        let val = cfg.get_string("telegram.bot_token").unwrap();
        assert_eq!(val, "env-token-123");

        unsafe {
            env::remove_var("TELEGRAM__BOT_TOKEN");
        }
    }
}
