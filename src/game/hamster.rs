use crate::config::config::{AccountCfg, GameCfg};
use crate::game::client::{AccountBalance, GameApiClient, GameApiError, PurchaseOutcome};
use crate::upgrades::catalog::RawUpgrade;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickerUser {
    balance_coins: f64,
    #[serde(default)]
    earn_passive_per_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    clicker_user: ClickerUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpgradesForBuyResponse {
    upgrades_for_buy: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyUpgradeResponse {
    #[serde(default)]
    clicker_user: Option<ClickerUser>,
}

/// Game API over HTTPS. Every endpoint is a POST under `/clicker/`,
/// optionally preceded by the CORS preflight a browser would send.
pub struct HamsterClient {
    client: Client,
    base_url: String,
    authorization: String,
    headers: HeaderMap,
    pacing: Duration,
    preflight: bool,
}

impl HamsterClient {
    pub fn new(client: Client, game: &GameCfg, account: &AccountCfg) -> Self {
        Self {
            client,
            base_url: game.base_url.trim_end_matches('/').to_string(),
            authorization: account.authorization.clone(),
            headers: default_headers(&game.origin, &account.user_agent),
            pacing: game.pacing,
            preflight: game.preflight,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/clicker/{}", self.base_url, endpoint)
    }

    async fn call_endpoint<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GameApiError> {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        let url = self.url(endpoint);

        if self.preflight {
            let request_headers = if body.is_some() {
                "authorization,content-type"
            } else {
                "authorization"
            };
            let res = self
                .client
                .request(reqwest::Method::OPTIONS, &url)
                .headers(self.headers.clone())
                .header("Access-Control-Request-Headers", request_headers)
                .header("Access-Control-Request-Method", "POST")
                .send()
                .await;
            if let Err(e) = res {
                debug!("preflight for {} failed: {}", endpoint, e);
            }
        }

        let mut headers = self.headers.clone();
        if body.is_some() {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        let mut req = self
            .client
            .post(&url)
            .headers(headers)
            .header(AUTHORIZATION, &self.authorization);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|source| GameApiError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GameApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>().await.map_err(|e| GameApiError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

fn default_headers(origin: &str, user_agent: &str) -> HeaderMap {
    let mut pairs: Vec<(&str, String)> = vec![
        ("Accept", "*/*".to_string()),
        ("Origin", origin.to_string()),
        ("Referer", format!("{}/", origin.trim_end_matches('/'))),
        ("Sec-Fetch-Dest", "empty".to_string()),
        ("Sec-Fetch-Mode", "cors".to_string()),
        ("Sec-Fetch-Site", "same-site".to_string()),
        ("User-Agent", user_agent.to_string()),
    ];

    // The web app embedded in the Android client sends these as well.
    if user_agent.contains("Android") {
        pairs.push(("Sec-Ch-Ua-Platform", "\"Android\"".to_string()));
        pairs.push(("Sec-Ch-Ua-Mobile", "?1".to_string()));
        pairs.push((
            "Sec-Ch-Ua",
            "\"Android WebView\";v=\"125\", \"Chromium\";v=\"125\", \"Not.A/Brand\";v=\"24\""
                .to_string(),
        ));
        pairs.push(("X-Requested-With", "org.telegram.messenger.web".to_string()));
    }

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("skipping invalid header {}: {:?}", name, value),
        }
    }
    headers
}

/// Entries that do not even parse as an object are logged and skipped; the
/// rest are left for the catalog adapter to validate.
fn parse_catalog_entries(entries: Vec<serde_json::Value>) -> Vec<RawUpgrade> {
    entries
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawUpgrade>(v) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Failed to parse upgrade entry: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl GameApiClient for HamsterClient {
    async fn fetch_catalog(&self) -> Result<Vec<RawUpgrade>, GameApiError> {
        let resp: UpgradesForBuyResponse = self.call_endpoint("upgrades-for-buy", None).await?;
        Ok(parse_catalog_entries(resp.upgrades_for_buy))
    }

    async fn purchase(&self, upgrade_id: &str) -> Result<PurchaseOutcome, GameApiError> {
        let body = json!({
            "upgradeId": upgrade_id,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        let resp: BuyUpgradeResponse = self.call_endpoint("buy-upgrade", Some(body)).await?;
        Ok(PurchaseOutcome {
            success: true,
            new_balance: resp.clicker_user.map(|u| u.balance_coins.floor() as i64),
        })
    }

    async fn fetch_balance(&self) -> Result<AccountBalance, GameApiError> {
        let resp: SyncResponse = self.call_endpoint("sync", None).await?;
        Ok(AccountBalance {
            balance_coins: resp.clicker_user.balance_coins.floor() as i64,
            passive_per_hour: resp
                .clicker_user
                .earn_passive_per_hour
                .map(|p| p.floor() as i64),
        })
    }
}
