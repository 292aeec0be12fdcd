use crate::core::types::UpgradeCandidate;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("malformed upgrade {id:?}: missing or invalid `{field}`")]
    MalformedCandidate { id: Option<String>, field: &'static str },
}

/// Catalog entry exactly as the game sends it. Every field is optional so a
/// single broken entry never poisons the whole snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUpgrade {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub profit_per_hour_delta: Option<f64>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default)]
    pub is_expired: Option<bool>,
    #[serde(default)]
    pub cooldown_seconds: Option<f64>,
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
}

impl RawUpgrade {
    /// Required: id, price, profitPerHourDelta, isAvailable, isExpired.
    /// A missing name falls back to the id, a missing level to 1 and a
    /// missing cooldown to 0 (the game omits it for ready cards).
    pub fn validate(self) -> Result<UpgradeCandidate, CatalogError> {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(CatalogError::MalformedCandidate {
                    id: None,
                    field: "id",
                });
            }
        };
        let malformed = |field| CatalogError::MalformedCandidate {
            id: Some(id.clone()),
            field,
        };

        let price = self
            .price
            .filter(|p| p.is_finite() && *p >= 0.0)
            .ok_or_else(|| malformed("price"))?;
        let profit = self
            .profit_per_hour_delta
            .filter(|p| p.is_finite())
            .ok_or_else(|| malformed("profitPerHourDelta"))?;
        let is_available = self.is_available.ok_or_else(|| malformed("isAvailable"))?;
        let is_expired = self.is_expired.ok_or_else(|| malformed("isExpired"))?;
        let cooldown = match self.cooldown_seconds {
            None => 0.0,
            Some(c) if c.is_finite() && c >= 0.0 => c,
            Some(_) => return Err(malformed("cooldownSeconds")),
        };
        let level = match self.level {
            None => 1,
            Some(l) if l >= 1 => l,
            Some(_) => return Err(malformed("level")),
        };

        Ok(UpgradeCandidate {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            price: price.ceil() as i64,
            profit_per_hour_delta: profit.floor() as i64,
            level,
            is_available,
            is_expired,
            cooldown_seconds: cooldown.ceil() as u64,
            condition: self.condition,
        })
    }
}

/// Drop malformed, expired, unavailable and non-profitable entries, and
/// repeated ids (the first occurrence wins). Input order is preserved.
pub fn filter_eligible(raw: Vec<RawUpgrade>) -> Vec<UpgradeCandidate> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|entry| match entry.validate() {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                debug!("dropping catalog entry: {}", e);
                None
            }
        })
        .filter(|candidate| {
            let first = seen.insert(candidate.id.clone());
            if !first {
                debug!("dropping duplicate catalog entry {}", candidate.id);
            }
            first
        })
        .filter(UpgradeCandidate::is_eligible)
        .collect()
}
