use crate::core::types::UpgradeCandidate;
use rust_decimal::Decimal;

/// Budget used when ranking should ignore affordability.
pub const UNBOUNDED_BUDGET: i64 = i64::MAX;

/// Coins spent per unit of hourly profit gained. Lower is better.
///
/// Only meaningful for eligible candidates, which guarantee a positive
/// profit delta.
pub fn coefficient(candidate: &UpgradeCandidate) -> Decimal {
    debug_assert!(candidate.profit_per_hour_delta > 0);
    Decimal::from(candidate.price) / Decimal::from(candidate.profit_per_hour_delta)
}

/// Affordable candidates ordered best-first by coefficient. Equal
/// coefficients keep their input order.
pub fn rank(eligible: &[UpgradeCandidate], budget: i64) -> Vec<UpgradeCandidate> {
    let mut ranked: Vec<UpgradeCandidate> = eligible
        .iter()
        .filter(|c| c.price <= budget)
        .cloned()
        .collect();
    ranked.sort_by_cached_key(coefficient);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, price: i64, profit: i64) -> UpgradeCandidate {
        UpgradeCandidate {
            id: id.to_string(),
            name: id.to_string(),
            price,
            profit_per_hour_delta: profit,
            level: 1,
            is_available: true,
            is_expired: false,
            cooldown_seconds: 0,
            condition: None,
        }
    }

    fn ids(ranked: &[UpgradeCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_rank_by_coefficient() {
        let catalog = vec![card("A", 1000, 10), card("B", 100, 5)];
        let ranked = rank(&catalog, 2000);
        assert_eq!(ids(&ranked), vec!["B", "A"]);
        assert_eq!(coefficient(&ranked[0]), Decimal::from(20));
        assert_eq!(coefficient(&ranked[1]), Decimal::from(100));
    }

    #[test]
    fn test_rank_drops_unaffordable() {
        let catalog = vec![card("cheap", 50, 1), card("pricey", 500, 100), card("exact", 200, 2)];
        let ranked = rank(&catalog, 200);
        assert_eq!(ids(&ranked), vec!["cheap", "exact"]);
        assert!(ranked.iter().all(|c| c.price <= 200));
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        // 300/3 == 100/1 == 200/2
        let catalog = vec![
            card("first", 300, 3),
            card("better", 10, 1),
            card("second", 100, 1),
            card("third", 200, 2),
        ];
        let ranked = rank(&catalog, UNBOUNDED_BUDGET);
        assert_eq!(ids(&ranked), vec!["better", "first", "second", "third"]);
    }

    #[test]
    fn test_rank_is_monotonic() {
        let catalog: Vec<UpgradeCandidate> = (1..40)
            .map(|i| card(&format!("c{i}"), (i * 7919) % 1000 + 1, (i * 104729) % 97 + 1))
            .collect();
        let ranked = rank(&catalog, 600);
        for pair in ranked.windows(2) {
            assert!(coefficient(&pair[0]) <= coefficient(&pair[1]));
        }
        assert!(ranked.iter().all(|c| c.price <= 600));
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(&[], 1_000).is_empty());
    }
}
