// Reduces an alert snapshot to the single condition that should drive
// annunciation.

use super::model::Alert;
use crate::core::model::RiskTier;

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub tier: RiskTier,
    /// First active alert at `tier` in snapshot order; `None` when LOW.
    pub lead: Option<Alert>,
}

impl Aggregation {
    pub fn lead_id(&self) -> Option<&str> {
        self.lead.as_ref().map(|alert| alert.id.as_str())
    }
}

/// Strict precedence reduction over ACTIVE alerts: the first CRITICAL wins,
/// else the first WARNING, else LOW with no lead. Ties break by input order
/// rather than timestamp so the result is deterministic.
pub fn aggregate(alerts: &[Alert]) -> Aggregation {
    let mut first_warning = None;

    for alert in alerts.iter().filter(|alert| alert.is_active()) {
        match alert.tier {
            RiskTier::Critical => {
                return Aggregation {
                    tier: RiskTier::Critical,
                    lead: Some(alert.clone()),
                };
            }
            RiskTier::Warning => {
                if first_warning.is_none() {
                    first_warning = Some(alert);
                }
            }
            RiskTier::Low => {}
        }
    }

    match first_warning {
        Some(alert) => Aggregation {
            tier: RiskTier::Warning,
            lead: Some(alert.clone()),
        },
        None => Aggregation::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::AlertStatus;
    use chrono::{TimeZone, Utc};

    fn make_alert(id: &str, zone: &str, tier: RiskTier, status: AlertStatus) -> Alert {
        let mut alert = Alert::active(
            id,
            zone,
            format!("Zone {zone}"),
            tier,
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
        );
        alert.status = status;
        alert
    }

    #[test]
    fn test_critical_wins_regardless_of_warning_count() {
        let mut alerts: Vec<Alert> = (0..5)
            .map(|i| make_alert(&format!("W{i}"), "D", RiskTier::Warning, AlertStatus::Active))
            .collect();
        alerts.insert(3, make_alert("C1", "B", RiskTier::Critical, AlertStatus::Active));

        let result = aggregate(&alerts);
        assert_eq!(result.tier, RiskTier::Critical);
        assert_eq!(result.lead_id(), Some("C1"));
    }

    #[test]
    fn test_warning_before_critical_in_input_order() {
        let alerts = vec![
            make_alert("ALT2", "D", RiskTier::Warning, AlertStatus::Active),
            make_alert("ALT1", "B", RiskTier::Critical, AlertStatus::Active),
        ];

        let result = aggregate(&alerts);
        assert_eq!(result.tier, RiskTier::Critical);
        assert_eq!(result.lead.unwrap().zone_id, "B");
    }

    #[test]
    fn test_ties_break_by_snapshot_order_not_timestamp() {
        let mut older = make_alert("late-in-list", "C", RiskTier::Critical, AlertStatus::Active);
        older.timestamp = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let alerts = vec![
            make_alert("early-in-list", "B", RiskTier::Critical, AlertStatus::Active),
            older,
        ];

        assert_eq!(aggregate(&alerts).lead_id(), Some("early-in-list"));
    }

    #[test]
    fn test_resolved_alerts_are_ignored() {
        let alerts = vec![
            make_alert("ALT1", "B", RiskTier::Critical, AlertStatus::Resolved),
            make_alert("ALT2", "D", RiskTier::Warning, AlertStatus::Active),
        ];

        let result = aggregate(&alerts);
        assert_eq!(result.tier, RiskTier::Warning);
        assert_eq!(result.lead_id(), Some("ALT2"));
    }

    #[test]
    fn test_no_active_alerts_yields_low_without_lead() {
        let alerts = vec![
            make_alert("ALT1", "B", RiskTier::Critical, AlertStatus::Resolved),
            make_alert("ALT3", "A", RiskTier::Low, AlertStatus::Active),
        ];

        assert_eq!(aggregate(&alerts), Aggregation::default());
        assert_eq!(aggregate(&[]).lead, None);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let alerts = vec![make_alert("ALT1", "B", RiskTier::Critical, AlertStatus::Active)];
        let before = alerts.clone();
        let _ = aggregate(&alerts);
        assert_eq!(alerts, before);
    }
}
