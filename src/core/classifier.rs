use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::aggregator;
use super::alerts::model::Alert;
use super::model::{Prediction, RiskTier, Zone};

pub const DISPLACEMENT_WEIGHT: f64 = 0.7;
pub const VIBRATION_WEIGHT: f64 = 0.3;

/// Score cut-offs for the fallback heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            warning: 6.0,
            critical: 8.0,
        }
    }
}

/// `0.7 × displacement + 0.3 × vibration`
pub fn heuristic_score(displacement: f64, vibration: f64) -> f64 {
    DISPLACEMENT_WEIGHT * displacement + VIBRATION_WEIGHT * vibration
}

/// Zone counts per tier for the dashboard summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub low: usize,
    pub warning: usize,
    pub critical: usize,
}

/// Single authoritative zone → tier mapping. Risk is computed upstream; the
/// numeric heuristic only fills in when a snapshot omits the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskClassifier {
    thresholds: ScoreThresholds,
}

impl RiskClassifier {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ScoreThresholds {
        &self.thresholds
    }

    pub fn classify(&self, zone: Option<&Zone>) -> RiskTier {
        match zone {
            Some(zone) => zone
                .risk_level
                .unwrap_or_else(|| self.tier_for_score(self.score(zone))),
            None => RiskTier::Low,
        }
    }

    /// Reported score when present, otherwise the weighted heuristic.
    pub fn score(&self, zone: &Zone) -> f64 {
        zone.risk_score
            .unwrap_or_else(|| heuristic_score(zone.displacement, zone.vibration))
    }

    pub fn tier_for_score(&self, score: f64) -> RiskTier {
        if score >= self.thresholds.critical {
            RiskTier::Critical
        } else if score >= self.thresholds.warning {
            RiskTier::Warning
        } else {
            RiskTier::Low
        }
    }

    /// Tier implied by a set of existing alert records.
    pub fn classify_alerts(&self, alerts: &[Alert]) -> RiskTier {
        aggregator::aggregate(alerts).tier
    }

    pub fn summarize(&self, zones: &[Zone]) -> ZoneSummary {
        zones
            .iter()
            .fold(ZoneSummary::default(), |mut summary, zone| {
                match self.classify(Some(zone)) {
                    RiskTier::Low => summary.low += 1,
                    RiskTier::Warning => summary.warning += 1,
                    RiskTier::Critical => summary.critical += 1,
                }
                summary
            })
    }

    /// Local stand-in used when the prediction service cannot be reached.
    pub fn fallback_prediction(&self, zone: &Zone, now: DateTime<Utc>) -> Prediction {
        Prediction {
            risk_level: self.classify(Some(zone)),
            risk_score: heuristic_score(zone.displacement, zone.vibration),
            prediction: format!("Zone {} assessment complete", zone.id),
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_tier_wins_over_metrics() {
        let classifier = RiskClassifier::default();
        let zone = Zone::new("D", "West Highwall")
            .with_level(RiskTier::Warning)
            .with_metrics(20.0, 9.0);

        assert_eq!(classifier.classify(Some(&zone)), RiskTier::Warning);
    }

    #[test]
    fn test_heuristic_partitions_scores() {
        let classifier = RiskClassifier::default();

        // 0.7 * 12.4 + 0.3 * 3.8 = 9.82
        let critical = Zone::new("B", "South Slope").with_metrics(12.4, 3.8);
        // 0.7 * 8.0 + 0.3 * 2.0 = 6.2
        let warning = Zone::new("D", "West Highwall").with_metrics(8.0, 2.0);
        let low = Zone::new("A", "North Pit Wall").with_metrics(2.1, 1.2);

        assert_eq!(classifier.classify(Some(&critical)), RiskTier::Critical);
        assert_eq!(classifier.classify(Some(&warning)), RiskTier::Warning);
        assert_eq!(classifier.classify(Some(&low)), RiskTier::Low);
    }

    #[test]
    fn test_absent_zone_is_low() {
        assert_eq!(RiskClassifier::default().classify(None), RiskTier::Low);
    }

    #[test]
    fn test_reported_score_preferred_over_heuristic() {
        let classifier = RiskClassifier::default();
        let zone = Zone::new("A", "North Pit Wall")
            .with_metrics(1.0, 1.0)
            .with_score(8.5);

        assert_eq!(classifier.classify(Some(&zone)), RiskTier::Critical);
    }

    #[test]
    fn test_summary_counts() {
        let classifier = RiskClassifier::default();
        let zones = vec![
            Zone::new("A", "North").with_level(RiskTier::Low),
            Zone::new("B", "South").with_level(RiskTier::Critical),
            Zone::new("C", "East").with_level(RiskTier::Warning),
            Zone::new("D", "West").with_level(RiskTier::Warning),
        ];

        let summary = classifier.summarize(&zones);
        assert_eq!(
            summary,
            ZoneSummary {
                low: 1,
                warning: 2,
                critical: 1
            }
        );
    }

    #[test]
    fn test_fallback_prediction_uses_heuristic_score() {
        let classifier = RiskClassifier::default();
        let zone = Zone::new("B", "South Slope").with_metrics(10.0, 5.0);

        let prediction = classifier.fallback_prediction(&zone, Utc::now());
        assert!((prediction.risk_score - 8.5).abs() < 1e-9);
        assert_eq!(prediction.risk_level, RiskTier::Critical);
        assert_eq!(prediction.prediction, "Zone B assessment complete");
    }
}
