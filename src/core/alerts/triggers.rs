// Threshold evaluation for a single zone.
//
// Each check contributes a trigger reason and raises the zone's tier; the
// combined outcome decides the recommended action.

use serde::{Deserialize, Serialize};

use crate::core::classifier::RiskClassifier;
use crate::core::model::{RiskTier, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    CriticalDisplacement,
    HighDisplacement,
    CriticalVibration,
    HighVibration,
    CriticalRiskScore,
    HighRiskScore,
    /// The provider reported a tier above what the metrics imply.
    ReportedLevel,
    MultipleFactors,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalDisplacement => "critical_displacement",
            Self::HighDisplacement => "high_displacement",
            Self::CriticalVibration => "critical_vibration",
            Self::HighVibration => "high_vibration",
            Self::CriticalRiskScore => "critical_risk_score",
            Self::HighRiskScore => "high_risk_score",
            Self::ReportedLevel => "reported_level",
            Self::MultipleFactors => "multiple_factors",
        }
    }
}

/// Metric thresholds for one zone (mm and mm/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneThresholds {
    pub displacement_warning: f64,
    pub displacement_critical: f64,
    pub vibration_warning: f64,
    pub vibration_critical: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            displacement_warning: 5.0,
            displacement_critical: 8.0,
            vibration_warning: 1.5,
            vibration_critical: 2.5,
        }
    }
}

/// Context provided to the trigger checks.
pub struct TriggerContext<'a> {
    pub thresholds: &'a ZoneThresholds,
    pub classifier: &'a RiskClassifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub tier: RiskTier,
    pub reasons: Vec<TriggerReason>,
    pub risk_score: f64,
}

impl TriggerOutcome {
    pub fn reason_text(&self) -> String {
        self.reasons
            .iter()
            .map(TriggerReason::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn recommended_action(&self) -> &'static str {
        recommended_action(self.tier, &self.reasons)
    }
}

/// Evaluate every check for `zone`. Returns `None` when nothing fires.
pub fn evaluate_zone(zone: &Zone, ctx: &TriggerContext) -> Option<TriggerOutcome> {
    let thresholds = ctx.thresholds;
    let mut fired: Vec<(RiskTier, TriggerReason)> = Vec::new();

    if zone.displacement >= thresholds.displacement_critical {
        fired.push((RiskTier::Critical, TriggerReason::CriticalDisplacement));
    } else if zone.displacement >= thresholds.displacement_warning {
        fired.push((RiskTier::Warning, TriggerReason::HighDisplacement));
    }

    if zone.vibration >= thresholds.vibration_critical {
        fired.push((RiskTier::Critical, TriggerReason::CriticalVibration));
    } else if zone.vibration >= thresholds.vibration_warning {
        fired.push((RiskTier::Warning, TriggerReason::HighVibration));
    }

    let risk_score = ctx.classifier.score(zone);
    match ctx.classifier.tier_for_score(risk_score) {
        RiskTier::Critical => fired.push((RiskTier::Critical, TriggerReason::CriticalRiskScore)),
        RiskTier::Warning => fired.push((RiskTier::Warning, TriggerReason::HighRiskScore)),
        RiskTier::Low => {}
    }

    let computed = highest(&fired);
    if let Some(reported) = zone.risk_level {
        if reported > computed {
            fired.push((reported, TriggerReason::ReportedLevel));
        }
    }

    let tier = highest(&fired);
    let mut reasons: Vec<TriggerReason> = fired.into_iter().map(|(_, reason)| reason).collect();
    if reasons.len() > 1 {
        reasons.push(TriggerReason::MultipleFactors);
    }

    (tier > RiskTier::Low).then(|| TriggerOutcome {
        tier,
        reasons,
        risk_score,
    })
}

fn highest(fired: &[(RiskTier, TriggerReason)]) -> RiskTier {
    fired
        .iter()
        .map(|(level, _)| *level)
        .max()
        .unwrap_or(RiskTier::Low)
}

pub fn recommended_action(tier: RiskTier, reasons: &[TriggerReason]) -> &'static str {
    let has = |reason: TriggerReason| reasons.contains(&reason);
    match tier {
        RiskTier::Critical => {
            if has(TriggerReason::CriticalDisplacement) {
                "Immediate evacuation and equipment removal"
            } else if has(TriggerReason::MultipleFactors) && !has(TriggerReason::CriticalVibration) {
                "Emergency evacuation protocol activated"
            } else {
                "Immediate evacuation required"
            }
        }
        RiskTier::Warning => {
            if has(TriggerReason::HighDisplacement) {
                "Monitor closely and restrict access"
            } else if has(TriggerReason::HighVibration) {
                "Reduce blast intensity in adjacent areas"
            } else {
                "Increase monitoring frequency"
            }
        }
        RiskTier::Low => "Routine monitoring",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(zone: &Zone) -> Option<TriggerOutcome> {
        let thresholds = ZoneThresholds::default();
        let classifier = RiskClassifier::default();
        let ctx = TriggerContext {
            thresholds: &thresholds,
            classifier: &classifier,
        };
        evaluate_zone(zone, &ctx)
    }

    #[test]
    fn test_quiet_zone_does_not_trigger() {
        let zone = Zone::new("A", "North Pit Wall").with_metrics(2.1, 1.2);
        assert!(evaluate(&zone).is_none());
    }

    #[test]
    fn test_critical_displacement_triggers() {
        let zone = Zone::new("B", "South Slope").with_metrics(12.4, 1.0);
        let outcome = evaluate(&zone).unwrap();

        assert_eq!(outcome.tier, RiskTier::Critical);
        assert_eq!(outcome.reasons[0], TriggerReason::CriticalDisplacement);
        assert_eq!(outcome.recommended_action(), "Immediate evacuation and equipment removal");
    }

    #[test]
    fn test_high_vibration_is_warning() {
        let zone = Zone::new("C", "East Bench").with_metrics(1.0, 1.8);
        let outcome = evaluate(&zone).unwrap();

        assert_eq!(outcome.tier, RiskTier::Warning);
        assert_eq!(outcome.reasons, vec![TriggerReason::HighVibration]);
        assert_eq!(outcome.recommended_action(), "Reduce blast intensity in adjacent areas");
    }

    #[test]
    fn test_multiple_factors_appended() {
        // displacement warning, vibration critical, score 0.7*6 + 0.3*3 = 5.1
        let zone = Zone::new("D", "West Highwall").with_metrics(6.0, 3.0);
        let outcome = evaluate(&zone).unwrap();

        assert_eq!(outcome.tier, RiskTier::Critical);
        assert_eq!(outcome.reasons.last(), Some(&TriggerReason::MultipleFactors));
        assert_eq!(
            outcome.reason_text(),
            "high_displacement_critical_vibration_multiple_factors"
        );
    }

    #[test]
    fn test_reported_level_escalates_quiet_metrics() {
        let zone = Zone::new("D", "West Highwall")
            .with_level(RiskTier::Warning)
            .with_metrics(3.9, 1.2);
        let outcome = evaluate(&zone).unwrap();

        assert_eq!(outcome.tier, RiskTier::Warning);
        assert_eq!(outcome.reasons, vec![TriggerReason::ReportedLevel]);
        assert_eq!(outcome.recommended_action(), "Increase monitoring frequency");
    }
}
