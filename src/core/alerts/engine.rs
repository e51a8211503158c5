// Alert engine - turns zone readings into alert records, deduplicating per
// zone and resolving alerts once the zone calms down.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Alert, AlertStatus};
use super::triggers::{evaluate_zone, TriggerContext, TriggerOutcome, ZoneThresholds};
use crate::core::classifier::RiskClassifier;
use crate::core::model::{Zone, ZoneId};

const DEFAULT_MAX_HISTORY: usize = 100;
/// An active alert resolves once the zone's score falls below this share
/// of the score it was raised with.
const SCORE_IMPROVEMENT: f64 = 0.7;

/// Alert engine configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertEngineConfig {
    /// Thresholds applied to every zone without an override
    pub thresholds: ZoneThresholds,
    /// Per-zone threshold overrides
    pub zone_overrides: HashMap<ZoneId, ZoneThresholds>,
    /// Resolved records retained before the oldest are dropped
    pub max_history: usize,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ZoneThresholds::default(),
            zone_overrides: HashMap::new(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl AlertEngineConfig {
    pub fn thresholds_for(&self, zone_id: &str) -> &ZoneThresholds {
        self.zone_overrides.get(zone_id).unwrap_or(&self.thresholds)
    }
}

/// What changed during one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub raised: Vec<Alert>,
    pub resolved: Vec<Alert>,
}

impl EvaluationReport {
    pub fn is_empty(&self) -> bool {
        self.raised.is_empty() && self.resolved.is_empty()
    }
}

pub struct AlertEngine {
    config: AlertEngineConfig,
    classifier: RiskClassifier,
    /// Oldest first.
    records: VecDeque<Alert>,
    /// Active alert id per zone.
    active: HashMap<ZoneId, String>,
    next_seq: u32,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig, classifier: RiskClassifier) -> Self {
        Self {
            config,
            classifier,
            records: VecDeque::new(),
            active: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Evaluate every zone and update the alert set.
    ///
    /// A zone keeps at most one active alert. Only a WARNING to CRITICAL
    /// escalation replaces it while the zone stays elevated; a lower tier
    /// never mints a new alert. The alert is resolved when the zone is back
    /// to LOW or its score improved by 30% or more.
    pub fn evaluate(&mut self, zones: &[Zone], now: DateTime<Utc>) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        for zone in zones {
            let ctx = TriggerContext {
                thresholds: self.config.thresholds_for(&zone.id),
                classifier: &self.classifier,
            };
            let outcome = evaluate_zone(zone, &ctx);

            let current = self
                .active
                .get(&zone.id)
                .and_then(|id| self.position(id))
                .map(|pos| (pos, self.records[pos].tier, self.records[pos].risk_score));

            let Some((pos, active_tier, active_score)) = current else {
                if let Some(outcome) = outcome {
                    report.raised.push(self.raise(zone, &outcome, now));
                }
                continue;
            };

            let Some(outcome) = outcome else {
                let note = "Risk level decreased to low".to_string();
                report.resolved.push(self.resolve(pos, note, now));
                continue;
            };

            let improved = active_score.filter(|previous| outcome.risk_score < *previous * SCORE_IMPROVEMENT);
            if let Some(previous) = improved {
                let note = format!("Risk score improved from {previous:.1} to {:.1}", outcome.risk_score);
                report.resolved.push(self.resolve(pos, note, now));
            } else if outcome.tier > active_tier {
                let note = format!("Escalated to {}", outcome.tier.describe());
                report.resolved.push(self.resolve(pos, note, now));
                report.raised.push(self.raise(zone, &outcome, now));
            }
        }

        self.trim_history();
        report
    }

    /// Records newest first, the order providers publish them in.
    pub fn alerts(&self) -> Vec<Alert> {
        self.records.iter().rev().cloned().collect()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.records
            .iter()
            .rev()
            .filter(|alert| alert.is_active())
            .cloned()
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|alert| alert.id == id)
    }

    fn next_id(&mut self) -> String {
        let id = format!("ALT{:03}", self.next_seq);
        self.next_seq += 1;
        id
    }

    fn raise(&mut self, zone: &Zone, outcome: &TriggerOutcome, now: DateTime<Utc>) -> Alert {
        let mut alert = Alert::active(self.next_id(), &zone.id, &zone.name, outcome.tier, now);
        alert.trigger_reason = outcome.reason_text();
        alert.recommended_action = outcome.recommended_action().to_string();
        alert.risk_score = Some(outcome.risk_score);
        alert.displacement_mm = Some(zone.displacement);
        alert.vibration_mm_s = Some(zone.vibration);

        log::info!(
            "Raised {} {} alert for zone {} ({})",
            alert.id,
            alert.tier,
            alert.zone_id,
            alert.trigger_reason
        );
        self.active.insert(zone.id.clone(), alert.id.clone());
        self.records.push_back(alert.clone());
        alert
    }

    /// Replace the active record at `pos` with a RESOLVED successor.
    fn resolve(&mut self, pos: usize, note: String, now: DateTime<Utc>) -> Alert {
        let id = self.next_id();
        let previous = &mut self.records[pos];
        self.active.remove(&previous.zone_id);

        let mut resolved = previous.clone();
        resolved.notes = Some(format!("Supersedes {}: {note}", previous.id));
        resolved.id = id;
        resolved.status = AlertStatus::Resolved;
        resolved.timestamp = now;

        log::info!(
            "Resolved {} for zone {} as {} ({note})",
            previous.id,
            resolved.zone_id,
            resolved.id
        );
        *previous = resolved.clone();
        resolved
    }

    fn trim_history(&mut self) {
        while self.records.len() > self.config.max_history {
            match self.records.iter().position(|alert| !alert.is_active()) {
                Some(pos) => {
                    self.records.remove(pos);
                }
                None => break,
            }
        }
    }
}
