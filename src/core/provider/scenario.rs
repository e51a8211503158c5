// Scripted snapshot source for demos and offline use.
//
// Rotates through four fixed site conditions on a fixed period. Alerts are
// synthesized from the zones by a local AlertEngine, so deduplication,
// escalation and auto-resolve behave as they would against a live backend.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use super::SnapshotProvider;
use crate::core::alerts::engine::{AlertEngine, AlertEngineConfig};
use crate::core::alerts::model::Alert;
use crate::core::classifier::RiskClassifier;
use crate::core::error::FetchFailure;
use crate::core::model::{Prediction, RiskTier, Zone};

const ZONES: [(&str, &str); 4] = [
    ("A", "North Pit Wall"),
    ("B", "South Slope"),
    ("C", "East Bench"),
    ("D", "West Highwall"),
];

/// (tier, score, displacement mm, vibration mm/s) per zone, in `ZONES` order.
type ScenarioRow = [(RiskTier, f64, f64, f64); 4];

const SCENARIOS: [(&str, ScenarioRow); 4] = [
    (
        "all safe",
        [
            (RiskTier::Low, 2.1, 2.1, 1.2),
            (RiskTier::Low, 1.8, 1.8, 1.0),
            (RiskTier::Low, 2.3, 2.3, 1.1),
            (RiskTier::Low, 1.9, 1.9, 1.0),
        ],
    ),
    (
        "single warning",
        [
            (RiskTier::Warning, 5.2, 5.6, 1.3),
            (RiskTier::Low, 1.8, 1.8, 1.0),
            (RiskTier::Low, 2.3, 2.3, 1.1),
            (RiskTier::Low, 1.9, 1.9, 1.0),
        ],
    ),
    (
        "critical and warning",
        [
            (RiskTier::Low, 2.1, 2.1, 1.2),
            (RiskTier::Critical, 8.5, 12.4, 3.8),
            (RiskTier::Warning, 4.8, 4.1, 1.6),
            (RiskTier::Low, 1.9, 1.9, 1.0),
        ],
    ),
    (
        "multiple warnings",
        [
            (RiskTier::Warning, 6.1, 6.0, 1.4),
            (RiskTier::Low, 1.8, 1.8, 1.0),
            (RiskTier::Warning, 5.3, 5.2, 1.2),
            (RiskTier::Warning, 4.7, 3.9, 1.7),
        ],
    ),
];

pub struct ScenarioProvider {
    rotation: Duration,
    origin: Instant,
    offset: usize,
    engine: Mutex<AlertEngine>,
}

impl ScenarioProvider {
    pub fn new(rotation: Duration, config: AlertEngineConfig, classifier: RiskClassifier) -> Self {
        Self {
            rotation: rotation.max(Duration::from_secs(1)),
            origin: Instant::now(),
            offset: 0,
            engine: Mutex::new(AlertEngine::new(config, classifier)),
        }
    }

    /// Begin the rotation at `index` instead of the all-safe scenario.
    pub fn starting_at(mut self, index: usize) -> Self {
        self.offset = index % SCENARIOS.len();
        self
    }

    pub fn scenario_count() -> usize {
        SCENARIOS.len()
    }

    pub fn current_index(&self) -> usize {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        let step = elapsed.as_millis() / self.rotation.as_millis().max(1);
        (self.offset + (step % SCENARIOS.len() as u128) as usize) % SCENARIOS.len()
    }

    pub fn current_name(&self) -> &'static str {
        SCENARIOS[self.current_index()].0
    }

    pub fn zones_for(index: usize) -> Vec<Zone> {
        let (_, rows) = &SCENARIOS[index % SCENARIOS.len()];
        ZONES
            .iter()
            .zip(rows.iter())
            .map(|((id, name), (tier, score, displacement, vibration))| {
                Zone::new(*id, *name)
                    .with_level(*tier)
                    .with_score(*score)
                    .with_metrics(*displacement, *vibration)
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotProvider for ScenarioProvider {
    async fn fetch_zones(&self) -> Result<Vec<Zone>, FetchFailure> {
        Ok(Self::zones_for(self.current_index()))
    }

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchFailure> {
        let index = self.current_index();
        let zones = Self::zones_for(index);
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| FetchFailure::Provider("alert engine lock poisoned".to_string()))?;

        let report = engine.evaluate(&zones, Utc::now());
        if !report.is_empty() {
            log::debug!(
                "Scenario '{}': {} raised, {} resolved",
                SCENARIOS[index].0,
                report.raised.len(),
                report.resolved.len()
            );
        }
        Ok(engine.alerts())
    }

    async fn fetch_prediction(&self, _zone: &Zone) -> Result<Prediction, FetchFailure> {
        Err(FetchFailure::Provider(
            "prediction service not available in scenario mode".to_string(),
        ))
    }
}
