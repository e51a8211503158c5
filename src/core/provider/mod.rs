// Snapshot sources.
//
// - http.rs: REST backend (`/zones`, `/alerts`, `/predict`)
// - scenario.rs: Scripted rotating scenarios with locally synthesized alerts

pub mod http;
pub mod scenario;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::alerts::model::Alert;
use super::classifier::RiskClassifier;
use super::config::{ProviderSettings, Settings};
use super::error::{FetchFailure, InvalidSnapshot};
use super::model::{Prediction, SnapshotRecord, Zone};

pub use http::HttpProvider;
pub use scenario::ScenarioProvider;

/// Injected source of zones, alerts and on-demand predictions.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_zones(&self) -> Result<Vec<Zone>, FetchFailure>;

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchFailure>;

    async fn fetch_prediction(&self, zone: &Zone) -> Result<Prediction, FetchFailure>;
}

/// Both halves of one poll. Each half fails independently.
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub zones: Result<Vec<Zone>, FetchFailure>,
    pub alerts: Result<Vec<Alert>, FetchFailure>,
}

pub async fn fetch_snapshot(provider: &dyn SnapshotProvider) -> SnapshotOutcome {
    let (zones, alerts) = tokio::join!(provider.fetch_zones(), provider.fetch_alerts());
    SnapshotOutcome { zones, alerts }
}

/// Ask the provider for a prediction, falling back to the local heuristic.
pub async fn predict_or_fallback(
    provider: &dyn SnapshotProvider,
    classifier: &RiskClassifier,
    zone: &Zone,
) -> Prediction {
    match provider.fetch_prediction(zone).await {
        Ok(prediction) => prediction,
        Err(err) => {
            log::warn!("Prediction for zone {} unavailable ({err}); using heuristic", zone.id);
            classifier.fallback_prediction(zone, Utc::now())
        }
    }
}

/// Build the provider selected in settings.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn SnapshotProvider>, FetchFailure> {
    Ok(match &settings.provider {
        ProviderSettings::Http { base_url, timeout_ms } => Arc::new(HttpProvider::new(
            base_url,
            std::time::Duration::from_millis(*timeout_ms),
        )?),
        ProviderSettings::Scenario { rotation_secs } => Arc::new(ScenarioProvider::new(
            std::time::Duration::from_secs(*rotation_secs),
            settings.alert_engine.clone(),
            RiskClassifier::new(settings.score_thresholds),
        )),
    })
}

/// Pull the record list out of a payload that is either a bare array or an
/// object envelope such as `{"zones": [...]}`.
pub fn records_from_payload(payload: Value, key: &str) -> Result<Vec<Value>, FetchFailure> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FetchFailure::Provider(format!("'{key}' is not a list"))),
            None => Err(FetchFailure::Provider(format!("payload has no '{key}' list"))),
        },
        _ => Err(FetchFailure::Provider(format!("unexpected {key} payload"))),
    }
}

/// Decode and validate each record, dropping (and logging) the bad ones.
pub fn decode_records<T>(items: Vec<Value>) -> Vec<T>
where
    T: DeserializeOwned + SnapshotRecord,
{
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let checked = serde_json::from_value::<T>(item)
                .map_err(|err| InvalidSnapshot::Malformed {
                    kind: T::KIND,
                    index,
                    reason: err.to_string(),
                })
                .and_then(|record| record.validate().map(|()| record));
            match checked {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("Dropping record: {err}");
                    None
                }
            }
        })
        .collect()
}
