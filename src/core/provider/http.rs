//! REST client for the monitoring backend.
//!
//! Wraps `GET /zones`, `GET /alerts` and `POST /predict` using [`reqwest`].
//! List endpoints may answer with a bare array or an envelope object.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{decode_records, records_from_payload, SnapshotProvider};
use crate::core::alerts::model::Alert;
use crate::core::error::FetchFailure;
use crate::core::model::{Prediction, Zone};

/// HTTP provider for a single backend instance.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    /// * `base_url` - Backend root, e.g. `http://host:5000`.
    /// * `timeout` - Applied to every request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchFailure> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get_list(&self, path: &str, key: &str) -> Result<Vec<Value>, FetchFailure> {
        let response = self.client.get(self.url(path)).send().await?;
        let payload: Value = Self::parse_response(response).await?;
        records_from_payload(payload, key)
    }

    // ---- private helpers ----

    /// Non-2xx responses become [`FetchFailure::Status`] carrying the body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, FetchFailure> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FetchFailure::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchFailure> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SnapshotProvider for HttpProvider {
    async fn fetch_zones(&self) -> Result<Vec<Zone>, FetchFailure> {
        let items = self.get_list("zones", "zones").await?;
        Ok(decode_records(items))
    }

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchFailure> {
        let items = self.get_list("alerts", "alerts").await?;
        Ok(decode_records(items))
    }

    async fn fetch_prediction(&self, zone: &Zone) -> Result<Prediction, FetchFailure> {
        let body = serde_json::json!({
            "zone_id": zone.id,
            "displacement": zone.displacement,
            "vibration": zone.vibration,
            "temperature": zone.temperature,
            "humidity": zone.humidity,
        });

        let response = self.client.post(self.url("predict")).json(&body).send().await?;
        Self::parse_response(response).await
    }
}
