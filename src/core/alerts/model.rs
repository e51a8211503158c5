// Alert records as exchanged with the snapshot provider.
//
// Field names follow the provider's wire format (`alert_id`, `alert_level`,
// `displacement_mm`, ...). Records are immutable once emitted: a change of
// status is published as a new record with a new id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::InvalidSnapshot;
use crate::core::model::{deserialize_id, deserialize_timestamp, RiskTier, SnapshotRecord, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "resolved")]
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "alert_id", alias = "id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub zone_id: ZoneId,
    #[serde(default)]
    pub zone_name: String,
    #[serde(rename = "alert_level", alias = "tier")]
    pub tier: RiskTier,
    pub status: AlertStatus,
    #[serde(default)]
    pub trigger_reason: String,
    #[serde(default)]
    pub recommended_action: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    /// Displacement at trigger time.
    #[serde(default)]
    pub displacement_mm: Option<f64>,
    /// Vibration at trigger time.
    #[serde(default)]
    pub vibration_mm_s: Option<f64>,
    /// Operator or resolution notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Alert {
    /// Minimal active alert; used by providers that synthesize records.
    pub fn active(
        id: impl Into<String>,
        zone_id: impl Into<String>,
        zone_name: impl Into<String>,
        tier: RiskTier,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            zone_id: zone_id.into(),
            zone_name: zone_name.into(),
            tier,
            status: AlertStatus::Active,
            trigger_reason: String::new(),
            recommended_action: String::new(),
            timestamp,
            risk_score: None,
            displacement_mm: None,
            vibration_mm_s: None,
            notes: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Zone label for messages, falling back to the id when the feed omits a name.
    pub fn zone_label(&self) -> &str {
        if self.zone_name.trim().is_empty() {
            &self.zone_id
        } else {
            &self.zone_name
        }
    }
}

impl SnapshotRecord for Alert {
    const KIND: &'static str = "alert";

    fn validate(&self) -> Result<(), InvalidSnapshot> {
        let missing = if self.id.trim().is_empty() {
            Some("alert_id")
        } else if self.zone_id.trim().is_empty() {
            Some("zone_id")
        } else {
            None
        };
        match missing {
            Some(field) => Err(InvalidSnapshot::MissingField {
                kind: Self::KIND,
                id: self.id.clone(),
                field,
            }),
            None => Ok(()),
        }
    }
}
