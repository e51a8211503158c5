// Effects published to the visual layer.

use serde::Serialize;

use super::alerts::model::Alert;
use super::classifier::ZoneSummary;
use super::model::{Prediction, RiskTier, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UiEvent {
    BannerShown { tier: RiskTier, message: String },
    BannerHidden,
    /// Blocking acknowledgement dialog; CRITICAL only.
    ModalShown { message: String },
    ModalHidden,
    Notice { level: NoticeLevel, message: String },
    /// Pulses for the length of one pattern pass.
    Playing(bool),
    Snapshot {
        zones: Vec<Zone>,
        alerts: Vec<Alert>,
        summary: ZoneSummary,
    },
    Prediction { zone_id: String, prediction: Prediction },
}

impl UiEvent {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::Notice {
            level,
            message: message.into(),
        }
    }
}
