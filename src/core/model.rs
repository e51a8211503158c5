use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use super::error::InvalidSnapshot;

pub type ZoneId = String;

/// Severity tier of a zone or alert. Ordered `Low < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RiskTier {
    #[default]
    Low,
    Warning,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Lowercase adjective used in operator-facing messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Low => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown risk tier '{}'", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for RiskTier {
    type Err = UnknownTier;

    /// Case-insensitive. Prediction services report `high` for warning-level
    /// risk and older alert feeds use `INFO` for routine entries.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" | "INFO" | "NORMAL" => Ok(Self::Low),
            "WARNING" | "HIGH" | "MEDIUM" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(UnknownTier(raw.to_string())),
        }
    }
}

impl Serialize for RiskTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RiskTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One monitored zone as reported by the snapshot provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(alias = "zone_id", deserialize_with = "deserialize_id")]
    pub id: ZoneId,
    #[serde(alias = "zone_name")]
    pub name: String,
    #[serde(default)]
    pub risk_level: Option<RiskTier>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    /// Slope displacement in millimetres.
    #[serde(default, alias = "displacement_mm")]
    pub displacement: f64,
    /// Ground vibration in mm/s.
    #[serde(default, alias = "vibration_mm_s")]
    pub vibration: f64,
    #[serde(default, alias = "temperature_c")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "humidity_percent")]
    pub humidity: Option<f64>,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            risk_level: None,
            risk_score: None,
            displacement: 0.0,
            vibration: 0.0,
            temperature: None,
            humidity: None,
        }
    }

    pub fn with_level(mut self, tier: RiskTier) -> Self {
        self.risk_level = Some(tier);
        self
    }

    pub fn with_metrics(mut self, displacement: f64, vibration: f64) -> Self {
        self.displacement = displacement;
        self.vibration = vibration;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.risk_score = Some(score);
        self
    }
}

/// Records arriving from a provider are checked before the engine sees them.
pub trait SnapshotRecord {
    const KIND: &'static str;

    fn validate(&self) -> Result<(), InvalidSnapshot>;
}

impl SnapshotRecord for Zone {
    const KIND: &'static str = "zone";

    fn validate(&self) -> Result<(), InvalidSnapshot> {
        if self.id.trim().is_empty() {
            return Err(InvalidSnapshot::MissingField {
                kind: Self::KIND,
                id: self.name.clone(),
                field: "id",
            });
        }
        let metrics = [
            ("displacement", Some(self.displacement)),
            ("vibration", Some(self.vibration)),
            ("risk_score", self.risk_score),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
        ];
        for (field, value) in metrics {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(InvalidSnapshot::NonFinite {
                    id: self.id.clone(),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// On-demand risk assessment for a single zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub risk_level: RiskTier,
    pub risk_score: f64,
    #[serde(default)]
    pub prediction: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Providers emit ids as strings or bare integers.
pub(crate) fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(n) => n.to_string(),
    })
}

pub(crate) fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("unrecognised timestamp '{raw}'")))
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS` forms some
/// feeds produce; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
