use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::location::LocationSample;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackingKind {
    CheckIn,
    CheckOut,
    Ambient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackingEntry {
    #[schema(example = 12.9716)]
    pub latitude: f64,

    #[schema(example = 77.5946)]
    pub longitude: f64,

    #[schema(example = "2026-01-15T09:15:00Z", value_type = String, format = "date-time")]
    pub captured_at: DateTime<Utc>,

    pub kind: TrackingKind,
}

impl TrackingEntry {
    pub fn from_sample(sample: &LocationSample, kind: TrackingKind) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            captured_at: sample.captured_at,
            kind,
        }
    }
}
