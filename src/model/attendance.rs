use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::location::LocationSample;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    NotStarted,
    CheckedIn,
    CheckedOut,
}

/// One employee's attendance for one calendar date.
///
/// Created by the first successful check-in and closed by check-out; a day
/// without a check-in has no record at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 42)]
    pub employee_id: u64,

    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub date: NaiveDate,

    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_at: Option<DateTime<Utc>>,

    pub check_in_location: Option<LocationSample>,

    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_at: Option<DateTime<Utc>>,

    pub check_out_location: Option<LocationSample>,

    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn checked_in(
        employee_id: u64,
        date: NaiveDate,
        at: DateTime<Utc>,
        location: LocationSample,
    ) -> Self {
        Self {
            employee_id,
            date,
            check_in_at: Some(at),
            check_in_location: Some(location),
            check_out_at: None,
            check_out_location: None,
            status: AttendanceStatus::CheckedIn,
        }
    }

    /// Closes the record. A clock that went backwards is clamped to the
    /// check-in time so `check_out_at >= check_in_at` always holds.
    pub fn check_out(&mut self, at: DateTime<Utc>, location: Option<LocationSample>) {
        let at = match self.check_in_at {
            Some(check_in_at) if at < check_in_at => check_in_at,
            _ => at,
        };
        self.check_out_at = Some(at);
        self.check_out_location = location;
        self.status = AttendanceStatus::CheckedOut;
    }

    /// Time worked: until check-out, or until `now` while still checked in.
    pub fn worked(&self, now: DateTime<Utc>) -> Duration {
        match (self.check_in_at, self.check_out_at) {
            (Some(start), Some(end)) => end - start,
            (Some(start), None) => (now - start).max(Duration::zero()),
            _ => Duration::zero(),
        }
    }
}
