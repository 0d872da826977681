//! CSV rendering of attendance records for export.

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};

use crate::clock::day_bounds;
use crate::model::{attendance::AttendanceRecord, location::LocationSample};
use crate::store::{StoreError, TrackingStore};

pub const CSV_HEADER: &str = "employee_id,date,check_in_at,check_out_at,duration,check_in_lat,check_in_lng,check_out_lat,check_out_lng,tracking_points";

/// A record plus the number of tracking points captured that day.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub record: AttendanceRecord,
    pub tracking_points: u64,
}

/// Pairs each record with the tracking points captured on its office-local
/// date.
pub async fn collect_rows(
    records: Vec<AttendanceRecord>,
    tracking: &dyn TrackingStore,
    utc_offset: FixedOffset,
) -> Result<Vec<ReportRow>, StoreError> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let (from, to) = day_bounds(record.date, utc_offset);
        let tracking_points = tracking
            .count_between(record.employee_id, from, to)
            .await?;
        rows.push(ReportRow {
            record,
            tracking_points,
        });
    }
    Ok(rows)
}

/// `"8h 45m"`; negative spans render as zero.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 128);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for row in rows {
        let record = &row.record;
        // open days have no duration yet
        let duration = match (record.check_in_at, record.check_out_at) {
            (Some(start), Some(end)) => format_duration(end - start),
            _ => String::new(),
        };
        let (in_lat, in_lng) = coordinates(record.check_in_location.as_ref());
        let (out_lat, out_lng) = coordinates(record.check_out_location.as_ref());

        let fields = [
            record.employee_id.to_string(),
            record.date.format("%Y-%m-%d").to_string(),
            timestamp(record.check_in_at),
            timestamp(record.check_out_at),
            duration,
            in_lat,
            in_lng,
            out_lat,
            out_lng,
            row.tracking_points.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn coordinates(sample: Option<&LocationSample>) -> (String, String) {
    match sample {
        Some(sample) => (
            format!("{:.6}", sample.latitude),
            format!("{:.6}", sample.longitude),
        ),
        None => (String::new(), String::new()),
    }
}
