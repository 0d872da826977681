//! The attendance state machine: `NotStarted -> CheckedIn -> CheckedOut`,
//! one record per employee per calendar date.

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::attendance::error::AttendanceError;
use crate::attendance::session::Session;
use crate::clock::{Clock, local_date};
use crate::geo::geofence::{self, GeofenceResult};
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    location::{IdentityArtifact, LocationSample},
    tracking::{TrackingEntry, TrackingKind},
};
use crate::store::{AttendanceStore, RecordQuery, TrackingStore};

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub record: AttendanceRecord,
    pub geofence: GeofenceResult,
}

pub struct AttendanceGate {
    records: Arc<dyn AttendanceStore>,
    tracking: Arc<dyn TrackingStore>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    locks: Cache<u64, Arc<Mutex<()>>>,
}

impl AttendanceGate {
    pub fn new(
        records: Arc<dyn AttendanceStore>,
        tracking: Arc<dyn TrackingStore>,
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            records,
            tracking,
            clock,
            utc_offset,
            locks: Cache::builder()
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.utc_offset)
    }

    /// Opens today's record. Refused while a record already exists for the
    /// day, and otherwise unless a sample inside the office boundary and an
    /// identity capture are both present.
    pub async fn check_in(
        &self,
        session: &Session,
        sample: Option<LocationSample>,
        identity: Option<&IdentityArtifact>,
    ) -> Result<CheckIn, AttendanceError> {
        let employee_id = session.employee_id();
        let lock = self.lock_for(employee_id).await;
        let _serialized = lock.lock().await;

        let now = self.clock.now();
        let date = local_date(now, self.utc_offset);

        if self.records.find(employee_id, date).await?.is_some() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        let sample = sample.ok_or(AttendanceError::LocationRequired)?;

        if !identity.is_some_and(IdentityArtifact::is_present) {
            return Err(AttendanceError::IdentityRequired);
        }

        let office = session
            .office()
            .ok_or(AttendanceError::OutOfBounds { distance_meters: None })?;
        let verdict = geofence::evaluate(&sample, &office);
        if !verdict.within_boundary {
            warn!(
                employee_id,
                distance_meters = verdict.distance_meters,
                radius_meters = office.radius_meters,
                "Check-in outside office boundary"
            );
            return Err(AttendanceError::OutOfBounds {
                distance_meters: Some(verdict.distance_meters).filter(|d| d.is_finite()),
            });
        }

        let record = AttendanceRecord::checked_in(employee_id, date, now, sample.clone());
        match self.records.insert(&record).await {
            Ok(()) => {}
            Err(crate::store::StoreError::Conflict) => return Err(AttendanceError::AlreadyCheckedIn),
            Err(e) => return Err(e.into()),
        }

        self.track(session, TrackingEntry::from_sample(&sample, TrackingKind::CheckIn))
            .await;

        info!(
            employee_id,
            %date,
            distance_meters = verdict.distance_meters,
            "Checked in"
        );

        Ok(CheckIn {
            record,
            geofence: verdict,
        })
    }

    /// Closes today's record. The office boundary is not re-checked and the
    /// sample is optional.
    pub async fn check_out(
        &self,
        session: &Session,
        sample: Option<LocationSample>,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let employee_id = session.employee_id();
        let lock = self.lock_for(employee_id).await;
        let _serialized = lock.lock().await;

        let now = self.clock.now();
        let date = local_date(now, self.utc_offset);

        let mut record = match self.records.find(employee_id, date).await? {
            Some(record) if record.status == AttendanceStatus::CheckedIn => record,
            _ => return Err(AttendanceError::NoActiveCheckIn),
        };

        record.check_out(now, sample);
        self.records.update(&record).await?;

        // without a checkout sample the point is pinned to the check-in spot
        let entry = match (&record.check_out_location, &record.check_in_location) {
            (Some(sample), _) => Some(TrackingEntry::from_sample(sample, TrackingKind::CheckOut)),
            (None, Some(check_in)) => Some(TrackingEntry {
                latitude: check_in.latitude,
                longitude: check_in.longitude,
                captured_at: record.check_out_at.unwrap_or(now),
                kind: TrackingKind::CheckOut,
            }),
            (None, None) => None,
        };
        if let Some(entry) = entry {
            self.track(session, entry).await;
        }

        info!(employee_id, %date, "Checked out");

        Ok(record)
    }

    /// Today's record for the employee, if they checked in.
    pub async fn today_record(
        &self,
        employee_id: u64,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        Ok(self.records.find(employee_id, self.today()).await?)
    }

    pub async fn history(
        &self,
        employee_id: u64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let query = RecordQuery {
            employee_id: Some(employee_id),
            from,
            to,
        };
        Ok(self.records.list(&query).await?)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    async fn lock_for(&self, employee_id: u64) -> Arc<Mutex<()>> {
        self.locks
            .get_with(employee_id, async { Arc::new(Mutex::new(())) })
            .await
    }

    /// The record is already committed, so a failed durable append is
    /// logged rather than surfaced.
    async fn track(&self, session: &Session, entry: TrackingEntry) {
        session.record_tracking(entry.clone());
        if let Err(e) = self.tracking.append(session.employee_id(), &entry).await {
            error!(error = %e, employee_id = session.employee_id(), "Failed to persist tracking entry");
        }
    }
}
