//! Per-employee session context.
//!
//! A session is created on login and torn down on logout (or when it has
//! been idle too long). It owns the employee's location provider and
//! sampler, the in-memory tracking log, and the task that keeps a location
//! watch running while office hours are open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use moka::future::Cache;
use moka::notification::RemovalCause;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::attendance::tracking_log::TrackingLog;
use crate::clock::Clock;
use crate::geo::sampler::{
    Fix, LocationSampler, ReportedLocationProvider, SamplerError, SamplerOptions, WatchHandle,
};
use crate::model::{
    employee::Employee,
    location::{LocationSample, OfficeLocation},
    role::Role,
    tracking::{TrackingEntry, TrackingKind},
};
use crate::store::TrackingStore;

pub struct Session {
    employee_id: u64,
    role: Role,
    office: RwLock<Option<OfficeLocation>>,
    provider: Arc<ReportedLocationProvider>,
    sampler: LocationSampler,
    tracking: Arc<Mutex<TrackingLog>>,
    /// Capture time of the newest ambient entry logged.
    last_ambient: Arc<Mutex<Option<DateTime<Utc>>>>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        employee_id: u64,
        role: Role,
        office: Option<OfficeLocation>,
        clock: Arc<dyn Clock>,
        options: SamplerOptions,
    ) -> Arc<Self> {
        let provider = Arc::new(ReportedLocationProvider::new());
        let sampler = LocationSampler::new(provider.clone(), clock, options);

        Arc::new(Self {
            employee_id,
            role,
            office: RwLock::new(office),
            provider,
            sampler,
            tracking: Arc::new(Mutex::new(TrackingLog::new())),
            last_ambient: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
        })
    }

    pub fn employee_id(&self) -> u64 {
        self.employee_id
    }

    pub fn office(&self) -> Option<OfficeLocation> {
        *self.office.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace_office(&self, office: OfficeLocation) {
        *self.office.write().unwrap_or_else(PoisonError::into_inner) = Some(office);
    }

    pub fn sampler(&self) -> &LocationSampler {
        &self.sampler
    }

    /// Feeds a client-side sensor reading into this session's provider.
    pub fn report_fix(&self, fix: Fix) {
        self.provider.report(fix);
    }

    pub fn record_tracking(&self, entry: TrackingEntry) {
        self.tracking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(entry);
    }

    pub fn tracking_snapshot(&self) -> Vec<TrackingEntry> {
        self.tracking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// One-shot fix for a request that carried none. `None` when the client
    /// has never reported a reading for this session.
    pub async fn current_fix(&self) -> Option<Fix> {
        if !self.provider.has_reading() {
            return None;
        }
        Some(self.sampler.sample_once().await)
    }

    pub fn sensor_subscribers(&self) -> usize {
        self.provider.subscribers()
    }

    /// Starts the office-hours supervisor. Only employees are tracked.
    fn supervise(
        self: &Arc<Self>,
        office_hours: watch::Receiver<bool>,
        store: Arc<dyn TrackingStore>,
    ) {
        if self.role != Role::Employee {
            return;
        }
        let task = tokio::spawn(tracking_loop(
            Arc::clone(self),
            office_hours,
            store,
            self.shutdown.clone(),
        ));
        *self.supervisor.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Stops live tracking and waits for the sensor to be released.
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        let task = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, employee_id = self.employee_id, "Tracking supervisor failed");
            }
        }
        debug!(employee_id = self.employee_id, "Session torn down");
    }

    fn start_tracking(self: &Arc<Self>, store: Arc<dyn TrackingStore>) -> WatchHandle {
        let employee_id = self.employee_id;
        let tracking = Arc::clone(&self.tracking);
        let last_ambient = Arc::clone(&self.last_ambient);
        let silence = Arc::new(Silence::default());
        let heard = Arc::clone(&silence);

        let on_sample = move |sample: LocationSample| {
            heard.reset();
            if !newer_than_last(&last_ambient, &sample) {
                return;
            }

            let entry = TrackingEntry::from_sample(&sample, TrackingKind::Ambient);
            tracking
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(entry.clone());

            let store = Arc::clone(&store);
            tokio::spawn(async move {
                if let Err(e) = store.append(employee_id, &entry).await {
                    error!(error = %e, employee_id, "Failed to persist tracking entry");
                }
            });
        };
        let on_error = move |e: SamplerError| {
            if e == SamplerError::Timeout && !silence.first_timeout() {
                debug!(employee_id, "Location watch still silent");
            } else {
                warn!(error = %e, employee_id, "Location watch error");
            }
        };

        info!(employee_id, "Live tracking started");
        self.sampler.start_watching(on_sample, on_error)
    }
}

/// Records `sample` as the newest ambient fix unless one at least as new was
/// already logged. A restarted watch replays the last fix it saw.
fn newer_than_last(last: &Mutex<Option<DateTime<Utc>>>, sample: &LocationSample) -> bool {
    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
    if last.is_some_and(|at| sample.captured_at <= at) {
        return false;
    }
    *last = Some(sample.captured_at);
    true
}

/// Tracks a run of watch timeouts so only the first one is a warning.
#[derive(Default)]
struct Silence(AtomicBool);

impl Silence {
    fn first_timeout(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

async fn tracking_loop(
    session: Arc<Session>,
    mut office_hours: watch::Receiver<bool>,
    store: Arc<dyn TrackingStore>,
    shutdown: CancellationToken,
) {
    let mut watch: Option<WatchHandle> = None;

    loop {
        let open = *office_hours.borrow_and_update();
        if open && watch.is_none() {
            watch = Some(session.start_tracking(Arc::clone(&store)));
        } else if !open {
            if let Some(mut handle) = watch.take() {
                session.sampler.stop_watching(&mut handle).await;
                info!(employee_id = session.employee_id, "Live tracking stopped");
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = office_hours.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(mut handle) = watch.take() {
        session.sampler.stop_watching(&mut handle).await;
    }
}

/// Live sessions keyed by employee id.
pub struct SessionRegistry {
    sessions: Cache<u64, Arc<Session>>,
    /// Employees who logged out, kept until their access tokens expire.
    signed_out: Cache<u64, ()>,
    clock: Arc<dyn Clock>,
    options: SamplerOptions,
    office_hours: watch::Receiver<bool>,
    tracking: Arc<dyn TrackingStore>,
}

impl SessionRegistry {
    pub fn new(
        clock: Arc<dyn Clock>,
        options: SamplerOptions,
        office_hours: watch::Receiver<bool>,
        tracking: Arc<dyn TrackingStore>,
        idle: Duration,
        signed_out_for: Duration,
    ) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(idle)
            .eviction_listener(|employee_id: Arc<u64>, session: Arc<Session>, cause| {
                if cause != RemovalCause::Explicit {
                    debug!(employee_id = *employee_id, ?cause, "Session evicted");
                }
                session.shutdown.cancel();
            })
            .build();

        Self {
            sessions,
            signed_out: Cache::builder().time_to_live(signed_out_for).build(),
            clock,
            options,
            office_hours,
            tracking,
        }
    }

    /// Returns the employee's live session, creating it if needed. A second
    /// login from another device shares the existing session.
    pub async fn init(&self, employee: &Employee, role: Role) -> Arc<Session> {
        self.signed_out.invalidate(&employee.id).await;
        let entry = self
            .sessions
            .entry(employee.id)
            .or_insert_with(async {
                let session = Session::new(
                    employee.id,
                    role,
                    employee.office,
                    Arc::clone(&self.clock),
                    self.options,
                );
                session.supervise(self.office_hours.clone(), Arc::clone(&self.tracking));
                info!(employee_id = employee.id, "Session initialised");
                session
            })
            .await;
        entry.into_value()
    }

    pub async fn get(&self, employee_id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&employee_id).await
    }

    pub async fn teardown(&self, employee_id: u64) {
        if let Some(session) = self.sessions.remove(&employee_id).await {
            session.teardown().await;
            info!(employee_id, "Session closed");
        }
    }

    /// Tears the session down and keeps it down until the next login.
    pub async fn sign_out(&self, employee_id: u64) {
        self.signed_out.insert(employee_id, ()).await;
        self.teardown(employee_id).await;
    }

    pub fn is_signed_out(&self, employee_id: u64) -> bool {
        self.signed_out.contains_key(&employee_id)
    }

    /// Swaps the office instance used by a live session.
    pub async fn replace_office(&self, employee_id: u64, office: OfficeLocation) {
        if let Some(session) = self.get(employee_id).await {
            session.replace_office(office);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn employee(id: u64) -> Employee {
        Employee {
            id,
            employee_code: format!("EMP-{id:03}"),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            email: "jane@company.com".into(),
            department: None,
            is_approved: true,
            office: Some(OfficeLocation {
                latitude: 12.9716,
                longitude: 77.5946,
                radius_meters: 100.0,
            }),
        }
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn registry(
        open: bool,
    ) -> (
        SessionRegistry,
        watch::Sender<bool>,
        Arc<ManualClock>,
        Arc<MemoryStore>,
    ) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::default());
        let (tx, rx) = watch::channel(open);
        let registry = SessionRegistry::new(
            clock.clone(),
            SamplerOptions::default(),
            rx,
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(900),
        );
        (registry, tx, clock, store)
    }

    #[tokio::test]
    async fn office_hours_drive_live_tracking() {
        let (registry, office_hours, clock, store) = registry(true);
        let session = registry.init(&employee(42), Role::Employee).await;
        settle().await;
        assert_eq!(session.sensor_subscribers(), 1);

        session.report_fix(Ok(LocationSample {
            latitude: 12.9717,
            longitude: 77.5947,
            accuracy_meters: 9.0,
            captured_at: clock.now(),
        }));
        settle().await;

        let snapshot = session.tracking_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].kind, TrackingKind::Ambient);
        assert_eq!(store.tracking_len(), 1);

        office_hours.send(false).unwrap();
        settle().await;
        assert_eq!(session.sensor_subscribers(), 0);

        office_hours.send(true).unwrap();
        settle().await;
        assert_eq!(session.sensor_subscribers(), 1);

        registry.teardown(42).await;
        assert_eq!(session.sensor_subscribers(), 0);
        assert!(registry.get(42).await.is_none());
    }

    #[tokio::test]
    async fn reopening_office_hours_does_not_log_a_fix_twice() {
        let (registry, office_hours, clock, store) = registry(true);
        let session = registry.init(&employee(42), Role::Employee).await;
        settle().await;

        session.report_fix(Ok(LocationSample {
            latitude: 12.9717,
            longitude: 77.5947,
            accuracy_meters: 9.0,
            captured_at: clock.now(),
        }));
        settle().await;

        office_hours.send(false).unwrap();
        settle().await;
        office_hours.send(true).unwrap();
        settle().await;

        assert_eq!(session.tracking_snapshot().len(), 1);
        assert_eq!(store.tracking_len(), 1);

        clock.advance(chrono::Duration::seconds(20));
        session.report_fix(Ok(LocationSample {
            latitude: 12.9718,
            longitude: 77.5948,
            accuracy_meters: 9.0,
            captured_at: clock.now(),
        }));
        settle().await;

        let snapshot = session.tracking_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].captured_at < snapshot[1].captured_at);
        assert_eq!(store.tracking_len(), 2);

        registry.teardown(42).await;
    }

    #[test]
    fn only_the_first_timeout_in_a_silent_run_is_reported() {
        let silence = Silence::default();
        assert!(silence.first_timeout());
        assert!(!silence.first_timeout());
        assert!(!silence.first_timeout());

        silence.reset();
        assert!(silence.first_timeout());
    }

    #[tokio::test]
    async fn admins_are_not_tracked() {
        let (registry, _office_hours, _clock, _store) = registry(true);
        let session = registry.init(&employee(1), Role::Admin).await;
        settle().await;
        assert_eq!(session.sensor_subscribers(), 0);
    }

    #[tokio::test]
    async fn second_login_shares_the_session() {
        let (registry, _office_hours, _clock, _store) = registry(false);
        let first = registry.init(&employee(42), Role::Employee).await;
        let second = registry.init(&employee(42), Role::Employee).await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn sign_out_holds_until_the_next_login() {
        let (registry, _office_hours, _clock, _store) = registry(false);
        registry.init(&employee(42), Role::Employee).await;

        registry.sign_out(42).await;
        assert!(registry.get(42).await.is_none());
        assert!(registry.is_signed_out(42));

        registry.init(&employee(42), Role::Employee).await;
        assert!(!registry.is_signed_out(42));
    }

    #[tokio::test]
    async fn teardown_is_safe_without_a_session() {
        let (registry, _office_hours, _clock, _store) = registry(false);
        registry.teardown(99).await;
        assert!(registry.get(99).await.is_none());
    }

    #[tokio::test]
    async fn replaced_office_is_seen_by_the_live_session() {
        let (registry, _office_hours, _clock, _store) = registry(false);
        let session = registry.init(&employee(42), Role::Employee).await;

        let moved = OfficeLocation {
            latitude: 13.0,
            longitude: 77.6,
            radius_meters: 250.0,
        };
        registry.replace_office(42, moved).await;
        assert_eq!(session.office(), Some(moved));
    }
}
