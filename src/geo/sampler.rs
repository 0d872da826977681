//! Location acquisition on top of a [`LocationProvider`].
//!
//! The provider is the platform sensor. Subscribing to it acquires the
//! sensor and dropping the receiver releases it, so every acquisition in
//! this module is scoped to a task or a call frame and cannot leak.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::model::location::LocationSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SamplerError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable")]
    Unavailable,
    #[error("timed out waiting for a location fix")]
    Timeout,
}

impl SamplerError {
    pub fn code(self) -> &'static str {
        match self {
            SamplerError::PermissionDenied => "permission_denied",
            SamplerError::Unavailable => "unavailable",
            SamplerError::Timeout => "timeout",
        }
    }
}

/// Latest sensor reading: a fix or the error the sensor reported.
pub type Fix = Result<LocationSample, SamplerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Balanced,
    High,
}

pub trait LocationProvider: Send + Sync + 'static {
    /// Acquires the sensor. The receiver holds `None` until the first
    /// reading; dropping it releases the sensor.
    fn subscribe(&self, accuracy: Accuracy) -> Result<watch::Receiver<Option<Fix>>, SamplerError>;
}

/// Provider fed by the client, which pushes fixes or sensor errors.
pub struct ReportedLocationProvider {
    tx: watch::Sender<Option<Fix>>,
}

impl ReportedLocationProvider {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn report(&self, fix: Fix) {
        self.tx.send_replace(Some(fix));
    }

    /// Whether the client has reported anything yet, fix or error.
    pub fn has_reading(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Number of live sensor subscriptions.
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ReportedLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for ReportedLocationProvider {
    fn subscribe(&self, _accuracy: Accuracy) -> Result<watch::Receiver<Option<Fix>>, SamplerError> {
        Ok(self.tx.subscribe())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    /// Hard cutoff for a one-shot fix, and the silence window after which
    /// a watch reports `Timeout`.
    pub timeout: Duration,
    /// Cached fix reuse window for one-shot sampling.
    pub one_shot_max_age: Duration,
    /// Cached fix reuse window for continuous watching.
    pub watch_max_age: Duration,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            one_shot_max_age: Duration::from_millis(60_000),
            watch_max_age: Duration::from_millis(30_000),
        }
    }
}

pub struct LocationSampler {
    provider: Arc<dyn LocationProvider>,
    clock: Arc<dyn Clock>,
    options: SamplerOptions,
    cached: Arc<Mutex<Option<LocationSample>>>,
}

impl LocationSampler {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        clock: Arc<dyn Clock>,
        options: SamplerOptions,
    ) -> Self {
        Self {
            provider,
            clock,
            options,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Last fix this sampler delivered, if it is within `max_age`.
    fn cached_within(&self, max_age: Duration) -> Option<LocationSample> {
        fresh_cached(&self.cached, self.clock.as_ref(), max_age)
    }

    /// One position fix. Serves the cache when it is young enough, otherwise
    /// waits for the sensor up to the configured timeout.
    pub async fn sample_once(&self) -> Result<LocationSample, SamplerError> {
        if let Some(sample) = self.cached_within(self.options.one_shot_max_age) {
            return Ok(sample);
        }

        let mut rx = self.provider.subscribe(Accuracy::Balanced)?;
        let max_age = self.options.one_shot_max_age;
        let clock = Arc::clone(&self.clock);

        let fix = tokio::time::timeout(self.options.timeout, async move {
            let current = rx.borrow_and_update().clone();
            match current {
                Some(Ok(sample)) if sample.is_fresh(clock.now(), max_age) => return Ok(sample),
                Some(Err(e)) => return Err(e),
                _ => {}
            }
            loop {
                rx.changed().await.map_err(|_| SamplerError::Unavailable)?;
                let next = rx.borrow_and_update().clone();
                if let Some(fix) = next {
                    return fix;
                }
            }
        })
        .await
        .unwrap_or(Err(SamplerError::Timeout));

        if let Ok(sample) = &fix {
            remember(&self.cached, sample);
        }
        fix
    }

    /// Streams fixes to `on_sample` and sensor failures to `on_error` until
    /// the returned handle is stopped or dropped. Errors never end the watch
    /// except when the sensor itself goes away.
    pub fn start_watching<S, E>(&self, mut on_sample: S, mut on_error: E) -> WatchHandle
    where
        S: FnMut(LocationSample) + Send + 'static,
        E: FnMut(SamplerError) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let provider = Arc::clone(&self.provider);
        let clock = Arc::clone(&self.clock);
        let cached = Arc::clone(&self.cached);
        let options = self.options;

        let task = tokio::spawn(async move {
            let mut rx = match provider.subscribe(Accuracy::High) {
                Ok(rx) => rx,
                Err(e) => {
                    on_error(e);
                    return;
                }
            };

            let initial = rx.borrow_and_update().clone();
            match initial {
                Some(Ok(sample)) if sample.is_fresh(clock.now(), options.watch_max_age) => {
                    remember(&cached, &sample);
                    on_sample(sample);
                }
                Some(Err(e)) => on_error(e),
                _ => {
                    if let Some(sample) = fresh_cached(&cached, clock.as_ref(), options.watch_max_age)
                    {
                        on_sample(sample);
                    }
                }
            }

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    changed = tokio::time::timeout(options.timeout, rx.changed()) => match changed {
                        Ok(Ok(())) => {
                            let next = rx.borrow_and_update().clone();
                            match next {
                                Some(Ok(sample)) => {
                                    remember(&cached, &sample);
                                    on_sample(sample);
                                }
                                Some(Err(e)) => on_error(e),
                                None => {}
                            }
                        }
                        Ok(Err(_)) => {
                            on_error(SamplerError::Unavailable);
                            break;
                        }
                        Err(_) => on_error(SamplerError::Timeout),
                    },
                }
            }

            debug!("location watch released");
        });

        WatchHandle {
            token,
            task: Some(task),
        }
    }

    pub async fn stop_watching(&self, handle: &mut WatchHandle) {
        handle.stop().await;
    }
}

fn fresh_cached(
    cached: &Mutex<Option<LocationSample>>,
    clock: &dyn Clock,
    max_age: Duration,
) -> Option<LocationSample> {
    cached
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .filter(|sample| sample.is_fresh(clock.now(), max_age))
        .cloned()
}

fn remember(cached: &Mutex<Option<LocationSample>>, sample: &LocationSample) {
    *cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample.clone());
}

/// Running location watch. Dropping the handle cancels the watch; `stop`
/// additionally waits until the sensor subscription is released.
pub struct WatchHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "location watch panicked");
                }
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex as StdMutex;

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn fix_at(at: chrono::DateTime<Utc>) -> LocationSample {
        LocationSample {
            latitude: 12.9716,
            longitude: 77.5946,
            accuracy_meters: 8.0,
            captured_at: at,
        }
    }

    fn sampler() -> (Arc<ReportedLocationProvider>, Arc<ManualClock>, LocationSampler) {
        let provider = Arc::new(ReportedLocationProvider::new());
        let clock = Arc::new(ManualClock::new(start()));
        let sampler = LocationSampler::new(
            provider.clone(),
            clock.clone(),
            SamplerOptions::default(),
        );
        (provider, clock, sampler)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sample_once_times_out_without_a_fix() {
        let (provider, _clock, sampler) = sampler();

        let started = tokio::time::Instant::now();
        let result = sampler.sample_once().await;

        assert_eq!(result, Err(SamplerError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(10_000));
        assert_eq!(provider.subscribers(), 0);
    }

    #[tokio::test]
    async fn sample_once_uses_a_fresh_reading() {
        let (provider, _clock, sampler) = sampler();
        provider.report(Ok(fix_at(start())));

        assert_eq!(sampler.sample_once().await, Ok(fix_at(start())));
        assert_eq!(provider.subscribers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_once_waits_past_a_stale_reading() {
        let (provider, clock, sampler) = sampler();
        provider.report(Ok(fix_at(start())));
        clock.advance(chrono::Duration::seconds(61));

        let reporter = {
            let provider = provider.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                provider.report(Ok(fix_at(start() + chrono::Duration::seconds(63))));
            })
        };

        let sample = sampler.sample_once().await.unwrap();
        assert_eq!(sample.captured_at, start() + chrono::Duration::seconds(63));
        reporter.await.unwrap();
    }

    #[tokio::test]
    async fn sample_once_serves_cache_within_a_minute() {
        let (provider, clock, sampler) = sampler();
        provider.report(Ok(fix_at(start())));
        sampler.sample_once().await.unwrap();

        provider.report(Err(SamplerError::Unavailable));
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(sampler.sample_once().await, Ok(fix_at(start())));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(sampler.sample_once().await, Err(SamplerError::Unavailable));
    }

    #[tokio::test]
    async fn permission_denied_is_reported_as_such() {
        let (provider, _clock, sampler) = sampler();
        provider.report(Err(SamplerError::PermissionDenied));

        assert_eq!(sampler.sample_once().await, Err(SamplerError::PermissionDenied));
    }

    #[tokio::test]
    async fn watch_delivers_fixes_and_errors_in_order() {
        let (provider, _clock, sampler) = sampler();
        let seen: Arc<StdMutex<Vec<Fix>>> = Arc::default();

        let on_sample = {
            let seen = seen.clone();
            move |sample| seen.lock().unwrap().push(Ok(sample))
        };
        let on_error = {
            let seen = seen.clone();
            move |e| seen.lock().unwrap().push(Err(e))
        };
        let mut handle = sampler.start_watching(on_sample, on_error);
        settle().await;
        assert_eq!(provider.subscribers(), 1);

        provider.report(Ok(fix_at(start())));
        settle().await;
        provider.report(Err(SamplerError::PermissionDenied));
        settle().await;

        sampler.stop_watching(&mut handle).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Ok(fix_at(start())), Err(SamplerError::PermissionDenied)]
        );
        assert_eq!(provider.subscribers(), 0);
    }

    #[tokio::test]
    async fn watch_replays_a_reading_younger_than_thirty_seconds() {
        let (provider, clock, sampler) = sampler();
        provider.report(Ok(fix_at(start())));
        clock.advance(chrono::Duration::seconds(30));

        let seen: Arc<StdMutex<Vec<LocationSample>>> = Arc::default();
        let mut handle = sampler.start_watching(
            {
                let seen = seen.clone();
                move |sample| seen.lock().unwrap().push(sample)
            },
            |_| {},
        );
        settle().await;
        handle.stop().await;

        assert_eq!(*seen.lock().unwrap(), vec![fix_at(start())]);
    }

    #[tokio::test]
    async fn watch_skips_a_reading_older_than_thirty_seconds() {
        let (provider, clock, sampler) = sampler();
        provider.report(Ok(fix_at(start())));
        clock.advance(chrono::Duration::seconds(31));

        let seen: Arc<StdMutex<Vec<LocationSample>>> = Arc::default();
        let mut handle = sampler.start_watching(
            {
                let seen = seen.clone();
                move |sample| seen.lock().unwrap().push(sample)
            },
            |_| {},
        );
        settle().await;
        handle.stop().await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sensor_reports_timeout_and_keeps_watching() {
        let (provider, _clock, sampler) = sampler();
        let errors: Arc<StdMutex<Vec<SamplerError>>> = Arc::default();

        let mut handle = sampler.start_watching(|_| {}, {
            let errors = errors.clone();
            move |e| errors.lock().unwrap().push(e)
        });

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(*errors.lock().unwrap(), vec![SamplerError::Timeout]);
        assert!(handle.is_active());
        assert_eq!(provider.subscribers(), 1);

        handle.stop().await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (provider, _clock, sampler) = sampler();
        let mut handle = sampler.start_watching(|_| {}, |_| {});
        settle().await;

        sampler.stop_watching(&mut handle).await;
        sampler.stop_watching(&mut handle).await;
        handle.stop().await;

        assert!(!handle.is_active());
        assert_eq!(provider.subscribers(), 0);
    }

    #[tokio::test]
    async fn dropping_the_handle_releases_the_sensor() {
        let (provider, _clock, sampler) = sampler();
        let handle = sampler.start_watching(|_| {}, |_| {});
        settle().await;
        assert_eq!(provider.subscribers(), 1);

        drop(handle);
        settle().await;
        assert_eq!(provider.subscribers(), 0);
    }
}
