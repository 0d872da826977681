use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa::ToSchema;

use crate::clock::Clock;

pub const TICK: Duration = Duration::from_secs(60);

/// Daily window in office-local hours, `[start_hour, end_hour)`. A window
/// with `start_hour > end_hour` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OfficeHours {
    #[schema(example = 9)]
    pub start_hour: u32,

    #[schema(example = 18)]
    pub end_hour: u32,

    #[serde(skip)]
    pub utc_offset: FixedOffset,
}

impl OfficeHours {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.with_timezone(&self.utc_offset).hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Process-wide "is it office hours" signal, re-evaluated every minute.
/// Consumers subscribe and read; nothing but the ticker writes.
pub struct OfficeHoursClock {
    hours: OfficeHours,
    rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl OfficeHoursClock {
    pub fn spawn(hours: OfficeHours, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = watch::channel(hours.contains(clock.now()));
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let open = hours.contains(clock.now());
                        let flipped = tx.send_if_modified(|current| {
                            if *current == open {
                                false
                            } else {
                                *current = open;
                                true
                            }
                        });
                        if flipped {
                            info!(open, "Office hours changed");
                        }
                    }
                }
            }
        });

        Self { hours, rx, cancel }
    }

    pub fn hours(&self) -> OfficeHours {
        self.hours
    }

    pub fn is_open(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Drop for OfficeHoursClock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
