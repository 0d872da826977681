use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{Data, ServiceConfig};

use crate::attendance::{
    gate::AttendanceGate, office_hours::OfficeHoursClock, session::SessionRegistry,
};
use crate::clock::Clock;
use crate::config::Config;
use crate::store::{AttendanceStore, CredentialStore, EmployeeStore, TrackingStore};

/// Everything the handlers share. Built once at startup and registered as
/// app data on every worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub attendance: Arc<dyn AttendanceStore>,
    pub tracking: Arc<dyn TrackingStore>,
    pub employees: Arc<dyn EmployeeStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub gate: Arc<AttendanceGate>,
    pub sessions: Arc<SessionRegistry>,
    pub office_hours: Arc<OfficeHoursClock>,
}

impl AppState {
    /// Wires the attendance core on top of one store that backs every
    /// persistence seam. Must be called inside a tokio runtime.
    pub fn new<S>(config: Config, store: Arc<S>, clock: Arc<dyn Clock>) -> anyhow::Result<Self>
    where
        S: AttendanceStore + TrackingStore + EmployeeStore + CredentialStore + 'static,
    {
        let office_hours = Arc::new(OfficeHoursClock::spawn(
            config.office_hours()?,
            Arc::clone(&clock),
        ));

        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&clock),
            config.sampler_options(),
            office_hours.subscribe(),
            store.clone(),
            config.session_idle(),
            Duration::from_secs(config.access_token_ttl as u64),
        ));

        let gate = Arc::new(AttendanceGate::new(
            store.clone(),
            store.clone(),
            clock,
            config.utc_offset()?,
        ));

        Ok(Self {
            config,
            attendance: store.clone(),
            tracking: store.clone(),
            employees: store.clone(),
            credentials: store,
            gate,
            sessions,
            office_hours,
        })
    }

    pub fn register(&self, cfg: &mut ServiceConfig) {
        cfg.app_data(Data::new(self.config.clone()))
            .app_data(Data::from(Arc::clone(&self.attendance)))
            .app_data(Data::from(Arc::clone(&self.tracking)))
            .app_data(Data::from(Arc::clone(&self.employees)))
            .app_data(Data::from(Arc::clone(&self.credentials)))
            .app_data(Data::from(Arc::clone(&self.gate)))
            .app_data(Data::from(Arc::clone(&self.sessions)))
            .app_data(Data::from(Arc::clone(&self.office_hours)));
    }
}
