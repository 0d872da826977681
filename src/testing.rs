//! Shared fixtures for handler tests: the full app wired on a
//! `MemoryStore` and a manual clock set inside office hours.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::test::TestRequest;
use chrono::{DateTime, TimeZone, Utc};

use crate::auth::{jwt, password::hash_password};
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::model::{
    employee::{Employee, NewEmployee},
    location::OfficeLocation,
    role::Role,
};
use crate::state::AppState;
use crate::store::{CredentialStore, EmployeeStore, memory::MemoryStore};

pub const OFFICE: OfficeLocation = OfficeLocation {
    latitude: 12.9716,
    longitude: 77.5946,
    radius_meters: 100.0,
};

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    /// Thursday 2026-01-15 10:00 UTC, inside the default 9..18 window.
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::default());
        let state = AppState::new(Config::for_tests(), store.clone(), clock.clone()).unwrap();

        Self {
            state,
            store,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Employee at [`OFFICE`] with a login of the same name.
    pub async fn seed_employee(&self, username: &str, password: &str, approved: bool) -> Employee {
        let employee = self
            .store
            .create(&NewEmployee {
                employee_code: format!("EMP-{username}"),
                first_name: username.to_string(),
                last_name: "Tester".into(),
                email: format!("{username}@company.com"),
                department: None,
                office: Some(OFFICE),
            })
            .await
            .unwrap();
        self.store.set_approved(employee.id, approved).await.unwrap();
        self.store
            .create_user(
                username,
                &hash_password(password).unwrap(),
                Role::Employee.id(),
                Some(employee.id),
            )
            .await
            .unwrap();

        self.store.get(employee.id).await.unwrap().unwrap()
    }

    /// Creates an admin login and returns an access token for it.
    pub async fn seed_admin(&self, username: &str, password: &str) -> String {
        self.store
            .create_user(username, &hash_password(password).unwrap(), Role::Admin.id(), None)
            .await
            .unwrap();
        self.tokens_for(username).await.0
    }

    /// Access and refresh tokens as a login would issue them.
    pub async fn tokens_for(&self, username: &str) -> (String, String) {
        let user = self.store.find_user(username).await.unwrap().unwrap();
        let config = &self.state.config;

        let access = jwt::generate_access_token(
            user.id,
            user.username.clone(),
            user.role_id,
            user.employee_id,
            &config.jwt_secret,
            config.access_token_ttl,
        )
        .unwrap();
        let (refresh, claims) = jwt::generate_refresh_token(
            user.id,
            user.username,
            user.role_id,
            user.employee_id,
            &config.jwt_secret,
            config.refresh_token_ttl,
        )
        .unwrap();
        self.store
            .store_refresh(user.id, &claims.jti, claims.exp as i64)
            .await
            .unwrap();

        (access, refresh)
    }
}

/// The rate limiters key on the peer address, which test requests lack.
pub fn request(req: TestRequest, uri: &str) -> TestRequest {
    req.uri(uri)
        .peer_addr(SocketAddr::from(([127, 0, 0, 1], 40_000)))
}

macro_rules! test_app {
    ($env:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .configure(|cfg| $env.state.register(cfg))
                .configure(|cfg| crate::routes::configure(cfg, &$env.state.config)),
        )
        .await
    };
}

pub(crate) use test_app;
