//! Persistence seams. The service only needs keyed access to attendance
//! records, an append-only tracking log, the employee directory and login
//! credentials; MySQL backs all four in production.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::{
    attendance::AttendanceRecord,
    employee::{Employee, NewEmployee},
    location::OfficeLocation,
    tracking::TrackingEntry,
    user::UserRecord,
};

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row already exists")]
    Conflict,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub employee_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RecordQuery {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.employee_id.is_none_or(|id| id == record.employee_id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
    }
}

/// Attendance records keyed by `(employee_id, date)`.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the key is taken.
    async fn insert(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Ordered by date, then employee.
    async fn list(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Append-only tracking history.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn append(&self, employee_id: u64, entry: &TrackingEntry) -> Result<(), StoreError>;

    /// Entries captured in `[from, to)`.
    async fn count_between(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<Employee>, StoreError>;

    /// One page plus the total row count.
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Employee>, i64), StoreError>;

    async fn create(&self, employee: &NewEmployee) -> Result<Employee, StoreError>;

    /// Returns `false` when the employee does not exist.
    async fn set_office(&self, id: u64, office: OfficeLocation) -> Result<bool, StoreError>;

    async fn set_approved(&self, id: u64, approved: bool) -> Result<bool, StoreError>;

    /// Removes an employee that nothing refers to yet. Returns `false` when
    /// the employee does not exist.
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role_id: u8,
        employee_id: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn touch_login(&self, user_id: u64) -> Result<(), StoreError>;

    async fn store_refresh(&self, user_id: u64, jti: &str, expires_at: i64)
    -> Result<(), StoreError>;

    /// Revokes the token if it is still active and reports whether it was.
    async fn revoke_refresh(&self, jti: &str) -> Result<bool, StoreError>;

    async fn set_password(&self, user_id: u64, password_hash: &str) -> Result<(), StoreError>;

    /// Revokes every active refresh token the user holds and returns how
    /// many there were.
    async fn revoke_all_refresh(&self, user_id: u64) -> Result<u64, StoreError>;
}
