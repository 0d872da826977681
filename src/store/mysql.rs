use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::StreamExt;
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use super::{
    AttendanceStore, CredentialStore, EmployeeStore, RecordQuery, StoreError, TrackingStore,
};
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    employee::{Employee, NewEmployee},
    location::{LocationSample, OfficeLocation},
    tracking::TrackingEntry,
    user::UserRecord,
};

/// Every store backed by one MySQL pool. Schema lives in `schema.sql`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// MySQL counts changed rows, so rewriting the current values
    /// affects nothing.
    async fn exists_if_untouched(&self, id: u64, rows_affected: u64) -> Result<bool, StoreError> {
        if rows_affected > 0 {
            return Ok(true);
        }
        Ok(EmployeeStore::get(self, id).await?.is_some())
    }
}

fn is_duplicate(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

#[derive(FromRow)]
struct AttendanceRow {
    employee_id: u64,
    date: NaiveDate,
    status: String,
    check_in_at: Option<DateTime<Utc>>,
    check_in_lat: Option<f64>,
    check_in_lng: Option<f64>,
    check_in_accuracy: Option<f64>,
    check_in_captured_at: Option<DateTime<Utc>>,
    check_out_at: Option<DateTime<Utc>>,
    check_out_lat: Option<f64>,
    check_out_lng: Option<f64>,
    check_out_accuracy: Option<f64>,
    check_out_captured_at: Option<DateTime<Utc>>,
}

fn sample_from(
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy_meters: Option<f64>,
    captured_at: Option<DateTime<Utc>>,
) -> Option<LocationSample> {
    Some(LocationSample {
        latitude: latitude?,
        longitude: longitude?,
        accuracy_meters: accuracy_meters.unwrap_or_default(),
        captured_at: captured_at?,
    })
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status)
            .map_err(|_| StoreError::Corrupt(format!("attendance status {:?}", row.status)))?;

        Ok(AttendanceRecord {
            employee_id: row.employee_id,
            date: row.date,
            check_in_at: row.check_in_at,
            check_in_location: sample_from(
                row.check_in_lat,
                row.check_in_lng,
                row.check_in_accuracy,
                row.check_in_captured_at,
            ),
            check_out_at: row.check_out_at,
            check_out_location: sample_from(
                row.check_out_lat,
                row.check_out_lng,
                row.check_out_accuracy,
                row.check_out_captured_at,
            ),
            status,
        })
    }
}

const ATTENDANCE_COLUMNS: &str = r#"
    employee_id, date, status,
    check_in_at, check_in_lat, check_in_lng, check_in_accuracy, check_in_captured_at,
    check_out_at, check_out_lat, check_out_lng, check_out_accuracy, check_out_captured_at
"#;

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND date = ?"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn insert(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let check_in = record.check_in_location.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO attendance
            (employee_id, date, status,
             check_in_at, check_in_lat, check_in_lng, check_in_accuracy, check_in_captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.employee_id)
        .bind(record.date)
        .bind(record.status.as_ref())
        .bind(record.check_in_at)
        .bind(check_in.map(|s| s.latitude))
        .bind(check_in.map(|s| s.longitude))
        .bind(check_in.map(|s| s.accuracy_meters))
        .bind(check_in.map(|s| s.captured_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let check_out = record.check_out_location.as_ref();

        sqlx::query(
            r#"
            UPDATE attendance
            SET status = ?,
                check_out_at = ?,
                check_out_lat = ?,
                check_out_lng = ?,
                check_out_accuracy = ?,
                check_out_captured_at = ?
            WHERE employee_id = ?
            AND date = ?
            "#,
        )
        .bind(record.status.as_ref())
        .bind(record.check_out_at)
        .bind(check_out.map(|s| s.latitude))
        .bind(check_out.map(|s| s.longitude))
        .bind(check_out.map(|s| s.accuracy_meters))
        .bind(check_out.map(|s| s.captured_at))
        .bind(record.employee_id)
        .bind(record.date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, StoreError> {
        // NULL parameters disable their filter
        let sql = format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS}
            FROM attendance
            WHERE (? IS NULL OR employee_id = ?)
            AND (? IS NULL OR date >= ?)
            AND (? IS NULL OR date <= ?)
            ORDER BY date, employee_id
            "#
        );

        let mut rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(query.employee_id)
            .bind(query.employee_id)
            .bind(query.from)
            .bind(query.from)
            .bind(query.to)
            .bind(query.to)
            .fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(row) = rows.next().await {
            records.push(AttendanceRecord::try_from(row?)?);
        }

        debug!(count = records.len(), "Loaded attendance records");
        Ok(records)
    }
}

#[async_trait]
impl TrackingStore for MySqlStore {
    async fn append(&self, employee_id: u64, entry: &TrackingEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tracking_entries (employee_id, latitude, longitude, captured_at, kind)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(entry.latitude)
        .bind(entry.longitude)
        .bind(entry.captured_at)
        .bind(entry.kind.as_ref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_between(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM tracking_entries
            WHERE employee_id = ?
            AND captured_at >= ?
            AND captured_at < ?
            "#,
        )
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}

#[derive(FromRow)]
struct EmployeeRow {
    id: u64,
    employee_code: String,
    first_name: String,
    last_name: String,
    email: String,
    department: Option<String>,
    is_approved: bool,
    office_lat: Option<f64>,
    office_lng: Option<f64>,
    office_radius_m: Option<f64>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        let office = match (row.office_lat, row.office_lng, row.office_radius_m) {
            (Some(latitude), Some(longitude), Some(radius_meters)) => Some(OfficeLocation {
                latitude,
                longitude,
                radius_meters,
            }),
            _ => None,
        };

        Employee {
            id: row.id,
            employee_code: row.employee_code,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            department: row.department,
            is_approved: row.is_approved,
            office,
        }
    }
}

const EMPLOYEE_COLUMNS: &str = r#"
    id, employee_code, first_name, last_name, email, department, is_approved,
    office_lat, office_lng, office_radius_m
"#;

#[async_trait]
impl EmployeeStore for MySqlStore {
    async fn get(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?");
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Employee::from))
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Employee>, i64), StoreError> {
        let offset = page.saturating_sub(1) * per_page;

        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY id LIMIT ? OFFSET ?");
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees")
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Employee::from).collect(), total))
    }

    async fn create(&self, new: &NewEmployee) -> Result<Employee, StoreError> {
        let office = new.office.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO employees
            (employee_code, first_name, last_name, email, department, is_approved,
             office_lat, office_lng, office_radius_m)
            VALUES (?, ?, ?, ?, ?, FALSE, ?, ?, ?)
            "#,
        )
        .bind(&new.employee_code)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.department)
        .bind(office.map(|o| o.latitude))
        .bind(office.map(|o| o.longitude))
        .bind(office.map(|o| o.radius_meters))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(Employee {
                id: done.last_insert_id(),
                employee_code: new.employee_code.clone(),
                first_name: new.first_name.clone(),
                last_name: new.last_name.clone(),
                email: new.email.clone(),
                department: new.department.clone(),
                is_approved: false,
                office: new.office,
            }),
            Err(e) if is_duplicate(&e) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_office(&self, id: u64, office: OfficeLocation) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET office_lat = ?, office_lng = ?, office_radius_m = ?
            WHERE id = ?
            "#,
        )
        .bind(office.latitude)
        .bind(office.longitude)
        .bind(office.radius_meters)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.exists_if_untouched(id, result.rows_affected()).await
    }

    async fn set_approved(&self, id: u64, approved: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE employees SET is_approved = ? WHERE id = ?")
            .bind(approved)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.exists_if_untouched(id, result.rows_affected()).await
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CredentialStore for MySqlStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, password, role_id, employee_id
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role_id: u8,
        employee_id: Option<u64>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO users (username, password, role_id, employee_id) VALUES (?, ?, ?, ?)"#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role_id)
        .bind(employee_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_id()),
            Err(e) if is_duplicate(&e) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn touch_login(&self, user_id: u64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn store_refresh(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, FROM_UNIXTIME(?))
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_refresh(&self, jti: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE jti = ?
            AND revoked = FALSE
            AND expires_at > NOW()
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_password(&self, user_id: u64, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_all_refresh(&self, user_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = ?
            AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
