use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AttendanceStore, CredentialStore, EmployeeStore, RecordQuery, StoreError, TrackingStore,
};
use crate::model::{
    attendance::AttendanceRecord,
    employee::{Employee, NewEmployee},
    location::OfficeLocation,
    tracking::TrackingEntry,
    user::UserRecord,
};

struct RefreshToken {
    user_id: u64,
    revoked: bool,
}

/// In-process stand-in for every store.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(NaiveDate, u64), AttendanceRecord>>,
    tracking: Mutex<Vec<(u64, TrackingEntry)>>,
    employees: Mutex<BTreeMap<u64, Employee>>,
    users: Mutex<Vec<UserRecord>>,
    refresh_tokens: Mutex<BTreeMap<String, RefreshToken>>,
}

impl MemoryStore {
    pub fn tracking_len(&self) -> usize {
        self.tracking.lock().unwrap().len()
    }

    pub fn refresh_active(&self, jti: &str) -> bool {
        self.refresh_tokens
            .lock()
            .unwrap()
            .get(jti)
            .is_some_and(|token| !token.revoked)
    }

    pub fn refresh_owner(&self, jti: &str) -> Option<u64> {
        self.refresh_tokens.lock().unwrap().get(jti).map(|t| t.user_id)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.records.lock().unwrap().get(&(date, employee_id)).cloned())
    }

    async fn insert(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let key = (record.date, record.employee_id);
        if records.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .insert((record.date, record.employee_id), record.clone());
        Ok(())
    }

    async fn list(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn append(&self, employee_id: u64, entry: &TrackingEntry) -> Result<(), StoreError> {
        self.tracking.lock().unwrap().push((employee_id, entry.clone()));
        Ok(())
    }

    async fn count_between(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .tracking
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, entry)| {
                *id == employee_id && entry.captured_at >= from && entry.captured_at < to
            })
            .count() as u64)
    }
}

#[async_trait]
impl EmployeeStore for MemoryStore {
    async fn get(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        Ok(self.employees.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Employee>, i64), StoreError> {
        let employees = self.employees.lock().unwrap();
        let offset = (page.saturating_sub(1) * per_page) as usize;
        let data = employees
            .values()
            .skip(offset)
            .take(per_page as usize)
            .cloned()
            .collect();
        Ok((data, employees.len() as i64))
    }

    async fn create(&self, new: &NewEmployee) -> Result<Employee, StoreError> {
        let mut employees = self.employees.lock().unwrap();
        if employees
            .values()
            .any(|e| e.employee_code == new.employee_code || e.email == new.email)
        {
            return Err(StoreError::Conflict);
        }
        let id = employees.keys().next_back().map_or(1, |last| last + 1);
        let employee = Employee {
            id,
            employee_code: new.employee_code.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            email: new.email.clone(),
            department: new.department.clone(),
            is_approved: false,
            office: new.office,
        };
        employees.insert(id, employee.clone());
        Ok(employee)
    }

    async fn set_office(&self, id: u64, office: OfficeLocation) -> Result<bool, StoreError> {
        Ok(match self.employees.lock().unwrap().get_mut(&id) {
            Some(employee) => {
                employee.office = Some(office);
                true
            }
            None => false,
        })
    }

    async fn set_approved(&self, id: u64, approved: bool) -> Result<bool, StoreError> {
        Ok(match self.employees.lock().unwrap().get_mut(&id) {
            Some(employee) => {
                employee.is_approved = approved;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        Ok(self.employees.lock().unwrap().remove(&id).is_some())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role_id: u8,
        employee_id: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|user| user.username == username) {
            return Err(StoreError::Conflict);
        }
        let id = users.len() as u64 + 1;
        users.push(UserRecord {
            id,
            username: username.to_string(),
            password: password_hash.to_string(),
            role_id,
            employee_id,
        });
        Ok(id)
    }

    async fn touch_login(&self, _user_id: u64) -> Result<(), StoreError> {
        Ok(())
    }

    async fn store_refresh(
        &self,
        user_id: u64,
        jti: &str,
        _expires_at: i64,
    ) -> Result<(), StoreError> {
        self.refresh_tokens.lock().unwrap().insert(
            jti.to_string(),
            RefreshToken {
                user_id,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn revoke_refresh(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(match self.refresh_tokens.lock().unwrap().get_mut(jti) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn set_password(&self, user_id: u64, password_hash: &str) -> Result<(), StoreError> {
        if let Some(user) = self
            .users
            .lock()
            .unwrap()
            .iter_mut()
            .find(|user| user.id == user_id)
        {
            user.password = password_hash.to_string();
        }
        Ok(())
    }

    async fn revoke_all_refresh(&self, user_id: u64) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for token in self.refresh_tokens.lock().unwrap().values_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
