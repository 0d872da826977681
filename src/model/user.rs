use sqlx::FromRow;

/// Login credentials row. `employee_id` is absent for pure admin accounts.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
}
