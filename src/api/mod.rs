use std::sync::Arc;

use actix_web::error::{ErrorForbidden, ErrorNotFound, ErrorUnauthorized};

use crate::attendance::session::{Session, SessionRegistry};
use crate::auth::auth::AuthUser;
use crate::store::EmployeeStore;

pub mod attendance;
pub mod employee;
pub mod error;
pub mod location;

/// The caller's live session. A valid token that outlived its session
/// (restart, idle eviction) gets a fresh one, unless the employee logged out.
pub async fn session_for(
    auth: &AuthUser,
    sessions: &SessionRegistry,
    employees: &dyn EmployeeStore,
) -> actix_web::Result<Arc<Session>> {
    let employee_id = auth.require_employee_id()?;
    if let Some(session) = sessions.get(employee_id).await {
        return Ok(session);
    }
    if sessions.is_signed_out(employee_id) {
        return Err(ErrorUnauthorized("Signed out, log in again"));
    }

    let employee = employees
        .get(employee_id)
        .await?
        .ok_or_else(|| ErrorNotFound("Employee not found"))?;
    if !employee.is_approved {
        return Err(ErrorForbidden("Employee not approved"));
    }

    Ok(sessions.init(&employee, auth.role).await)
}
