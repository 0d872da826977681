use crate::{
    attendance::session::SessionRegistry,
    auth::{auth::AuthUser, password::hash_password},
    model::{
        employee::{Employee, NewEmployee},
        location::{OfficeLocation, has_valid_coordinates},
        role::Role,
    },
    store::{CredentialStore, EmployeeStore, StoreError},
};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "first name")]
    pub first_name: String,
    #[schema(example = "last name")]
    pub last_name: String,
    #[schema(example = "john@email.com", format = "email")]
    pub email: String,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    pub office: Option<OfficeLocation>,

    /// Login for the new employee
    #[schema(example = "john.doe")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 5)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct ApproveEmployee {
    #[schema(example = true)]
    pub approved: bool,
}

fn valid_office(office: &OfficeLocation) -> bool {
    has_valid_coordinates(office.latitude, office.longitude)
        && office.radius_meters.is_finite()
        && office.radius_meters > 0.0
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "message": "Employee not found"
    }))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employee",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created, pending approval", body = Employee),
        (status = 400, description = "Missing fields or invalid office"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Employee code, email or username already taken", body = Object, example = json!({
            "message": "Employee or username already exists"
        })),
        (status = 500, description = "Internal server error", body = Object, example = json!({
            "message": "Something went wrong, Contact with system admin"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    employees: web::Data<dyn EmployeeStore>,
    credentials: web::Data<dyn CredentialStore>,
    payload: web::Json<CreateEmployee>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let username = payload.username.trim();
    if username.is_empty()
        || payload.password.is_empty()
        || payload.employee_code.trim().is_empty()
        || payload.email.trim().is_empty()
    {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "employee_code, email, username and password are required"
        })));
    }
    if payload.office.as_ref().is_some_and(|office| !valid_office(office)) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Office location is invalid"
        })));
    }

    let conflict = || {
        HttpResponse::Conflict().json(json!({
            "message": "Employee or username already exists"
        }))
    };

    if credentials.find_user(username).await?.is_some() {
        return Ok(conflict());
    }

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let new = NewEmployee {
        employee_code: payload.employee_code.trim().to_string(),
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        email: payload.email.trim().to_string(),
        department: payload.department.clone(),
        office: payload.office,
    };
    let employee = match employees.create(&new).await {
        Ok(employee) => employee,
        Err(StoreError::Conflict) => return Ok(conflict()),
        Err(e) => return Err(e.into()),
    };

    let created = credentials
        .create_user(username, &hashed, Role::Employee.id(), Some(employee.id))
        .await;
    if let Err(e) = created {
        // an employee without a login cannot be recreated under the same code
        match employees.delete(employee.id).await {
            Ok(_) => warn!(employee_id = employee.id, error = %e, "Login creation failed, employee removed"),
            Err(cleanup) => {
                error!(employee_id = employee.id, error = %cleanup, "Failed to remove employee without a login")
            }
        }
        return match e {
            StoreError::Conflict => Ok(conflict()),
            e => Err(e.into()),
        };
    }

    info!(employee_id = employee.id, created_by = auth.user_id, "Employee created");

    Ok(HttpResponse::Created().json(employee))
}

#[utoipa::path(
    get,
    path = "/api/employee",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 403, description = "Admin only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    employees: web::Data<dyn EmployeeStore>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let (data, total) = employees.list(page, per_page).await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employee/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 403, description = "Not an admin and not yourself"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    employees: web::Data<dyn EmployeeStore>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    if !auth.can_access(employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your profile"));
    }

    match employees.get(employee_id).await? {
        Some(employee) => Ok(HttpResponse::Ok().json(employee)),
        None => Ok(not_found()),
    }
}

/// Replace the office location
#[utoipa::path(
    put,
    path = "/api/employee/{employee_id}/office",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    request_body = OfficeLocation,
    responses(
        (status = 200, description = "Office replaced; live session updated", body = Object, example = json!({
            "message": "Office updated"
        })),
        (status = 400, description = "Invalid office location"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn set_office(
    auth: AuthUser,
    employees: web::Data<dyn EmployeeStore>,
    sessions: web::Data<SessionRegistry>,
    path: web::Path<u64>,
    office: web::Json<OfficeLocation>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let employee_id = path.into_inner();
    let office = office.into_inner();

    if !valid_office(&office) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Office location is invalid"
        })));
    }

    if !employees.set_office(employee_id, office).await? {
        return Ok(not_found());
    }
    sessions.replace_office(employee_id, office).await;

    info!(
        employee_id,
        latitude = office.latitude,
        longitude = office.longitude,
        radius_meters = office.radius_meters,
        "Office location replaced"
    );

    Ok(HttpResponse::Ok().json(json!({
        "message": "Office updated"
    })))
}

/// Approve or suspend an employee
#[utoipa::path(
    put,
    path = "/api/employee/{employee_id}/approve",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    request_body = ApproveEmployee,
    responses(
        (status = 200, description = "Approval updated", body = Object, example = json!({
            "message": "Employee approved"
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn approve_employee(
    auth: AuthUser,
    employees: web::Data<dyn EmployeeStore>,
    sessions: web::Data<SessionRegistry>,
    path: web::Path<u64>,
    body: web::Json<ApproveEmployee>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let employee_id = path.into_inner();

    if !employees.set_approved(employee_id, body.approved).await? {
        return Ok(not_found());
    }

    // a suspended employee loses live tracking right away
    if !body.approved {
        sessions.teardown(employee_id).await;
    }

    info!(employee_id, approved = body.approved, "Employee approval changed");

    let message = if body.approved {
        "Employee approved"
    } else {
        "Employee suspended"
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}
