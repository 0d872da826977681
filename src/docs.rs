use crate::api::attendance::{CheckInRequest, CheckInResponse, CheckOutRequest, TodayResponse};
use crate::api::employee::{ApproveEmployee, CreateEmployee, EmployeeListResponse};
use crate::api::location::{CurrentLocation, OfficeHoursResponse, ReportLocation, TrackingSnapshot};
use crate::geo::{geofence::GeofenceResult, sampler::SamplerError};
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    employee::Employee,
    location::{LocationSample, OfficeLocation},
    tracking::{TrackingEntry, TrackingKind},
};
use crate::models::{ChangePasswordDto, LoginReqDto, TokenPair};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Geofenced Attendance API",
        version = "1.0.0",
        description = r#"
## Geofenced Attendance

Employees check in only from inside their assigned office boundary, with a
fresh location fix and an identity capture. While office hours are open,
each signed-in employee's location is tracked for the map view.

### 🔹 Key Features
- **Attendance**
  - Geofenced check-in, check-out, today's status, history
  - CSV report export
- **Location**
  - Client-reported fixes, one-shot sampling with geofence verdict
  - Live tracking log (last 100 points) during office hours
- **Employee Management**
  - Create employees, assign office locations, approve accounts

### 🔐 Security
Endpoints under `/api` require a **JWT Bearer** access token.
Employee administration is restricted to **Admin**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::change_password,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::report,

        crate::api::location::report_location,
        crate::api::location::current_location,
        crate::api::location::tracking_snapshot,
        crate::api::location::office_hours,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::set_office,
        crate::api::employee::approve_employee
    ),
    components(
        schemas(
            LoginReqDto,
            ChangePasswordDto,
            TokenPair,
            CheckInRequest,
            CheckInResponse,
            CheckOutRequest,
            TodayResponse,
            AttendanceRecord,
            AttendanceStatus,
            GeofenceResult,
            LocationSample,
            OfficeLocation,
            ReportLocation,
            SamplerError,
            CurrentLocation,
            TrackingSnapshot,
            TrackingEntry,
            TrackingKind,
            OfficeHoursResponse,
            CreateEmployee,
            ApproveEmployee,
            Employee,
            EmployeeListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and logout"),
        (name = "Attendance", description = "Geofenced attendance APIs"),
        (name = "Location", description = "Location sampling and tracking APIs"),
        (name = "Employee", description = "Employee management APIs"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
