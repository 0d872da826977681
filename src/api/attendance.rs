use crate::{
    api::session_for,
    attendance::{
        gate::AttendanceGate,
        report::{collect_rows, format_duration, render_csv},
        session::{Session, SessionRegistry},
    },
    auth::auth::AuthUser,
    geo::{geofence::GeofenceResult, sampler::SamplerError},
    model::{
        attendance::{AttendanceRecord, AttendanceStatus},
        location::{IdentityArtifact, LocationSample},
    },
    store::{AttendanceStore, EmployeeStore, RecordQuery, TrackingStore},
};
use actix_web::{HttpResponse, Responder, http::header, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckInRequest {
    /// Fix taken by the client just before submitting. Falls back to the
    /// latest fix reported for the session.
    pub location: Option<LocationSample>,

    #[schema(value_type = Option<String>, example = "captures/42/2026-01-15.jpg")]
    pub identity_artifact: Option<IdentityArtifact>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckOutRequest {
    pub location: Option<LocationSample>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    pub record: AttendanceRecord,
    pub geofence: GeofenceResult,
}

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub record: Option<AttendanceRecord>,
    #[schema(example = 525)]
    pub worked_minutes: i64,
    #[schema(example = "8h 45m")]
    pub worked: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RangeQuery {
    /// Admins only; defaults to the caller
    pub employee_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

impl RangeQuery {
    /// Resolves whose records are requested. `None` means everyone, which
    /// only admins get.
    fn target(&self, auth: &AuthUser) -> actix_web::Result<Option<u64>> {
        match self.employee_id {
            Some(id) if auth.can_access(id) => Ok(Some(id)),
            Some(_) => Err(actix_web::error::ErrorForbidden("Not your record")),
            None if auth.require_admin().is_ok() => Ok(auth.employee_id),
            None => auth.require_employee_id().map(Some),
        }
    }
}

fn invalid_location() -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "error": "invalid_location",
        "message": "latitude must be within ±90, longitude within ±180"
    }))
}

async fn resolve_sample(
    session: &Session,
    reported: Option<LocationSample>,
) -> Result<Option<LocationSample>, SamplerError> {
    if reported.is_some() {
        return Ok(reported);
    }
    session.current_fix().await.transpose()
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in successfully", body = CheckInResponse),
        (status = 400, description = "Already checked in, location invalid, or location / identity capture missing", body = Object, example = json!({
            "error": "already_checked_in",
            "message": "already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Outside the office boundary", body = Object, example = json!({
            "error": "out_of_bounds",
            "message": "location is outside the office boundary",
            "distance_meters": 1000.8
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "check_in", skip_all, fields(employee_id = ?auth.employee_id))]
pub async fn check_in(
    auth: AuthUser,
    payload: web::Json<CheckInRequest>,
    gate: web::Data<AttendanceGate>,
    sessions: web::Data<SessionRegistry>,
    employees: web::Data<dyn EmployeeStore>,
) -> actix_web::Result<impl Responder> {
    let session = session_for(&auth, &sessions, employees.get_ref()).await?;
    let CheckInRequest {
        location,
        identity_artifact,
    } = payload.into_inner();
    if location.as_ref().is_some_and(|sample| !sample.is_valid()) {
        return Ok(invalid_location());
    }

    let sample = resolve_sample(&session, location).await?;
    let checked_in = gate
        .check_in(&session, sample, identity_artifact.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(CheckInResponse {
        record: checked_in.record,
        geofence: checked_in.geofence,
    }))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = CheckOutRequest, description = "Optional checkout location"),
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceRecord),
        (status = 400, description = "No active check-in found for today, or location invalid", body = Object, example = json!({
            "error": "no_active_check_in",
            "message": "no active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "check_out", skip_all, fields(employee_id = ?auth.employee_id))]
pub async fn check_out(
    auth: AuthUser,
    payload: Option<web::Json<CheckOutRequest>>,
    gate: web::Data<AttendanceGate>,
    sessions: web::Data<SessionRegistry>,
    employees: web::Data<dyn EmployeeStore>,
) -> actix_web::Result<impl Responder> {
    let session = session_for(&auth, &sessions, employees.get_ref()).await?;
    let location = payload.and_then(|body| body.into_inner().location);
    if location.as_ref().is_some_and(|sample| !sample.is_valid()) {
        return Ok(invalid_location());
    }

    // the sample is optional here, so a sensor failure does not block
    let sample = match resolve_sample(&session, location).await {
        Ok(sample) => sample,
        Err(e) => {
            warn!(error = %e, "Checking out without a location");
            None
        }
    };
    let record = gate.check_out(&session, sample).await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Today's record and time worked so far
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance", body = TodayResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    gate: web::Data<AttendanceGate>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;
    let record = gate.today_record(employee_id).await?;

    let worked = record
        .as_ref()
        .map(|r| r.worked(gate.now()))
        .unwrap_or_else(chrono::Duration::zero);

    Ok(HttpResponse::Ok().json(TodayResponse {
        date: gate.today(),
        status: record
            .as_ref()
            .map_or(AttendanceStatus::NotStarted, |r| r.status),
        worked_minutes: worked.num_minutes().max(0),
        worked: format_duration(worked),
        record,
    }))
}

/// Attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(RangeQuery),
    responses(
        (status = 200, description = "Records ordered by date", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    query: web::Query<RangeQuery>,
    gate: web::Data<AttendanceGate>,
) -> actix_web::Result<impl Responder> {
    let employee_id = match query.target(&auth)? {
        Some(id) => id,
        None => auth.require_employee_id()?,
    };
    let records = gate.history(employee_id, query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Attendance report (CSV)
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(RangeQuery),
    responses(
        (status = 200, description = "CSV export", content_type = "text/csv", body = String),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn report(
    auth: AuthUser,
    query: web::Query<RangeQuery>,
    gate: web::Data<AttendanceGate>,
    records: web::Data<dyn AttendanceStore>,
    tracking: web::Data<dyn TrackingStore>,
) -> actix_web::Result<impl Responder> {
    // admins without a filter export everyone
    let employee_id = if auth.require_admin().is_ok() {
        query.employee_id
    } else {
        query.target(&auth)?
    };

    let filter = RecordQuery {
        employee_id,
        from: query.from,
        to: query.to,
    };
    let found = records.list(&filter).await?;
    debug!(?filter, rows = found.len(), "Exporting attendance report");

    let rows = collect_rows(found, tracking.get_ref(), gate.utc_offset()).await?;
    let filename = format!("attendance_report_{}.csv", gate.today());

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(render_csv(&rows)))
}
