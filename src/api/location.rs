use crate::{
    api::session_for,
    attendance::{office_hours::OfficeHoursClock, session::SessionRegistry},
    auth::auth::AuthUser,
    geo::{
        geofence::{self, GeofenceResult},
        sampler::SamplerError,
    },
    model::{
        location::{LocationSample, OfficeLocation},
        tracking::TrackingEntry,
    },
    store::EmployeeStore,
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use utoipa::ToSchema;

/// What the client's sensor produced: a fix or the error it raised.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportLocation {
    pub location: Option<LocationSample>,
    pub error: Option<SamplerError>,
}

#[derive(Serialize, ToSchema)]
pub struct CurrentLocation {
    pub sample: LocationSample,
    /// Absent when no office is assigned
    pub geofence: Option<GeofenceResult>,
}

#[derive(Serialize, ToSchema)]
pub struct TrackingSnapshot {
    pub office: Option<OfficeLocation>,
    /// Oldest first, at most 100 entries
    pub entries: Vec<TrackingEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct OfficeHoursResponse {
    #[schema(example = 9)]
    pub start_hour: u32,
    #[schema(example = 18)]
    pub end_hour: u32,
    #[schema(example = 330)]
    pub utc_offset_minutes: i32,
    pub is_open: bool,
}

/// Push a sensor reading
#[utoipa::path(
    post,
    path = "/api/location",
    request_body = ReportLocation,
    responses(
        (status = 204, description = "Reading accepted"),
        (status = 400, description = "Exactly one of location or error is required, with valid coordinates"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn report_location(
    auth: AuthUser,
    payload: web::Json<ReportLocation>,
    sessions: web::Data<SessionRegistry>,
    employees: web::Data<dyn EmployeeStore>,
) -> actix_web::Result<impl Responder> {
    let fix = match payload.into_inner() {
        ReportLocation {
            location: Some(sample),
            error: None,
        } if sample.is_valid() => Ok(sample),
        ReportLocation {
            location: None,
            error: Some(e),
        } => Err(e),
        _ => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "invalid_reading",
                "message": "Send either a valid location or a sensor error"
            })));
        }
    };

    let session = session_for(&auth, &sessions, employees.get_ref()).await?;
    debug!(employee_id = session.employee_id(), ok = fix.is_ok(), "Sensor reading reported");
    session.report_fix(fix);

    Ok(HttpResponse::NoContent().finish())
}

/// One-shot location with geofence verdict
#[utoipa::path(
    get,
    path = "/api/location/current",
    responses(
        (status = 200, description = "Current fix", body = CurrentLocation),
        (status = 403, description = "Location permission denied", body = Object, example = json!({
            "error": "permission_denied",
            "message": "location permission denied"
        })),
        (status = 503, description = "Location unavailable"),
        (status = 504, description = "No fix within the timeout")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn current_location(
    auth: AuthUser,
    sessions: web::Data<SessionRegistry>,
    employees: web::Data<dyn EmployeeStore>,
) -> actix_web::Result<impl Responder> {
    let session = session_for(&auth, &sessions, employees.get_ref()).await?;
    let sample = session.sampler().sample_once().await?;
    let geofence = session
        .office()
        .map(|office| geofence::evaluate(&sample, &office));

    Ok(HttpResponse::Ok().json(CurrentLocation { sample, geofence }))
}

/// Tracking points for the map view
#[utoipa::path(
    get,
    path = "/api/tracking",
    responses(
        (status = 200, description = "Office and recent tracking entries", body = TrackingSnapshot),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn tracking_snapshot(
    auth: AuthUser,
    sessions: web::Data<SessionRegistry>,
    employees: web::Data<dyn EmployeeStore>,
) -> actix_web::Result<impl Responder> {
    let session = session_for(&auth, &sessions, employees.get_ref()).await?;

    Ok(HttpResponse::Ok().json(TrackingSnapshot {
        office: session.office(),
        entries: session.tracking_snapshot(),
    }))
}

/// Office hours
#[utoipa::path(
    get,
    path = "/api/office-hours",
    responses(
        (status = 200, description = "Configured window and whether it is open now", body = OfficeHoursResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn office_hours(clock: web::Data<OfficeHoursClock>) -> impl Responder {
    let hours = clock.hours();
    HttpResponse::Ok().json(OfficeHoursResponse {
        start_hour: hours.start_hour,
        end_hour: hours.end_hour,
        utc_offset_minutes: hours.utc_offset.local_minus_utc() / 60,
        is_open: clock.is_open(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OFFICE, TestEnv, request, test_app};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn reported_fix_is_served_with_a_verdict() {
        let env = TestEnv::new();
        env.seed_employee("jane", "s3cret!", true).await;
        let (access, _) = env.tokens_for("jane").await;
        let app = test_app!(env);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::post(), "/api/location")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .set_json(json!({
                    "location": {
                        "latitude": OFFICE.latitude,
                        "longitude": OFFICE.longitude,
                        "accuracy_meters": 8.0,
                        "captured_at": env.now()
                    }
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::get(), "/api/location/current")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["geofence"]["within_boundary"], true);
        assert_eq!(body["geofence"]["distance_meters"], 0.0);
    }

    #[actix_web::test]
    async fn sensor_errors_are_surfaced() {
        let env = TestEnv::new();
        env.seed_employee("jane", "s3cret!", true).await;
        let (access, _) = env.tokens_for("jane").await;
        let app = test_app!(env);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::post(), "/api/location")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .set_json(json!({ "error": "permission_denied" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::get(), "/api/location/current")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "permission_denied");
    }

    #[actix_web::test]
    async fn malformed_readings_are_rejected() {
        let env = TestEnv::new();
        env.seed_employee("jane", "s3cret!", true).await;
        let (access, _) = env.tokens_for("jane").await;
        let app = test_app!(env);

        for body in [
            json!({}),
            json!({
                "location": {
                    "latitude": 123.0,
                    "longitude": 0.0,
                    "accuracy_meters": 5.0,
                    "captured_at": env.now()
                }
            }),
        ] {
            let resp = test::call_service(
                &app,
                request(test::TestRequest::post(), "/api/location")
                    .insert_header(("Authorization", format!("Bearer {access}")))
                    .set_json(body)
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn tracking_snapshot_shows_the_office_and_check_in() {
        let env = TestEnv::new();
        env.seed_employee("jane", "s3cret!", true).await;
        let (access, _) = env.tokens_for("jane").await;
        let app = test_app!(env);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::post(), "/api/attendance/check-in")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .set_json(json!({
                    "location": {
                        "latitude": OFFICE.latitude,
                        "longitude": OFFICE.longitude,
                        "accuracy_meters": 8.0,
                        "captured_at": env.now()
                    },
                    "identity_artifact": "captures/jane.jpg"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::get(), "/api/tracking")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["office"]["radius_meters"], OFFICE.radius_meters);
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert_eq!(body["entries"][0]["kind"], "check_in");
    }

    #[actix_web::test]
    async fn office_hours_report_the_window() {
        let env = TestEnv::new();
        env.seed_employee("jane", "s3cret!", true).await;
        let (access, _) = env.tokens_for("jane").await;
        let app = test_app!(env);

        let resp = test::call_service(
            &app,
            request(test::TestRequest::get(), "/api/office-hours")
                .insert_header(("Authorization", format!("Bearer {access}")))
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["start_hour"], 9);
        assert_eq!(body["end_hour"], 18);
        assert_eq!(body["is_open"], true);
    }
}
