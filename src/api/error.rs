use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use tracing::error;

use crate::attendance::error::AttendanceError;
use crate::geo::sampler::SamplerError;
use crate::store::StoreError;

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::LocationRequired
            | AttendanceError::IdentityRequired
            | AttendanceError::AlreadyCheckedIn
            | AttendanceError::NoActiveCheckIn => StatusCode::BAD_REQUEST,
            AttendanceError::OutOfBounds { .. } => StatusCode::FORBIDDEN,
            AttendanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AttendanceError::Store(e) => e.error_response(),
            AttendanceError::OutOfBounds { distance_meters } => {
                HttpResponse::build(self.status_code()).json(json!({
                    "error": self.code(),
                    "message": self.to_string(),
                    "distance_meters": distance_meters,
                }))
            }
            _ => HttpResponse::build(self.status_code()).json(json!({
                "error": self.code(),
                "message": self.to_string(),
            })),
        }
    }
}

impl ResponseError for SamplerError {
    fn status_code(&self) -> StatusCode {
        match self {
            SamplerError::PermissionDenied => StatusCode::FORBIDDEN,
            SamplerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            SamplerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}

/// Details stay in the log.
impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        error!(error = %self, "Store failure");
        HttpResponse::InternalServerError().json(json!({
            "error": "internal",
            "message": "Something went wrong, Contact with system admin",
        }))
    }
}
