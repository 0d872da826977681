use thiserror::Error;

use crate::store::StoreError;

/// Why a check-in or check-out was refused. Every variant leaves the
/// attendance record untouched.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("a location sample is required to check in")]
    LocationRequired,

    #[error("an identity capture is required to check in")]
    IdentityRequired,

    /// `distance_meters` is `None` when no office is configured or the
    /// distance could not be computed.
    #[error("location is outside the office boundary")]
    OutOfBounds { distance_meters: Option<f64> },

    #[error("already checked in today")]
    AlreadyCheckedIn,

    #[error("no active check-in found for today")]
    NoActiveCheckIn,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::LocationRequired => "location_required",
            AttendanceError::IdentityRequired => "identity_required",
            AttendanceError::OutOfBounds { .. } => "out_of_bounds",
            AttendanceError::AlreadyCheckedIn => "already_checked_in",
            AttendanceError::NoActiveCheckIn => "no_active_check_in",
            AttendanceError::Store(_) => "internal",
        }
    }
}
