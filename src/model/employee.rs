use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::location::OfficeLocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "department": "Engineering",
        "is_approved": true,
        "office": {
            "latitude": 12.9716,
            "longitude": 77.5946,
            "radius_meters": 100.0
        }
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "Engineering", nullable = true)]
    pub department: Option<String>,

    /// Unapproved employees cannot log in.
    pub is_approved: bool,

    /// Geofence used to gate check-in. `None` until an admin assigns one.
    pub office: Option<OfficeLocation>,
}

/// Fields needed to create an employee row.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
    pub office: Option<OfficeLocation>,
}
