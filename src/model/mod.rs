pub mod attendance;
pub mod employee;
pub mod location;
pub mod role;
pub mod tracking;
pub mod user;
