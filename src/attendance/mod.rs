pub mod error;
pub mod gate;
pub mod office_hours;
pub mod report;
pub mod session;
pub mod tracking_log;
