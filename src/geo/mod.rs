pub mod geofence;
pub mod sampler;
