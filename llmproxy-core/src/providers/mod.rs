pub mod hosted_api;
pub mod local_runtime;
