pub mod env;
pub mod retry;
pub mod telemetry;
