/// Structured logging setup
pub mod tracing_setup;
