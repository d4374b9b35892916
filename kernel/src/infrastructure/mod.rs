/// Audit logging for lifecycle and recovery events.
pub mod audit;
/// Configuration management for the kernel.
pub mod config;
/// HTTP control plane.
pub mod server;
/// Telemetry setup for logging and tracing.
pub mod telemetry;
