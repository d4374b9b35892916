//! Keel Kernel - host process for the Keel task and initiative engine.
//!
//! This crate wires the `supervisor` engine to SQLite storage, broadcasts its
//! events, runs startup recovery and serves the operational control plane.

/// Engine event broadcasting.
pub mod events;
/// Host wiring and startup recovery.
pub mod host;
/// Infrastructure components (config, server, telemetry, audit).
pub mod infrastructure;
/// SQLite entity store and schema.
pub mod store;
