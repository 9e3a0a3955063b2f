//! Server internals: configuration, telemetry bootstrap, the gRPC service,
//! and the streaming disciplines behind it.

pub mod config;
pub mod service;
pub mod streaming;
pub mod telemetry;
