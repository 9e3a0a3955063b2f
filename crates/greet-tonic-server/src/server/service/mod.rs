//! gRPC service implementation and call lifecycle coordination.
//!
//! This module contains the client-facing entry points for the four greet
//! operations and the shared state that governs their shutdown behavior.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`GreeterService`).
//! - [`lifecycle`] - drain/cancel coordination for in-flight calls.

pub mod handler;
pub mod lifecycle;
