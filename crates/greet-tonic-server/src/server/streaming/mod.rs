//! Streaming disciplines for the three non-unary calls.
//!
//! Each discipline is a free function over the call's streams and
//! cancellation token, kept independent of the gRPC plumbing so it can be
//! exercised directly in tests.
//!
//! - [`fan_out`] - concurrent producers, serialized emission (`GreetManyTimes`).
//! - [`collect`] - accumulate until end-of-input (`LongGreet`).
//! - [`relay`] - one response per request, interleaved (`GreetEveryone`).

pub mod collect;
pub mod fan_out;
pub mod relay;
