//! Error types for the greet service.
//!
//! This module defines the central `Error` enum, which captures all
//! recoverable and reportable error cases within the service. It implements
//! `From<Error>` for `tonic::Status` to enable seamless gRPC error propagation
//! to clients with appropriate status codes and messages.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between a producer
//!   task and the outbound response stream.
//! - `Transport`: A read on an inbound request stream failed mid-call. This
//!   is always a call-scoped failure; it ends the call that observed it and
//!   nothing else.
//! - `RequestCancelled`: The client canceled the call mid-flight, or the
//!   call's cancellation signal fired.
//! - `ServiceShutdown`: A call arrived while the service was shutting down.
//!
//! End-of-input on a request stream is a normal termination signal, not an
//! error, and has no variant here.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the greet service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A read on an inbound request stream failed for a reason other than
    /// end-of-input.
    #[error("Transport failure: {status}")]
    Transport { status: Status },

    /// The client aborted the call.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Transport { status }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            // Surface the original fault unchanged so the caller sees the
            // transport's own status code.
            Error::Transport { status } => status,
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn cancelled_maps_to_cancelled_status() {
        let status: Status = Error::RequestCancelled.into();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[test]
    fn shutdown_maps_to_unavailable_status() {
        let status: Status = Error::ServiceShutdown.into();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[test]
    fn channel_error_maps_to_internal_status() {
        let status: Status = Error::ChannelError {
            context: "closed".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("closed"));
    }

    #[test]
    fn transport_preserves_original_status() {
        let original = Status::data_loss("stream reset");
        let status: Status = Error::from(original.clone()).into();
        assert_eq!(status.code(), original.code());
        assert_eq!(status.message(), original.message());
    }
}
