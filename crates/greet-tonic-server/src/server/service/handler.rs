//! gRPC service implementation for the greet operations.
//!
//! This module defines [`GreeterService`], the concrete implementation of the
//! `GreetService` gRPC service defined in the protobuf specification. One
//! greeting operation is exposed in four interaction shapes: unary,
//! server-streaming, client-streaming, and bidirectional streaming.
//!
//! ## Responsibilities
//!
//! - Refuse new calls once the service is draining for shutdown.
//! - Derive a per-call cancellation token and hand it to the streaming
//!   disciplines, which observe it at every read and send.
//! - Keep the in-flight stream count accurate so graceful shutdown can drain.
//! - Report call failures as per-call gRPC statuses; a fault in one call
//!   never reaches any other call, let alone the process.

use crate::server::{
    config::ServerConfig,
    service::lifecycle::ServiceState,
    streaming::{
        collect::collect_greetings, fan_out::fan_out_greetings, relay::relay_greetings,
    },
    telemetry::{
        decrement_streams_inflight, increment_call_errors, increment_greetings_sent,
        increment_requests, increment_streams_inflight, record_stream_duration,
    },
};
use core::pin::Pin;
use core::time::Duration;
use greet_tonic_core::{
    Error,
    proto::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, LongGreetRequest, LongGreetResponse,
        greet_service_server::GreetService,
    },
};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// The greet gRPC service.
///
/// Cheap to clone: configuration plus one `Arc`'d [`ServiceState`] shared by
/// all clones, holding the shutdown token and in-flight accounting.
#[derive(Clone)]
pub struct GreeterService {
    config: ServerConfig,
    state: Arc<ServiceState>,
}

impl GreeterService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(ServiceState::new()),
        }
    }

    /// Initiates a graceful shutdown: refuse new calls, drain in-flight
    /// streams (bounded by the configured timeout), then cancel the rest.
    pub async fn shutdown(&self) {
        self.state
            .shutdown(Duration::from_secs(self.config.shutdown_timeout_secs))
            .await;
    }

    fn check_accepting(&self) -> Result<(), Status> {
        if self.state.is_draining() {
            increment_call_errors();
            return Err(Error::ServiceShutdown.into());
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl GreetService for GreeterService {
    /// Unary greeting.
    ///
    /// Sleeps for the configured artificial work delay, racing the delay
    /// against the call's cancellation token; a token that fires first ends
    /// the call with `Cancelled` and no response.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<GreetResponse>, Status> {
        self.check_accepting()?;
        increment_requests();
        #[cfg(feature = "tracing")]
        tracing::info!("Greet rpc invoked");

        let call_token = self.state.call_token();

        // Simulated processing; the window in which the caller may withdraw.
        tokio::select! {
            () = call_token.cancelled() => {
                increment_call_errors();
                return Err(Error::RequestCancelled.into());
            }
            () = sleep(Duration::from_millis(self.config.unary_delay_ms)) => {}
        }

        let first_name = request.into_inner().greeting.unwrap_or_default().first_name;
        Ok(Response::new(GreetResponse {
            result: format!("Hello {first_name}"),
        }))
    }

    type GreetManyTimesStream =
        Pin<Box<dyn Stream<Item = Result<GreetManyTimesResponse, Status>> + Send>>;

    /// Server-streaming greeting: five responses, concurrently produced,
    /// serialized onto one outbound stream, in no particular order.
    ///
    /// The fan-out runs in a spawned task; the stream handed back to tonic
    /// closes only after all five producers have completed.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_many_times(
        &self,
        request: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, Status> {
        self.check_accepting()?;
        increment_requests();
        increment_streams_inflight();
        #[cfg(feature = "tracing")]
        tracing::info!("GreetManyTimes rpc invoked");
        let start = std::time::Instant::now();

        let first_name = request.into_inner().greeting.unwrap_or_default().first_name;
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let call_token = self.state.call_token();
        let jitter_ms = self.config.fan_out_jitter_ms;
        let guard = self.state.begin_stream();

        let fut = async move {
            let _guard = guard;
            match fan_out_greetings(&first_name, jitter_ms, &call_token, &resp_tx).await {
                Ok(()) => {
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Error: {}", e);
                    // Best effort to surface the failure; the client may
                    // already be gone.
                    if let Err(_e) = resp_tx.send(Err(e.into())).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Failed to forward err: {}", _e);
                    }
                }
            }
            decrement_streams_inflight();
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("fan_out"))
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|_| increment_greetings_sent(1))
            .inspect_err(|_e| increment_call_errors());

        Ok(Response::new(Box::pin(stream)))
    }

    /// Client-streaming greeting: accumulate until end-of-input, then answer
    /// once.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn long_greet(
        &self,
        request: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, Status> {
        self.check_accepting()?;
        increment_requests();
        increment_streams_inflight();
        #[cfg(feature = "tracing")]
        tracing::info!("LongGreet rpc invoked");
        let start = std::time::Instant::now();

        let call_token = self.state.call_token();
        let _guard = self.state.begin_stream();

        let outcome = collect_greetings(request.into_inner(), &call_token).await;
        decrement_streams_inflight();

        match outcome {
            Ok(result) => {
                record_stream_duration(start.elapsed().as_millis() as f64);
                Ok(Response::new(LongGreetResponse { result }))
            }
            Err(e) => {
                increment_call_errors();
                #[cfg(feature = "tracing")]
                tracing::warn!("Error: {}", e);
                Err(e.into())
            }
        }
    }

    type GreetEveryoneStream =
        Pin<Box<dyn Stream<Item = Result<GreetEveryoneResponse, Status>> + Send>>;

    /// Bidirectional greeting: one response per request, in order, until
    /// end-of-input. The relay runs in a spawned task feeding the outbound
    /// stream.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_everyone(
        &self,
        request: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, Status> {
        self.check_accepting()?;
        increment_requests();
        increment_streams_inflight();
        #[cfg(feature = "tracing")]
        tracing::info!("GreetEveryone rpc invoked");
        let start = std::time::Instant::now();

        let inbound = request.into_inner();
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let call_token = self.state.call_token();
        let guard = self.state.begin_stream();

        let fut = async move {
            let _guard = guard;
            match relay_greetings(inbound, &call_token, &resp_tx).await {
                Ok(()) => {
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Error: {}", e);
                    if let Err(_e) = resp_tx.send(Err(e.into())).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Failed to forward err: {}", _e);
                    }
                }
            }
            decrement_streams_inflight();
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("relay"))
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|_| increment_greetings_sent(1))
            .inspect_err(|_e| increment_call_errors());

        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use greet_tonic_core::proto::Greeting;
    use greet_tonic_core::types::FAN_OUT_RESPONSES;
    use tonic::Code;

    fn test_config() -> ServerConfig {
        ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            stream_buffer_size: 8,
            unary_delay_ms: 5,
            fan_out_jitter_ms: 2,
            shutdown_timeout_secs: 1,
        }
    }

    fn greeting(first_name: &str) -> Option<Greeting> {
        Some(Greeting {
            first_name: first_name.to_string(),
        })
    }

    #[tokio::test]
    async fn greet_appends_first_name() {
        let service = GreeterService::new(test_config());

        let response = service
            .greet(Request::new(GreetRequest {
                greeting: greeting("Maria"),
            }))
            .await
            .unwrap();

        assert_eq!(response.into_inner().result, "Hello Maria");
    }

    #[tokio::test]
    async fn greet_tolerates_missing_greeting() {
        let service = GreeterService::new(test_config());

        let response = service
            .greet(Request::new(GreetRequest { greeting: None }))
            .await
            .unwrap();

        assert_eq!(response.into_inner().result, "Hello ");
    }

    #[tokio::test]
    async fn greet_cancelled_mid_delay() {
        let mut config = test_config();
        config.unary_delay_ms = 5_000;
        let service = GreeterService::new(config);

        let call = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .greet(Request::new(GreetRequest {
                        greeting: greeting("Maria"),
                    }))
                    .await
            })
        };

        // Let the call reach its delay, then withdraw it.
        sleep(Duration::from_millis(50)).await;
        service.shutdown().await;

        let status = call.await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn draining_service_refuses_new_calls() {
        let service = GreeterService::new(test_config());
        service.shutdown().await;

        let status = service
            .greet(Request::new(GreetRequest { greeting: None }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn greet_many_times_streams_exactly_five() {
        let service = GreeterService::new(test_config());

        let response = service
            .greet_many_times(Request::new(GreetManyTimesRequest {
                greeting: greeting("Foo"),
            }))
            .await
            .unwrap();

        let mut stream = response.into_inner();
        let mut results = Vec::new();
        while let Some(msg) = stream.next().await {
            results.push(msg.unwrap().result);
        }

        results.sort();
        let expected: Vec<String> = (0..FAN_OUT_RESPONSES)
            .map(|i| format!("Hello Foo number {i}"))
            .collect();
        assert_eq!(results, expected);
    }
}
