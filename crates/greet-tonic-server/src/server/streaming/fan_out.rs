//! Concurrent fan-out for the `GreetManyTimes` call.

use core::time::Duration;
use greet_tonic_core::{Error, Result, proto::GreetManyTimesResponse, types::FAN_OUT_RESPONSES};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Produces the [`FAN_OUT_RESPONSES`] responses for one `GreetManyTimes`
/// call.
///
/// Each response is computed by its own spawned task after an independent
/// random delay in `[0, jitter_ms)`, so completion order is unrelated to the
/// response index. All producers share one bounded channel to the outbound
/// stream; the channel serializes emission, so computation runs in parallel
/// while no two sends are ever in flight at once.
///
/// The `join_all` over the producer handles is the completion barrier: this
/// function only returns - and the caller only lets the stream close - once
/// every producer has run to completion.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the call token fires or the client goes
///   away (closed outbound channel) before all responses are sent.
/// - [`Error::ChannelError`] if a producer task itself fails.
pub async fn fan_out_greetings(
    first_name: &str,
    jitter_ms: u64,
    call_token: &CancellationToken,
    resp_tx: &mpsc::Sender<core::result::Result<GreetManyTimesResponse, Status>>,
) -> Result<()> {
    let producers: Vec<_> = (0..FAN_OUT_RESPONSES)
        .map(|i| {
            let first_name = first_name.to_owned();
            let token = call_token.clone();
            let resp_tx = resp_tx.clone();

            tokio::spawn(async move {
                if token.is_cancelled() || resp_tx.is_closed() {
                    return Err(Error::RequestCancelled);
                }

                tokio::select! {
                    () = token.cancelled() => return Err(Error::RequestCancelled),
                    () = resp_tx.closed() => return Err(Error::RequestCancelled),
                    () = sleep(jitter(jitter_ms)) => {}
                }

                let response = GreetManyTimesResponse {
                    result: format!("Hello {first_name} number {i}"),
                };

                // A refused send means the receiving side is gone; the caller
                // has withdrawn the call.
                resp_tx
                    .send(Ok(response))
                    .await
                    .map_err(|_| Error::RequestCancelled)
            })
        })
        .collect();

    let mut first_error = None;
    for joined in futures::future::join_all(producers).await {
        let produced = joined.unwrap_or_else(|e| {
            Err(Error::ChannelError {
                context: format!("Producer task failed: {e}"),
            })
        });

        if let Err(e) = produced {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

fn jitter(jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..jitter_ms))
}
