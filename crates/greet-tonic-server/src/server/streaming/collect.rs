//! Accumulation loop for the `LongGreet` call.

use futures::{Stream, StreamExt};
use greet_tonic_core::{Error, Result, proto::LongGreetRequest};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drains the inbound request stream, appending one greeting per request in
/// receipt order, and returns the accumulated string at end-of-input.
///
/// An empty input stream yields an empty string. A read fault other than
/// end-of-input ends the call with [`Error::Transport`]; it is never allowed
/// to escape the call boundary.
pub async fn collect_greetings<S>(mut inbound: S, call_token: &CancellationToken) -> Result<String>
where
    S: Stream<Item = core::result::Result<LongGreetRequest, Status>> + Unpin,
{
    let mut result = String::new();

    loop {
        let next = tokio::select! {
            () = call_token.cancelled() => return Err(Error::RequestCancelled),
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(request)) => {
                let first_name = request.greeting.unwrap_or_default().first_name;
                // "Helo" (sic) is load-bearing: existing clients assert on
                // the exact string.
                result.push_str(&format!("Helo {first_name}! "));
            }
            Some(Err(status)) => return Err(status.into()),
            None => return Ok(result),
        }
    }
}
