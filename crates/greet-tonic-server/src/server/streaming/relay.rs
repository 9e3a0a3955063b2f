//! Request/response relay for the `GreetEveryone` call.

use futures::{Stream, StreamExt};
use greet_tonic_core::{
    Error, Result,
    proto::{GreetEveryoneRequest, GreetEveryoneResponse},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Answers every inbound request with exactly one response, in order, until
/// end-of-input.
///
/// The i-th response always corresponds to the i-th request: the loop reads,
/// sends, and only then reads again, so interleaving is strictly one-to-one.
/// On end-of-input the function returns `Ok(())` and the caller closes the
/// response side with no final message.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the call token fires or the client stops
///   receiving.
/// - [`Error::Transport`] for a read fault other than end-of-input; the
///   fault ends this call and nothing else.
pub async fn relay_greetings<S>(
    mut inbound: S,
    call_token: &CancellationToken,
    resp_tx: &mpsc::Sender<core::result::Result<GreetEveryoneResponse, Status>>,
) -> Result<()>
where
    S: Stream<Item = core::result::Result<GreetEveryoneRequest, Status>> + Unpin,
{
    loop {
        let next = tokio::select! {
            () = call_token.cancelled() => return Err(Error::RequestCancelled),
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(request)) => {
                let first_name = request.greeting.unwrap_or_default().first_name;
                let response = GreetEveryoneResponse {
                    result: format!("Helo {first_name}!"),
                };

                if resp_tx.send(Ok(response)).await.is_err() {
                    return Err(Error::RequestCancelled);
                }
            }
            Some(Err(status)) => return Err(status.into()),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greet_tonic_core::proto::Greeting;
    use tonic::Code;

    fn request(first_name: &str) -> core::result::Result<GreetEveryoneRequest, Status> {
        Ok(GreetEveryoneRequest {
            greeting: Some(Greeting {
                first_name: first_name.to_string(),
            }),
        })
    }

    #[tokio::test]
    async fn one_response_per_request_in_order() {
        let token = CancellationToken::new();
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let inbound = tokio_stream::iter(vec![request("A"), request("B")]);

        relay_greetings(inbound, &token, &resp_tx).await.unwrap();
        drop(resp_tx);

        let mut results = Vec::new();
        while let Some(msg) = resp_rx.recv().await {
            results.push(msg.unwrap().result);
        }
        assert_eq!(results, vec!["Helo A!", "Helo B!"]);
    }

    #[tokio::test]
    async fn end_of_input_closes_without_final_response() {
        let token = CancellationToken::new();
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let inbound = tokio_stream::iter(Vec::new());

        relay_greetings(inbound, &token, &resp_tx).await.unwrap();
        drop(resp_tx);

        assert!(resp_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn read_fault_surfaces_as_transport_error() {
        let token = CancellationToken::new();
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let inbound = tokio_stream::iter(vec![
            request("A"),
            Err(Status::unavailable("connection lost")),
        ]);

        let err = relay_greetings(inbound, &token, &resp_tx)
            .await
            .unwrap_err();
        match err {
            Error::Transport { status } => assert_eq!(status.code(), Code::Unavailable),
            other => panic!("expected transport error, got {other:?}"),
        }

        // The response produced before the fault was still delivered.
        let first = resp_rx.recv().await.unwrap().unwrap();
        assert_eq!(first.result, "Helo A!");
    }

    #[tokio::test]
    async fn receiver_gone_is_treated_as_cancellation() {
        let token = CancellationToken::new();
        let (resp_tx, resp_rx) = mpsc::channel(8);
        drop(resp_rx);
        let inbound = tokio_stream::iter(vec![request("A")]);

        let err = relay_greetings(inbound, &token, &resp_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestCancelled));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_read() {
        let token = CancellationToken::new();
        token.cancel();
        let (resp_tx, _resp_rx) = mpsc::channel(8);
        let inbound =
            futures::stream::pending::<core::result::Result<GreetEveryoneRequest, Status>>();

        let err = relay_greetings(inbound, &token, &resp_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestCancelled));
    }
}
