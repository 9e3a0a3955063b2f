//! End-to-end tests driving the four greet operations over a real transport.

use greet_tonic_core::proto::greet_service_client::GreetServiceClient;
use greet_tonic_core::proto::greet_service_server::GreetServiceServer;
use greet_tonic_core::proto::{
    GreetEveryoneRequest, GreetManyTimesRequest, GreetRequest, Greeting, LongGreetRequest,
};
use greet_tonic_core::types::FAN_OUT_RESPONSES;
use greet_tonic_server::server::config::ServerConfig;
use greet_tonic_server::server::service::handler::GreeterService;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tonic::transport::{Channel, Server};
use tonic::{Code, Request};

fn test_config() -> ServerConfig {
    ServerConfig {
        server_addr: "127.0.0.1:0".to_string(),
        stream_buffer_size: 8,
        unary_delay_ms: 10,
        fan_out_jitter_ms: 5,
        shutdown_timeout_secs: 1,
    }
}

fn greeting(first_name: &str) -> Option<Greeting> {
    Some(Greeting {
        first_name: first_name.to_string(),
    })
}

async fn spawn_server(config: ServerConfig) -> (SocketAddr, GreeterService) {
    let service = GreeterService::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let svc = service.clone();
    tokio::spawn(async move {
        Server::builder()
            .add_service(GreetServiceServer::new(svc))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    (addr, service)
}

async fn connect(addr: SocketAddr) -> GreetServiceClient<Channel> {
    GreetServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
}

#[tokio::test]
async fn greet_returns_hello() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let response = client
        .greet(Request::new(GreetRequest {
            greeting: greeting("Foo"),
        }))
        .await
        .unwrap();

    assert_eq!(response.into_inner().result, "Hello Foo");
}

#[tokio::test]
async fn greet_with_empty_name_is_permitted() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let response = client
        .greet(Request::new(GreetRequest {
            greeting: greeting(""),
        }))
        .await
        .unwrap();

    assert_eq!(response.into_inner().result, "Hello ");
}

#[tokio::test]
async fn greet_is_idempotent() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let first = client
        .greet(Request::new(GreetRequest {
            greeting: greeting("Foo"),
        }))
        .await
        .unwrap()
        .into_inner();
    let second = client
        .greet(Request::new(GreetRequest {
            greeting: greeting("Foo"),
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(first.result, second.result);
}

#[tokio::test]
async fn greet_many_times_yields_all_five_then_closes() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let mut stream = client
        .greet_many_times(Request::new(GreetManyTimesRequest {
            greeting: greeting("Foo"),
        }))
        .await
        .unwrap()
        .into_inner();

    let mut results = Vec::new();
    while let Some(msg) = stream.message().await.unwrap() {
        results.push(msg.result);
    }

    // Order is unconstrained by design; compare as a set.
    results.sort();
    let expected: Vec<String> = (0..FAN_OUT_RESPONSES)
        .map(|i| format!("Hello Foo number {i}"))
        .collect();
    assert_eq!(results, expected);
}

#[tokio::test]
async fn long_greet_accumulates_in_receipt_order() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let requests = vec![
        LongGreetRequest {
            greeting: greeting("A"),
        },
        LongGreetRequest {
            greeting: greeting("B"),
        },
    ];

    let response = client
        .long_greet(tokio_stream::iter(requests))
        .await
        .unwrap();

    assert_eq!(response.into_inner().result, "Helo A! Helo B! ");
}

#[tokio::test]
async fn long_greet_with_no_requests_yields_empty_string() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let response = client
        .long_greet(tokio_stream::iter(Vec::<LongGreetRequest>::new()))
        .await
        .unwrap();

    assert_eq!(response.into_inner().result, "");
}

#[tokio::test]
async fn greet_everyone_round_trips_one_to_one_in_order() {
    let (addr, _service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;

    let requests = vec![
        GreetEveryoneRequest {
            greeting: greeting("A"),
        },
        GreetEveryoneRequest {
            greeting: greeting("B"),
        },
    ];

    let mut stream = client
        .greet_everyone(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let mut results = Vec::new();
    while let Some(msg) = stream.message().await.unwrap() {
        results.push(msg.result);
    }

    assert_eq!(results, vec!["Helo A!", "Helo B!"]);
}

#[tokio::test]
async fn withdrawn_greet_fails_with_cancelled() {
    let mut config = test_config();
    config.unary_delay_ms = 5_000;
    let (addr, service) = spawn_server(config).await;
    let mut client = connect(addr).await;

    let call = tokio::spawn(async move {
        client
            .greet(Request::new(GreetRequest {
                greeting: greeting("Foo"),
            }))
            .await
    });

    // Give the call time to enter its artificial delay, then withdraw it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.shutdown().await;

    let status = call.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
}

#[tokio::test]
async fn draining_server_refuses_new_calls() {
    let (addr, service) = spawn_server(test_config()).await;
    let mut client = connect(addr).await;
    service.shutdown().await;

    let status = client
        .greet(Request::new(GreetRequest {
            greeting: greeting("Foo"),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
}
