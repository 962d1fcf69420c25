use extension::telemetry::{Event, ServerConfig, ServerError, TelemetryServer, RUNTIME_DONE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::Span;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Reserves an ephemeral port by binding and immediately releasing it.
fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn wait_until_listening(addr: SocketAddr) {
    timeout(STARTUP_TIMEOUT, async {
        while tokio::net::TcpStream::connect(addr).await.is_err() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("telemetry listener did not come up");
}

struct RunningServer {
    endpoint: String,
    calls: Arc<AtomicUsize>,
    token: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    async fn start() -> Self {
        let addr = free_addr();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        let server = TelemetryServer::new(
            Span::none(),
            move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            },
            ServerConfig::new().with_custom_addr(addr.to_string()),
        );
        let endpoint = server.endpoint();

        let token = CancellationToken::new();
        let server_token = token.clone();
        let handle = tokio::spawn(async move { server.start(server_token).await });
        wait_until_listening(addr).await;

        Self {
            endpoint,
            calls,
            token,
            handle,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn stop(self) {
        self.token.cancel();
        timeout(SHUTDOWN_TIMEOUT, self.handle)
            .await
            .expect("listener did not shut down")
            .unwrap()
            .expect("shutdown should not be an error");
    }
}

#[tokio::test]
async fn test_start_returns_after_cancel() {
    let addr = free_addr();
    let server = TelemetryServer::new(
        Span::none(),
        || {},
        ServerConfig::new().with_custom_addr(addr.to_string()),
    );
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let result = timeout(SHUTDOWN_TIMEOUT, server.start(token))
        .await
        .expect("start did not return after cancellation");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_runtime_done_over_http() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&server.endpoint)
        .json(&vec![Event::new(RUNTIME_DONE)])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());
    assert_eq!(server.calls(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_non_terminal_events_over_http() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&server.endpoint)
        .json(&vec![Event::new("platform.initStart"), Event::new("platform.start")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(server.calls(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_body_over_http() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&server.endpoint)
        .header("content-type", "application/json")
        .body("[{\"type\":")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(server.calls(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_batches_are_handled_independently() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let requests = (0..8).map(|i| {
        let batch = if i % 2 == 0 {
            vec![Event::new("platform.start"), Event::new(RUNTIME_DONE)]
        } else {
            vec![Event::new("platform.report")]
        };
        client.post(&server.endpoint).json(&batch).send()
    });

    for response in futures::future::join_all(requests).await {
        assert_eq!(response.unwrap().status(), reqwest::StatusCode::OK);
    }
    assert_eq!(server.calls(), 4);

    server.stop().await;
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();

    let server = TelemetryServer::new(
        Span::none(),
        || {},
        ServerConfig::new().with_custom_addr(addr.to_string()),
    );

    let result = timeout(SHUTDOWN_TIMEOUT, server.start(CancellationToken::new()))
        .await
        .expect("bind failure should return immediately");

    match result {
        Err(ServerError::Bind { addr: reported, .. }) => assert_eq!(reported, addr.to_string()),
        other => panic!("expected bind error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_request_completes_during_shutdown() {
    let addr = free_addr();
    let entered = Arc::new(tokio::sync::Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let hook_entered = Arc::clone(&entered);
    let hook_calls = Arc::clone(&calls);
    let server = TelemetryServer::new(
        Span::none(),
        move || {
            hook_entered.notify_one();
            std::thread::sleep(Duration::from_millis(300));
            hook_calls.fetch_add(1, Ordering::SeqCst);
        },
        ServerConfig::new().with_custom_addr(addr.to_string()),
    );
    let endpoint = server.endpoint();

    let token = CancellationToken::new();
    let server_token = token.clone();
    let handle = tokio::spawn(async move { server.start(server_token).await });
    wait_until_listening(addr).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(&endpoint)
            .json(&vec![Event::new(RUNTIME_DONE)])
            .send()
            .await
    });

    timeout(STARTUP_TIMEOUT, entered.notified())
        .await
        .expect("hook was never entered");
    token.cancel();

    let response = timeout(SHUTDOWN_TIMEOUT, request)
        .await
        .expect("in-flight request did not finish")
        .unwrap()
        .expect("in-flight request was dropped by shutdown");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = timeout(SHUTDOWN_TIMEOUT, handle)
        .await
        .expect("listener did not shut down")
        .unwrap();
    assert!(result.is_ok());
}
