//! Integration tests for NetworkFetcher.
//!
//! Uses wiremock for HTTP mocking, a raw TCP listener for a body cut short
//! of its declared length, and a fake transport for scripted outcomes and
//! requests that never complete. Tests cover
//! success, status/length/conversion failures, transport errors and
//! cancellation races.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use hoard_fetch::{
    CompletionQueue, FetchContext, FetchError, Fetcher, FetcherExt, HttpResponse, HttpTransport, NetworkConfig,
    NetworkFetcher, ReqwestTransport, TransportError, COMPLETION_THREAD_NAME,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Observed<T> {
    outcome: Result<T, FetchError>,
    thread: Option<String>,
}

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Observed<T>>>>>;

fn record<T>(slot: &Slot<T>, outcome: Result<T, FetchError>) {
    let thread = std::thread::current().name().map(String::from);
    if let Some(tx) = slot.lock().unwrap().take() {
        let _ = tx.send(Observed { outcome, thread });
    }
}

async fn observe<F: Fetcher>(fetcher: &F) -> Observed<F::Value> {
    let (tx, rx) = oneshot::channel();
    let slot: Slot<F::Value> = Arc::new(Mutex::new(Some(tx)));
    let fail_slot = slot.clone();

    fetcher.fetch(
        Box::new(move |e: FetchError| record(&fail_slot, Err(e))),
        Box::new(move |v: F::Value| record(&slot, Ok(v))),
    );

    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("no callback within 5s")
        .expect("callbacks dropped without running")
}

/// One completion thread for the whole test binary, as in production.
fn shared_context() -> FetchContext {
    static COMPLETION: OnceLock<CompletionQueue> = OnceLock::new();
    let queue = COMPLETION
        .get_or_init(|| CompletionQueue::spawn().expect("failed to start completion thread"));
    FetchContext::with_completion(queue.clone()).expect("test runs inside a tokio runtime")
}

fn counting_callbacks<T: Send + 'static>(
    calls: &Arc<AtomicUsize>,
) -> (
    Box<dyn FnOnce(FetchError) + Send>,
    Box<dyn FnOnce(T) + Send>,
) {
    let (fail_calls, ok_calls) = (calls.clone(), calls.clone());
    (
        Box::new(move |_: FetchError| {
            fail_calls.fetch_add(1, Ordering::SeqCst);
        }),
        Box::new(move |_: T| {
            ok_calls.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

fn reqwest_transport() -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::new(&NetworkConfig::default()).expect("failed to create transport"))
}

fn text_fetcher(
    mock_server: &MockServer,
    route: &str,
    transport: Arc<dyn HttpTransport>,
) -> NetworkFetcher<String> {
    let url = format!("{}{}", mock_server.uri(), route);
    NetworkFetcher::parse(&url, transport, shared_context())
        .expect("failed to create fetcher")
}

/// Transport with a scripted outcome.
#[derive(Debug)]
enum Script {
    Respond(HttpResponse),
    Fail(String),
    Hang,
}

#[derive(Debug)]
struct FakeTransport {
    script: Script,
    requests: AtomicUsize,
    aborted: Arc<AtomicBool>,
}

impl FakeTransport {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: AtomicUsize::new(0),
            aborted: Arc::new(AtomicBool::new(false)),
        })
    }
}

struct AbortGuard(Arc<AtomicBool>);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, _url: &Url) -> Result<HttpResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Respond(response) => Ok(response.clone()),
            Script::Fail(message) => Err(TransportError::Connection {
                message: message.clone(),
            }),
            Script::Hang => {
                let _guard = AbortGuard(self.aborted.clone());
                std::future::pending().await
            }
        }
    }
}

fn fake_fetcher(transport: Arc<FakeTransport>) -> NetworkFetcher<String> {
    NetworkFetcher::parse(
        "https://cdn.example.com/items/42",
        transport,
        shared_context(),
    )
    .expect("failed to create fetcher")
}

#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/images/banner.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("banner text"))
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/images/banner.txt", reqwest_transport());
    let observed = observe(&fetcher).await;

    assert_eq!(observed.outcome.unwrap(), "banner text");
    assert_eq!(observed.thread.as_deref(), Some(COMPLETION_THREAD_NAME));
}

#[tokio::test]
async fn test_key_is_absolute_url() {
    let mock_server = MockServer::start().await;
    let fetcher = text_fetcher(&mock_server, "/a/../b?size=2", reqwest_transport());

    assert_eq!(fetcher.key(), format!("{}/b?size=2", mock_server.uri()));
    assert_eq!(fetcher.key(), fetcher.url().as_str());
}

#[tokio::test]
async fn test_sends_configured_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(header("user-agent", "gallery/2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = NetworkConfig::default().with_user_agent("gallery/2.0");
    let transport = Arc::new(ReqwestTransport::new(&config).unwrap());
    let fetcher = text_fetcher(&mock_server, "/ua", transport);

    assert_eq!(observe(&fetcher).await.outcome.unwrap(), "ok");
}

#[tokio::test]
async fn test_not_found_reports_invalid_status_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/missing", reqwest_transport());
    let observed = observe(&fetcher).await;
    let err = observed.outcome.unwrap_err();

    assert!(matches!(err, FetchError::InvalidStatusCode { status: 404, .. }));
    assert_eq!(err.code(), -402);
    assert_eq!(err.description(), "Not Found");
    assert_eq!(observed.thread.as_deref(), Some(COMPLETION_THREAD_NAME));
}

#[tokio::test]
async fn test_server_error_reports_invalid_status_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/broken", reqwest_transport());
    let err = observe(&fetcher).await.outcome.unwrap_err();

    assert_eq!(err.description(), "Service Unavailable");
}

#[tokio::test]
async fn test_unconvertible_body_reports_invalid_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/binary"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0xfd]))
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/binary", reqwest_transport());
    let err = observe(&fetcher).await.outcome.unwrap_err();

    assert_eq!(err.code(), -400);
    assert!(
        err.description().contains(fetcher.key()),
        "description should name the URL: {}",
        err
    );
}

#[tokio::test]
async fn test_short_body_reports_missing_data() {
    let response = HttpResponse::new(200, "0123456789").with_expected_length(Some(100));
    let transport = FakeTransport::new(Script::Respond(response));
    let fetcher = fake_fetcher(transport);

    let err = observe(&fetcher).await.outcome.unwrap_err();

    assert!(matches!(
        err,
        FetchError::MissingData {
            expected: 100,
            received: 10
        }
    ));
    assert_eq!(err.code(), -401);
    let description = err.description();
    assert!(description.contains("100"), "{}", description);
    assert!(description.contains("10 bytes"), "{}", description);
}

/// Serve one response that declares `declared` bytes but sends only `body`, then closes.
async fn serve_truncated_body(declared: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            declared
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{}/truncated", addr)
}

#[tokio::test]
async fn test_truncated_body_over_http_reports_missing_data() {
    let url = serve_truncated_body(100, b"0123456789").await;
    let fetcher =
        NetworkFetcher::<String>::parse(&url, reqwest_transport(), shared_context()).unwrap();

    let err = observe(&fetcher).await.outcome.unwrap_err();

    assert!(
        matches!(
            err,
            FetchError::MissingData {
                expected: 100,
                received: 10
            }
        ),
        "expected missing data, got {:?}",
        err
    );
    assert_eq!(err.code(), -401);
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    let transport = FakeTransport::new(Script::Fail("connection reset by peer".to_string()));
    let fetcher = fake_fetcher(transport);

    let err = observe(&fetcher).await.outcome.unwrap_err();

    match err {
        FetchError::Transport(TransportError::Connection { message }) => {
            assert_eq!(message, "connection reset by peer");
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_before_response_suppresses_callbacks() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/slow", reqwest_transport());
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_failure, on_success) = counting_callbacks::<String>(&calls);

    fetcher.fetch(on_failure, on_success);
    fetcher.cancel_fetch();

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_aborts_hung_transport() {
    let transport = FakeTransport::new(Script::Hang);
    let fetcher = fake_fetcher(transport.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_failure, on_success) = counting_callbacks::<String>(&calls);

    fetcher.fetch(on_failure, on_success);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.requests.load(Ordering::SeqCst), 1);
    assert!(!transport.aborted.load(Ordering::SeqCst));

    fetcher.cancel_fetch();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(transport.aborted.load(Ordering::SeqCst), "request future should be dropped");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_is_permanent() {
    let transport = FakeTransport::new(Script::Respond(HttpResponse::new(200, "value")));
    let fetcher = fake_fetcher(transport.clone());

    fetcher.cancel_fetch();
    assert!(fetcher.fetch_async().await.is_none());
    assert_eq!(transport.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_fetch_supersedes_first() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("value")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = text_fetcher(&mock_server, "/slow", reqwest_transport());
    let calls = Arc::new(AtomicUsize::new(0));

    let (on_failure, on_success) = counting_callbacks::<String>(&calls);
    fetcher.fetch(on_failure, on_success);
    let (on_failure, on_success) = counting_callbacks::<String>(&calls);
    fetcher.fetch(on_failure, on_success);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_async_success() {
    let transport = FakeTransport::new(Script::Respond(HttpResponse::new(200, "value")));
    let fetcher = fake_fetcher(transport);

    let value = fetcher.fetch_async().await.expect("not cancelled");
    assert_eq!(value.unwrap(), "value");
}
