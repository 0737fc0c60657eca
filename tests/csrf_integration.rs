//! Integration tests for token acquisition, the request gate and the
//! retry-once policy against a mock server.

mod support;
use support::socket_guard::start_mock_server_or_skip;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use xsrf_session::{ApiClient, ApiError, ClientConfig, FailureKind, SettleStrategy};

const CSRF_PATH: &str = "/sanctum/csrf-cookie";

fn client_for(server: &MockServer) -> ApiClient {
    let config = ClientConfig::new(&format!("{}/api", server.uri()))
        .unwrap()
        .with_settle(SettleStrategy::Immediate);
    ApiClient::new(config).unwrap()
}

fn csrf_cookie(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(204)
        .insert_header("set-cookie", format!("XSRF-TOKEN={value}; Path=/").as_str())
}

/// Hands out a new token on every call: `token-1`, `token-2`, ...
struct RotatingToken {
    issued: AtomicUsize,
    delay: Duration,
}

impl RotatingToken {
    fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Slow enough for concurrent callers to pile up behind one acquisition.
    fn delayed(mut self) -> Self {
        self.delay = Duration::from_millis(200);
        self
    }
}

impl Respond for RotatingToken {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        csrf_cookie(&format!("token-{n}")).set_delay(self.delay)
    }
}

/// Formatted log output collected for assertions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes this crate's debug-level events on the current thread into `logs`.
fn capture_logs(logs: &CapturedLogs) -> tracing::subscriber::DefaultGuard {
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("xsrf_session=debug"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::set_default(subscriber)
}

#[tokio::test]
async fn test_concurrent_mutations_share_one_token_request() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(csrf_cookie("shared").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/event"))
        .and(header("x-xsrf-token", "shared"))
        .respond_with(ResponseTemplate::new(201))
        .expect(5)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let results = join_all((0..5).map(|i| {
        let client = client.clone();
        async move { client.post_json("/event", &json!({ "n": i })).await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().status(), 201);
    }
    assert_eq!(client.broker().acquisitions_started(), 1);
    assert!(!client.broker().is_acquiring());
}

#[tokio::test]
async fn test_sequential_mutations_each_acquire_a_token() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(csrf_cookie("t"))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/event/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client.delete("/event/1").await.unwrap();
    client.delete("/event/1").await.unwrap();
    assert_eq!(client.broker().acquisitions_started(), 2);
}

#[tokio::test]
async fn test_concurrent_list_loads_make_no_token_requests() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(csrf_cookie("unused"))
        .expect(0)
        .mount(&mock_server)
        .await;
    for list in ["/api/event", "/api/penduduk", "/api/keluarga"] {
        Mock::given(method("GET"))
            .and(path(list))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = client_for(&mock_server);
    let (events, residents, families) = tokio::join!(
        client.get("/event"),
        client.get("/penduduk"),
        client.get("/keluarga"),
    );
    assert_eq!(events.unwrap().status(), 200);
    assert_eq!(residents.unwrap().status(), 200);
    assert_eq!(families.unwrap().status(), 200);
    assert_eq!(client.broker().acquisitions_started(), 0);
}

#[tokio::test]
async fn test_concurrent_load_then_mutate_flows_rotate_token_once() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(RotatingToken::new().delayed())
        .expect(1)
        .mount(&mock_server)
        .await;
    for resource in ["event", "penduduk", "keluarga"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/{resource}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/{resource}")))
            .and(header("x-xsrf-token", "token-1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = client_for(&mock_server);
    let flows = ["/event", "/penduduk", "/keluarga"].map(|target| {
        let client = client.clone();
        async move {
            client.get(target).await?;
            client.post_json(target, &json!({ "name": "baru" })).await
        }
    });
    for result in join_all(flows).await {
        assert_eq!(result.unwrap().status(), 201);
    }
    assert_eq!(client.broker().acquisitions_started(), 1);
}

#[tokio::test]
async fn test_token_endpoint_failure_blocks_the_request() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/event"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.post_json("/event", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::TokenAcquisition);
    assert!(matches!(err, ApiError::TokenAcquisition(_)));
}

#[tokio::test]
async fn test_missing_cookie_still_sends_request() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    // Token endpoint answers but never sets the cookie: the gate tries twice
    // and then sends without the header.
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/event"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client.post_json("/event", &json!({})).await.unwrap();
    assert_eq!(response.status(), 201);

    let received = mock_server.received_requests().await.unwrap();
    let post = received
        .iter()
        .find(|request| request.method.as_str() == "POST")
        .unwrap();
    assert!(!post.headers.contains_key("x-xsrf-token"));
}

#[tokio::test]
async fn test_stale_form_recovers_transparently() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    // The first token the page obtained is no longer accepted; the second
    // one is.
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(RotatingToken::new())
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/event/7"))
        .and(header("x-xsrf-token", "token-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "id": 7 }, "message": "Event updated" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/event/7"))
        .and(header("x-xsrf-token", "token-1"))
        .respond_with(ResponseTemplate::new(419))
        .expect(1)
        .mount(&mock_server)
        .await;

    let logs = CapturedLogs::default();
    let _logging = capture_logs(&logs);

    let client = client_for(&mock_server);
    let response = client
        .put_json("/event/7", &json!({ "name": "Posyandu" }))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.message().as_deref(), Some("Event updated"));

    // A recovered mismatch logs nothing at error level.
    let output = logs.contents();
    assert!(
        output
            .lines()
            .any(|line| line.contains("DEBUG") && line.contains("retrying once")),
        "Expected the retry at debug level in:\n{output}"
    );
    assert!(
        !output.lines().any(|line| line.contains("ERROR")),
        "Unexpected error-level event in:\n{output}"
    );

    let resubmitted = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "PUT")
        .last()
        .unwrap();
    assert_eq!(resubmitted.headers["x-requested-with"], "XMLHttpRequest");
    assert_eq!(resubmitted.body, br#"{"name":"Posyandu"}"#);
}

#[tokio::test]
async fn test_second_token_mismatch_is_terminal() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(RotatingToken::new())
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/event"))
        .respond_with(ResponseTemplate::new(419))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.post_json("/event", &json!({})).await.unwrap_err();
    match err {
        ApiError::TokenMismatch { retried, .. } => assert!(retried),
        other => panic!("Expected TokenMismatch, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_refresh_during_retry_surfaces_acquisition_error() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(csrf_cookie("first"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/event/3"))
        .respond_with(ResponseTemplate::new(419))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client
        .patch_json("/event/3", &json!({ "status": "done" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::TokenAcquisition);
}

#[tokio::test]
async fn test_validation_failure_is_not_retried() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(csrf_cookie("t"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/penduduk"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "The nik field is required.",
            "errors": { "nik": ["The nik field is required."] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.post_json("/penduduk", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    assert!(err.is_expected());
    assert_eq!(err.user_message(), "The nik field is required.");
    assert_eq!(
        err.field_errors().unwrap()["nik"],
        vec!["The nik field is required.".to_string()]
    );
}

#[tokio::test]
async fn test_server_error_passes_through_as_domain_failure() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/event"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "Server Error" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get("/event").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Domain);
    assert_eq!(err.status(), Some(500));
}
