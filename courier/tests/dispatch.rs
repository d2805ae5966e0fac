//! Dispatch tests against an in-process transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier::{
    FnListener, NetworkResponse, OutgoingRequest, Outcome, Payload, QueueConfig, Request,
    RequestConfig, RequestError, RequestFormat, RequestMethod, RequestQueue, RequestState,
    ResponseData, ResponseListener, TimeoutPolicy, Transport, TransportError, TransportErrorKind,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

type Reply = fn(&OutgoingRequest) -> Result<NetworkResponse, TransportError>;

/// Transport answering from a function after a fixed delay.
struct MockTransport {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockTransport {
    fn new(reply: Reply) -> Arc<Self> {
        Self::delayed(reply, Duration::ZERO)
    }

    fn delayed(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<NetworkResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        (self.reply)(&request)
    }
}

fn ok_json(request: &OutgoingRequest) -> Result<NetworkResponse, TransportError> {
    let body = json!({ "url": request.url.as_str(), "method": request.method.as_str() });
    Ok(NetworkResponse::new(200, body.to_string())
        .with_header("Content-Type", "application/json; charset=UTF-8"))
}

fn unprocessable(_: &OutgoingRequest) -> Result<NetworkResponse, TransportError> {
    Ok(NetworkResponse::new(422, r#"{"error":"bad title"}"#))
}

fn refused(_: &OutgoingRequest) -> Result<NetworkResponse, TransportError> {
    Err(TransportError::connection("connection refused"))
}

fn echo_body(request: &OutgoingRequest) -> Result<NetworkResponse, TransportError> {
    Ok(NetworkResponse::new(201, request.body.clone().unwrap_or_default()))
}

fn json_request(url: &str) -> Request<Value> {
    Request::new(RequestMethod::Get, url, RequestConfig::new(RequestFormat::Json)).unwrap()
}

fn smart_request(url: &str) -> Request<Value> {
    Request::new(
        RequestMethod::Get,
        url,
        RequestConfig::new(RequestFormat::Json).smart_comparison(true),
    )
    .unwrap()
}

#[derive(Default)]
struct Recorder {
    ok: AtomicUsize,
    failed: AtomicUsize,
}

impl Recorder {
    fn total(&self) -> usize {
        self.ok.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }
}

struct RecordingListener(Arc<Recorder>);

impl<R, E> ResponseListener<R, E> for RecordingListener {
    fn on_response_received(&self, _data: &ResponseData<R, E>, request: &Request<R, E>) {
        assert_eq!(request.state(), RequestState::Delivered);
        self.0.ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, data: &ResponseData<R, E>, request: &Request<R, E>) {
        assert!(data.error.is_some());
        assert_eq!(request.state(), RequestState::Failed);
        self.0.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_synchronous_request_returns_decoded_result() {
    let transport = MockTransport::new(ok_json);
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let recorder = Arc::new(Recorder::default());

    let mut request = json_request("http://api.test/items");
    request.add_get_parameter("page", Some(3));
    request.set_response_listener(RecordingListener(recorder.clone()));
    let request = Arc::new(request);

    let data = request.perform_request(true, &queue).await.unwrap();

    assert_eq!(data.status_code, Some(200));
    assert_eq!(
        data.result,
        Some(json!({ "url": "http://api.test/items?page=3", "method": "GET" }))
    );
    assert_eq!(request.state(), RequestState::Delivered);
    assert_eq!(recorder.ok.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.failed.load(Ordering::SeqCst), 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_asynchronous_request_returns_immediately() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(20));
    let queue = RequestQueue::new(transport, QueueConfig::default());
    let request = Arc::new(json_request("http://api.test/slow"));

    let snapshot = request.perform_request(false, &queue).await.unwrap();
    assert_eq!(snapshot.status_code, None);
    assert_eq!(snapshot.result, None);

    let outcome = request.completion().wait().await.unwrap();
    let data = outcome.into_data().unwrap();
    assert_eq!(data.status_code, Some(200));
    assert!(data.result.is_some());
}

#[tokio::test]
async fn test_error_status_is_delivered_with_parsed_error() {
    let queue = RequestQueue::new(MockTransport::new(unprocessable), QueueConfig::default());
    let recorder = Arc::new(Recorder::default());

    let mut request: Request<Value, Value> = Request::new(
        RequestMethod::Post,
        "http://api.test/notes",
        RequestConfig::new(RequestFormat::Json),
    )
    .unwrap();
    request.set_object_to_post(json!({ "title": "" }));
    request.set_response_listener(RecordingListener(recorder.clone()));
    let request = Arc::new(request);

    let data = request.perform_request(true, &queue).await.unwrap();

    assert_eq!(data.status_code, Some(422));
    assert_eq!(data.result, None);
    assert_eq!(data.parsed_error, Some(json!({ "error": "bad title" })));
    assert!(matches!(
        data.error,
        Some(RequestError::Transport(ref error)) if error.kind() == TransportErrorKind::Status
    ));
    assert_eq!(recorder.failed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.ok.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transport_failure_is_delivered_as_error() {
    let queue = RequestQueue::new(MockTransport::new(refused), QueueConfig::default());
    let request = Arc::new(json_request("http://api.test/down"));

    let data = request.perform_request(true, &queue).await.unwrap();

    assert_eq!(data.status_code, None);
    assert!(data.is_error());
    assert_eq!(request.state(), RequestState::Failed);
}

#[tokio::test]
async fn test_body_reaches_transport() {
    let queue = RequestQueue::new(MockTransport::new(echo_body), QueueConfig::default());
    let mut request: Request<String> = Request::new(
        RequestMethod::Put,
        "http://api.test/echo",
        RequestConfig::new(RequestFormat::Json).response_format(courier::ResponseFormat::Text),
    )
    .unwrap();
    request.set_object_to_post(json!({ "a": 1 }));
    let request = Arc::new(request);

    let data = request.perform_request(true, &queue).await.unwrap();
    assert_eq!(data.status_code, Some(201));
    assert_eq!(data.result.as_deref(), Some(r#"{"a":1}"#));
}

#[tokio::test]
async fn test_cancel_releases_synchronous_waiter_with_nothing() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(50));
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let recorder = Arc::new(Recorder::default());

    let mut request = json_request("http://api.test/cancel");
    request.set_response_listener(RecordingListener(recorder.clone()));
    let request = Arc::new(request);

    let canceller = request.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        canceller.cancel();
    });

    let data = request.perform_request(true, &queue).await;
    assert!(data.is_none());
    assert!(request.is_cancelled());

    queue.wait_idle().await;
    assert_eq!(recorder.total(), 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_request_is_not_transported() {
    let transport = MockTransport::new(ok_json);
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let request = Arc::new(json_request("http://api.test/never"));

    request.cancel();
    let data = request.perform_request(true, &queue).await;
    queue.wait_idle().await;

    assert!(data.is_none());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_while_waiting_for_slot_is_not_transported() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(30));
    let config = QueueConfig::builder().max_concurrent_requests(1).build();
    let queue = RequestQueue::new(transport.clone(), config);

    let first = Arc::new(json_request("http://api.test/first"));
    let second = Arc::new(json_request("http://api.test/second"));
    first.perform_request(false, &queue).await;
    second.perform_request(false, &queue).await;
    second.cancel();

    queue.wait_idle().await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(first.state(), RequestState::Delivered);
    assert_eq!(second.state(), RequestState::Cancelled);
}

#[tokio::test]
async fn test_equal_smart_requests_share_one_call() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(20));
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let recorder = Arc::new(Recorder::default());

    let requests: Vec<_> = (0..3)
        .map(|_| {
            let mut request = smart_request("http://api.test/shared");
            request.set_response_listener(RecordingListener(recorder.clone()));
            Arc::new(request)
        })
        .collect();

    let results = futures::future::join_all(
        requests
            .iter()
            .map(|request| request.perform_request(true, &queue)),
    )
    .await;

    assert_eq!(transport.calls(), 1);
    assert_eq!(recorder.ok.load(Ordering::SeqCst), 3);
    for data in results {
        assert_eq!(data.unwrap().status_code, Some(200));
    }
}

#[tokio::test]
async fn test_smart_requests_with_different_methods_are_all_sent() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(20));
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let config = RequestConfig::new(RequestFormat::Json).smart_comparison(true);

    let url = "http://api.test/items/1";
    let get: Arc<Request<Value>> =
        Arc::new(Request::new(RequestMethod::Get, url, config.clone()).unwrap());
    let delete: Arc<Request<Value>> =
        Arc::new(Request::new(RequestMethod::Delete, url, config).unwrap());
    let (get_data, delete_data) = tokio::join!(
        get.perform_request(true, &queue),
        delete.perform_request(true, &queue)
    );

    assert_eq!(transport.calls(), 2);
    assert_eq!(get_data.unwrap().result.unwrap()["method"], "GET");
    assert_eq!(delete_data.unwrap().result.unwrap()["method"], "DELETE");
}

#[tokio::test]
async fn test_follower_survives_cancelled_leader() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(20));
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());

    let leader = Arc::new(smart_request("http://api.test/shared"));
    let follower = Arc::new(smart_request("http://api.test/shared"));
    leader.perform_request(false, &queue).await;
    follower.perform_request(false, &queue).await;
    leader.cancel();

    let data = follower.completion().wait().await.and_then(Outcome::into_data);
    assert_eq!(data.unwrap().status_code, Some(200));
    assert_eq!(transport.calls(), 1);
    assert_eq!(leader.state(), RequestState::Cancelled);
}

#[tokio::test]
async fn test_identity_mode_does_not_share_calls() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(10));
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());

    let first = Arc::new(json_request("http://api.test/same"));
    let second = Arc::new(json_request("http://api.test/same"));
    let (a, b) = tokio::join!(
        first.perform_request(true, &queue),
        second.perform_request(true, &queue)
    );

    assert!(a.is_some() && b.is_some());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_deduplication_can_be_disabled() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(10));
    let config = QueueConfig::builder().deduplicate(false).build();
    let queue = RequestQueue::new(transport.clone(), config);

    let first = Arc::new(smart_request("http://api.test/same"));
    let second = Arc::new(smart_request("http://api.test/same"));
    tokio::join!(
        first.perform_request(true, &queue),
        second.perform_request(true, &queue)
    );

    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(10));
    let config = QueueConfig::builder().max_concurrent_requests(2).build();
    let queue = RequestQueue::new(transport.clone(), config);

    for index in 0..6 {
        let request = Arc::new(json_request(&format!("http://api.test/{index}")));
        request.perform_request(false, &queue).await;
    }
    assert!(queue.wait_idle_timeout(Duration::from_secs(5)).await);

    assert_eq!(transport.calls(), 6);
    assert!(transport.max_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(queue.active_request_count(), 0);
}

#[tokio::test]
async fn test_cancel_timeout_policy_delivers_timeout() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(200));
    let config = QueueConfig::builder()
        .timeout(Duration::from_millis(10))
        .build();
    let queue = RequestQueue::new(transport, config);
    let request = Arc::new(json_request("http://api.test/slow"));

    let data = request.perform_request(true, &queue).await.unwrap();

    assert!(matches!(
        data.error,
        Some(RequestError::Transport(ref error)) if error.kind() == TransportErrorKind::Timeout
    ));
}

#[tokio::test]
async fn test_warn_timeout_policy_still_delivers() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(20));
    let config = QueueConfig::builder()
        .timeout_policy(TimeoutPolicy::Warn(Duration::from_millis(1)))
        .build();
    let queue = RequestQueue::new(transport, config);
    let request = Arc::new(json_request("http://api.test/slow"));

    let data = request.perform_request(true, &queue).await.unwrap();
    assert_eq!(data.status_code, Some(200));
}

#[tokio::test]
async fn test_interrupted_wait_returns_current_data() {
    let transport = MockTransport::delayed(ok_json, Duration::from_millis(200));
    let config = QueueConfig::builder()
        .sync_wait_timeout(Duration::from_millis(10))
        .build();
    let queue = RequestQueue::new(transport, config);
    let request = Arc::new(json_request("http://api.test/slow"));

    let data = request.perform_request(true, &queue).await.unwrap();

    assert_eq!(data.status_code, None);
    assert_eq!(request.state(), RequestState::Enqueued);
}

#[tokio::test]
async fn test_completed_request_is_not_enqueued_again() {
    let transport = MockTransport::new(ok_json);
    let queue = RequestQueue::new(transport.clone(), QueueConfig::default());
    let request = Arc::new(json_request("http://api.test/once"));

    request.perform_request(true, &queue).await;
    let again = request.perform_request(true, &queue).await.unwrap();

    assert_eq!(again.status_code, Some(200));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_closure_listener() {
    let queue = RequestQueue::new(MockTransport::new(ok_json), QueueConfig::default());
    let seen = Arc::new(AtomicUsize::new(0));

    let mut request: Request<Payload> =
        Request::new(RequestMethod::Get, "http://api.test/fn", RequestConfig::default()).unwrap();
    let counter = seen.clone();
    request.set_response_listener(FnListener::new(
        move |data: &ResponseData<Payload>| {
            assert!(matches!(data.result, Some(Payload::Json(_))));
            counter.fetch_add(1, Ordering::SeqCst);
        },
        |data: &ResponseData<Payload>| assert!(data.error.is_none(), "unexpected error"),
    ));
    let request = Arc::new(request);

    request.perform_request(true, &queue).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_blocking_request_from_plain_thread() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let queue = RequestQueue::with_runtime(
        runtime.handle().clone(),
        MockTransport::new(ok_json),
        QueueConfig::default(),
    );
    let request = Arc::new(json_request("http://api.test/blocking"));

    let data = std::thread::spawn(move || request.perform_request_blocking(&queue))
        .join()
        .unwrap()
        .unwrap();

    assert_eq!(data.status_code, Some(200));
}
