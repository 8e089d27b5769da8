//! Tests for backoff computation and the retrying transport.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderValue, StatusCode};
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::retry::retry_after;
use super::{
    ApiRequest, ApiResponse, BackoffPolicy, HttpSend, LastFailure, NoJitter, PreparedRequest,
    RequestBody, RetryingTransport, SeededJitter, SendError, Sleeper, TransportError,
};

/// Sender that replays a fixed script of outcomes and records what it saw.
#[derive(Default)]
struct ScriptedSender {
    script: Mutex<VecDeque<Result<ApiResponse, SendError>>>,
    seen_bodies: Mutex<Vec<Option<Vec<u8>>>>,
    calls: AtomicU32,
}

impl ScriptedSender {
    fn new(script: Vec<Result<ApiResponse, SendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpSend for Arc<ScriptedSender> {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_bodies
            .lock()
            .expect("body log lock")
            .push(request.body);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(StatusCode::OK, "done")))
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("delay log lock").push(duration);
    }
}

/// Sleeper that fires the token and then never wakes up on its own.
struct CancellingSleeper {
    token: CancellationToken,
}

#[async_trait]
impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.token.cancel();
        std::future::pending::<()>().await;
    }
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("stream already consumed"))
    }
}

fn status(code: StatusCode) -> Result<ApiResponse, SendError> {
    Ok(ApiResponse::new(code, Vec::new()))
}

fn with_retry_after(code: StatusCode, value: &str) -> Result<ApiResponse, SendError> {
    let mut response = ApiResponse::new(code, Vec::new());
    response.headers.insert(
        RETRY_AFTER,
        HeaderValue::from_str(value).expect("valid header value"),
    );
    Ok(response)
}

fn request() -> ApiRequest {
    ApiRequest::get(Url::parse("https://api.example.test/resource?page=1").expect("valid URL"))
}

fn transport(
    sender: &Arc<ScriptedSender>,
    sleeper: &Arc<RecordingSleeper>,
) -> RetryingTransport<Arc<ScriptedSender>> {
    RetryingTransport::new(Arc::clone(sender))
        .with_jitter(Arc::new(NoJitter))
        .with_sleeper(Arc::clone(sleeper) as Arc<dyn Sleeper>)
}

// --- backoff ---

#[rstest]
#[case::seed_one(1)]
#[case::seed_large(0xDEAD_BEEF)]
#[case::seed_zero(0)]
fn jittered_delay_stays_within_cap(#[case] seed: u64) {
    let policy = BackoffPolicy::default();
    let jitter = SeededJitter::new(seed);

    for attempt in 0..64 {
        let delay = policy.next(attempt, &jitter);
        assert!(
            delay <= policy.cap(),
            "attempt {attempt} produced {delay:?}, above the cap"
        );
    }
}

#[rstest]
fn delay_without_jitter_grows_until_clamped() {
    let policy = BackoffPolicy::default();
    let delays: Vec<Duration> = (0..40).map(|a| policy.delay_without_jitter(a)).collect();

    assert!(
        delays.windows(2).all(|pair| pair.first() <= pair.last()),
        "delays must be non-decreasing: {delays:?}"
    );
    assert_eq!(delays.first(), Some(&Duration::from_millis(500)));
    assert_eq!(delays.get(1), Some(&Duration::from_secs(1)));
    assert_eq!(delays.get(3), Some(&Duration::from_secs(4)));
    assert_eq!(delays.last(), Some(&policy.cap()));
}

#[rstest]
fn jitter_stays_within_half_of_raw_delay() {
    let policy = BackoffPolicy::default();
    let jitter = SeededJitter::new(42);

    for _ in 0..200 {
        let delay = policy.next(2, &jitter);
        assert!(delay > Duration::from_secs(1), "lower bound: {delay:?}");
        assert!(delay < Duration::from_secs(3), "upper bound: {delay:?}");
    }
}

#[rstest]
fn zero_base_yields_zero_delay() {
    let policy = BackoffPolicy::new(Duration::ZERO, 2, Duration::from_secs(30));
    let jitter = SeededJitter::new(9);

    assert_eq!(policy.next(0, &jitter), Duration::ZERO);
    assert_eq!(policy.next(10, &jitter), Duration::ZERO);
}

#[rstest]
fn seeded_jitter_is_deterministic() {
    let policy = BackoffPolicy::default();
    let first = SeededJitter::new(1234);
    let second = SeededJitter::new(1234);

    let left: Vec<Duration> = (0..8).map(|a| policy.next(a, &first)).collect();
    let right: Vec<Duration> = (0..8).map(|a| policy.next(a, &second)).collect();

    assert_eq!(left, right);
}

#[rstest]
fn no_jitter_returns_raw_delay() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.next(1, &NoJitter), Duration::from_secs(1));
}

// --- Retry-After parsing ---

#[rstest]
#[case::seconds("2", Some(Duration::from_secs(2)))]
#[case::padded_seconds(" 7 ", Some(Duration::from_secs(7)))]
#[case::zero_seconds("0", None)]
#[case::http_date("Wed, 21 Oct 2015 07:28:00 GMT", Some(Duration::from_secs(10)))]
#[case::past_date("Wed, 21 Oct 2015 07:00:00 GMT", None)]
#[case::garbage("soon", None)]
fn retry_after_parses_seconds_and_dates(#[case] value: &str, #[case] expected: Option<Duration>) {
    let now = Utc
        .with_ymd_and_hms(2015, 10, 21, 7, 27, 50)
        .single()
        .expect("valid timestamp");
    let mut headers = HeaderMap::new();
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from_str(value).expect("valid header value"),
    );

    assert_eq!(retry_after(&headers, now), expected);
}

#[rstest]
fn retry_after_missing_header_is_none() {
    assert_eq!(retry_after(&HeaderMap::new(), Utc::now()), None);
}

// --- transport ---

#[tokio::test]
async fn retries_server_errors_then_returns_success() {
    let sender = Arc::new(ScriptedSender::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::BAD_GATEWAY),
        Ok(ApiResponse::new(StatusCode::OK, "payload")),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let response = transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect("third attempt should succeed");

    assert_eq!(response.text(), "payload");
    assert_eq!(sender.calls(), 3);
    assert_eq!(
        *sleeper.delays.lock().expect("delay log lock"),
        vec![Duration::from_millis(500), Duration::from_secs(1)]
    );
}

#[rstest]
#[case::not_found(StatusCode::NOT_FOUND)]
#[case::unauthorised(StatusCode::UNAUTHORIZED)]
#[case::forbidden(StatusCode::FORBIDDEN)]
#[case::bad_request(StatusCode::BAD_REQUEST)]
#[tokio::test]
async fn client_errors_are_returned_without_retry(#[case] code: StatusCode) {
    let sender = Arc::new(ScriptedSender::new(vec![status(code)]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let response = transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect("client errors are responses, not transport failures");

    assert_eq!(response.status, code);
    assert_eq!(sender.calls(), 1);
    assert!(sleeper.delays.lock().expect("delay log lock").is_empty());
}

#[tokio::test]
async fn exhaustion_reports_attempts_and_last_status() {
    let sender = Arc::new(ScriptedSender::new(
        (0..10)
            .map(|_| status(StatusCode::INTERNAL_SERVER_ERROR))
            .collect(),
    ));
    let sleeper = Arc::new(RecordingSleeper::default());

    let error = transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect_err("every attempt fails");

    match error {
        TransportError::Exhausted { attempts, source } => {
            assert_eq!(attempts, 6);
            assert_eq!(source, LastFailure::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(sender.calls(), 6);
    assert_eq!(sleeper.delays.lock().expect("delay log lock").len(), 5);
}

#[tokio::test]
async fn transient_send_failures_are_retried() {
    let sender = Arc::new(ScriptedSender::new(vec![
        Err(SendError::Transient {
            message: "connection reset".to_owned(),
        }),
        Ok(ApiResponse::new(StatusCode::OK, "ok")),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let response = transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect("second attempt should succeed");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(sender.calls(), 2);
}

#[tokio::test]
async fn transient_failure_exhaustion_wraps_send_error() {
    let failure = SendError::Transient {
        message: "timed out".to_owned(),
    };
    let sender = Arc::new(ScriptedSender::new(vec![
        Err(failure.clone()),
        Err(failure.clone()),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let error = transport(&sender, &sleeper)
        .with_max_retries(1)
        .send(&CancellationToken::new(), request())
        .await
        .expect_err("both attempts fail");

    assert!(
        matches!(
            error,
            TransportError::Exhausted { attempts: 2, source: LastFailure::Send(ref cause) } if *cause == failure
        ),
        "unexpected error: {error:?}"
    );
}

#[tokio::test]
async fn fatal_send_failures_are_not_retried() {
    let sender = Arc::new(ScriptedSender::new(vec![Err(SendError::Fatal {
        message: "invalid header".to_owned(),
    })]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let error = transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect_err("fatal failure surfaces");

    assert!(matches!(error, TransportError::Fatal(SendError::Fatal { .. })));
    assert_eq!(sender.calls(), 1);
}

#[tokio::test]
async fn reader_body_is_replayed_on_every_attempt() {
    let sender = Arc::new(ScriptedSender::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let body = RequestBody::Reader(Box::new(io::Cursor::new(b"{\"q\":1}".to_vec())));

    transport(&sender, &sleeper)
        .send(
            &CancellationToken::new(),
            request().with_body(body),
        )
        .await
        .expect("third attempt succeeds");

    let seen = sender.seen_bodies.lock().expect("body log lock");
    assert_eq!(seen.len(), 3);
    assert!(
        seen.iter().all(|b| b.as_deref() == Some(b"{\"q\":1}".as_slice())),
        "every attempt must carry the full body: {seen:?}"
    );
}

#[tokio::test]
async fn unreadable_body_fails_before_sending() {
    let sender = Arc::new(ScriptedSender::default());
    let sleeper = Arc::new(RecordingSleeper::default());

    let error = transport(&sender, &sleeper)
        .send(
            &CancellationToken::new(),
            request().with_body(RequestBody::Reader(Box::new(FailingReader))),
        )
        .await
        .expect_err("body cannot be buffered");

    assert!(matches!(error, TransportError::BodyNotReplayable { .. }));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn cancelled_token_prevents_any_attempt() {
    let sender = Arc::new(ScriptedSender::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let token = CancellationToken::new();
    token.cancel();

    let error = transport(&sender, &sleeper)
        .send(&token, request())
        .await
        .expect_err("cancelled");

    assert!(matches!(error, TransportError::Cancelled));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_backoff_sleep() {
    let sender = Arc::new(ScriptedSender::new(vec![status(
        StatusCode::SERVICE_UNAVAILABLE,
    )]));
    let token = CancellationToken::new();
    let sleeper = Arc::new(CancellingSleeper {
        token: token.clone(),
    });

    let error = RetryingTransport::new(Arc::clone(&sender))
        .with_jitter(Arc::new(NoJitter))
        .with_sleeper(sleeper)
        .send(&token, request())
        .await
        .expect_err("cancelled while waiting");

    assert!(matches!(error, TransportError::Cancelled));
    assert_eq!(sender.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_seconds_delays_next_attempt() {
    let sender = Arc::new(ScriptedSender::new(vec![
        with_retry_after(StatusCode::TOO_MANY_REQUESTS, "2"),
        Ok(ApiResponse::new(StatusCode::OK, "ok")),
    ]));
    let started = tokio::time::Instant::now();

    let response = RetryingTransport::new(Arc::clone(&sender))
        .with_jitter(Arc::new(SeededJitter::new(7)))
        .send(&CancellationToken::new(), request())
        .await
        .expect("second attempt succeeds");

    let waited = started.elapsed();
    assert_eq!(response.status, StatusCode::OK);
    assert!(waited >= Duration::from_secs(2), "waited only {waited:?}");
    assert!(waited < Duration::from_secs(3), "waited too long: {waited:?}");
}

#[tokio::test]
async fn retry_after_overrides_policy_on_server_errors() {
    let sender = Arc::new(ScriptedSender::new(vec![with_retry_after(
        StatusCode::SERVICE_UNAVAILABLE,
        "4",
    )]));
    let sleeper = Arc::new(RecordingSleeper::default());

    transport(&sender, &sleeper)
        .send(&CancellationToken::new(), request())
        .await
        .expect("second attempt succeeds");

    assert_eq!(
        *sleeper.delays.lock().expect("delay log lock"),
        vec![Duration::from_secs(4)]
    );
}
