//! Tests for the cached, authenticated fetcher.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde::Deserialize;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use super::{Accept, Fetcher, USER_AGENT_VALUE};
use crate::cache::ResponseCache;
use crate::error::AtlasError;
use crate::test_support::{
    BlocksOnRuntime, ServerHarness, TEST_AUTH_HEADER, TEST_MAX_RETRIES, fetcher,
};

struct FetchFixture {
    harness: ServerHarness,
    _temp: TempDir,
    fetcher: Fetcher,
}

impl FetchFixture {
    fn url(&self, route: &str) -> Url {
        Url::parse(&format!("{}{route}", self.harness.server.uri())).expect("valid mock URL")
    }
}

#[fixture]
fn fixture() -> FetchFixture {
    let harness = ServerHarness::start();
    let temp = TempDir::new().expect("temp dir should be created");
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("UTF-8 temp path");
    let fetcher = {
        let _guard = harness.runtime.enter();
        fetcher(ResponseCache::new(dir, Duration::from_secs(300)))
    };
    FetchFixture {
        harness,
        _temp: temp,
        fetcher,
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct Payload {
    name: String,
}

#[rstest]
fn sends_auth_and_identification_headers(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(header("authorization", TEST_AUTH_HEADER))
            .and(header("user-agent", USER_AGENT_VALUE))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "widget"
            })))
            .expect(1)
            .mount(&harness.server),
    );

    let payload: Payload = harness
        .block_on(fixture.fetcher.get_json(
            &CancellationToken::new(),
            "item",
            &fixture.url("/item"),
        ))
        .expect("request should succeed");

    assert_eq!(
        payload,
        Payload {
            name: "widget".to_owned()
        }
    );
}

#[rstest]
fn text_requests_ask_for_plain_text(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/diff"))
            .and(header("accept", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("diff --git a/x b/x\n"))
            .expect(1)
            .mount(&harness.server),
    );

    let text = harness
        .block_on(
            fixture
                .fetcher
                .get_text(&CancellationToken::new(), "diff", &fixture.url("/diff")),
        )
        .expect("request should succeed");

    assert_eq!(text, "diff --git a/x b/x\n");
}

#[rstest]
fn successful_bodies_are_served_from_cache(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/cached"))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .expect(1)
            .mount(&harness.server),
    );
    let cancel = CancellationToken::new();
    let url = fixture.url("/cached");

    let first = harness
        .block_on(fixture.fetcher.get_bytes(&cancel, "cached", &url, Accept::Json))
        .expect("first request should succeed");
    let second = harness
        .block_on(fixture.fetcher.get_bytes(&cancel, "cached", &url, Accept::Json))
        .expect("second request should be a cache hit");

    assert_eq!(first, b"payload".to_vec());
    assert_eq!(second, first);
}

#[rstest]
fn error_responses_are_not_cached(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&harness.server),
    );
    let cancel = CancellationToken::new();
    let url = fixture.url("/missing");

    for _ in 0..2 {
        let result =
            harness.block_on(fixture.fetcher.get_bytes(&cancel, "page 9", &url, Accept::Json));
        assert!(
            matches!(&result, Err(AtlasError::NotFound { resource }) if resource == "page 9"),
            "unexpected result: {result:?}"
        );
    }
}

#[rstest]
fn authentication_failures_carry_api_message(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "message": "Invalid credentials" }
            })))
            .mount(&harness.server),
    );

    let result = harness.block_on(fixture.fetcher.get_bytes(
        &CancellationToken::new(),
        "secret",
        &fixture.url("/secret"),
        Accept::Json,
    ));

    let error = result.expect_err("401 should fail");
    assert!(
        matches!(&error, AtlasError::Authentication { message, .. } if message == "Invalid credentials"),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn persistent_throttling_is_rate_limited(fixture: FetchFixture) {
    let harness = &fixture.harness;
    let attempts = TEST_MAX_RETRIES + 1;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .expect(u64::from(attempts))
            .mount(&harness.server),
    );

    let result = harness.block_on(fixture.fetcher.get_bytes(
        &CancellationToken::new(),
        "busy",
        &fixture.url("/busy"),
        Accept::Json,
    ));

    assert!(
        matches!(&result, Err(AtlasError::RateLimited { attempts: made, .. }) if *made == attempts),
        "unexpected result: {result:?}"
    );
}

#[rstest]
fn transient_server_errors_recover(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(async {
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&harness.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&harness.server)
            .await;
    });

    let body = harness
        .block_on(fixture.fetcher.get_bytes(
            &CancellationToken::new(),
            "flaky",
            &fixture.url("/flaky"),
            Accept::Json,
        ))
        .expect("second attempt should succeed");

    assert_eq!(body, b"ok".to_vec());
}

#[rstest]
fn undecodable_json_is_a_decode_error(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .and(path("/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&harness.server),
    );

    let result: Result<Payload, AtlasError> = harness.block_on(fixture.fetcher.get_json(
        &CancellationToken::new(),
        "garbled",
        &fixture.url("/garbled"),
    ));

    assert!(matches!(result, Err(AtlasError::Decode { .. })));
}

#[rstest]
fn cancelled_token_sends_nothing(fixture: FetchFixture) {
    let harness = &fixture.harness;
    harness.block_on(
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&harness.server),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness.block_on(fixture.fetcher.get_bytes(
        &cancel,
        "anything",
        &fixture.url("/anything"),
        Accept::Json,
    ));

    assert!(matches!(result, Err(AtlasError::Cancelled)));
}
