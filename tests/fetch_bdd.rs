//! Behavioural tests for fetching pull requests and pages end to end.

mod support;

use std::io;

use atlas::{AtlasConfig, cli};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use serde_json::{Value, json};
use support::runtime::{self, SharedRuntime, ensure_runtime_and_server, server_uri};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(ScenarioState, Default)]
struct FetchState {
    runtime: Slot<SharedRuntime>,
    server: Slot<MockServer>,
    output: Slot<String>,
    exit_code: Slot<u8>,
}

#[fixture]
fn fetch_state() -> FetchState {
    FetchState::default()
}

fn mount(state: &FetchState, mock: Mock) -> Result<(), io::Error> {
    runtime::mount(&state.runtime, &state.server, mock)
}

fn pull_request_path(pr: u64) -> String {
    format!("/repositories/acme/widgets/pullrequests/{pr}")
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[given(
    "a mock Bitbucket server with pull request {pr:u64} titled {title} and \
     {count:u64} comments"
)]
fn seed_pull_request(
    fetch_state: &FetchState,
    pr: u64,
    title: String,
    count: u64,
) -> Result<(), io::Error> {
    let comments: Vec<Value> = (0..count)
        .map(|index| {
            json!({
                "id": index + 1,
                "content": { "raw": format!("comment {index}") },
                "user": { "uuid": "{reviewer}", "nickname": "reviewer" },
                "created_on": "2024-01-02T15:00:00+00:00"
            })
        })
        .collect();
    let pr_body = json!({
        "id": pr,
        "title": title.trim_matches('"'),
        "state": "OPEN",
        "author": { "uuid": "{octocat}", "nickname": "octocat" },
        "source": { "branch": { "name": "feature" } },
        "destination": { "branch": { "name": "main" } }
    });
    let base = pull_request_path(pr);

    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(base.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(&pr_body)),
    )?;
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(format!("{base}/comments")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "values": comments })),
            ),
    )?;
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(format!("{base}/tasks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    { "id": 1, "content": { "raw": "Add a changelog entry" }, "state": "UNRESOLVED" }
                ]
            }))),
    )?;
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(format!("{base}/diff")))
            .respond_with(ResponseTemplate::new(200).set_body_string("")),
    )
}

#[given("a mock Bitbucket server that rejects credentials for pull request {pr:u64}")]
fn seed_rejecting_server(fetch_state: &FetchState, pr: u64) -> Result<(), io::Error> {
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(pull_request_path(pr)))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": { "message": "Bad credentials" }
            }))),
    )
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[given("a mock Confluence server with page {id} titled {title}")]
fn seed_page(fetch_state: &FetchState, id: String, title: String) -> Result<(), io::Error> {
    let page_id = id.trim_matches('"');
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(format!("/wiki/rest/api/content/{page_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": page_id,
                "title": title.trim_matches('"'),
                "body": { "storage": { "value": "<p>Restart the service.</p>" } },
                "space": { "key": "OPS", "name": "Operations" }
            }))),
    )
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[given("a mock Bitbucket workspace {workspace} with repository {slug}")]
fn seed_workspace(
    fetch_state: &FetchState,
    workspace: String,
    slug: String,
) -> Result<(), io::Error> {
    let workspace_slug = workspace.trim_matches('"');
    let repository_slug = slug.trim_matches('"');
    mount(
        fetch_state,
        Mock::given(method("GET"))
            .and(path(format!("/repositories/{workspace_slug}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [{
                    "slug": repository_slug,
                    "name": repository_slug,
                    "full_name": format!("{workspace_slug}/{repository_slug}")
                }]
            }))),
    )
}

fn run_atlas(fetch_state: &FetchState, config: AtlasConfig) -> Result<(), io::Error> {
    let shared = ensure_runtime_and_server(&fetch_state.runtime, &fetch_state.server)?;
    let server_url = server_uri(&fetch_state.server)?;
    let resolved = AtlasConfig {
        username: Some("test@example.com".to_owned()),
        app_password: Some("test-token".to_owned()),
        bitbucket_base_url: Some(server_url.clone()),
        confluence_site: Some(server_url),
        no_cache: true,
        ..config
    };

    let mut out = Vec::new();
    let result = shared.block_on(cli::run(&resolved, &CancellationToken::new(), &mut out));

    fetch_state
        .output
        .set(String::from_utf8_lossy(&out).into_owned());
    match result {
        Ok(()) => drop(fetch_state.exit_code.take()),
        Err(error) => fetch_state.exit_code.set(error.exit_code()),
    }
    Ok(())
}

fn input_config(input: &str) -> AtlasConfig {
    AtlasConfig {
        url: Some(input.trim_matches('"').to_owned()),
        ..AtlasConfig::default()
    }
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[when("atlas runs with input {input}")]
fn run_with_input(fetch_state: &FetchState, input: String) -> Result<(), io::Error> {
    run_atlas(fetch_state, input_config(&input))
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[when("atlas runs with comments for input {input}")]
fn run_with_comments(fetch_state: &FetchState, input: String) -> Result<(), io::Error> {
    run_atlas(
        fetch_state,
        AtlasConfig {
            comments: true,
            ..input_config(&input)
        },
    )
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[when("atlas runs with JSON output for input {input}")]
fn run_with_json(fetch_state: &FetchState, input: String) -> Result<(), io::Error> {
    run_atlas(
        fetch_state,
        AtlasConfig {
            format: "json".to_owned(),
            ..input_config(&input)
        },
    )
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[when("atlas lists repositories in workspace {workspace}")]
fn run_repository_search(fetch_state: &FetchState, workspace: String) -> Result<(), io::Error> {
    run_atlas(
        fetch_state,
        AtlasConfig {
            bitbucket_search: Some("repos".to_owned()),
            workspace: Some(workspace.trim_matches('"').to_owned()),
            ..AtlasConfig::default()
        },
    )
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[then("the output contains {expected}")]
fn assert_output_contains(fetch_state: &FetchState, expected: String) -> Result<(), io::Error> {
    let needle = expected.trim_matches('"');
    let output = fetch_state
        .output
        .get()
        .ok_or_else(|| io::Error::other("atlas did not run"))?;
    if fetch_state.exit_code.with_ref(|_| ()).is_some() {
        return Err(io::Error::other(format!("run failed; output:\n{output}")));
    }
    if output.contains(needle) {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "expected {needle:?} in output:\n{output}"
        )))
    }
}

#[then("the run fails with exit code {code:u64}")]
fn assert_exit_code(fetch_state: &FetchState, code: u64) -> Result<(), io::Error> {
    let actual = fetch_state
        .exit_code
        .get()
        .ok_or_else(|| io::Error::other("expected the run to fail"))?;
    if u64::from(actual) == code {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "expected exit code {code} but got {actual}"
        )))
    }
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd passes owned step arguments"
)]
#[then("the JSON document has {field} {expected}")]
fn assert_json_field(
    fetch_state: &FetchState,
    field: String,
    expected: String,
) -> Result<(), io::Error> {
    let output = fetch_state
        .output
        .get()
        .ok_or_else(|| io::Error::other("atlas did not run"))?;
    let document: Value = serde_json::from_str(&output).map_err(io::Error::other)?;
    let actual = document.get(field.as_str()).and_then(Value::as_str);
    if actual == Some(expected.trim_matches('"')) {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "expected {field} = {expected} but got {actual:?}"
        )))
    }
}

// --- Scenario bindings ---

#[scenario(path = "tests/features/fetch.feature", index = 0)]
fn pull_request_with_comments_renders_markdown(fetch_state: FetchState) {
    let _ = fetch_state;
}

#[scenario(path = "tests/features/fetch.feature", index = 1)]
fn rejected_credentials_exit_with_auth_code(fetch_state: FetchState) {
    let _ = fetch_state;
}

#[scenario(path = "tests/features/fetch.feature", index = 2)]
fn unknown_inputs_are_rejected(fetch_state: FetchState) {
    let _ = fetch_state;
}

#[scenario(path = "tests/features/fetch.feature", index = 3)]
fn confluence_page_renders_as_json(fetch_state: FetchState) {
    let _ = fetch_state;
}

#[scenario(path = "tests/features/fetch.feature", index = 4)]
fn repository_search_lists_workspace_repositories(fetch_state: FetchState) {
    let _ = fetch_state;
}
