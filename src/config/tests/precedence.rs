//! Tests for configuration layer precedence.

use rstest::rstest;
use serde_json::{Value, json};

use super::helpers::build_config_from_layers;
use crate::AtlasConfig;

#[rstest]
#[case::file_overrides_defaults(
    vec![("defaults", json!({"url": "default-ref"})), ("file", json!({"url": "file-ref"}))],
    "file-ref",
    "file should override default"
)]
#[case::environment_overrides_file(
    vec![("file", json!({"url": "file-ref"})), ("environment", json!({"url": "env-ref"}))],
    "env-ref",
    "environment should override file"
)]
#[case::cli_overrides_environment(
    vec![("environment", json!({"url": "env-ref"})), ("cli", json!({"url": "cli-ref"}))],
    "cli-ref",
    "CLI should override environment"
)]
fn url_follows_layer_precedence(
    #[case] layers: Vec<(&str, Value)>,
    #[case] expected: &str,
    #[case] message: &str,
) {
    let config = build_config_from_layers(&layers);

    assert_eq!(config.url.as_deref(), Some(expected), "{message}");
}

#[rstest]
fn defaults_apply_when_no_sources_provided() {
    let config = build_config_from_layers(&[("defaults", json!({"url": null}))]);

    assert!(config.url.is_none(), "url should be None");
    assert!(config.username.is_none(), "username should be None");
    assert_eq!(config.concurrency, 5);
    assert_eq!(config.page_size, 50);
    assert_eq!(config.cache_ttl_seconds, 300);
    assert_eq!(config.limit, 25);
    assert_eq!(config.format, "markdown");
    assert!(!config.no_cache && !config.comments && !config.diff && !config.cql);
}

#[rstest]
fn full_precedence_chain() {
    let config = build_config_from_layers(&[
        (
            "defaults",
            json!({"username": "default-user", "app_password": "default-secret", "concurrency": 1}),
        ),
        (
            "file",
            json!({"username": "file-user", "app_password": "file-secret", "concurrency": 2}),
        ),
        ("environment", json!({"username": "env-user", "concurrency": 3})),
        ("cli", json!({"concurrency": 4})),
    ]);

    assert_eq!(config.username.as_deref(), Some("env-user"), "environment wins for username");
    assert_eq!(
        config.app_password.as_deref(),
        Some("file-secret"),
        "file wins for app_password (no env/cli override)"
    );
    assert_eq!(config.concurrency, 4, "CLI wins for concurrency");
}

#[rstest]
#[case::file_sets_flag(vec![("file", json!({"comments": true}))], true)]
#[case::cli_overrides_file(
    vec![("file", json!({"comments": false})), ("cli", json!({"comments": true}))],
    true
)]
fn boolean_flags_follow_precedence(#[case] layers: Vec<(&str, Value)>, #[case] expected: bool) {
    let config = build_config_from_layers(&layers);

    assert_eq!(config.comments, expected);
}

#[rstest]
fn partial_overrides_preserve_lower_values() {
    let config = build_config_from_layers(&[
        ("file", json!({"confluence_site": "https://file.example", "page_size": 20})),
        ("cli", json!({"page_size": 80})),
    ]);

    assert_eq!(config.confluence_site.as_deref(), Some("https://file.example"));
    assert_eq!(config.page_size, 80);
    assert_eq!(config.concurrency, AtlasConfig::default().concurrency);
}
