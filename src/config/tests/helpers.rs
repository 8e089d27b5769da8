//! Shared test helpers for configuration tests.

use std::ffi::OsString;

use ortho_config::{MergeComposer, OrthoConfig};
use serde_json::Value;
use tempfile::TempDir;

use crate::AtlasConfig;

/// Applies a configuration layer to the composer based on the layer type.
pub fn apply_layer(composer: &mut MergeComposer, layer_type: &str, value: Value) {
    match layer_type {
        "defaults" => composer.push_defaults(value),
        "file" => composer.push_file(value, None),
        "environment" => composer.push_environment(value),
        "cli" => composer.push_cli(value),
        _ => panic!("unknown layer type: {layer_type}"),
    }
}

/// Helper to compose an [`AtlasConfig`] from a sequence of `(layer_type, value)` pairs.
pub fn build_config_from_layers(layers: &[(&str, Value)]) -> AtlasConfig {
    let mut composer = MergeComposer::new();

    for (layer_type, value) in layers {
        apply_layer(&mut composer, layer_type, value.clone());
    }

    AtlasConfig::merge_from_layers(composer.layers()).expect("merge should succeed")
}

/// Loads configuration from `cli_args` with the given `ATLAS_*` variables
/// set, every other variable used by these tests cleared, and no config files
/// visible.
pub fn load_with_env(env: &[(&str, &str)], cli_args: &[&str]) -> AtlasConfig {
    let temp_dir = TempDir::new().expect("temp dir should be created");
    let home = temp_dir.path().to_string_lossy().to_string();
    let lookup = |name: &str| {
        env.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    };

    let _guard = env_lock::lock_env([
        ("HOME", Some(home.as_str())),
        ("XDG_CONFIG_HOME", Some(home.as_str())),
        ("ATLAS_USERNAME", lookup("ATLAS_USERNAME")),
        ("ATLAS_CACHE_TTL_SECONDS", lookup("ATLAS_CACHE_TTL_SECONDS")),
        ("ATLAS_CONFLUENCE_SITE", lookup("ATLAS_CONFLUENCE_SITE")),
        ("ATLAS_PAGE_SIZE", lookup("ATLAS_PAGE_SIZE")),
        ("ATLAS_WORKSPACE", lookup("ATLAS_WORKSPACE")),
    ]);

    let mut args: Vec<OsString> = vec![OsString::from("atlas")];
    args.extend(cli_args.iter().map(OsString::from));

    AtlasConfig::load_from_iter(args).expect("config should load")
}
