#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! These read `Cargo.toml` and fail when the lint policy, the feature layout
//! or the demo wiring drifts from what the crate relies on.

use std::path::PathBuf;

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&text).unwrap_or_else(|e| panic!("Cargo.toml does not parse: {e}"))
}

fn table<'a>(parent: &'a toml::Table, key: &str) -> &'a toml::Table {
    parent
        .get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing [{key}]"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: lint_policy
// ─────────────────────────────────────────────────────────────────────────────

mod lint_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn panic_prone_lints_are_denied() {
        let manifest = manifest();
        let clippy = table(table(&manifest, "lints"), "clippy");
        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "[lints.clippy] must set `{lint} = \"deny\"` to keep library code panic-free"
            );
        }
    }

    #[test]
    fn rust_version_is_declared() {
        let manifest = manifest();
        let package = table(&manifest, "package");
        let version = package
            .get("rust-version")
            .and_then(toml::Value::as_str)
            .expect("Cargo.toml must declare a rust-version");
        assert!(
            version.split('.').count() == 3,
            "rust-version '{version}' should be a full MAJOR.MINOR.PATCH version"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    fn feature_list(features: &toml::Table, name: &str) -> Vec<String> {
        features
            .get(name)
            .and_then(toml::Value::as_array)
            .unwrap_or_else(|| panic!("feature '{name}' is missing"))
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn default_features_enable_websocket_and_login() {
        let manifest = manifest();
        let features = table(&manifest, "features");
        let default = feature_list(features, "default");
        assert!(default.contains(&"transport-websocket".to_string()));
        assert!(default.contains(&"http-login".to_string()));
    }

    #[test]
    fn optional_dependencies_sit_behind_features() {
        let manifest = manifest();
        let features = table(&manifest, "features");
        let deps = table(&manifest, "dependencies");

        for (feature, dep) in [
            ("transport-websocket", "tokio-tungstenite"),
            ("transport-websocket", "futures-util"),
            ("http-login", "reqwest"),
        ] {
            let optional = deps
                .get(dep)
                .and_then(toml::Value::as_table)
                .and_then(|d| d.get("optional"))
                .and_then(toml::Value::as_bool);
            assert_eq!(optional, Some(true), "`{dep}` must be optional");
            assert!(
                feature_list(features, feature).contains(&format!("dep:{dep}")),
                "feature '{feature}' must enable `dep:{dep}`"
            );
        }
    }

    #[test]
    fn reqwest_uses_rustls() {
        let manifest = manifest();
        let reqwest = table(table(&manifest, "dependencies"), "reqwest");
        assert_eq!(
            reqwest.get("default-features").and_then(toml::Value::as_bool),
            Some(false)
        );
        let features: Vec<&str> = reqwest
            .get("features")
            .and_then(toml::Value::as_array)
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(features.contains(&"rustls-tls"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: demo_policy
// ─────────────────────────────────────────────────────────────────────────────

mod demo_policy {
    use super::*;

    #[test]
    fn every_declared_demo_exists() {
        let manifest = manifest();
        let examples = manifest
            .get("example")
            .and_then(toml::Value::as_array)
            .expect("Cargo.toml declares no [[example]] targets");
        assert!(!examples.is_empty());
        for example in examples {
            let path = example
                .get("path")
                .and_then(toml::Value::as_str)
                .expect("[[example]] without a path");
            assert!(
                path.starts_with("demos/"),
                "demo '{path}' must live under demos/"
            );
            assert!(
                project_root().join(path).is_file(),
                "demo '{path}' is declared but missing"
            );
        }
    }
}
