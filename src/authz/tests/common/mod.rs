//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a fmt subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Absolute path of a file under `fixtures/`
pub fn fixture(name: &str) -> String {
    format!("{}/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn rule(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}
