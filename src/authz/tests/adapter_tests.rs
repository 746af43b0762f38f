//! Persistence through the memory and CSV file adapters

mod common;

use arbiter_authz::{
    error::AdapterError, Adapter, AuthzError, Enforcer, EnforcerConfig, FileAdapter, Filter,
    MemoryAdapter, MgmtApi, Model, RoleManager,
};
use async_trait::async_trait;
use common::{fixture, init_tracing, rule};
use tempfile::TempDir;

async fn rbac_model() -> Model {
    Model::from_file(fixture("rbac_model.conf")).await.unwrap()
}

/// Copy a fixture policy into a scratch directory
fn scratch_policy(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::copy(fixture(name), &path).unwrap();
    path
}

// ============================================================================
// FILE ADAPTER
// ============================================================================

#[tokio::test]
async fn test_file_round_trip() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = scratch_policy(&dir, "rbac_policy.csv");

    let mut e = Enforcer::new(rbac_model().await, FileAdapter::new(&path)).await.unwrap();
    // Incremental writes are not supported by the file adapter; memory still changes
    assert!(e.add_policy(rule(&["carol", "data3", "read"])).await.unwrap());
    assert!(e.remove_grouping_policy(rule(&["alice", "data2_admin"])).await.unwrap());
    e.save_policy().await.unwrap();

    let reloaded = Enforcer::new(rbac_model().await, FileAdapter::new(&path)).await.unwrap();
    assert!(reloaded.enforce(["carol", "data3", "read"]).unwrap());
    assert!(!reloaded.enforce(["alice", "data2", "read"]).unwrap());
    assert_eq!(reloaded.get_policy().await, e.get_policy().await);
    assert!(reloaded.get_grouping_policy().await.is_empty());
}

#[tokio::test]
async fn test_file_filtered_load() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = scratch_policy(&dir, "rbac_with_domains_policy.csv");
    let model = Model::from_file(fixture("rbac_with_domains_model.conf")).await.unwrap();

    let mut e = Enforcer::new(model, FileAdapter::new(&path)).await.unwrap();
    e.load_filtered_policy(Filter {
        p: vec!["".into(), "domain1".into()],
        g: vec!["".into(), "".into(), "domain1".into()],
    })
    .await
    .unwrap();

    assert!(e.is_filtered());
    assert_eq!(e.get_policy().await.len(), 2);
    assert!(e.enforce(["alice", "domain1", "data1", "read"]).unwrap());
    assert!(!e.enforce(["bob", "domain2", "data2", "read"]).unwrap());

    let err = e.save_policy().await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidOperation(_)));

    e.load_policy().await.unwrap();
    assert!(!e.is_filtered());
    assert!(e.enforce(["bob", "domain2", "data2", "read"]).unwrap());
}

#[tokio::test]
async fn test_missing_file_keeps_policy() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = scratch_policy(&dir, "rbac_policy.csv");
    let mut e = Enforcer::new(rbac_model().await, FileAdapter::new(&path)).await.unwrap();

    std::fs::remove_file(&path).unwrap();
    assert!(e.load_policy().await.is_err());
    assert!(e.enforce(["alice", "data2", "read"]).unwrap());
}

// ============================================================================
// MEMORY ADAPTER
// ============================================================================

#[tokio::test]
async fn test_auto_save_mirrors_mutations() {
    init_tracing();
    let adapter = MemoryAdapter::new();
    let mut e = Enforcer::new(rbac_model().await, adapter.clone()).await.unwrap();

    e.add_policy(rule(&["alice", "data1", "read"])).await.unwrap();
    e.add_grouping_policy(rule(&["alice", "admin"])).await.unwrap();
    e.update_policy(rule(&["alice", "data1", "read"]), rule(&["alice", "data1", "write"]))
        .await
        .unwrap();

    assert_eq!(
        adapter.lines().await,
        vec![rule(&["p", "alice", "data1", "write"]), rule(&["g", "alice", "admin"])]
    );

    e.enable_auto_save(false);
    e.add_policy(rule(&["bob", "data2", "read"])).await.unwrap();
    assert_eq!(adapter.lines().await.len(), 2);
    assert!(e.enforce(["bob", "data2", "read"]).unwrap());
}

#[tokio::test]
async fn test_clear_policy() {
    init_tracing();
    let adapter = MemoryAdapter::with_lines([vec!["p", "alice", "data1", "read"], vec!["g", "alice", "admin"]]);
    let mut e = Enforcer::new(rbac_model().await, adapter.clone()).await.unwrap();

    e.clear_policy().await.unwrap();
    assert!(e.get_policy().await.is_empty());
    assert!(e.get_role_manager("g").unwrap().get_roles("alice", None).is_empty());
    assert!(adapter.lines().await.is_empty());
}

// ============================================================================
// FAILING ADAPTER
// ============================================================================

/// Adapter whose incremental writes always fail
struct BrokenAdapter;

#[async_trait]
impl Adapter for BrokenAdapter {
    async fn load_policy(&mut self, _m: &mut Model) -> arbiter_authz::Result<()> {
        Ok(())
    }

    async fn save_policy(&mut self, _m: &Model) -> arbiter_authz::Result<()> {
        Ok(())
    }

    async fn add_policy(&mut self, _sec: &str, _ptype: &str, _rule: Vec<String>) -> arbiter_authz::Result<bool> {
        Err(AdapterError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")).into())
    }
}

#[tokio::test]
async fn test_adapter_failure_leaves_memory_unchanged() {
    init_tracing();
    let mut e = Enforcer::with_config(rbac_model().await, BrokenAdapter, EnforcerConfig::default())
        .await
        .unwrap();

    assert!(e.add_grouping_policy(rule(&["alice", "admin"])).await.is_err());
    assert!(!e.has_grouping_policy(rule(&["alice", "admin"])).await);
    assert!(e.get_role_manager("g").unwrap().get_roles("alice", None).is_empty());

    // Unsupported operations are tolerated
    assert!(e.remove_filtered_policy(0, vec!["nobody".into()]).await.is_ok());
}
