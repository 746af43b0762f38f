//! Role graph behavior through the role manager and the RBAC API

mod common;

use arbiter_authz::{
    error::RbacError, matcher::functions::key_match2, AuthzError, DefaultRoleManager, Enforcer,
    EnforcerConfig, MemoryAdapter, MgmtApi, Model, RbacApi, RoleManager,
};
use common::{fixture, init_tracing, rule};

async fn rbac_enforcer(config: EnforcerConfig) -> Enforcer {
    init_tracing();
    let model = Model::from_file(fixture("rbac_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "alice", "data1", "read"],
        vec!["p", "data2_admin", "data2", "read"],
        vec!["p", "data2_admin", "data2", "write"],
        vec!["g", "alice", "data2_admin"],
    ]);
    Enforcer::with_config(model, adapter, config).await.unwrap()
}

// ============================================================================
// CYCLE DETECTION
// ============================================================================

#[test]
fn test_three_node_cycle_rejected() {
    let mut rm = DefaultRoleManager::new(10).with_cycle_detection(true);
    rm.add_link("A", "B", None).unwrap();
    rm.add_link("B", "C", None).unwrap();

    let err = rm.add_link("C", "A", None).unwrap_err();
    assert!(matches!(err, RbacError::CycleDetected { .. }));

    assert!(!rm.has_link("C", "A", None));
    assert!(rm.has_link("A", "B", None));
    assert!(rm.has_link("B", "C", None));
    assert!(rm.has_link("A", "C", None));
}

#[tokio::test]
async fn test_cycle_rejected_through_enforcer() {
    let mut e = rbac_enforcer(EnforcerConfig {
        cycle_detection: true,
        ..Default::default()
    })
    .await;

    e.add_grouping_policy(rule(&["A", "B"])).await.unwrap();
    e.add_grouping_policy(rule(&["B", "C"])).await.unwrap();

    let err = e.add_grouping_policy(rule(&["C", "A"])).await.unwrap_err();
    match err {
        AuthzError::Rbac(RbacError::CycleDetected { path }) => {
            assert_eq!(path, "C -> A -> B -> C");
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(!e.has_grouping_policy(rule(&["C", "A"])).await);
    assert!(!e.has_role_for_user("C", "A", None).await.unwrap());
    assert!(e.has_role_for_user("A", "B", None).await.unwrap());
    assert!(e.has_role_for_user("B", "C", None).await.unwrap());
}

#[tokio::test]
async fn test_cyclic_batch_leaves_no_partial_links() {
    let mut e = rbac_enforcer(EnforcerConfig {
        cycle_detection: true,
        ..Default::default()
    })
    .await;

    let batch = vec![rule(&["x", "y"]), rule(&["y", "z"]), rule(&["z", "x"])];
    assert!(e.add_grouping_policies(batch).await.is_err());

    assert!(!e.has_grouping_policy(rule(&["x", "y"])).await);
    assert!(e.get_roles_for_user("x", None).await.unwrap().is_empty());
    assert!(e.get_roles_for_user("y", None).await.unwrap().is_empty());
}

// ============================================================================
// RBAC API
// ============================================================================

#[tokio::test]
async fn test_role_queries() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;

    assert_eq!(e.get_roles_for_user("alice", None).await.unwrap(), vec!["data2_admin"]);
    assert_eq!(e.get_users_for_role("data2_admin", None).await.unwrap(), vec!["alice"]);
    assert!(e.has_role_for_user("alice", "data2_admin", None).await.unwrap());

    assert!(e.add_role_for_user("alice", "auditor", None).await.unwrap());
    assert!(!e.add_role_for_user("alice", "auditor", None).await.unwrap());
    assert_eq!(
        e.get_roles_for_user("alice", None).await.unwrap(),
        vec!["data2_admin", "auditor"]
    );

    assert!(e.delete_role_for_user("alice", "auditor", None).await.unwrap());
    assert!(e.delete_roles_for_user("alice", None).await.unwrap());
    assert!(e.get_roles_for_user("alice", None).await.unwrap().is_empty());
    assert!(!e.enforce(["alice", "data2", "read"]).unwrap());
}

#[tokio::test]
async fn test_delete_user_and_role() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;

    assert!(e.delete_role("data2_admin").await.unwrap());
    assert!(e.get_policy().await.iter().all(|r| r[0] != "data2_admin"));
    assert!(!e.enforce(["alice", "data2", "read"]).unwrap());

    assert!(e.delete_user("alice").await.unwrap());
    assert!(e.get_policy().await.is_empty());
    assert!(!e.delete_user("alice").await.unwrap());
}

#[tokio::test]
async fn test_permissions() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;

    assert!(e.add_permission_for_user("bob", rule(&["data3", "read"])).await.unwrap());
    assert!(e.has_permission_for_user("bob", rule(&["data3", "read"])).await);
    assert_eq!(
        e.get_permissions_for_user("bob", None).await,
        vec![rule(&["bob", "data3", "read"])]
    );
    assert!(e.enforce(["bob", "data3", "read"]).unwrap());

    assert!(e.delete_permission_for_user("bob", rule(&["data3", "read"])).await.unwrap());
    assert!(!e.enforce(["bob", "data3", "read"]).unwrap());
}

#[tokio::test]
async fn test_implicit_roles_and_permissions() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;
    e.add_role_for_user("data2_admin", "super_admin", None).await.unwrap();
    e.add_permission_for_user("super_admin", rule(&["audit_log", "read"])).await.unwrap();

    assert_eq!(
        e.get_implicit_roles_for_user("alice", None).await.unwrap(),
        vec!["data2_admin", "super_admin"]
    );

    let perms = e.get_implicit_permissions_for_user("alice", None).await.unwrap();
    assert_eq!(
        perms,
        vec![
            rule(&["alice", "data1", "read"]),
            rule(&["data2_admin", "data2", "read"]),
            rule(&["data2_admin", "data2", "write"]),
            rule(&["super_admin", "audit_log", "read"]),
        ]
    );
    assert!(e.enforce(["alice", "audit_log", "read"]).unwrap());
}

#[tokio::test]
async fn test_roles_in_domain() {
    let e = Enforcer::from_files(
        fixture("rbac_with_domains_model.conf"),
        fixture("rbac_with_domains_policy.csv"),
    )
    .await
    .unwrap();

    assert_eq!(
        e.get_roles_for_user_in_domain("alice", "domain1").await.unwrap(),
        vec!["admin"]
    );
    assert!(e.get_roles_for_user_in_domain("alice", "domain2").await.unwrap().is_empty());
    assert_eq!(
        e.get_permissions_for_user("admin", Some("domain2")).await,
        vec![
            rule(&["admin", "domain2", "data2", "read"]),
            rule(&["admin", "domain2", "data2", "write"]),
        ]
    );
}

// ============================================================================
// PATTERN MATCHING
// ============================================================================

#[tokio::test]
async fn test_named_matching_fn() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;
    e.add_grouping_policy(rule(&["/book/:id", "book_reader"])).await.unwrap();
    e.add_policy(rule(&["book_reader", "library", "read"])).await.unwrap();

    assert!(!e.enforce(["/book/1", "library", "read"]).unwrap());

    e.add_named_matching_fn("g", key_match2).unwrap();
    assert!(e.enforce(["/book/1", "library", "read"]).unwrap());
    assert!(!e.enforce(["/shelf/1", "library", "read"]).unwrap());
}

#[tokio::test]
async fn test_hierarchy_level_bound() {
    let mut e = rbac_enforcer(EnforcerConfig {
        max_hierarchy_level: 2,
        ..Default::default()
    })
    .await;
    e.add_grouping_policy(rule(&["u", "r1"])).await.unwrap();
    e.add_grouping_policy(rule(&["r1", "r2"])).await.unwrap();
    e.add_grouping_policy(rule(&["r2", "r3"])).await.unwrap();

    assert!(e.has_role_for_user("u", "r1", None).await.unwrap());
    let rm = e.get_role_manager("g").unwrap();
    assert!(rm.has_link("u", "r2", None));
    assert!(!rm.has_link("u", "r3", None));
}

#[tokio::test]
async fn test_custom_role_manager() {
    let mut e = rbac_enforcer(EnforcerConfig::default()).await;
    e.set_role_manager("g", Box::new(DefaultRoleManager::new(1))).unwrap();

    // Links are rebuilt from the stored rows
    assert!(e.enforce(["alice", "data2", "read"]).unwrap());
}
