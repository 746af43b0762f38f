//! End-to-end enforcement over the fixture models

mod common;

use arbiter_authz::{
    error::ModelError, request, Authorizer, AuthzError, EnforceContext, Enforcer, MemoryAdapter,
    MgmtApi, Model, Value,
};
use common::{fixture, init_tracing, rule};
use serde_json::json;

async fn from_fixtures(model: &str, policy: &str) -> Enforcer {
    init_tracing();
    Enforcer::from_files(fixture(model), fixture(policy)).await.unwrap()
}

// ============================================================================
// BASIC RBAC
// ============================================================================

#[tokio::test]
async fn test_rbac_scenario() {
    init_tracing();
    let model = Model::from_file(fixture("rbac_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "alice", "data1", "read"],
        vec!["p", "data2_admin", "data2", "read"],
        vec!["p", "data2_admin", "data2", "write"],
        vec!["g", "alice", "data2_admin"],
    ]);
    let mut e = Enforcer::new(model, adapter).await.unwrap();

    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    assert!(!e.enforce(["alice", "data1", "write"]).unwrap());
    assert!(e.enforce(["alice", "data2", "read"]).unwrap(), "granted through the role link");
    assert!(!e.enforce(["bob", "data2", "write"]).unwrap(), "bob holds no role");

    assert!(e.remove_grouping_policy(rule(&["alice", "data2_admin"])).await.unwrap());
    assert!(!e.enforce(["alice", "data2", "read"]).unwrap());
    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
}

#[tokio::test]
async fn test_rbac_from_files() {
    let e = from_fixtures("rbac_model.conf", "rbac_policy.csv").await;

    assert!(e.enforce(["alice", "data2", "write"]).unwrap());
    assert!(e.enforce(["bob", "data2", "write"]).unwrap());
    assert!(!e.enforce(["bob", "data1", "read"]).unwrap());

    let decision = e.enforce_ex(["alice", "data2", "write"]).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.explain, vec![rule(&["data2_admin", "data2", "write"])]);
}

#[tokio::test]
async fn test_enforce_never_mutates_store() {
    let e = from_fixtures("rbac_model.conf", "rbac_policy.csv").await;
    let before = e.get_policy().await;

    for sub in ["alice", "bob", "carol"] {
        let _ = e.enforce([sub, "data2", "read"]).unwrap();
    }
    assert_eq!(e.get_policy().await, before);
}

#[tokio::test]
async fn test_request_arity_error() {
    let e = from_fixtures("rbac_model.conf", "rbac_policy.csv").await;
    let err = e.enforce(["alice", "data1"]).unwrap_err();
    assert!(matches!(
        err,
        AuthzError::Model(ModelError::RequestArity { expected: 3, got: 2 })
    ));
}

// ============================================================================
// DOMAINS
// ============================================================================

#[tokio::test]
async fn test_rbac_with_domains() {
    let e = from_fixtures("rbac_with_domains_model.conf", "rbac_with_domains_policy.csv").await;

    assert!(e.enforce(["alice", "domain1", "data1", "read"]).unwrap());
    assert!(e.enforce(["alice", "domain1", "data1", "write"]).unwrap());
    assert!(!e.enforce(["alice", "domain2", "data2", "read"]).unwrap());
    assert!(e.enforce(["bob", "domain2", "data2", "write"]).unwrap());
    assert!(!e.enforce(["bob", "domain1", "data1", "read"]).unwrap());
}

// ============================================================================
// PATTERN MATCHING
// ============================================================================

#[tokio::test]
async fn test_key_match_model() {
    let e = from_fixtures("keymatch_model.conf", "keymatch_policy.csv").await;

    assert!(e.enforce(["alice", "/alice_data/resource1", "GET"]).unwrap());
    assert!(e.enforce(["alice", "/alice_data/resource1", "POST"]).unwrap());
    assert!(!e.enforce(["alice", "/alice_data/resource2", "POST"]).unwrap());
    assert!(e.enforce(["bob", "/bob_data/anything", "POST"]).unwrap());
    assert!(!e.enforce(["bob", "/bob_data/anything", "GET"]).unwrap());
    assert!(e.enforce(["cathy", "/cathy_data", "GET"]).unwrap());
    assert!(e.enforce(["cathy", "/cathy_data", "POST"]).unwrap());
    assert!(!e.enforce(["cathy", "/cathy_data", "DELETE"]).unwrap());
}

#[tokio::test]
async fn test_custom_function() {
    let mut e = from_fixtures("keymatch_model.conf", "keymatch_policy.csv").await;

    let model = Model::from_str(
        &std::fs::read_to_string(fixture("keymatch_model.conf"))
            .unwrap()
            .replace("keyMatch(r.obj, p.obj)", "prefixMatch(r.obj, p.obj)"),
    )
    .unwrap();
    e.add_function(
        "prefixMatch",
        arbiter_authz::matcher::functions::string_predicate("prefixMatch", |a, b| {
            a.starts_with(b.trim_end_matches('*'))
        }),
    );
    e.set_model(model).await.unwrap();

    assert!(e.enforce(["alice", "/alice_data/x/y", "GET"]).unwrap());
    assert!(!e.enforce(["alice", "/bob_data/x", "GET"]).unwrap());
}

// ============================================================================
// EFFECTS
// ============================================================================

#[tokio::test]
async fn test_priority_model() {
    let e = from_fixtures("priority_model.conf", "priority_policy.csv").await;

    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    assert!(e.enforce(["alice", "data1", "write"]).unwrap());
    assert!(!e.enforce(["bob", "data2", "read"]).unwrap());
    assert!(e.enforce(["bob", "data2", "write"]).unwrap());

    let decision = e.enforce_ex(["bob", "data2", "read"]).unwrap();
    assert_eq!(decision.explain, vec![rule(&["1", "bob", "data2", "read", "deny"])]);
}

#[tokio::test]
async fn test_priority_kept_for_added_rows() {
    init_tracing();
    let model = Model::from_file(fixture("priority_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([vec!["p", "10", "alice", "data1", "read", "allow"]]);
    let mut e = Enforcer::new(model, adapter).await.unwrap();
    assert!(e.enforce(["alice", "data1", "read"]).unwrap());

    assert!(e
        .add_policy(rule(&["1", "alice", "data1", "read", "deny"]))
        .await
        .unwrap());
    let decision = e.enforce_ex(["alice", "data1", "read"]).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.explain, vec![rule(&["1", "alice", "data1", "read", "deny"])]);

    // Demote the deny below the allow
    assert!(e
        .update_policy(
            rule(&["1", "alice", "data1", "read", "deny"]),
            rule(&["20", "alice", "data1", "read", "deny"]),
        )
        .await
        .unwrap());
    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    assert_eq!(
        e.get_policy().await,
        vec![
            rule(&["10", "alice", "data1", "read", "allow"]),
            rule(&["20", "alice", "data1", "read", "deny"]),
        ]
    );
}

#[tokio::test]
async fn test_subject_priority_follows_mutations() {
    init_tracing();
    let model = Model::from_str(
        r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act, eft

[role_definition]
g = _, _

[policy_effect]
e = subjectPriority(p.eft) || deny

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#,
    )
    .unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "role_root", "data", "read", "allow"],
        vec!["g", "alice", "role_root"],
    ]);
    let mut e = Enforcer::new(model, adapter).await.unwrap();
    assert!(e.enforce(["alice", "data", "read"]).unwrap());

    assert!(e.add_policy(rule(&["alice", "data", "read", "deny"])).await.unwrap());
    assert!(!e.enforce(["alice", "data", "read"]).unwrap(), "the member's own row ranks first");
    assert_eq!(e.get_policy().await[0], rule(&["alice", "data", "read", "deny"]));

    // bob joins below alice; his allow outranks alice's deny for bob only
    assert!(e.add_grouping_policy(rule(&["bob", "alice"])).await.unwrap());
    assert!(e.add_policy(rule(&["bob", "data", "read", "allow"])).await.unwrap());
    assert_eq!(e.get_policy().await[0], rule(&["bob", "data", "read", "allow"]));
    assert!(e.enforce(["bob", "data", "read"]).unwrap());
    assert!(!e.enforce(["alice", "data", "read"]).unwrap());
}

#[tokio::test]
async fn test_update_onto_existing_row_is_rejected() {
    init_tracing();
    let model = Model::from_file(fixture("rbac_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "alice", "data1", "read"],
        vec!["p", "bob", "data2", "write"],
        vec!["g", "alice", "admin"],
        vec!["g", "bob", "admin"],
    ]);
    let mut e = Enforcer::new(model, adapter).await.unwrap();

    assert!(!e
        .update_policy(rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"]))
        .await
        .unwrap());
    assert!(!e
        .update_rule("g", "g", rule(&["alice", "admin"]), rule(&["bob", "admin"]))
        .await
        .unwrap());

    let policy = vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"])];
    assert_eq!(e.get_policy().await, policy);
    assert!(e.has_grouping_policy(rule(&["alice", "admin"])).await);

    // The stored copy is untouched as well
    e.load_policy().await.unwrap();
    assert_eq!(e.get_policy().await, policy);
    assert_eq!(e.get_grouping_policy().await.len(), 2);
}

#[tokio::test]
async fn test_deny_override() {
    init_tracing();
    let model = Model::from_file(fixture("deny_override_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "admin", "data", "read", "allow"],
        vec!["p", "alice", "data", "read", "deny"],
        vec!["g", "alice", "admin"],
        vec!["g", "bob", "admin"],
    ]);
    let e = Enforcer::new(model, adapter).await.unwrap();

    assert!(!e.enforce(["alice", "data", "read"]).unwrap());
    assert!(e.enforce(["bob", "data", "read"]).unwrap());
    // Nothing matched, nothing denied
    assert!(e.enforce(["carol", "other", "write"]).unwrap());
}

// ============================================================================
// ABAC
// ============================================================================

#[tokio::test]
async fn test_abac_rules_in_policy() {
    let e = from_fixtures("abac_rule_model.conf", "abac_rule_policy.csv").await;

    let young = Value::from(json!({"Name": "alice", "Age": 16}));
    let adult = Value::from(json!({"Name": "bob", "Age": 30}));
    let senior = Value::from(json!({"Name": "carol", "Age": 70}));

    assert!(!e.enforce(vec![young.clone(), "/data1".into(), "read".into()]).unwrap());
    assert!(e.enforce(vec![adult.clone(), "/data1".into(), "read".into()]).unwrap());
    assert!(e.enforce(vec![young, "/data2".into(), "write".into()]).unwrap());
    assert!(!e.enforce(vec![senior, "/data2".into(), "write".into()]).unwrap());
    assert!(!e.enforce(vec![adult, "/data2".into(), "read".into()]).unwrap());
}

#[tokio::test]
async fn test_row_errors_exclude_row() {
    init_tracing();
    let model = Model::from_file(fixture("abac_rule_model.conf")).await.unwrap();
    let adapter = MemoryAdapter::with_lines([
        vec!["p", "r.sub.Missing > 1", "/data1", "read"],
        vec!["p", "r.sub.Age > 18", "/data1", "read"],
    ]);
    let e = Enforcer::new(model, adapter).await.unwrap();

    let sub = Value::from(json!({"Age": 30}));
    let decision = e
        .enforce_ex(vec![sub, "/data1".into(), "read".into()])
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.explain, vec![rule(&["r.sub.Age > 18", "/data1", "read"])]);
}

// ============================================================================
// CONTEXTS AND POLICY-LESS MODELS
// ============================================================================

#[tokio::test]
async fn test_enforce_context_selects_definitions() {
    init_tracing();
    let text = format!(
        "{}\n[request_definition]\nr2 = sub, obj\n[policy_definition]\np2 = sub, obj\n\
         [policy_effect]\ne2 = some(where (p.eft == allow))\n[matchers]\nm2 = r2.sub == p2.sub && keyMatch(r2.obj, p2.obj)\n",
        std::fs::read_to_string(fixture("rbac_model.conf")).unwrap()
    );
    let model = Model::from_str(&text).unwrap();
    let adapter = MemoryAdapter::with_lines([vec!["p2", "alice", "/files/*"]]);
    let e = Enforcer::new(model, adapter).await.unwrap();

    let ctx = EnforceContext::new("2");
    assert!(e
        .authorize_with_context(ctx.clone(), request(["alice", "/files/a.txt"]))
        .await
        .unwrap()
        .allowed);
    assert!(!e
        .authorize_with_context(ctx, request(["bob", "/files/a.txt"]))
        .await
        .unwrap()
        .allowed);
    assert!(!e.enforce(["alice", "/files/a.txt", "read"]).unwrap());
}

#[tokio::test]
async fn test_policy_less_model() {
    init_tracing();
    let model = Model::from_str(
        "[request_definition]\nr = sub, obj, act\n\
         [policy_definition]\np = sub, obj, act\n\
         [policy_effect]\ne = some(where (p.eft == allow))\n\
         [matchers]\nm = r.sub == 'root'\n",
    )
    .unwrap();
    let e = Enforcer::new(model, MemoryAdapter::new()).await.unwrap();

    assert!(e.enforce(["root", "anything", "any"]).unwrap());
    assert!(!e.enforce(["alice", "anything", "any"]).unwrap());
}

#[tokio::test]
async fn test_disabled_enforcement() {
    let mut e = from_fixtures("rbac_model.conf", "rbac_policy.csv").await;
    e.enable_enforce(false);
    assert!(e.enforce(["nobody", "nothing", "never"]).unwrap());
    e.enable_enforce(true);
    assert!(!e.enforce(["nobody", "nothing", "never"]).unwrap());
}
