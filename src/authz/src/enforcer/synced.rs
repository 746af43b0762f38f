//! Shared, lock-guarded enforcer

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Authorizer, Enforcer};
use crate::adapter::Filter;
use crate::error::Result;
use crate::matcher::{MatcherFn, Value};
use crate::model::Model;
use crate::rbac::{MatchingFn, RoleManager};
use crate::types::{Decision, EnforceContext};

/// Wraps an authorizer in `Arc<RwLock<_>>` so clones can be handed to many
/// tasks. Enforcement and queries share the read lock; every mutation holds
/// the write lock for its whole duration, so readers never observe a
/// half-applied batch.
pub struct SyncedEnforcer<E> {
    inner: Arc<RwLock<E>>,
}

impl<E> Clone for SyncedEnforcer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Authorizer> SyncedEnforcer<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, E> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, E> {
        self.inner.write().await
    }
}

impl SyncedEnforcer<Enforcer> {
    pub async fn enforce<I, V>(&self, rvals: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.inner.read().await.enforce(rvals)
    }

    pub async fn enforce_ex<I, V>(&self, rvals: I) -> Result<Decision>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.inner.read().await.enforce_ex(rvals)
    }

    pub async fn enable_enforce(&self, enabled: bool) {
        self.inner.write().await.enable_enforce(enabled);
    }

    pub async fn add_function(&self, name: impl Into<String>, f: MatcherFn) {
        self.inner.write().await.add_function(name, f);
    }

    pub async fn set_role_manager(&self, ptype: &str, rm: Box<dyn RoleManager>) -> Result<()> {
        self.inner.write().await.set_role_manager(ptype, rm)
    }

    pub async fn add_named_matching_fn(&self, ptype: &str, f: MatchingFn) -> Result<()> {
        self.inner.write().await.add_named_matching_fn(ptype, f)
    }

    pub async fn add_named_domain_matching_fn(&self, ptype: &str, f: MatchingFn) -> Result<()> {
        self.inner.write().await.add_named_domain_matching_fn(ptype, f)
    }

    pub async fn set_model(&self, model: Model) -> Result<()> {
        self.inner.write().await.set_model(model).await
    }

    pub async fn load_filtered_policy(&self, filter: Filter) -> Result<()> {
        self.inner.write().await.load_filtered_policy(filter).await
    }

    pub async fn build_role_links(&self) -> Result<()> {
        self.inner.write().await.build_role_links()
    }
}

#[async_trait]
impl<E: Authorizer> Authorizer for SyncedEnforcer<E> {
    async fn authorize_ex(&self, rvals: Vec<Value>) -> Result<Decision> {
        self.inner.read().await.authorize_ex(rvals).await
    }

    async fn authorize_with_context(&self, ctx: EnforceContext, rvals: Vec<Value>) -> Result<Decision> {
        self.inner.read().await.authorize_with_context(ctx, rvals).await
    }

    async fn get_rules(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.inner.read().await.get_rules(sec, ptype).await
    }

    async fn get_filtered_rules(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Vec<Vec<String>> {
        self.inner
            .read()
            .await
            .get_filtered_rules(sec, ptype, field_index, field_values)
            .await
    }

    async fn has_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        self.inner.read().await.has_rule(sec, ptype, rule).await
    }

    async fn direct_roles(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.inner.read().await.direct_roles(ptype, name, domain).await
    }

    async fn direct_users(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.inner.read().await.direct_users(ptype, name, domain).await
    }

    async fn add_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        self.inner.write().await.add_rules(sec, ptype, rules).await
    }

    async fn remove_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        self.inner.write().await.remove_rules(sec, ptype, rules).await
    }

    async fn remove_filtered_rules(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.inner
            .write()
            .await
            .remove_filtered_rules(sec, ptype, field_index, field_values)
            .await
    }

    async fn update_rule(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        self.inner.write().await.update_rule(sec, ptype, old, new).await
    }

    async fn load_policy(&mut self) -> Result<()> {
        self.inner.write().await.load_policy().await
    }

    async fn save_policy(&mut self) -> Result<()> {
        self.inner.write().await.save_policy().await
    }

    async fn clear_policy(&mut self) -> Result<()> {
        self.inner.write().await.clear_policy().await
    }
}
