//! Enforcement interface shared by the enforcer and its decorators

use async_trait::async_trait;

use super::Enforcer;
use crate::error::{RbacError, Result};
use crate::matcher::Value;
use crate::types::{Decision, EnforceContext};

/// Authorization interface
///
/// Reads take `&self`; mutations take `&mut self`. Decorators that share
/// state between clones ([`super::SyncedEnforcer`]) still serialize
/// mutations internally.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide a request against the default definitions
    async fn authorize(&self, rvals: Vec<Value>) -> Result<bool> {
        Ok(self.authorize_ex(rvals).await?.allowed)
    }

    /// Decide a request, returning the deciding rows
    async fn authorize_ex(&self, rvals: Vec<Value>) -> Result<Decision>;

    /// Decide a request against the definitions named by `ctx`
    async fn authorize_with_context(&self, ctx: EnforceContext, rvals: Vec<Value>) -> Result<Decision>;

    async fn get_rules(&self, sec: &str, ptype: &str) -> Vec<Vec<String>>;

    async fn get_filtered_rules(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Vec<Vec<String>>;

    async fn has_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> bool;

    /// Direct roles of `name` under role definition `ptype`
    async fn direct_roles(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>>;

    /// Direct members of role `name` under role definition `ptype`
    async fn direct_users(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>>;

    /// Add rows as one unit; false (and no change) when any is present
    async fn add_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool>;

    /// Remove rows as one unit; false (and no change) unless all are present
    async fn remove_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool>;

    async fn remove_filtered_rules(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool>;

    async fn update_rule(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool>;

    async fn load_policy(&mut self) -> Result<()>;

    async fn save_policy(&mut self) -> Result<()>;

    async fn clear_policy(&mut self) -> Result<()>;
}

#[async_trait]
impl Authorizer for Enforcer {
    async fn authorize_ex(&self, rvals: Vec<Value>) -> Result<Decision> {
        self.enforce_with_context(&EnforceContext::default(), &rvals)
    }

    async fn authorize_with_context(&self, ctx: EnforceContext, rvals: Vec<Value>) -> Result<Decision> {
        self.enforce_with_context(&ctx, &rvals)
    }

    async fn get_rules(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.model().get_policy(sec, ptype).to_vec()
    }

    async fn get_filtered_rules(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Vec<Vec<String>> {
        self.model()
            .get_filtered_policy(sec, ptype, field_index, &field_values)
    }

    async fn has_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        self.model().has_policy(sec, ptype, &rule)
    }

    async fn direct_roles(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let rm = self
            .get_role_manager(ptype)
            .ok_or_else(|| RbacError::MissingRoleManager(ptype.to_string()))?;
        Ok(rm.get_roles(name, domain))
    }

    async fn direct_users(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let rm = self
            .get_role_manager(ptype)
            .ok_or_else(|| RbacError::MissingRoleManager(ptype.to_string()))?;
        Ok(rm.get_users(name, domain))
    }

    async fn add_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_rules_internal(sec, ptype, rules).await
    }

    async fn remove_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        self.remove_rules_internal(sec, ptype, rules).await
    }

    async fn remove_filtered_rules(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.remove_filtered_rules_internal(sec, ptype, field_index, field_values)
            .await
    }

    async fn update_rule(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        self.update_rule_internal(sec, ptype, old, new).await
    }

    async fn load_policy(&mut self) -> Result<()> {
        Enforcer::load_policy(self).await
    }

    async fn save_policy(&mut self) -> Result<()> {
        Enforcer::save_policy(self).await
    }

    async fn clear_policy(&mut self) -> Result<()> {
        Enforcer::clear_policy(self).await
    }
}
