//! Enforcement orchestration
//!
//! [`Enforcer`] ties the policy store, role managers, effector and matcher
//! engine together. Decorators ([`CachedEnforcer`], [`SyncedEnforcer`])
//! implement the same [`Authorizer`] interface around any inner authorizer.
//!
//! # Architecture
//!
//! ```text
//! request → bind r_* → for each p row: bind p_* → matcher ─→ effect stream → verdict
//!                                          ↓   ↓                    ↑
//!                                   g(...)    keyMatch(...)   short-circuit
//!                                 RoleManager  FunctionMap
//! ```

mod authorizer;
mod cached;
mod management;
mod rbac_api;
mod synced;

pub use authorizer::Authorizer;
pub use cached::{CacheStats, CachedEnforcer};
pub use management::MgmtApi;
pub use rbac_api::RbacApi;
pub use synced::SyncedEnforcer;

use std::path::Path;
use tracing::{debug, info, trace, warn};

use crate::adapter::{Adapter, FileAdapter, Filter};
use crate::config::EnforcerConfig;
use crate::effector::{DefaultEffector, Effect, EffectKind, Effector};
use crate::error::{AuthzError, ModelError, RbacError, Result};
use crate::matcher::{
    Bindings, EvalContext, FunctionMap, FunctionScope, MatcherEngine, MatcherFn, RoleLinks, Value,
};
use crate::model::{Model, PolicyOp};
use crate::rbac::{DefaultRoleManager, MatchingFn, RoleManager};
use crate::types::{Decision, EnforceContext};

/// Authorization enforcer
///
/// Enforcement is synchronous and never mutates the policy store. Policy
/// and persistence operations are async because they go through the
/// adapter.
///
/// # Example
///
/// ```ignore
/// use arbiter_authz::{Enforcer, MemoryAdapter, Model};
///
/// let model = Model::from_str(MODEL_TEXT)?;
/// let e = Enforcer::new(model, MemoryAdapter::new()).await?;
/// assert!(!e.enforce(["alice", "data1", "read"])?);
/// ```
pub struct Enforcer {
    model: Model,
    adapter: Box<dyn Adapter>,
    functions: FunctionMap,
    effector: Box<dyn Effector>,
    role_links: RoleLinks,
    engine: MatcherEngine,
    config: EnforcerConfig,
}

/// Map an adapter result, treating `NotSupported` as a logged no-op
fn tolerate_unsupported<T>(result: Result<T>, operation: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_supported() => {
            warn!("Adapter does not support {}; keeping the in-memory change only", operation);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl Enforcer {
    /// Create an enforcer and load policy from `adapter`
    pub async fn new(model: Model, adapter: impl Adapter + 'static) -> Result<Self> {
        Self::with_config(model, adapter, EnforcerConfig::default()).await
    }

    /// Create an enforcer with explicit configuration
    ///
    /// # Errors
    ///
    /// Model validation errors, adapter load errors, and role-link cycle
    /// errors raised while building links from loaded rows.
    pub async fn with_config(
        model: Model,
        adapter: impl Adapter + 'static,
        config: EnforcerConfig,
    ) -> Result<Self> {
        for assertion in model.assertions("e") {
            EffectKind::parse(&assertion.value)?;
        }

        let mut enforcer = Self {
            model,
            adapter: Box::new(adapter),
            functions: FunctionMap::with_builtins(),
            effector: Box::new(DefaultEffector),
            role_links: RoleLinks::new(),
            engine: MatcherEngine::new(),
            config,
        };
        enforcer.init_role_links();
        enforcer.load_policy().await?;

        info!(
            "Enforcer initialized with {} role definition(s), auto_save={}, cycle_detection={}",
            enforcer.role_links.len(),
            enforcer.config.auto_save,
            enforcer.config.cycle_detection
        );
        Ok(enforcer)
    }

    /// Load the model from a file and rows from a CSV policy file
    pub async fn from_files(model_path: impl AsRef<Path>, policy_path: impl AsRef<Path>) -> Result<Self> {
        let model = Model::from_file(model_path).await?;
        Self::new(model, FileAdapter::new(policy_path)).await
    }

    /// One role manager per role definition, keeping managers already set
    fn init_role_links(&mut self) {
        let keys: Vec<String> = self.model.assertions("g").map(|a| a.key.clone()).collect();
        for key in keys {
            self.role_links.entry(key).or_insert_with(|| {
                Box::new(
                    DefaultRoleManager::new(self.config.max_hierarchy_level)
                        .with_cycle_detection(self.config.cycle_detection),
                )
            });
        }
    }

    // ========================================
    // Enforcement
    // ========================================

    /// Decide a request against the default `r`/`p`/`e`/`m` definitions
    pub fn enforce<I, V>(&self, rvals: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.enforce_ex(rvals)?.allowed)
    }

    /// Like [`Enforcer::enforce`], also returning the deciding rows
    pub fn enforce_ex<I, V>(&self, rvals: I) -> Result<Decision>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rvals: Vec<Value> = rvals.into_iter().map(Into::into).collect();
        self.enforce_with_context(&EnforceContext::default(), &rvals)
    }

    /// Decide a request against the definitions named by `ctx`.
    ///
    /// # Errors
    ///
    /// * `ModelError::UnknownAssertion` when `ctx` names a missing definition
    /// * `ModelError::RequestArity` when `rvals` does not fit the request definition
    /// * `MatcherError` when the matcher fails validation or compilation
    ///
    /// Errors raised while evaluating one row exclude that row instead.
    pub fn enforce_with_context(&self, ctx: &EnforceContext, rvals: &[Value]) -> Result<Decision> {
        if !self.config.enabled {
            return Ok(Decision::allow());
        }

        let r_ast = self.model.get_assertion("r", &ctx.r_type)?;
        if rvals.len() != r_ast.tokens.len() {
            return Err(ModelError::RequestArity {
                expected: r_ast.tokens.len(),
                got: rvals.len(),
            }
            .into());
        }
        let p_ast = self.model.get_assertion("p", &ctx.p_type)?;
        let kind = EffectKind::parse(&self.model.get_assertion("e", &ctx.e_type)?.value)?;
        let m_ast = self.model.get_assertion("m", &ctx.m_type)?;

        let scope = FunctionScope::new(&self.functions, &self.role_links);
        let program = self.engine.compile(&m_ast.value, &scope)?;
        let eft_idx = p_ast.token_index(&format!("{}_eft", p_ast.key));

        let mut stream = self.effector.new_stream(kind);
        let mut matched: Vec<usize> = Vec::new();

        if p_ast.policy.is_empty() {
            // Policy-less models evaluate once with every p_* bound to ""
            let bindings = Bindings::new(&r_ast.tokens, rvals, &p_ast.tokens, &[]);
            match self.engine.evaluate(&program, &EvalContext::new(scope, bindings)) {
                Ok(true) => {
                    stream.push_effect(Effect::Allow);
                }
                Ok(false) => {}
                Err(e) => warn!("Matcher evaluation failed without policy rows: {}", e),
            }
        } else {
            for (idx, row) in p_ast.policy.iter().enumerate() {
                let bindings = Bindings::new(&r_ast.tokens, rvals, &p_ast.tokens, row);
                match self.engine.evaluate(&program, &EvalContext::new(scope, bindings)) {
                    Ok(true) => {}
                    Ok(false) => {
                        trace!("Row {:?} did not match", row);
                        continue;
                    }
                    Err(e) => {
                        warn!("Excluding row {:?}: {}", row, e);
                        continue;
                    }
                }

                let effect = Effect::from_field(eft_idx.and_then(|i| row.get(i)).map(String::as_str));
                trace!("Row {:?} matched with effect {:?}", row, effect);
                matched.push(idx);
                if stream.push_effect(effect) {
                    break;
                }
            }
        }

        let allowed = stream.next();
        let explain: Vec<Vec<String>> = stream
            .explain()
            .and_then(|i| matched.get(i))
            .and_then(|&idx| p_ast.policy.get(idx))
            .cloned()
            .into_iter()
            .collect();

        if self.config.log_enabled {
            debug!(
                "Request {:?}: {} (explain={:?})",
                rvals,
                if allowed { "ALLOW" } else { "DENY" },
                explain
            );
        }

        Ok(Decision { allowed, explain })
    }

    // ========================================
    // Flags and components
    // ========================================

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    pub fn enable_enforce(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn enable_log(&mut self, enabled: bool) {
        self.config.log_enabled = enabled;
    }

    pub fn enable_auto_save(&mut self, enabled: bool) {
        self.config.auto_save = enabled;
    }

    pub fn enable_auto_build_role_links(&mut self, enabled: bool) {
        self.config.auto_build_role_links = enabled;
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Replace the model and reload policy into it
    pub async fn set_model(&mut self, model: Model) -> Result<()> {
        for assertion in model.assertions("e") {
            EffectKind::parse(&assertion.value)?;
        }
        self.model = model;
        self.role_links.clear();
        self.init_role_links();
        self.engine.invalidate();
        self.load_policy().await
    }

    /// Replace the adapter. Rows are not reloaded.
    pub fn set_adapter(&mut self, adapter: impl Adapter + 'static) {
        self.adapter = Box::new(adapter);
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn set_effector(&mut self, effector: Box<dyn Effector>) {
        self.effector = effector;
    }

    pub fn matcher_engine(&self) -> &MatcherEngine {
        &self.engine
    }

    // ========================================
    // Functions and role managers
    // ========================================

    /// Register (or replace) a matcher function
    pub fn add_function(&mut self, name: impl Into<String>, f: MatcherFn) {
        let name = name.into();
        debug!("Registering matcher function '{}'", name);
        self.functions.add(name, f);
        self.engine.invalidate();
    }

    /// Unregister a matcher function. Returns false when it was not registered.
    pub fn remove_function(&mut self, name: &str) -> bool {
        let removed = self.functions.remove(name).is_some();
        if removed {
            self.engine.invalidate();
        }
        removed
    }

    pub fn get_role_manager(&self, ptype: &str) -> Option<&dyn RoleManager> {
        self.role_links.get(ptype).map(|rm| rm.as_ref())
    }

    /// Attach a role manager to a role definition and rebuild its links
    pub fn set_role_manager(&mut self, ptype: &str, rm: Box<dyn RoleManager>) -> Result<()> {
        self.role_links.insert(ptype.to_string(), rm);
        self.engine.invalidate();
        self.rebuild_links_for(ptype)
    }

    /// Compare role names of `ptype` with `f`, then rebuild its links
    pub fn add_named_matching_fn(&mut self, ptype: &str, f: MatchingFn) -> Result<()> {
        self.role_manager_mut(ptype)?.set_matching_fn(Some(f));
        self.engine.invalidate();
        self.rebuild_links_for(ptype)
    }

    /// Compare domains of `ptype` with `f`, then rebuild its links
    pub fn add_named_domain_matching_fn(&mut self, ptype: &str, f: MatchingFn) -> Result<()> {
        self.role_manager_mut(ptype)?.set_domain_matching_fn(Some(f));
        self.engine.invalidate();
        self.rebuild_links_for(ptype)
    }

    fn role_manager_mut(&mut self, ptype: &str) -> Result<&mut Box<dyn RoleManager>> {
        self.role_links
            .get_mut(ptype)
            .ok_or_else(|| RbacError::MissingRoleManager(ptype.to_string()).into())
    }

    fn rebuild_links_for(&mut self, ptype: &str) -> Result<()> {
        let rules = self.model.get_policy("g", ptype).to_vec();
        let rm = self.role_manager_mut(ptype)?;
        rm.clear();
        Model::build_incremental_role_links(rm.as_mut(), PolicyOp::Add, &rules)
    }

    /// Clear every role manager and rebuild links from the `g` rows
    pub fn build_role_links(&mut self) -> Result<()> {
        for rm in self.role_links.values_mut() {
            rm.clear();
        }
        self.model.build_role_links(&mut self.role_links)
    }

    // ========================================
    // Loading and saving
    // ========================================

    /// Reload every row from the adapter. On failure the current policy stays.
    pub async fn load_policy(&mut self) -> Result<()> {
        let mut model = self.model.clone();
        model.clear_policy();
        self.adapter.load_policy(&mut model).await?;
        self.finish_load(model)
    }

    /// Load only rows accepted by `filter`. A filtered enforcer refuses
    /// `save_policy`.
    pub async fn load_filtered_policy(&mut self, filter: Filter) -> Result<()> {
        let mut model = self.model.clone();
        model.clear_policy();
        self.adapter.load_filtered_policy(&mut model, filter).await?;
        self.finish_load(model)
    }

    fn finish_load(&mut self, mut model: Model) -> Result<()> {
        model.sort_policies_by_priority();
        if subject_priority(&model) {
            model.sort_policies_by_subject_hierarchy();
        }

        let previous = std::mem::replace(&mut self.model, model);
        if self.config.auto_build_role_links {
            if let Err(e) = self.build_role_links() {
                self.model = previous;
                // Restore links for the policy we kept
                if let Err(restore) = self.build_role_links() {
                    warn!("Failed to restore role links: {}", restore);
                }
                return Err(e);
            }
        }

        info!(
            "Loaded {} policy row(s) and {} role row(s)",
            self.model.assertions("p").map(|a| a.policy.len()).sum::<usize>(),
            self.model.assertions("g").map(|a| a.policy.len()).sum::<usize>()
        );
        Ok(())
    }

    pub fn is_filtered(&self) -> bool {
        self.adapter.is_filtered()
    }

    /// Persist every row through the adapter
    pub async fn save_policy(&mut self) -> Result<()> {
        if self.is_filtered() {
            return Err(AuthzError::InvalidOperation(
                "cannot save a filtered policy".to_string(),
            ));
        }
        self.adapter.save_policy(&self.model).await
    }

    /// Drop every row and role link
    pub async fn clear_policy(&mut self) -> Result<()> {
        if self.config.auto_save {
            tolerate_unsupported(self.adapter.clear_policy().await, "clear_policy")?;
        }
        self.model.clear_policy();
        for rm in self.role_links.values_mut() {
            rm.clear();
        }
        Ok(())
    }

    // ========================================
    // Row mutation
    // ========================================

    /// Apply `g` rows to the role manager of `ptype`, undoing the batch on failure
    fn link_rules(&mut self, ptype: &str, op: PolicyOp, rules: &[Vec<String>]) -> Result<()> {
        let rm = self.role_manager_mut(ptype)?;
        for (i, rule) in rules.iter().enumerate() {
            if let Err(e) = Model::build_incremental_role_links(rm.as_mut(), op, std::slice::from_ref(rule)) {
                let undo = match op {
                    PolicyOp::Add => PolicyOp::Remove,
                    PolicyOp::Remove => PolicyOp::Add,
                };
                if let Err(undo_err) = Model::build_incremental_role_links(rm.as_mut(), undo, &rules[..i]) {
                    warn!("Failed to undo role links for '{}': {}", ptype, undo_err);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn links_enabled(&self, sec: &str) -> bool {
        sec == "g" && self.config.auto_build_role_links
    }

    /// Re-run the subject-hierarchy sort after a successful mutation
    fn reorder_after(&mut self, changed: bool) -> bool {
        if changed && subject_priority(&self.model) {
            self.model.sort_policies_by_subject_hierarchy();
        }
        changed
    }

    /// Add rows as one unit. Order: validate, role links, adapter, memory.
    pub(crate) async fn add_rules_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        {
            let ast = self.model.get_assertion(sec, ptype)?;
            for rule in &rules {
                ast.check_arity(rule)?;
            }
            let mut seen = std::collections::HashSet::new();
            if rules.is_empty() || rules.iter().any(|r| ast.contains(r) || !seen.insert(r)) {
                return Ok(false);
            }
        }

        let link = self.links_enabled(sec);
        if link {
            self.link_rules(ptype, PolicyOp::Add, &rules)?;
        }

        if self.config.auto_save {
            let saved = if rules.len() == 1 {
                self.adapter.add_policy(sec, ptype, rules[0].clone()).await
            } else {
                self.adapter.add_policies(sec, ptype, rules.clone()).await
            };
            if let Err(e) = tolerate_unsupported(saved, "add_policy") {
                if link {
                    self.link_rules(ptype, PolicyOp::Remove, &rules)?;
                }
                return Err(e);
            }
        }

        let added = self.model.add_policies(sec, ptype, rules)?;
        Ok(self.reorder_after(added))
    }

    /// Remove rows as one unit; nothing changes unless every row is present
    pub(crate) async fn remove_rules_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        {
            let ast = self.model.get_assertion(sec, ptype)?;
            if rules.is_empty() || !rules.iter().all(|r| ast.contains(r)) {
                return Ok(false);
            }
        }

        if self.config.auto_save {
            let removed = if rules.len() == 1 {
                self.adapter.remove_policy(sec, ptype, rules[0].clone()).await
            } else {
                self.adapter.remove_policies(sec, ptype, rules.clone()).await
            };
            tolerate_unsupported(removed, "remove_policy")?;
        }

        if self.links_enabled(sec) {
            self.link_rules(ptype, PolicyOp::Remove, &rules)?;
        }
        let removed = self.model.remove_policies(sec, ptype, &rules)?;
        Ok(self.reorder_after(removed))
    }

    /// Remove rows matching a field filter; true when anything was removed
    pub(crate) async fn remove_filtered_rules_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.model.get_assertion(sec, ptype)?;

        if self.config.auto_save {
            let removed = self
                .adapter
                .remove_filtered_policy(sec, ptype, field_index, field_values.clone())
                .await;
            tolerate_unsupported(removed, "remove_filtered_policy")?;
        }

        let removed = self
            .model
            .remove_filtered_policy(sec, ptype, field_index, &field_values)?;
        if self.links_enabled(sec) && !removed.is_empty() {
            self.link_rules(ptype, PolicyOp::Remove, &removed)?;
        }
        Ok(self.reorder_after(!removed.is_empty()))
    }

    /// Replace one row in place; false when `old` is absent or `new` is
    /// already stored
    pub(crate) async fn update_rule_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        {
            let ast = self.model.get_assertion(sec, ptype)?;
            ast.check_arity(&new)?;
            if !ast.contains(&old) || (new != old && ast.contains(&new)) {
                return Ok(false);
            }
        }

        let link = self.links_enabled(sec);
        if link {
            self.link_rules(ptype, PolicyOp::Remove, std::slice::from_ref(&old))?;
            if let Err(e) = self.link_rules(ptype, PolicyOp::Add, std::slice::from_ref(&new)) {
                self.link_rules(ptype, PolicyOp::Add, std::slice::from_ref(&old))?;
                return Err(e);
            }
        }

        if self.config.auto_save {
            let updated = self
                .adapter
                .update_policy(sec, ptype, old.clone(), new.clone())
                .await;
            if let Err(e) = tolerate_unsupported(updated, "update_policy") {
                if link {
                    self.link_rules(ptype, PolicyOp::Remove, std::slice::from_ref(&new))?;
                    self.link_rules(ptype, PolicyOp::Add, std::slice::from_ref(&old))?;
                }
                return Err(e);
            }
        }

        let updated = self.model.update_policy(sec, ptype, &old, new)?;
        Ok(self.reorder_after(updated))
    }
}

fn subject_priority(model: &Model) -> bool {
    model
        .get_assertion("e", "e")
        .map(|e| EffectKind::parse(&e.value) == Ok(EffectKind::SubjectPriority))
        .unwrap_or(false)
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("model", &self.model)
            .field("functions", &self.functions)
            .field("role_definitions", &self.role_links.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
