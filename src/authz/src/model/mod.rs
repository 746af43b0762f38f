//! Policy store
//!
//! A [`Model`] maps each section (`r`, `p`, `g`, `e`, `m`) to its named
//! definitions, and each `p`/`g` definition to its ordered rows. It has no
//! behavior beyond storage, lookup and bookkeeping; the enforcer decides what
//! the rows mean.

mod assertion;
mod loader;

pub use assertion::Assertion;

use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

use crate::error::{ModelError, PolicyError, RbacError, Result};
use crate::matcher::RoleLinks;
use crate::rbac::RoleManager;

/// Direction of an incremental role-link update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    model: BTreeMap<String, IndexMap<String, Assertion>>,
}

fn check_policy_section(sec: &str) -> std::result::Result<(), PolicyError> {
    match sec {
        "p" | "g" => Ok(()),
        other => Err(PolicyError::UnknownSection(other.to_string())),
    }
}

/// `field_values[i]` constrains column `field_index + i`; empty values match anything
fn row_matches_filter(row: &[String], field_index: usize, field_values: &[String]) -> bool {
    field_values.iter().enumerate().all(|(i, want)| {
        want.is_empty() || row.get(field_index + i).map_or(false, |have| have == want)
    })
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Returns false when `value` is empty.
    pub fn add_def(&mut self, sec: &str, key: &str, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        self.model
            .entry(sec.to_string())
            .or_default()
            .insert(key.to_string(), Assertion::new(sec, key, value));
        true
    }

    pub fn has_section(&self, sec: &str) -> bool {
        self.model.get(sec).map_or(false, |defs| !defs.is_empty())
    }

    /// Definitions of one section in declaration order
    pub fn assertions(&self, sec: &str) -> impl Iterator<Item = &Assertion> {
        self.model.get(sec).into_iter().flat_map(|defs| defs.values())
    }

    pub fn get_assertion(&self, sec: &str, ptype: &str) -> std::result::Result<&Assertion, ModelError> {
        self.model
            .get(sec)
            .and_then(|defs| defs.get(ptype))
            .ok_or_else(|| ModelError::UnknownAssertion {
                sec: sec.to_string(),
                ptype: ptype.to_string(),
            })
    }

    fn get_assertion_mut(&mut self, sec: &str, ptype: &str) -> Result<&mut Assertion> {
        check_policy_section(sec)?;
        self.model
            .get_mut(sec)
            .and_then(|defs| defs.get_mut(ptype))
            .ok_or_else(|| {
                ModelError::UnknownAssertion {
                    sec: sec.to_string(),
                    ptype: ptype.to_string(),
                }
                .into()
            })
    }

    // ========================================
    // Row mutation
    // ========================================

    /// Add one row. Returns false, leaving the store unchanged, when the row
    /// is already present.
    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> Result<bool> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        ast.check_arity(&rule)?;
        if ast.contains(&rule) {
            return Ok(false);
        }
        ast.push(rule);
        Ok(true)
    }

    /// Add rows as one unit: nothing is added if any row is already present
    /// or the batch repeats a row.
    pub fn add_policies(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        let mut seen = HashSet::new();
        for rule in &rules {
            ast.check_arity(rule)?;
            if ast.contains(rule) || !seen.insert(rule) {
                return Ok(false);
            }
        }
        for rule in rules {
            ast.push(rule);
        }
        Ok(true)
    }

    /// Bulk insert that skips the uniqueness check
    pub fn add_policies_allow_duplicates(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<()> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        for rule in &rules {
            ast.check_arity(rule)?;
        }
        for rule in rules {
            ast.push(rule);
        }
        Ok(())
    }

    /// Remove a row (every copy of it). Returns false when absent.
    pub fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> Result<bool> {
        Ok(self.get_assertion_mut(sec, ptype)?.remove(rule) > 0)
    }

    /// Remove rows as one unit: nothing is removed unless every row is present
    pub fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        if !rules.iter().all(|rule| ast.contains(rule)) {
            return Ok(false);
        }
        for rule in rules {
            ast.remove(rule);
        }
        Ok(true)
    }

    /// Replace `old` with `new` at the same position (re-slotted when a
    /// priority field changes). Returns false, leaving the store unchanged,
    /// when `old` is absent or `new` is already another row.
    pub fn update_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        old: &[String],
        new: Vec<String>,
    ) -> Result<bool> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        ast.check_arity(&new)?;
        if !ast.contains(old) || (new.as_slice() != old && ast.contains(&new)) {
            return Ok(false);
        }
        Ok(ast.replace(old, new))
    }

    /// Remove rows matching the field filter, returning them in store order
    pub fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let ast = self.get_assertion_mut(sec, ptype)?;
        if field_values.is_empty() {
            return Ok(Vec::new());
        }
        Ok(ast.drain_where(|row| row_matches_filter(row, field_index, field_values)))
    }

    /// Drop every `p` and `g` row, keeping the definitions
    pub fn clear_policy(&mut self) {
        for sec in ["p", "g"] {
            if let Some(defs) = self.model.get_mut(sec) {
                defs.values_mut().for_each(Assertion::clear);
            }
        }
    }

    // ========================================
    // Row queries
    // ========================================

    /// Rows of one definition; empty when the definition does not exist
    pub fn get_policy(&self, sec: &str, ptype: &str) -> &[Vec<String>] {
        self.get_assertion(sec, ptype)
            .map(|ast| ast.policy.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        self.get_policy(sec, ptype)
            .iter()
            .filter(|row| row_matches_filter(row, field_index, field_values))
            .cloned()
            .collect()
    }

    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.get_assertion(sec, ptype)
            .map_or(false, |ast| ast.contains(rule))
    }

    /// Distinct values of one column, in first-seen order
    pub fn get_values_for_field_in_policy(&self, sec: &str, ptype: &str, field_index: usize) -> Vec<String> {
        self.get_policy(sec, ptype)
            .iter()
            .filter_map(|row| row.get(field_index).cloned())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    // ========================================
    // Role links
    // ========================================

    /// Feed every `g` row into its role manager.
    ///
    /// # Errors
    ///
    /// `RbacError::MissingRoleManager` when a role definition has no manager,
    /// or the first cycle error raised by a manager.
    pub fn build_role_links(&self, rm_map: &mut RoleLinks) -> Result<()> {
        for ast in self.assertions("g") {
            let rm = rm_map
                .get_mut(&ast.key)
                .ok_or_else(|| RbacError::MissingRoleManager(ast.key.clone()))?;
            for rule in &ast.policy {
                Self::apply_link(rm.as_mut(), PolicyOp::Add, rule)?;
            }
            info!(ptype = %ast.key, links = ast.policy.len(), "Built role links");
        }
        Ok(())
    }

    /// Apply added or removed `g` rows to one role manager
    pub fn build_incremental_role_links(
        rm: &mut dyn RoleManager,
        op: PolicyOp,
        rules: &[Vec<String>],
    ) -> Result<()> {
        for rule in rules {
            Self::apply_link(rm, op, rule)?;
        }
        Ok(())
    }

    fn apply_link(rm: &mut dyn RoleManager, op: PolicyOp, rule: &[String]) -> Result<()> {
        let [name1, name2, rest @ ..] = rule else {
            return Err(PolicyError::FieldCount {
                ptype: "g".to_string(),
                expected: 2,
                got: rule.len(),
            }
            .into());
        };
        let domain = rest.first().map(String::as_str);
        match op {
            PolicyOp::Add => rm.add_link(name1, name2, domain)?,
            PolicyOp::Remove => rm.delete_link(name1, name2, domain),
        }
        Ok(())
    }

    // ========================================
    // Ordering
    // ========================================

    /// Stable sort of every `p` definition carrying a `priority` field,
    /// lowest value first. Unparsable priorities sort last.
    pub fn sort_policies_by_priority(&mut self) {
        let Some(defs) = self.model.get_mut("p") else {
            return;
        };
        for ast in defs.values_mut() {
            let Some(idx) = ast.token_index(&format!("{}_priority", ast.key)) else {
                continue;
            };
            let key = ast.key.clone();
            ast.policy.sort_by_cached_key(|row| {
                row.get(idx)
                    .and_then(|p| p.parse::<i64>().ok())
                    .unwrap_or_else(|| {
                        warn!(ptype = %key, row = ?row, "Unparsable policy priority");
                        i64::MAX
                    })
            });
        }
    }

    /// Stable sort of `p` rows so subjects deeper in the `g` hierarchy come
    /// first; subjects absent from the hierarchy sort last.
    pub fn sort_policies_by_subject_hierarchy(&mut self) {
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        for rule in self.get_policy("g", "g") {
            if let [child, parent, rest @ ..] = rule.as_slice() {
                let key = |name: &str| match rest.first() {
                    Some(dom) => format!("{}::{}", dom, name),
                    None => name.to_string(),
                };
                parents.entry(key(child)).or_default().push(key(parent));
            }
        }

        let mut levels: HashMap<String, usize> = HashMap::new();
        let Some(defs) = self.model.get_mut("p") else {
            return;
        };
        for ast in defs.values_mut() {
            let sub_idx = ast.token_index(&format!("{}_sub", ast.key)).unwrap_or(0);
            let dom_idx = ast.token_index(&format!("{}_dom", ast.key));
            ast.policy.sort_by_cached_key(|row| {
                let sub = row.get(sub_idx).map(String::as_str).unwrap_or("");
                let key = match dom_idx.and_then(|i| row.get(i)) {
                    Some(dom) => format!("{}::{}", dom, sub),
                    None => sub.to_string(),
                };
                std::cmp::Reverse(hierarchy_level(&key, &parents, &mut levels, &mut HashSet::new()))
            });
        }
    }
}

/// Distance from `name` to the top of its role chain
fn hierarchy_level(
    name: &str,
    parents: &HashMap<String, Vec<String>>,
    memo: &mut HashMap<String, usize>,
    visiting: &mut HashSet<String>,
) -> usize {
    if let Some(&level) = memo.get(name) {
        return level;
    }
    if !visiting.insert(name.to_string()) {
        return 0;
    }
    let level = parents
        .get(name)
        .map(|ps| {
            ps.iter()
                .map(|p| hierarchy_level(p, parents, memo, visiting) + 1)
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    visiting.remove(name);
    memo.insert(name.to_string(), level);
    level
}
