//! One model definition and the rows stored under it

use std::collections::HashMap;

use crate::error::PolicyError;

/// A definition line such as `p = sub, obj, act` plus, for `p`/`g`
/// definitions, its ordered policy rows.
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    /// Definition name (`r`, `p2`, `g`, `e`, `m`, ...)
    pub key: String,

    /// Raw definition text
    pub value: String,

    /// Field names, prefixed with the key for request and policy
    /// definitions (`p_sub`); role definitions keep their `_` placeholders
    pub tokens: Vec<String>,

    /// Rows in insertion (or sorted) order
    pub policy: Vec<Vec<String>>,

    /// Occurrence count per row
    counts: HashMap<Vec<String>, usize>,

    /// Index of the `{key}_priority` field of a policy definition
    priority: Option<usize>,
}

/// Sort key for a row's priority field; unparsable values sort last
fn priority_of(row: &[String], idx: usize) -> i64 {
    row.get(idx)
        .and_then(|p| p.parse::<i64>().ok())
        .unwrap_or(i64::MAX)
}

impl Assertion {
    pub fn new(sec: &str, key: &str, value: &str) -> Self {
        let tokens = match sec {
            "r" | "p" => value
                .split(',')
                .map(|t| format!("{}_{}", key, t.trim()))
                .collect(),
            "g" => value.split(',').map(|t| t.trim().to_string()).collect(),
            _ => Vec::new(),
        };

        let priority = match sec {
            "p" => {
                let name = format!("{}_priority", key);
                tokens.iter().position(|t| *t == name)
            }
            _ => None,
        };

        Self {
            key: key.to_string(),
            value: value.to_string(),
            tokens,
            policy: Vec::new(),
            counts: HashMap::new(),
            priority,
        }
    }

    /// Position of a token such as `p_eft` or `p_priority`
    pub fn token_index(&self, token: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    pub fn contains(&self, rule: &[String]) -> bool {
        self.counts.contains_key(rule)
    }

    pub(crate) fn check_arity(&self, rule: &[String]) -> Result<(), PolicyError> {
        if rule.len() != self.tokens.len() {
            return Err(PolicyError::FieldCount {
                ptype: self.key.clone(),
                expected: self.tokens.len(),
                got: rule.len(),
            });
        }
        Ok(())
    }

    /// Insert without the uniqueness check. Definitions with a priority
    /// field keep rows ordered: a new row lands after every row whose
    /// priority is lower or equal.
    pub(crate) fn push(&mut self, rule: Vec<String>) {
        *self.counts.entry(rule.clone()).or_insert(0) += 1;
        match self.priority {
            Some(idx) => {
                let pos = self.insert_position(&rule, idx);
                self.policy.insert(pos, rule);
            }
            None => self.policy.push(rule),
        }
    }

    fn insert_position(&self, rule: &[String], idx: usize) -> usize {
        let key = priority_of(rule, idx);
        self.policy.partition_point(|row| priority_of(row, idx) <= key)
    }

    /// Remove every copy of `rule`; returns how many were removed
    pub(crate) fn remove(&mut self, rule: &[String]) -> usize {
        let Some(count) = self.counts.remove(rule) else {
            return 0;
        };
        self.policy.retain(|row| row.as_slice() != rule);
        count
    }

    /// Replace `old`, keeping its position unless the priority changed
    pub(crate) fn replace(&mut self, old: &[String], new: Vec<String>) -> bool {
        let Some(pos) = self.policy.iter().position(|row| row.as_slice() == old) else {
            return false;
        };
        if let Some(count) = self.counts.get_mut(old) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(old);
            }
        }
        *self.counts.entry(new.clone()).or_insert(0) += 1;
        match self.priority {
            Some(idx) if priority_of(old, idx) != priority_of(&new, idx) => {
                self.policy.remove(pos);
                let pos = self.insert_position(&new, idx);
                self.policy.insert(pos, new);
            }
            _ => self.policy[pos] = new,
        }
        true
    }

    /// Remove rows for which `matches` holds, returning them in order
    pub(crate) fn drain_where(&mut self, mut matches: impl FnMut(&[String]) -> bool) -> Vec<Vec<String>> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.policy).into_iter().partition(|row| matches(row));
        self.policy = kept;
        for row in &removed {
            if let Some(count) = self.counts.get_mut(row) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(row);
                }
            }
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.policy.clear();
        self.counts.clear();
    }
}
