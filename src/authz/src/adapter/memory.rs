//! In-memory adapter

use async_trait::async_trait;
use indexmap::IndexSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{load_policy_line, policy_lines, Adapter, Filter};
use crate::error::Result;
use crate::model::Model;

/// Adapter keeping persisted lines in memory.
///
/// Clones share storage, so a test can hand one clone to an enforcer and
/// inspect what was persisted through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    lines: Arc<RwLock<IndexSet<Vec<String>>>>,
    is_filtered: bool,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with persisted lines (`ptype` first)
    pub fn with_lines<I, L, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines
            .into_iter()
            .map(|line| line.into_iter().map(Into::into).collect())
            .collect();
        Self {
            lines: Arc::new(RwLock::new(lines)),
            is_filtered: false,
        }
    }

    /// Snapshot of every persisted line
    pub async fn lines(&self) -> Vec<Vec<String>> {
        self.lines.read().await.iter().cloned().collect()
    }

    fn line(ptype: &str, rule: Vec<String>) -> Vec<String> {
        let mut line = Vec::with_capacity(rule.len() + 1);
        line.push(ptype.to_string());
        line.extend(rule);
        line
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&mut self, m: &mut Model) -> Result<()> {
        let lines = self.lines.read().await;
        for line in lines.iter() {
            load_policy_line(line.clone(), m)?;
        }
        self.is_filtered = false;
        debug!(lines = lines.len(), "Loaded policy from memory adapter");
        Ok(())
    }

    async fn load_filtered_policy(&mut self, m: &mut Model, filter: Filter) -> Result<()> {
        let lines = self.lines.read().await;
        for line in lines.iter().filter(|line| filter.accepts(line)) {
            load_policy_line(line.clone(), m)?;
        }
        self.is_filtered = true;
        Ok(())
    }

    async fn save_policy(&mut self, m: &Model) -> Result<()> {
        let mut lines = self.lines.write().await;
        *lines = policy_lines(m).into_iter().collect();
        Ok(())
    }

    async fn clear_policy(&mut self) -> Result<()> {
        self.lines.write().await.clear();
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    async fn add_policy(&mut self, _sec: &str, ptype: &str, rule: Vec<String>) -> Result<bool> {
        Ok(self.lines.write().await.insert(Self::line(ptype, rule)))
    }

    async fn add_policies(&mut self, _sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        let mut lines = self.lines.write().await;
        let new: Vec<_> = rules.into_iter().map(|rule| Self::line(ptype, rule)).collect();
        if new.iter().any(|line| lines.contains(line)) {
            return Ok(false);
        }
        lines.extend(new);
        Ok(true)
    }

    async fn remove_policy(&mut self, _sec: &str, ptype: &str, rule: Vec<String>) -> Result<bool> {
        Ok(self.lines.write().await.shift_remove(&Self::line(ptype, rule)))
    }

    async fn remove_policies(&mut self, _sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        let mut lines = self.lines.write().await;
        let doomed: Vec<_> = rules.into_iter().map(|rule| Self::line(ptype, rule)).collect();
        if !doomed.iter().all(|line| lines.contains(line)) {
            return Ok(false);
        }
        for line in &doomed {
            lines.shift_remove(line);
        }
        Ok(true)
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        let mut lines = self.lines.write().await;
        let before = lines.len();
        lines.retain(|line| {
            let Some((head, fields)) = line.split_first() else {
                return true;
            };
            let hit = head == ptype
                && field_values.iter().enumerate().all(|(i, want)| {
                    want.is_empty() || fields.get(field_index + i) == Some(want)
                });
            !hit
        });
        Ok(lines.len() != before)
    }

    async fn update_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        let mut lines = self.lines.write().await;
        let Some(idx) = lines.get_index_of(&Self::line(ptype, old)) else {
            return Ok(false);
        };
        let new = Self::line(ptype, new);
        if lines.contains(&new) {
            lines.shift_remove_index(idx);
            return Ok(true);
        }
        lines.insert(new);
        let last = lines.len() - 1;
        lines.swap_indices(idx, last);
        lines.pop();
        Ok(true)
    }
}
