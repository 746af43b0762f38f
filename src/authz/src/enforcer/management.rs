//! Policy management conveniences over any [`Authorizer`]

use async_trait::async_trait;
use indexmap::IndexSet;

use super::Authorizer;
use crate::error::Result;

fn distinct_field(rows: Vec<Vec<String>>, idx: usize) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().nth(idx))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Management API in terms of `p`/`g` rows.
///
/// Implemented for every [`Authorizer`], so decorators get it for free.
#[async_trait]
pub trait MgmtApi: Authorizer {
    async fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_rules("p", "p").await
    }

    async fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.get_rules("p", ptype).await
    }

    async fn get_filtered_policy(&self, field_index: usize, field_values: Vec<String>) -> Vec<Vec<String>> {
        self.get_filtered_rules("p", "p", field_index, field_values).await
    }

    async fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_rules("g", "g").await
    }

    async fn get_named_grouping_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.get_rules("g", ptype).await
    }

    async fn has_policy(&self, rule: Vec<String>) -> bool {
        self.has_rule("p", "p", rule).await
    }

    async fn has_grouping_policy(&self, rule: Vec<String>) -> bool {
        self.has_rule("g", "g", rule).await
    }

    async fn add_policy(&mut self, rule: Vec<String>) -> Result<bool> {
        self.add_rules("p", "p", vec![rule]).await
    }

    async fn add_policies(&mut self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_rules("p", "p", rules).await
    }

    async fn add_named_policy(&mut self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.add_rules("p", ptype, vec![rule]).await
    }

    async fn remove_policy(&mut self, rule: Vec<String>) -> Result<bool> {
        self.remove_rules("p", "p", vec![rule]).await
    }

    async fn remove_policies(&mut self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.remove_rules("p", "p", rules).await
    }

    async fn remove_filtered_policy(&mut self, field_index: usize, field_values: Vec<String>) -> Result<bool> {
        self.remove_filtered_rules("p", "p", field_index, field_values).await
    }

    async fn update_policy(&mut self, old: Vec<String>, new: Vec<String>) -> Result<bool> {
        self.update_rule("p", "p", old, new).await
    }

    async fn add_grouping_policy(&mut self, rule: Vec<String>) -> Result<bool> {
        self.add_rules("g", "g", vec![rule]).await
    }

    async fn add_named_grouping_policy(&mut self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.add_rules("g", ptype, vec![rule]).await
    }

    async fn add_grouping_policies(&mut self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_rules("g", "g", rules).await
    }

    async fn remove_grouping_policy(&mut self, rule: Vec<String>) -> Result<bool> {
        self.remove_rules("g", "g", vec![rule]).await
    }

    async fn remove_grouping_policies(&mut self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.remove_rules("g", "g", rules).await
    }

    async fn remove_filtered_grouping_policy(
        &mut self,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.remove_filtered_rules("g", "g", field_index, field_values).await
    }

    /// Distinct subjects (first `p` field)
    async fn get_all_subjects(&self) -> Vec<String> {
        distinct_field(self.get_rules("p", "p").await, 0)
    }

    /// Distinct objects (second `p` field)
    async fn get_all_objects(&self) -> Vec<String> {
        distinct_field(self.get_rules("p", "p").await, 1)
    }

    /// Distinct actions (third `p` field)
    async fn get_all_actions(&self) -> Vec<String> {
        distinct_field(self.get_rules("p", "p").await, 2)
    }

    /// Distinct roles (second `g` field)
    async fn get_all_roles(&self) -> Vec<String> {
        distinct_field(self.get_rules("g", "g").await, 1)
    }
}

impl<T: Authorizer + ?Sized> MgmtApi for T {}
