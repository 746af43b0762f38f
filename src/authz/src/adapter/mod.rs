//! Policy persistence
//!
//! The enforcer loads rows through an [`Adapter`] and, with auto-save on,
//! mirrors every mutation to it before changing memory. Operations an
//! adapter does not implement report [`AdapterError::NotSupported`]; the
//! enforcer logs that and carries on with the in-memory change.

mod file;
mod memory;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};
use crate::model::Model;

/// Row filter for partial loads. Each list constrains fields from the first
/// column on; empty strings match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub p: Vec<String>,
    #[serde(default)]
    pub g: Vec<String>,
}

impl Filter {
    /// Whether a stored line (`ptype` followed by fields) passes the filter
    pub fn accepts(&self, line: &[String]) -> bool {
        let Some((ptype, fields)) = line.split_first() else {
            return false;
        };
        let wanted = if ptype.starts_with('p') {
            &self.p
        } else if ptype.starts_with('g') {
            &self.g
        } else {
            return false;
        };
        wanted
            .iter()
            .enumerate()
            .all(|(i, want)| want.is_empty() || fields.get(i) == Some(want))
    }
}

/// Storage backend for policy rows
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Load every row into `m`
    async fn load_policy(&mut self, m: &mut Model) -> Result<()>;

    /// Load only rows accepted by `filter`
    async fn load_filtered_policy(&mut self, _m: &mut Model, _filter: Filter) -> Result<()> {
        Err(AdapterError::NotSupported("load_filtered_policy").into())
    }

    /// Replace stored rows with the contents of `m`
    async fn save_policy(&mut self, m: &Model) -> Result<()>;

    /// Drop every stored row
    async fn clear_policy(&mut self) -> Result<()> {
        Err(AdapterError::NotSupported("clear_policy").into())
    }

    /// Whether the last load was filtered
    fn is_filtered(&self) -> bool {
        false
    }

    async fn add_policy(&mut self, _sec: &str, _ptype: &str, _rule: Vec<String>) -> Result<bool> {
        Err(AdapterError::NotSupported("add_policy").into())
    }

    async fn add_policies(&mut self, _sec: &str, _ptype: &str, _rules: Vec<Vec<String>>) -> Result<bool> {
        Err(AdapterError::NotSupported("add_policies").into())
    }

    async fn remove_policy(&mut self, _sec: &str, _ptype: &str, _rule: Vec<String>) -> Result<bool> {
        Err(AdapterError::NotSupported("remove_policy").into())
    }

    async fn remove_policies(&mut self, _sec: &str, _ptype: &str, _rules: Vec<Vec<String>>) -> Result<bool> {
        Err(AdapterError::NotSupported("remove_policies").into())
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _field_index: usize,
        _field_values: Vec<String>,
    ) -> Result<bool> {
        Err(AdapterError::NotSupported("remove_filtered_policy").into())
    }

    async fn update_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _old: Vec<String>,
        _new: Vec<String>,
    ) -> Result<bool> {
        Err(AdapterError::NotSupported("update_policy").into())
    }
}

/// Store one persisted line (`ptype, field, field, ...`) in the model.
/// Lines repeating an existing row are skipped.
pub(crate) fn load_policy_line(line: Vec<String>, m: &mut Model) -> Result<()> {
    let Some((ptype, fields)) = line.split_first() else {
        return Ok(());
    };
    let sec = ptype.get(..1).unwrap_or_default();
    m.add_policy(sec, ptype, fields.to_vec())?;
    Ok(())
}

/// Every stored row of `m` as a persisted line, `p` section first
pub(crate) fn policy_lines(m: &Model) -> Vec<Vec<String>> {
    ["p", "g"]
        .iter()
        .flat_map(|sec| m.assertions(sec))
        .flat_map(|ast| {
            ast.policy.iter().map(move |row| {
                std::iter::once(ast.key.clone())
                    .chain(row.iter().cloned())
                    .collect()
            })
        })
        .collect()
}
