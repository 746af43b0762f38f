//! Enforcer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rbac::DEFAULT_MAX_HIERARCHY_LEVEL;

/// Enforcer behavior switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// When false every request is allowed
    pub enabled: bool,

    /// Mirror policy mutations to the adapter
    pub auto_save: bool,

    /// Keep role managers in sync with `g` row mutations
    pub auto_build_role_links: bool,

    /// Emit a debug event per enforcement verdict
    pub log_enabled: bool,

    /// Links followed by role managers created by the enforcer
    pub max_hierarchy_level: usize,

    /// Reject role links that would close a cycle
    pub cycle_detection: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
            log_enabled: false,
            max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
            cycle_detection: false,
        }
    }
}

/// Decision cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for cached decisions
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}
