//! Role hierarchy resolution
//!
//! A role manager answers "does actor A inherit role B" over a mutable graph
//! of role links, optionally partitioned by domain and optionally comparing
//! names with a pattern function instead of string equality.

mod default_role_manager;

pub use default_role_manager::DefaultRoleManager;

use crate::error::RbacError;

/// Name comparison used in place of string equality.
///
/// Called as `f(name, stored)` where `stored` may be a pattern such as
/// `/book/:id` or `domain*`.
pub type MatchingFn = fn(&str, &str) -> bool;

/// Default maximum number of links followed by `has_link`
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Role graph operations consulted by the matcher's `g(...)` predicates
pub trait RoleManager: Send + Sync {
    /// Drop all nodes and links
    fn clear(&mut self);

    /// Add a link meaning `name1` inherits `name2`. Adding an existing link
    /// succeeds without change.
    ///
    /// # Errors
    ///
    /// `RbacError::CycleDetected` when cycle detection is enabled and the link
    /// would close a cycle. The graph is left exactly as before the call.
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> Result<(), RbacError>;

    /// Remove a link. Absent links are ignored.
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Whether `name1` inherits `name2`, directly or transitively
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Direct roles of `name`
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Direct members of role `name`
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Domains holding at least one node, in creation order
    fn get_domains(&self) -> Vec<String>;

    /// Compare role names with `f` instead of string equality
    fn set_matching_fn(&mut self, f: Option<MatchingFn>);

    /// Compare domains with `f` instead of string equality
    fn set_domain_matching_fn(&mut self, f: Option<MatchingFn>);

    fn set_max_hierarchy_level(&mut self, level: usize);

    fn enable_cycle_detection(&mut self, enabled: bool);
}
