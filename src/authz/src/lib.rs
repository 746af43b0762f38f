//! # Arbiter Authorization Engine
//!
//! Embeddable access-control engine driven by a declarative model and a
//! store of policy rows.
//!
//! ## Features
//!
//! - **Model files** declaring request, policy, role, effect and matcher definitions
//! - **Role graph** with domains, pattern matching and optional cycle rejection
//! - **Effect policies**: allow-override, deny-override, allow-and-deny, priority
//! - **Matcher expressions** compiled once and evaluated per policy row
//! - **Adapters** for in-memory and CSV file persistence
//! - **Decorators** for decision caching and shared concurrent access
//!
//! ## Example
//!
//! ```rust,no_run
//! use arbiter_authz::{Enforcer, MemoryAdapter, Model, RbacApi};
//!
//! #[tokio::main]
//! async fn main() -> arbiter_authz::Result<()> {
//!     let model = Model::from_str(
//!         "[request_definition]\nr = sub, obj, act\n\
//!          [policy_definition]\np = sub, obj, act\n\
//!          [role_definition]\ng = _, _\n\
//!          [policy_effect]\ne = some(where (p.eft == allow))\n\
//!          [matchers]\nm = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act\n",
//!     )?;
//!     let mut e = Enforcer::new(model, MemoryAdapter::new()).await?;
//!
//!     e.add_permission_for_user("admin", vec!["data".into(), "read".into()]).await?;
//!     e.add_role_for_user("alice", "admin", None).await?;
//!
//!     if e.enforce(["alice", "data", "read"])? {
//!         println!("Access granted!");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! authz/
//! ├── model/      - Model text loader and policy row store
//! ├── rbac/       - Role managers
//! ├── effector/   - Effect combination
//! ├── matcher/    - Matcher compilation and evaluation
//! ├── adapter/    - Policy persistence
//! └── enforcer/   - Orchestration, management APIs and decorators
//! ```

pub mod adapter;
pub mod config;
pub mod effector;
pub mod enforcer;
pub mod error;
pub mod matcher;
pub mod model;
pub mod rbac;
pub mod types;

// Re-export commonly used types
pub use adapter::{Adapter, FileAdapter, Filter, MemoryAdapter};
pub use config::{CacheConfig, EnforcerConfig};
pub use effector::{DefaultEffector, Effect, EffectKind, Effector};
pub use enforcer::{Authorizer, CacheStats, CachedEnforcer, Enforcer, MgmtApi, RbacApi, SyncedEnforcer};
pub use error::{AuthzError, Result};
pub use matcher::Value;
pub use model::Model;
pub use rbac::{DefaultRoleManager, RoleManager};
pub use types::{request, Decision, EnforceContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
