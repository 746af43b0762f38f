//! Matcher expression language.
//!
//! Matcher text from the model (and `eval()` arguments taken from policy
//! rows) is normalized, validated against the portable subset, parsed into an
//! [`ast::Expr`] and evaluated by [`MatcherEngine`] against one request and
//! one candidate policy row at a time.

pub mod ast;
pub mod context;
pub mod engine;
pub mod functions;
pub(crate) mod lexer;
pub mod validator;
pub mod value;

pub use context::{Bindings, EvalContext, FunctionScope, RoleLinks};
pub use engine::{CacheStats, MatcherEngine, Program};
pub use functions::{FunctionMap, MatcherFn};
pub use validator::validate;
pub use value::Value;
