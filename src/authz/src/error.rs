//! Error types for the authorization engine

use thiserror::Error;

/// Model definition errors (model text, definitions, request shape)
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// One or more required sections are absent from the model
    #[error("Missing required model section(s): {}", .0.join(", "))]
    MissingSection(Vec<String>),

    /// A line of model text could not be understood
    #[error("Malformed model text at line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    /// Lookup of a definition that was never declared
    #[error("Unknown definition {sec}.{ptype}")]
    UnknownAssertion { sec: String, ptype: String },

    /// Request value count differs from the request definition
    #[error("Request has {got} value(s) but the definition declares {expected}")]
    RequestArity { expected: usize, got: usize },

    /// Policy effect expression is not one of the supported forms
    #[error("Unsupported policy effect: {0}")]
    UnsupportedEffect(String),
}

/// Policy row errors
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    /// Row field count differs from the definition's token count
    #[error("Rule for '{ptype}' has {got} field(s) but the definition declares {expected}")]
    FieldCount {
        ptype: String,
        expected: usize,
        got: usize,
    },

    /// Rows can only live in the `p` and `g` sections
    #[error("Section '{0}' does not hold policy rows")]
    UnknownSection(String),
}

/// Role graph errors
#[derive(Debug, Error, PartialEq)]
pub enum RbacError {
    /// Inserting the link would close a cycle; the graph was left untouched
    #[error("Role link cycle detected: {path}")]
    CycleDetected { path: String },

    /// Matcher or API referenced a role definition with no manager attached
    #[error("No role manager for '{0}'")]
    MissingRoleManager(String),
}

/// Matcher compilation and evaluation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatcherError {
    /// Expression uses a construct outside the portable subset
    #[error("Disallowed construct '{construct}' in matcher expression: {expr}")]
    Blocked { construct: String, expr: String },

    /// Expression could not be parsed
    #[error("Syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },

    /// Call to a function that is neither built in nor registered
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Identifier with no binding in the evaluation environment
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),

    /// Operands of incompatible types
    #[error("Type error: {0}")]
    Type(String),

    /// Wrong number of arguments for a function
    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// Expression did not produce a boolean
    #[error("Matcher did not return a boolean result")]
    NonBoolean,
}

/// Adapter (persistence) errors
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter does not implement this operation; callers treat this as a no-op
    #[error("Adapter does not support '{0}'")]
    NotSupported(&'static str),

    /// Policy line could not be parsed
    #[error("Invalid policy line {line}: {msg}")]
    Parse { line: usize, msg: String },

    /// CSV decoding or encoding failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Model definition error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Policy row error
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Role graph error
    #[error("RBAC error: {0}")]
    Rbac(#[from] RbacError),

    /// Matcher error
    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),

    /// Adapter error
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Operation refused in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// True when an adapter reported that it does not implement an operation
    pub fn is_not_supported(&self) -> bool {
        matches!(self, AuthzError::Adapter(AdapterError::NotSupported(_)))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
