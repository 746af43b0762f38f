//! Request and decision types shared across the crate

use serde::{Deserialize, Serialize};

use crate::matcher::Value;

/// Build a request vector for the async [`crate::Authorizer`] interface
///
/// ```ignore
/// e.authorize(request(["alice", "data1", "read"])).await?;
/// ```
pub fn request<I, V>(rvals: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    rvals.into_iter().map(Into::into).collect()
}

/// Outcome of one enforcement call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Final verdict
    pub allowed: bool,

    /// Rows that decided the verdict, in store order. Empty when no row
    /// decided it (for example a default deny).
    pub explain: Vec<Vec<String>>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            explain: Vec::new(),
        }
    }

    pub fn deny() -> Self {
        Self::default()
    }

    pub fn with_explain(mut self, rows: Vec<Vec<String>>) -> Self {
        self.explain = rows;
        self
    }
}

/// Which request, policy, effect and matcher definitions one enforcement
/// uses. Defaults to `r`, `p`, `e`, `m`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnforceContext {
    pub r_type: String,
    pub p_type: String,
    pub e_type: String,
    pub m_type: String,
}

impl EnforceContext {
    /// Context selecting the numbered definitions, e.g. `"2"` for `r2`, `p2`, `e2`, `m2`
    pub fn new(suffix: &str) -> Self {
        Self {
            r_type: format!("r{}", suffix),
            p_type: format!("p{}", suffix),
            e_type: format!("e{}", suffix),
            m_type: format!("m{}", suffix),
        }
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}
