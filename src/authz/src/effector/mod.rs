//! Policy effect combination
//!
//! The enforcer feeds one [`Effect`] per matching policy row into an
//! [`EffectorStream`] and stops as soon as the stream reports the verdict is
//! decided.

mod default_effector;

pub use default_effector::{DefaultEffectStream, DefaultEffector};

use crate::error::ModelError;
use std::fmt;
use std::str::FromStr;

/// Effect tag of one matching row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Allow,
    Deny,
    /// Row matched but its effect field named neither allow nor deny
    Indeterminate,
}

impl Effect {
    /// Effect of a row's `eft` field; rows without one allow
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            None | Some("allow") => Effect::Allow,
            Some("deny") => Effect::Deny,
            Some(_) => Effect::Indeterminate,
        }
    }
}

/// Supported `[policy_effect]` expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft) || deny`
    Priority,
    /// `subjectPriority(p.eft) || deny`
    SubjectPriority,
}

impl EffectKind {
    /// Parse effect text, ignoring whitespace and accepting `p.eft` or `p_eft`
    pub fn parse(expr: &str) -> Result<Self, ModelError> {
        let compact: String = expr
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .replace("p.eft", "p_eft");

        match compact.as_str() {
            "some(where(p_eft==allow))" => Ok(EffectKind::AllowOverride),
            "!some(where(p_eft==deny))" => Ok(EffectKind::DenyOverride),
            "some(where(p_eft==allow))&&!some(where(p_eft==deny))" => Ok(EffectKind::AllowAndDeny),
            "priority(p_eft)||deny" => Ok(EffectKind::Priority),
            "subjectPriority(p_eft)||deny" => Ok(EffectKind::SubjectPriority),
            _ => Err(ModelError::UnsupportedEffect(expr.to_string())),
        }
    }

    /// Verdict when no row matched
    pub fn default_verdict(self) -> bool {
        matches!(self, EffectKind::DenyOverride)
    }
}

impl FromStr for EffectKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EffectKind::AllowOverride => "some(where (p.eft == allow))",
            EffectKind::DenyOverride => "!some(where (p.eft == deny))",
            EffectKind::AllowAndDeny => "some(where (p.eft == allow)) && !some(where (p.eft == deny))",
            EffectKind::Priority => "priority(p.eft) || deny",
            EffectKind::SubjectPriority => "subjectPriority(p.eft) || deny",
        };
        f.write_str(text)
    }
}

/// Factory for per-enforcement effect streams
pub trait Effector: Send + Sync {
    fn new_stream(&self, kind: EffectKind) -> Box<dyn EffectorStream>;
}

/// Incremental reduction over the effects of matching rows
pub trait EffectorStream {
    /// Feed the next effect. Returns true once the verdict can no longer change.
    fn push_effect(&mut self, effect: Effect) -> bool;

    /// Final verdict, falling back to the kind's default when nothing decided it
    fn next(&self) -> bool;

    /// Position (in push order) of the effect that decided the verdict
    fn explain(&self) -> Option<usize>;
}
