//! Evaluation environment: request/policy bindings and callable functions

use super::functions::FunctionMap;
use super::value::Value;
use crate::rbac::RoleManager;
use std::collections::HashMap;

/// Role managers keyed by role definition name (`g`, `g2`, ...)
pub type RoleLinks = HashMap<String, Box<dyn RoleManager>>;

/// Everything a matcher may call: the function table and the role-link
/// predicates. Fixed for the duration of one enforcement call.
#[derive(Clone, Copy)]
pub struct FunctionScope<'a> {
    pub functions: &'a FunctionMap,
    pub role_links: &'a RoleLinks,
}

impl<'a> FunctionScope<'a> {
    pub fn new(functions: &'a FunctionMap, role_links: &'a RoleLinks) -> Self {
        Self {
            functions,
            role_links,
        }
    }

    /// Whether `name` may appear in call position
    pub fn is_callable(&self, name: &str) -> bool {
        name == "eval" || self.role_links.contains_key(name) || self.functions.contains(name)
    }
}

/// Values bound to `r_*` and `p_*` identifiers for one candidate row
#[derive(Clone, Copy)]
pub struct Bindings<'a> {
    request_tokens: &'a [String],
    request: &'a [Value],
    policy_tokens: &'a [String],
    policy: &'a [String],
}

impl<'a> Bindings<'a> {
    pub fn new(
        request_tokens: &'a [String],
        request: &'a [Value],
        policy_tokens: &'a [String],
        policy: &'a [String],
    ) -> Self {
        Self {
            request_tokens,
            request,
            policy_tokens,
            policy,
        }
    }

    /// Look up a bound identifier. Policy tokens past the end of a short row
    /// (the synthesized row of a policy-less model) bind to the empty string.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(idx) = self.request_tokens.iter().position(|t| t == name) {
            return self.request.get(idx).cloned();
        }
        self.policy_tokens
            .iter()
            .position(|t| t == name)
            .map(|idx| Value::Str(self.policy.get(idx).cloned().unwrap_or_default()))
    }
}

/// Full evaluation context for one matcher run
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub scope: FunctionScope<'a>,
    pub bindings: Bindings<'a>,
}

impl<'a> EvalContext<'a> {
    pub fn new(scope: FunctionScope<'a>, bindings: Bindings<'a>) -> Self {
        Self { scope, bindings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_request_then_policy() {
        let r_tokens = vec!["r_sub".to_string(), "r_obj".to_string()];
        let r_vals = vec![Value::from("alice"), Value::from("data1")];
        let p_tokens = vec!["p_sub".to_string(), "p_obj".to_string()];
        let p_vals = vec!["bob".to_string(), "data2".to_string()];

        let bindings = Bindings::new(&r_tokens, &r_vals, &p_tokens, &p_vals);
        assert_eq!(bindings.lookup("r_obj"), Some(Value::from("data1")));
        assert_eq!(bindings.lookup("p_sub"), Some(Value::from("bob")));
        assert_eq!(bindings.lookup("p_act"), None);
    }

    #[test]
    fn test_empty_policy_row_binds_empty_strings() {
        let r_tokens = vec!["r_sub".to_string()];
        let r_vals = vec![Value::from("alice")];
        let p_tokens = vec!["p_sub".to_string()];

        let bindings = Bindings::new(&r_tokens, &r_vals, &p_tokens, &[]);
        assert_eq!(bindings.lookup("p_sub"), Some(Value::from("")));
    }

    #[test]
    fn test_scope_callables() {
        let functions = FunctionMap::with_builtins();
        let links = RoleLinks::new();
        let scope = FunctionScope::new(&functions, &links);
        assert!(scope.is_callable("eval"));
        assert!(scope.is_callable("keyMatch2"));
        assert!(!scope.is_callable("g"));
    }
}
