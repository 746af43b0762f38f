//! Matcher engine with compiled program caching

use dashmap::DashMap;
use regex::Regex;
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use super::ast::{self, BinOp, Expr, UnaryOp};
use super::context::{EvalContext, FunctionScope};
use super::lexer::tokenize;
use super::validator::validate_tokens;
use super::value::Value;
use crate::error::MatcherError;

/// Nesting bound for `eval()` calls whose argument is itself an `eval()`
const MAX_EVAL_DEPTH: usize = 8;

/// A parsed, validated matcher expression
#[derive(Debug)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    /// Normalized source text the program was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Compiles matcher expressions once and evaluates them per policy row.
///
/// Each enforcer owns its engine, so models never share cached programs.
/// Programs are validated against the callable set at compile time, which is
/// why owners call [`MatcherEngine::invalidate`] after changing functions or
/// role definitions.
pub struct MatcherEngine {
    /// Compiled program cache (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,
}

impl MatcherEngine {
    pub fn new() -> Self {
        Self {
            program_cache: Arc::new(DashMap::new()),
        }
    }

    /// Rewrite attribute-dot definition references to identifiers:
    /// `r.sub` becomes `r_sub`, `p2.obj` becomes `p2_obj`. Quoted literals
    /// are copied unchanged.
    pub fn normalize(expr: &str) -> Cow<'_, str> {
        static DOT_REF: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = DOT_REF.get_or_init(|| Regex::new(r"(^|[^A-Za-z0-9_])([rp][0-9]*)\.").ok()) else {
            return Cow::Borrowed(expr);
        };
        if !expr.contains(['\'', '"']) {
            return re.replace_all(expr, "${1}${2}_");
        }

        let mut out = String::with_capacity(expr.len());
        let mut rest = expr;
        while let Some(open) = rest.find(['\'', '"']) {
            out.push_str(&re.replace_all(&rest[..open], "${1}${2}_"));
            let end = open + quoted_len(&rest[open..]);
            out.push_str(&rest[open..end]);
            rest = &rest[end..];
        }
        out.push_str(&re.replace_all(rest, "${1}${2}_"));
        Cow::Owned(out)
    }

    /// Compile an expression, returning the cached program when present.
    ///
    /// # Errors
    ///
    /// Validation (`Blocked`), parse (`Syntax`) or unknown-function errors.
    /// All of these surface before any evaluation happens.
    pub fn compile(
        &self,
        expr: &str,
        scope: &FunctionScope<'_>,
    ) -> Result<Arc<Program>, MatcherError> {
        let source = Self::normalize(expr);

        if let Some(program) = self.program_cache.get(source.as_ref()) {
            return Ok(program.clone());
        }

        let tokens = tokenize(&source)?;
        validate_tokens(&tokens, &source)?;
        let parsed = ast::parse(&tokens, source.len())?;

        let mut unknown = None;
        parsed.for_each_call(&mut |name| {
            if unknown.is_none() && !scope.is_callable(name) {
                unknown = Some(name.to_string());
            }
        });
        if let Some(name) = unknown {
            return Err(MatcherError::UnknownFunction(name));
        }

        let program = Arc::new(Program {
            source: source.to_string(),
            expr: parsed,
        });
        self.program_cache
            .insert(source.into_owned(), program.clone());

        Ok(program)
    }

    /// Evaluate a compiled program to a boolean
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext<'_>) -> Result<bool, MatcherError> {
        self.eval(&program.expr, ctx, 0)?.as_bool()
    }

    /// Compile and evaluate in one call
    pub fn evaluate_expression(&self, expr: &str, ctx: &EvalContext<'_>) -> Result<bool, MatcherError> {
        let program = self.compile(expr, &ctx.scope)?;
        self.evaluate(&program, ctx)
    }

    /// Drop every compiled program
    pub fn invalidate(&self) {
        self.program_cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.program_cache.len(),
        }
    }

    fn eval(&self, expr: &Expr, ctx: &EvalContext<'_>, depth: usize) -> Result<Value, MatcherError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Field(name) => ctx
                .bindings
                .lookup(name)
                .ok_or_else(|| MatcherError::UnboundIdentifier(name.clone())),
            Expr::Attr(base, field) => {
                let base = self.eval(base, ctx, depth)?;
                base.get_attr(field).cloned()
            }
            Expr::Unary(UnaryOp::Not, inner) => {
                Ok(Value::Bool(!self.eval(inner, ctx, depth)?.as_bool()?))
            }
            Expr::Unary(UnaryOp::Neg, inner) => match self.eval(inner, ctx, depth)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(MatcherError::Type(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary(BinOp::And, lhs, rhs) => {
                if !self.eval(lhs, ctx, depth)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs, ctx, depth)?.as_bool()?))
            }
            Expr::Binary(BinOp::Or, lhs, rhs) => {
                if self.eval(lhs, ctx, depth)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs, ctx, depth)?.as_bool()?))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx, depth)?;
                let rhs = self.eval(rhs, ctx, depth)?;
                Self::binary(*op, &lhs, &rhs)
            }
            Expr::In(needle, haystack) => {
                let needle = self.eval(needle, ctx, depth)?;
                let mut items = Vec::with_capacity(haystack.len());
                for item in haystack {
                    items.push(self.eval(item, ctx, depth)?);
                }
                // `x in (list_value)` searches inside the list
                if let [Value::List(inner)] = items.as_slice() {
                    return Ok(Value::Bool(inner.iter().any(|v| v.loose_eq(&needle))));
                }
                Ok(Value::Bool(items.iter().any(|v| v.loose_eq(&needle))))
            }
            Expr::Call(name, args) => self.call(name, args, ctx, depth),
        }
    }

    fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, MatcherError> {
        use std::cmp::Ordering::*;
        let out = match op {
            BinOp::Eq => Value::Bool(lhs.loose_eq(rhs)),
            BinOp::Ne => Value::Bool(!lhs.loose_eq(rhs)),
            BinOp::Lt => Value::Bool(lhs.compare(rhs)? == Less),
            BinOp::Le => Value::Bool(lhs.compare(rhs)? != Greater),
            BinOp::Gt => Value::Bool(lhs.compare(rhs)? == Greater),
            BinOp::Ge => Value::Bool(lhs.compare(rhs)? != Less),
            BinOp::Add => lhs.add(rhs)?,
            BinOp::Sub => lhs.arith(rhs, "-")?,
            BinOp::Mul => lhs.arith(rhs, "*")?,
            BinOp::Div => lhs.arith(rhs, "/")?,
            BinOp::Rem => lhs.arith(rhs, "%")?,
            BinOp::And => Value::Bool(lhs.as_bool()? && rhs.as_bool()?),
            BinOp::Or => Value::Bool(lhs.as_bool()? || rhs.as_bool()?),
        };
        Ok(out)
    }

    fn call(
        &self,
        name: &str,
        args: &[Expr],
        ctx: &EvalContext<'_>,
        depth: usize,
    ) -> Result<Value, MatcherError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, ctx, depth)?);
        }

        if name == "eval" {
            return self.call_eval(&values, ctx, depth);
        }

        if let Some(rm) = ctx.scope.role_links.get(name) {
            let (user, role, domain) = match values.as_slice() {
                [user, role] => (user.as_str(name)?, role.as_str(name)?, None),
                [user, role, domain] => (
                    user.as_str(name)?,
                    role.as_str(name)?,
                    Some(domain.as_str(name)?),
                ),
                _ => {
                    return Err(MatcherError::Arity {
                        name: name.to_string(),
                        expected: "2 or 3".to_string(),
                        got: values.len(),
                    })
                }
            };
            return Ok(Value::Bool(rm.has_link(user, role, domain)));
        }

        match ctx.scope.functions.get(name) {
            Some(f) => f(&values),
            None => Err(MatcherError::UnknownFunction(name.to_string())),
        }
    }

    /// `eval(expr)`: the argument is matcher text stored as policy data
    fn call_eval(
        &self,
        values: &[Value],
        ctx: &EvalContext<'_>,
        depth: usize,
    ) -> Result<Value, MatcherError> {
        let [source] = values else {
            return Err(MatcherError::Arity {
                name: "eval".to_string(),
                expected: "1".to_string(),
                got: values.len(),
            });
        };
        if depth >= MAX_EVAL_DEPTH {
            return Err(MatcherError::Type(format!(
                "eval() nested deeper than {}",
                MAX_EVAL_DEPTH
            )));
        }
        let program = self.compile(source.as_str("eval argument")?, &ctx.scope)?;
        let result = self.eval(&program.expr, ctx, depth + 1)?.as_bool()?;
        Ok(Value::Bool(result))
    }
}

impl Default for MatcherEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cached programs
    pub size: usize,
}

/// Byte length of the quoted literal opening `s`, closing quote included.
/// An unterminated literal runs to the end of `s`.
fn quoted_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    let Some((_, quote)) = chars.next() else {
        return 0;
    };
    let mut escaped = false;
    for (i, ch) in chars {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return i + ch.len_utf8();
        }
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::context::{Bindings, RoleLinks};
    use crate::matcher::functions::FunctionMap;
    use crate::rbac::{DefaultRoleManager, RoleManager};
    use serde_json::json;

    struct Fixture {
        functions: FunctionMap,
        links: RoleLinks,
        r_tokens: Vec<String>,
        p_tokens: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut rm = DefaultRoleManager::new(10);
            rm.add_link("alice", "admin", None).unwrap();
            let mut links = RoleLinks::new();
            links.insert("g".to_string(), Box::new(rm) as Box<dyn RoleManager>);

            Self {
                functions: FunctionMap::with_builtins(),
                links,
                r_tokens: vec!["r_sub".into(), "r_obj".into(), "r_act".into()],
                p_tokens: vec!["p_sub".into(), "p_obj".into(), "p_act".into()],
            }
        }

        fn run(&self, engine: &MatcherEngine, expr: &str, r: &[Value], p: &[&str]) -> Result<bool, MatcherError> {
            let p: Vec<String> = p.iter().map(|s| s.to_string()).collect();
            let ctx = EvalContext::new(
                FunctionScope::new(&self.functions, &self.links),
                Bindings::new(&self.r_tokens, r, &self.p_tokens, &p),
            );
            engine.evaluate_expression(expr, &ctx)
        }
    }

    fn req(sub: &str, obj: &str, act: &str) -> Vec<Value> {
        vec![sub.into(), obj.into(), act.into()]
    }

    #[test]
    fn test_normalize_dots() {
        assert_eq!(
            MatcherEngine::normalize("r.sub == p.sub && r2.obj == p2.obj"),
            "r_sub == p_sub && r2_obj == p2_obj"
        );
        assert_eq!(MatcherEngine::normalize("r.sub.age > 18"), "r_sub.age > 18");
        assert_eq!(MatcherEngine::normalize("keyMatch(r_obj, p_obj)"), "keyMatch(r_obj, p_obj)");
    }

    #[test]
    fn test_normalize_skips_literals() {
        assert_eq!(MatcherEngine::normalize("r.obj == 'p.data'"), "r_obj == 'p.data'");
        assert_eq!(
            MatcherEngine::normalize(r#"r.act in ("r.read", 'it\'s p.x') && p.eft == "allow""#),
            r#"r_act in ("r.read", 'it\'s p.x') && p_eft == "allow""#
        );
        assert_eq!(MatcherEngine::normalize("r.sub == 'p.open"), "r_sub == 'p.open");
    }

    #[test]
    fn test_rbac_matcher() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let m = "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act";

        assert!(fx.run(&engine, m, &req("alice", "data", "read"), &["admin", "data", "read"]).unwrap());
        assert!(!fx.run(&engine, m, &req("bob", "data", "read"), &["admin", "data", "read"]).unwrap());
        assert!(!fx.run(&engine, m, &req("alice", "data", "write"), &["admin", "data", "read"]).unwrap());
    }

    #[test]
    fn test_abac_attribute_access() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let sub = Value::from(json!({"name": "alice", "age": 30}));
        let r = vec![sub, "doc".into(), "read".into()];

        assert!(fx.run(&engine, "r.sub.age > 18 && r.act in ('read', 'list')", &r, &["", "", ""]).unwrap());
        assert!(!fx.run(&engine, "r.sub.age - 20 > 18", &r, &["", "", ""]).unwrap());

        let err = fx.run(&engine, "r.sub.height > 1", &r, &["", "", ""]).unwrap_err();
        assert!(matches!(err, MatcherError::UnboundIdentifier(_)));
    }

    #[test]
    fn test_eval_of_policy_data() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let sub = Value::from(json!({"age": 70}));
        let r = vec![sub, "/data1".into(), "read".into()];

        assert!(fx.run(&engine, "eval(p.sub) && r.obj == p.obj", &r, &["r.sub.age > 60", "/data1", ""]).unwrap());
        assert!(!fx.run(&engine, "eval(p.sub)", &r, &["r.sub.age < 60", "", ""]).unwrap());

        // Stored rules go through the same validator
        let err = fx.run(&engine, "eval(p.sub)", &r, &["let x = 1", "", ""]).unwrap_err();
        assert!(matches!(err, MatcherError::Blocked { .. }));
    }

    #[test]
    fn test_unknown_function_rejected_at_compile() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let scope = FunctionScope::new(&fx.functions, &fx.links);

        let err = engine.compile("g2(r_sub, p_sub)", &scope).unwrap_err();
        assert_eq!(err, MatcherError::UnknownFunction("g2".into()));
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_program_caching() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let scope = FunctionScope::new(&fx.functions, &fx.links);

        let a = engine.compile("r.sub == p.sub", &scope).unwrap();
        let b = engine.compile("r_sub == p_sub", &scope).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cache_stats().size, 1);

        engine.compile("true", &scope).unwrap();
        assert_eq!(engine.cache_stats().size, 2);

        engine.invalidate();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_non_boolean_result() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let err = fx.run(&engine, "'hello'", &req("a", "b", "c"), &["", "", ""]).unwrap_err();
        assert_eq!(err, MatcherError::NonBoolean);
    }

    #[test]
    fn test_role_link_arity() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        let err = fx.run(&engine, "g(r.sub)", &req("a", "b", "c"), &["", "", ""]).unwrap_err();
        assert!(matches!(err, MatcherError::Arity { .. }));
    }

    #[test]
    fn test_builtin_call() {
        let engine = MatcherEngine::new();
        let fx = Fixture::new();
        assert!(fx
            .run(&engine, "keyMatch2(r.obj, p.obj) && ipMatch('10.0.0.5', '10.0.0.0/8')", &req("a", "/user/7", "c"), &["", "/user/:id", ""])
            .unwrap());
    }
}
