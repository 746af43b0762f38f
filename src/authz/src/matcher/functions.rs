//! Built-in predicate library and the function table consulted by matchers.
//!
//! All predicates are pure functions over strings. Invalid patterns (a
//! malformed regex, an unparsable address) never match.

use dashmap::DashMap;
use ipnetwork::IpNetwork;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use super::value::Value;
use crate::error::MatcherError;

/// A function callable from a matcher expression
pub type MatcherFn = Arc<dyn Fn(&[Value]) -> Result<Value, MatcherError> + Send + Sync>;

/// Upper bound on compiled patterns held by the predicate regex cache
const REGEX_CACHE_CAPACITY: usize = 1024;

/// Bounded map of compiled patterns; invalid patterns are cached as `None`
struct RegexCache {
    entries: DashMap<String, Option<Regex>>,
    capacity: usize,
}

impl RegexCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(hit) = self.entries.get(pattern) {
            return hit.value().clone();
        }
        if self.entries.len() >= self.capacity {
            self.evict();
        }
        let compiled = Regex::new(pattern).ok();
        self.entries.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    /// Drop a tenth of the entries, at least one
    fn evict(&self) {
        let to_remove = (self.capacity / 10).max(1);
        let mut removed = 0;
        self.entries.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
    }
}

/// Compiled-regex cache shared by the pattern predicates
fn cached_regex(pattern: &str) -> Option<Regex> {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE
        .get_or_init(|| RegexCache::new(REGEX_CACHE_CAPACITY))
        .get_or_compile(pattern)
}

/// `key2` may end in `*`: `/foo/*` matches `/foo/bar/baz`.
///
/// ```
/// use arbiter_authz::matcher::functions::key_match;
/// assert!(key_match("/foo/bar", "/foo/*"));
/// assert!(!key_match("/bar/foo", "/foo/*"));
/// ```
pub fn key_match(key1: &str, key2: &str) -> bool {
    match key2.find('*') {
        None => key1 == key2,
        Some(i) if key1.len() > i => key1.get(..i) == key2.get(..i),
        Some(i) => Some(key1) == key2.get(..i),
    }
}

/// Like [`key_match`] plus `:param` segments: `/user/:id` matches `/user/42`.
pub fn key_match2(key1: &str, key2: &str) -> bool {
    if key2 == "*" {
        return true;
    }
    let pattern = key2.replace("/*", "/.*");
    let pattern = replace_all(&pattern, r":[^/]+", "[^/]+");
    regex_match(key1, &format!("^{}$", pattern))
}

/// Like [`key_match`] plus `{param}` segments: `/user/{id}` matches `/user/42`.
pub fn key_match3(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let pattern = replace_all(&pattern, r"\{[^/]+?\}", "[^/]+");
    regex_match(key1, &format!("^{}$", pattern))
}

/// Like [`key_match3`], but a `{param}` repeated in `key2` must bind the same
/// value everywhere: `/parent/{id}/child/{id}` matches `/parent/1/child/1`
/// and not `/parent/1/child/2`.
pub fn key_match4(key1: &str, key2: &str) -> bool {
    let key2 = key2.replace("/*", "/.*");
    let Some(token_re) = cached_regex(r"\{([^/]+?)\}") else {
        return false;
    };

    let names: Vec<String> = token_re
        .captures_iter(&key2)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    let pattern = token_re.replace_all(&key2, "([^/]+)");

    let Some(re) = cached_regex(&format!("^{}$", pattern)) else {
        return false;
    };
    let Some(caps) = re.captures(key1) else {
        return false;
    };

    let mut bound: HashMap<&str, &str> = HashMap::new();
    for (idx, name) in names.iter().enumerate() {
        let Some(value) = caps.get(idx + 1).map(|m| m.as_str()) else {
            return false;
        };
        match bound.get(name.as_str()) {
            Some(previous) if *previous != value => return false,
            _ => {
                bound.insert(name, value);
            }
        }
    }
    true
}

/// Like [`key_match3`], ignoring any query string on `key1`.
pub fn key_match5(key1: &str, key2: &str) -> bool {
    let key1 = key1.split('?').next().unwrap_or(key1);
    let pattern = key2.replace("/*", "/.*");
    let pattern = replace_all(&pattern, r"\{[^/]+?\}", "[^/]+");
    regex_match(key1, &format!("^{}$", pattern))
}

/// Returns the part of `key1` covered by the `*` in `key2`, or an empty string.
pub fn key_get(key1: &str, key2: &str) -> String {
    let Some(i) = key2.find('*') else {
        return String::new();
    };
    match (key1.get(..i), key2.get(..i)) {
        (Some(head1), Some(head2)) if key1.len() > i && head1 == head2 => key1[i..].to_string(),
        _ => String::new(),
    }
}

/// Returns the value bound to `:path_var` when `key1` matches `key2`.
pub fn key_get2(key1: &str, key2: &str, path_var: &str) -> String {
    let key2 = key2.replace("/*", "/.*");
    let Some(token_re) = cached_regex(r":[^/]+") else {
        return String::new();
    };

    let names: Vec<&str> = token_re
        .find_iter(&key2)
        .map(|m| m.as_str().trim_start_matches(':'))
        .collect();
    let pattern = token_re.replace_all(&key2, "([^/]+)");

    let caps = cached_regex(&format!("^{}$", pattern)).and_then(|re| {
        re.captures(key1)
            .map(|c| c.iter().map(|m| m.map(|m| m.as_str().to_string())).collect::<Vec<_>>())
    });
    let Some(caps) = caps else {
        return String::new();
    };

    names
        .iter()
        .position(|name| *name == path_var)
        .and_then(|idx| caps.get(idx + 1).cloned().flatten())
        .unwrap_or_default()
}

/// Regular-expression search of `key2` in `key1`
pub fn regex_match(key1: &str, key2: &str) -> bool {
    cached_regex(key2).map(|re| re.is_match(key1)).unwrap_or(false)
}

/// `ip1` is an address; `ip2` is an address or a CIDR block
pub fn ip_match(ip1: &str, ip2: &str) -> bool {
    let Ok(addr) = ip1.trim().parse::<IpAddr>() else {
        return false;
    };
    match ip2.trim().parse::<IpNetwork>() {
        Ok(net) => net.contains(addr),
        Err(_) => false,
    }
}

/// Path glob: `*` does not cross `/`, `**` does not exist, `?` is one char
pub fn glob_match(key1: &str, key2: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    glob::Pattern::new(key2)
        .map(|p| p.matches_with(key1, options))
        .unwrap_or(false)
}

fn replace_all(input: &str, pattern: &str, replacement: &str) -> String {
    match cached_regex(pattern) {
        Some(re) => re.replace_all(input, replacement).into_owned(),
        None => input.to_string(),
    }
}

/// Name → function table for matcher calls.
///
/// Mutating the table changes what compiled programs may call, so owners
/// invalidate their program cache after every change.
#[derive(Clone)]
pub struct FunctionMap {
    fns: HashMap<String, MatcherFn>,
}

impl FunctionMap {
    /// Empty table
    pub fn new() -> Self {
        Self {
            fns: HashMap::new(),
        }
    }

    /// Table holding the built-in predicates
    pub fn with_builtins() -> Self {
        let mut map = Self::new();
        map.add("keyMatch", string_predicate("keyMatch", key_match));
        map.add("keyMatch2", string_predicate("keyMatch2", key_match2));
        map.add("keyMatch3", string_predicate("keyMatch3", key_match3));
        map.add("keyMatch4", string_predicate("keyMatch4", key_match4));
        map.add("keyMatch5", string_predicate("keyMatch5", key_match5));
        map.add("regexMatch", string_predicate("regexMatch", regex_match));
        map.add("ipMatch", string_predicate("ipMatch", ip_match));
        map.add("globMatch", string_predicate("globMatch", glob_match));
        map.add(
            "keyGet",
            Arc::new(|args: &[Value]| -> Result<Value, MatcherError> {
                let [a, b] = expect_args::<2>("keyGet", args)?;
                Ok(Value::Str(key_get(a, b)))
            }),
        );
        map.add(
            "keyGet2",
            Arc::new(|args: &[Value]| -> Result<Value, MatcherError> {
                let [a, b, var] = expect_args::<3>("keyGet2", args)?;
                Ok(Value::Str(key_get2(a, b, var)))
            }),
        );
        map
    }

    /// Register or replace a function; returns the previous binding
    pub fn add(&mut self, name: impl Into<String>, f: MatcherFn) -> Option<MatcherFn> {
        self.fns.insert(name.into(), f)
    }

    pub fn remove(&mut self, name: &str) -> Option<MatcherFn> {
        self.fns.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&MatcherFn> {
        self.fns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.fns.keys().collect();
        names.sort();
        f.debug_struct("FunctionMap").field("functions", &names).finish()
    }
}

/// Wrap a two-string predicate as a matcher function
pub fn string_predicate(name: &'static str, f: fn(&str, &str) -> bool) -> MatcherFn {
    Arc::new(move |args: &[Value]| -> Result<Value, MatcherError> {
        let [a, b] = expect_args::<2>(name, args)?;
        Ok(Value::Bool(f(a, b)))
    })
}

fn expect_args<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<[&'a str; N], MatcherError> {
    if args.len() != N {
        return Err(MatcherError::Arity {
            name: name.to_string(),
            expected: N.to_string(),
            got: args.len(),
        });
    }
    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str(name)?;
    }
    Ok(out)
}
