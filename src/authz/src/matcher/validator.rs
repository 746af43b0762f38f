//! Portability validator for matcher expressions.
//!
//! Runs before parsing and rejects host-scripting constructs that other
//! engines reading the same model could not evaluate identically:
//! collection/string/math namespaces, lambdas, bindings, loops, control flow,
//! object construction and imports.

use super::lexer::{tokenize, Spanned, Tok};
use crate::error::MatcherError;

/// Keywords of general-purpose scripting languages
const BLOCKED_KEYWORDS: &[&str] = &[
    "let", "fn", "lambda", "for", "while", "if", "else", "return", "new", "import", "use",
    "break", "continue",
];

/// Namespaces whose member calls are not portable
const BLOCKED_NAMESPACES: &[&str] = &["seq", "string", "math"];

/// Validate an expression string.
///
/// # Errors
///
/// `MatcherError::Blocked` naming the first offending construct, or
/// `MatcherError::Syntax` when the text cannot be tokenized at all.
pub fn validate(expr: &str) -> Result<(), MatcherError> {
    let tokens = tokenize(expr)?;
    validate_tokens(&tokens, expr)
}

pub(crate) fn validate_tokens(tokens: &[Spanned], expr: &str) -> Result<(), MatcherError> {
    let blocked = |construct: String| MatcherError::Blocked {
        construct,
        expr: expr.to_string(),
    };

    for (idx, spanned) in tokens.iter().enumerate() {
        match &spanned.tok {
            Tok::Ident(word) if BLOCKED_KEYWORDS.contains(&word.as_str()) => {
                return Err(blocked(word.clone()));
            }
            Tok::Ident(word) if BLOCKED_NAMESPACES.contains(&word.as_str()) => {
                // Only namespace access is blocked; a bare `string` could be a field name
                if matches!(tokens.get(idx + 1).map(|t| &t.tok), Some(Tok::Dot)) {
                    return Err(blocked(format!("{}.", word)));
                }
            }
            Tok::Assign
            | Tok::Arrow
            | Tok::Semicolon
            | Tok::LBrace
            | Tok::RBrace
            | Tok::LBracket
            | Tok::RBracket => {
                return Err(blocked(spanned.tok.spelling()));
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_construct(expr: &str) -> String {
        match validate(expr) {
            Err(MatcherError::Blocked { construct, .. }) => construct,
            other => panic!("expected Blocked for {:?}, got {:?}", expr, other),
        }
    }

    #[test]
    fn test_portable_expressions_pass() {
        for expr in [
            "g(r_sub, p_sub) && r_obj == p_obj && r_act == p_act",
            "keyMatch2(r_obj, p_obj) || r_sub == 'root'",
            "r_sub.age > 18 && r_obj in ('a', 'b')",
            "eval(p_sub_rule)",
            "!(r_act == 'write')",
        ] {
            assert!(validate(expr).is_ok(), "{}", expr);
        }
    }

    #[test]
    fn test_namespaces_rejected() {
        assert_eq!(blocked_construct("seq.list(1, 2)"), "seq.");
        assert_eq!(blocked_construct("string.contains(r_obj, 'a')"), "string.");
        assert_eq!(blocked_construct("math.abs(r_sub.age) > 1"), "math.");
    }

    #[test]
    fn test_scripting_keywords_rejected() {
        assert_eq!(blocked_construct("let x = 1"), "let");
        assert_eq!(blocked_construct("lambda(x) -> x end"), "lambda");
        assert_eq!(blocked_construct("for x in r_obj"), "for");
        assert_eq!(blocked_construct("if r_sub == 'a'"), "if");
        assert_eq!(blocked_construct("new java.util.Date()"), "new");
        assert_eq!(blocked_construct("import os"), "import");
    }

    #[test]
    fn test_punctuation_rejected() {
        assert_eq!(blocked_construct("r_sub = 'alice'"), "=");
        assert_eq!(blocked_construct("x -> x"), "->");
        assert_eq!(blocked_construct("true; false"), ";");
        assert_eq!(blocked_construct("r_obj[0] == 'a'"), "[");
        assert_eq!(blocked_construct("{ true }"), "{");
    }

    #[test]
    fn test_field_named_like_namespace_is_allowed() {
        assert!(validate("r_sub == string").is_ok());
    }

    #[test]
    fn test_error_carries_expression() {
        let err = validate("let x = 1").unwrap_err();
        assert!(err.to_string().contains("let x = 1"));
    }
}
