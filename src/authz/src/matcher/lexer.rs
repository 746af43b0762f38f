//! Tokenizer for matcher expressions.
//!
//! The lexer is deliberately wider than the grammar: it also produces tokens
//! for constructs the grammar rejects (`=`, `->`, `;`, braces, brackets) so
//! the validator can name them precisely.

use crate::error::MatcherError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    In,
    And,    // &&
    Or,     // ||
    Not,    // !
    Eq,     // ==
    Ne,     // !=
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
    // Lexed only so the validator can reject them by name
    Assign,    // =
    Arrow,     // ->
    Semicolon, // ;
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

impl Tok {
    /// Source spelling, used in error messages
    pub(crate) fn spelling(&self) -> String {
        match self {
            Tok::Ident(s) => s.clone(),
            Tok::Str(s) => format!("'{}'", s),
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            Tok::True => "true".into(),
            Tok::False => "false".into(),
            Tok::In => "in".into(),
            Tok::And => "&&".into(),
            Tok::Or => "||".into(),
            Tok::Not => "!".into(),
            Tok::Eq => "==".into(),
            Tok::Ne => "!=".into(),
            Tok::Lt => "<".into(),
            Tok::Le => "<=".into(),
            Tok::Gt => ">".into(),
            Tok::Ge => ">=".into(),
            Tok::Plus => "+".into(),
            Tok::Minus => "-".into(),
            Tok::Star => "*".into(),
            Tok::Slash => "/".into(),
            Tok::Percent => "%".into(),
            Tok::LParen => "(".into(),
            Tok::RParen => ")".into(),
            Tok::Comma => ",".into(),
            Tok::Dot => ".".into(),
            Tok::Assign => "=".into(),
            Tok::Arrow => "->".into(),
            Tok::Semicolon => ";".into(),
            Tok::LBrace => "{".into(),
            Tok::RBrace => "}".into(),
            Tok::LBracket => "[".into(),
            Tok::RBracket => "]".into(),
        }
    }
}

/// Token plus its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub tok: Tok,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, MatcherError> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let next = bytes.get(i + 1).copied();

        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'&' if next == Some(b'&') => {
                i += 2;
                Tok::And
            }
            b'|' if next == Some(b'|') => {
                i += 2;
                Tok::Or
            }
            b'=' if next == Some(b'=') => {
                i += 2;
                Tok::Eq
            }
            b'!' if next == Some(b'=') => {
                i += 2;
                Tok::Ne
            }
            b'<' if next == Some(b'=') => {
                i += 2;
                Tok::Le
            }
            b'>' if next == Some(b'=') => {
                i += 2;
                Tok::Ge
            }
            b'-' if next == Some(b'>') => {
                i += 2;
                Tok::Arrow
            }
            b'=' => single(&mut i, Tok::Assign),
            b'!' => single(&mut i, Tok::Not),
            b'<' => single(&mut i, Tok::Lt),
            b'>' => single(&mut i, Tok::Gt),
            b'+' => single(&mut i, Tok::Plus),
            b'-' => single(&mut i, Tok::Minus),
            b'*' => single(&mut i, Tok::Star),
            b'/' => single(&mut i, Tok::Slash),
            b'%' => single(&mut i, Tok::Percent),
            b'(' => single(&mut i, Tok::LParen),
            b')' => single(&mut i, Tok::RParen),
            b',' => single(&mut i, Tok::Comma),
            b'.' => single(&mut i, Tok::Dot),
            b';' => single(&mut i, Tok::Semicolon),
            b'{' => single(&mut i, Tok::LBrace),
            b'}' => single(&mut i, Tok::RBrace),
            b'[' => single(&mut i, Tok::LBracket),
            b']' => single(&mut i, Tok::RBracket),
            b'\'' | b'"' => {
                let (s, end) = read_string(input, i)?;
                i = end;
                Tok::Str(s)
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = i + 1 < bytes.len()
                    && bytes[i] == b'.'
                    && bytes[i + 1].is_ascii_digit();
                if is_float {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text = &input[start..i];
                    Tok::Float(text.parse().map_err(|_| MatcherError::Syntax {
                        pos: start,
                        msg: format!("invalid number '{}'", text),
                    })?)
                } else {
                    let text = &input[start..i];
                    Tok::Int(text.parse().map_err(|_| MatcherError::Syntax {
                        pos: start,
                        msg: format!("integer out of range '{}'", text),
                    })?)
                }
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                match &input[start..i] {
                    "true" => Tok::True,
                    "false" => Tok::False,
                    "in" => Tok::In,
                    word => Tok::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(MatcherError::Syntax {
                    pos: start,
                    msg: format!("unexpected character '{}'", ch),
                });
            }
        };

        out.push(Spanned { tok, pos: start });
    }

    Ok(out)
}

fn single(i: &mut usize, tok: Tok) -> Tok {
    *i += 1;
    tok
}

/// Read a quoted string starting at `start`; returns the unescaped text and
/// the offset just past the closing quote.
fn read_string(input: &str, start: usize) -> Result<(String, usize), MatcherError> {
    let mut chars = input[start..].char_indices();
    let (_, quote) = chars.next().ok_or_else(|| MatcherError::Syntax {
        pos: start,
        msg: "expected string".to_string(),
    })?;

    let mut out = String::new();
    let mut escaped = false;
    for (offset, ch) in chars {
        if escaped {
            out.push(match ch {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Ok((out, start + offset + ch.len_utf8()));
        } else {
            out.push(ch);
        }
    }

    Err(MatcherError::Syntax {
        pos: start,
        msg: "unterminated string literal".to_string(),
    })
}
