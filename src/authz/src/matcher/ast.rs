//! Expression AST and recursive-descent parser.
//!
//! Grammar (lowest to highest precedence):
//!   expr    = or
//!   or      = and ( '||' and )*
//!   and     = cmp ( '&&' cmp )*
//!   cmp     = sum ( ( '==' | '!=' | '<' | '<=' | '>' | '>=' ) sum )?
//!           | sum 'in' '(' expr ( ',' expr )* ')'
//!   sum     = product ( ( '+' | '-' ) product )*
//!   product = unary ( ( '*' | '/' | '%' ) unary )*
//!   unary   = ( '!' | '-' ) unary | postfix
//!   postfix = primary ( '.' ident )*
//!   primary = literal | ident | ident '(' args ')' | '(' expr ')'

use super::lexer::{Spanned, Tok};
use super::value::Value;
use crate::error::MatcherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Bound name such as `r_sub` or `p_obj`
    Field(String),
    /// `base.name`
    Attr(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `needle in (a, b, ...)`
    In(Box<Expr>, Vec<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Visit every function name called anywhere in the tree
    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match self {
            Expr::Literal(_) | Expr::Field(_) => {}
            Expr::Attr(base, _) => base.for_each_call(f),
            Expr::Unary(_, inner) => inner.for_each_call(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.for_each_call(f);
                rhs.for_each_call(f);
            }
            Expr::In(needle, haystack) => {
                needle.for_each_call(f);
                haystack.iter().for_each(|e| e.for_each_call(f));
            }
            Expr::Call(name, args) => {
                f(name);
                args.iter().for_each(|e| e.for_each_call(f));
            }
        }
    }
}

pub(crate) fn parse(tokens: &[Spanned], source_len: usize) -> Result<Expr, MatcherError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source_len,
    };
    let expr = parser.expr()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(MatcherError::Syntax {
            pos: extra.pos,
            msg: format!("unexpected '{}'", extra.tok.spelling()),
        });
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    source_len: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Tok> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn peek_spanned(&self) -> Option<&'t Spanned> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Tok> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map(|s| s.pos).unwrap_or(self.source_len)
    }

    fn error(&self, msg: impl Into<String>) -> MatcherError {
        MatcherError::Syntax {
            pos: self.offset(),
            msg: msg.into(),
        }
    }

    fn expect(&mut self, want: Tok) -> Result<(), MatcherError> {
        match self.peek() {
            Some(tok) if *tok == want => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.error(format!(
                "expected '{}', found '{}'",
                want.spelling(),
                tok.spelling()
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", want.spelling()))),
        }
    }

    fn expr(&mut self) -> Result<Expr, MatcherError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, MatcherError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, MatcherError> {
        let mut lhs = self.cmp()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let rhs = self.cmp()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Expr, MatcherError> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Tok::Eq) => BinOp::Eq,
            Some(Tok::Ne) => BinOp::Ne,
            Some(Tok::Lt) => BinOp::Lt,
            Some(Tok::Le) => BinOp::Le,
            Some(Tok::Gt) => BinOp::Gt,
            Some(Tok::Ge) => BinOp::Ge,
            Some(Tok::In) => {
                self.pos += 1;
                return self.in_list(lhs);
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.sum()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn in_list(&mut self, needle: Expr) -> Result<Expr, MatcherError> {
        self.expect(Tok::LParen)?;
        let items = self.comma_list()?;
        Ok(Expr::In(Box::new(needle), items))
    }

    /// Parses `a, b, c )`; the opening paren has been consumed
    fn comma_list(&mut self) -> Result<Vec<Expr>, MatcherError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            match self.bump() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => return Ok(items),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected ',' or ')'"));
                }
            }
        }
    }

    fn sum(&mut self) -> Result<Expr, MatcherError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn product(&mut self) -> Result<Expr, MatcherError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, MatcherError> {
        match self.peek() {
            Some(Tok::Not) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Some(Tok::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, MatcherError> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Tok::Dot) {
            self.pos += 1;
            match self.bump() {
                Some(Tok::Ident(name)) => expr = Expr::Attr(Box::new(expr), name.clone()),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected attribute name after '.'"));
                }
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, MatcherError> {
        let Some(tok) = self.peek() else {
            return Err(self.error("unexpected end of expression"));
        };

        let expr = match tok {
            Tok::True => Expr::Literal(Value::Bool(true)),
            Tok::False => Expr::Literal(Value::Bool(false)),
            Tok::Int(i) => Expr::Literal(Value::Int(*i)),
            Tok::Float(f) => Expr::Literal(Value::Float(*f)),
            Tok::Str(s) => Expr::Literal(Value::Str(s.clone())),
            Tok::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                return Ok(inner);
            }
            Tok::Ident(name) => {
                self.pos += 1;
                if self.peek() == Some(&Tok::LParen) {
                    self.pos += 1;
                    let args = self.comma_list()?;
                    return Ok(Expr::Call(name.clone(), args));
                }
                return Ok(Expr::Field(name.clone()));
            }
            other => return Err(self.error(format!("unexpected '{}'", other.spelling()))),
        };

        self.pos += 1;
        Ok(expr)
    }
}
