//! Conditional predicates.
//!
//! ```text
//! expr    := or
//! or      := and ( "or" and )*
//! and     := unary ( "and" unary )*
//! unary   := "not" unary | "(" expr ")" | compare
//! compare := operand ( op operand )?
//! op      := "=" | "==" | "!=" | "<>" | "<" | ">" | "<=" | ">="
//! operand := field | string | number | "true" | "false" | "null"
//! ```
//!
//! Keywords ignore case. Strings may use typographic double quotes, which
//! spreadsheet autocorrect inserts.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use logos::Logos;
use thiserror::Error;

use autoreport_model::{FieldPath, Value};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct PredicateError {
    pub message: String,
    pub offset: usize,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[regex(r#""[^"]*""#, |lex| {
        let slice = lex.slice();
        slice[1..slice.len() - 1].to_string()
    })]
    Str(String),
    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r"[A-Za-z_@][A-Za-z0-9_\-]*(\.[A-Za-z_@][A-Za-z0-9_\-]*)?", |lex| lex.slice().to_string())]
    Ident(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    fn holds(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => left.loosely_equals(right),
            Self::Ne => !left.loosely_equals(right),
            Self::Lt => left.compare(right) == Some(Ordering::Less),
            Self::Gt => left.compare(right) == Some(Ordering::Greater),
            Self::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
            Self::Ge => matches!(
                left.compare(right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(FieldPath),
    Literal(Value),
}

impl Operand {
    fn value<F>(&self, lookup: &F) -> Value
    where
        F: Fn(&FieldPath) -> Value,
    {
        match self {
            Self::Field(field) => lookup(field),
            Self::Literal(value) => value.clone(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{field}"),
            Self::Literal(Value::Text(text)) => write!(f, "\"{text}\""),
            Self::Literal(Value::Null) => f.write_str("null"),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// A compiled predicate. Evaluation is a pure function of the field lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Truthy(Operand),
}

impl Predicate {
    pub fn parse(text: &str) -> Result<Self, PredicateError> {
        let normalized: String = text
            .chars()
            .map(|ch| match ch {
                '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' => '"',
                other => other,
            })
            .collect();
        let mut tokens = Vec::new();
        let mut lexer = Tok::lexer(&normalized);
        while let Some(token) = lexer.next() {
            let span = lexer.span();
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(PredicateError {
                        message: format!("unexpected '{}'", lexer.slice()),
                        offset: span.start,
                    });
                }
            }
        }
        let mut parser = PredicateParser {
            tokens,
            position: 0,
            end: normalized.len(),
        };
        let predicate = parser.or()?;
        if let Some((_, span)) = parser.tokens.get(parser.position) {
            return Err(PredicateError {
                message: "unexpected trailing input".to_string(),
                offset: span.start,
            });
        }
        Ok(predicate)
    }

    pub fn evaluate<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&FieldPath) -> Value,
    {
        match self {
            Self::Or(left, right) => left.evaluate(lookup) || right.evaluate(lookup),
            Self::And(left, right) => left.evaluate(lookup) && right.evaluate(lookup),
            Self::Not(inner) => !inner.evaluate(lookup),
            Self::Compare { left, op, right } => {
                op.holds(&left.value(lookup), &right.value(lookup))
            }
            Self::Truthy(operand) => operand.value(lookup).is_truthy(),
        }
    }

    /// Every field the predicate reads, in source order.
    pub fn fields(&self) -> Vec<&FieldPath> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Self::Or(left, right) | Self::And(left, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Self::Not(inner) => inner.collect_fields(out),
            Self::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Field(field) = operand {
                        out.push(field);
                    }
                }
            }
            Self::Truthy(Operand::Field(field)) => out.push(field),
            Self::Truthy(Operand::Literal(_)) => {}
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Or(left, right) => write!(f, "({left} or {right})"),
            Self::And(left, right) => write!(f, "({left} and {right})"),
            Self::Not(inner) => write!(f, "not {inner}"),
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::Truthy(operand) => write!(f, "{operand}"),
        }
    }
}

struct PredicateParser {
    tokens: Vec<(Tok, Range<usize>)>,
    position: usize,
    end: usize,
}

impl PredicateParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.end, |(_, span)| span.start)
    }

    fn error(&self, message: impl Into<String>) -> PredicateError {
        PredicateError {
            message: message.into(),
            offset: self.offset(),
        }
    }

    fn keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn or(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.and()?;
        while self.keyword("or") {
            self.position += 1;
            let right = self.and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.unary()?;
        while self.keyword("and") {
            self.position += 1;
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Predicate, PredicateError> {
        if self.keyword("not") {
            self.position += 1;
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Tok::LParen) {
            self.position += 1;
            let inner = self.or()?;
            if self.peek() != Some(&Tok::RParen) {
                return Err(self.error("expected ')'"));
            }
            self.position += 1;
            return Ok(inner);
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Predicate, PredicateError> {
        let left = self.operand()?;
        let op = match self.peek() {
            Some(Tok::Eq) => CompareOp::Eq,
            Some(Tok::Ne) => CompareOp::Ne,
            Some(Tok::Lt) => CompareOp::Lt,
            Some(Tok::Gt) => CompareOp::Gt,
            Some(Tok::Le) => CompareOp::Le,
            Some(Tok::Ge) => CompareOp::Ge,
            _ => return Ok(Predicate::Truthy(left)),
        };
        self.position += 1;
        let right = self.operand()?;
        Ok(Predicate::Compare { left, op, right })
    }

    fn operand(&mut self) -> Result<Operand, PredicateError> {
        let Some((token, _)) = self.tokens.get(self.position).cloned() else {
            return Err(self.error("expected a field or value"));
        };
        let operand = match token {
            Tok::Str(text) => Operand::Literal(Value::Text(text)),
            Tok::Number(number) => Operand::Literal(Value::Number(number)),
            Tok::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Operand::Literal(Value::Boolean(true)),
                "false" => Operand::Literal(Value::Boolean(false)),
                "null" => Operand::Literal(Value::Null),
                "and" | "or" | "not" => {
                    return Err(self.error(format!("unexpected keyword '{word}'")));
                }
                _ => Operand::Field(
                    word.parse::<FieldPath>()
                        .map_err(|_| self.error(format!("invalid field '{word}'")))?,
                ),
            },
            other => return Err(self.error(format!("unexpected {other:?}"))),
        };
        self.position += 1;
        Ok(operand)
    }
}
