//! Closed-form literal grammar for run-result cells.
//!
//! Result files carry Python-literal shaped values: numbers (including the
//! bare tokens `inf`, `-inf` and `nan`), `True`/`False`/`None`, quoted
//! strings, tuples, lists and dicts whose keys are integers, strings or
//! tuples of those. This module parses exactly that grammar and nothing
//! more, and renders values back in the same shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors raised while parsing a literal
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("value {0} cannot be used as a dict key")]
    InvalidKey(String),

    #[error("trailing input at offset {0}")]
    Trailing(usize),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest container nesting accepted in one cell
pub const MAX_DEPTH: usize = 32;

/// Hashable dict key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Str(String),
    Tuple(Vec<Key>),
}

impl Key {
    fn from_literal(value: Literal) -> Result<Self, LiteralError> {
        match value {
            Literal::Int(i) => Ok(Key::Int(i)),
            Literal::Bool(b) => Ok(Key::Int(b as i64)),
            Literal::Str(s) => Ok(Key::Str(s)),
            Literal::Tuple(items) => items
                .into_iter()
                .map(Key::from_literal)
                .collect::<Result<Vec<_>, _>>()
                .map(Key::Tuple),
            other => Err(LiteralError::InvalidKey(other.to_string())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => write!(f, "'{}'", s),
            Key::Tuple(items) => write_sequence(f, "(", ")", items, items.len() == 1),
        }
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<(u32, u32)> for Key {
    fn from((a, b): (u32, u32)) -> Self {
        Key::Tuple(vec![Key::Int(a as i64), Key::Int(b as i64)])
    }
}

/// A parsed result-file value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Dict(Vec<(Key, Literal)>),
}

impl Literal {
    /// Numeric view of scalars. Booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(x) => Some(*x),
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Key, Literal)]> {
        match self {
            Literal::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Literal::Dict(_))
    }

    /// Every number reachable from this value, descending into containers.
    pub fn numbers(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.collect_numbers(&mut out);
        out
    }

    fn collect_numbers(&self, out: &mut Vec<f64>) {
        match self {
            Literal::Int(_) | Literal::Float(_) => out.extend(self.as_f64()),
            Literal::Tuple(items) | Literal::List(items) => {
                items.iter().for_each(|i| i.collect_numbers(out))
            }
            Literal::Dict(entries) => entries.iter().for_each(|(_, v)| v.collect_numbers(out)),
            _ => {}
        }
    }

    /// Build a dict literal from `(key, number)` pairs
    pub fn float_dict<K, I>(entries: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Literal::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Literal::Float(v)))
                .collect(),
        )
    }

    pub fn int_dict<K, I>(entries: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, u64)>,
    {
        Literal::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Literal::Int(v as i64)))
                .collect(),
        )
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

/// Render a float the way the result files spell it
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        let s = format!("{}", value);
        if s.contains('.') || s.contains('e') {
            s
        } else {
            format!("{}.0", s)
        }
    }
}

fn write_sequence<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    close: &str,
    items: &[T],
    trailing_comma: bool,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    if trailing_comma {
        f.write_str(",")?;
    }
    f.write_str(close)
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => f.write_str(&format_float(*x)),
            Literal::Str(s) => write!(f, "'{}'", s),
            Literal::Tuple(items) => write_sequence(f, "(", ")", items, items.len() == 1),
            Literal::List(items) => write_sequence(f, "[", "]", items, false),
            Literal::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl FromStr for Literal {
    type Err = LiteralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s.as_bytes(), pos: 0, depth: 0 };
        let value = parser.value()?;
        parser.skip_ws();
        if parser.pos != parser.input.len() {
            return Err(LiteralError::Trailing(parser.pos));
        }
        Ok(value)
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn unexpected(&self) -> LiteralError {
        match self.input.get(self.pos) {
            Some(&b) => LiteralError::Unexpected { found: b as char, offset: self.pos },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(LiteralError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = self.item();
        self.depth -= 1;
        value
    }

    fn item(&mut self) -> Result<Literal, LiteralError> {
        match self.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some(b'{') => self.dict(),
            Some(b'[') => self.sequence(b'[', b']').map(|(items, _)| Literal::List(items)),
            Some(b'(') => {
                let (mut items, trailing_comma) = self.sequence(b'(', b')')?;
                // `(x)` is just `x`, `(x,)` is a one-tuple
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Literal::Tuple(items))
                }
            }
            Some(b'\'') | Some(b'"') => self.string(),
            Some(b) if b.is_ascii_alphabetic() => self.word(),
            Some(b) if b.is_ascii_digit() || b == b'-' || b == b'+' || b == b'.' => self.number(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn sequence(&mut self, open: u8, close: u8) -> Result<(Vec<Literal>, bool), LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = false;
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(b) if b == close => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn dict(&mut self) -> Result<Literal, LiteralError> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Dict(entries));
            }
            let key = Key::from_literal(self.value()?)?;
            self.expect(b':')?;
            let value = self.value()?;
            entries.push((key, value));
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn string(&mut self) -> Result<Literal, LiteralError> {
        let quote = self.input[self.pos];
        self.pos += 1;
        let start = self.pos;
        while let Some(&b) = self.input.get(self.pos) {
            if b == quote {
                let s = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(Literal::Str(s));
            }
            self.pos += 1;
        }
        Err(LiteralError::UnexpectedEnd)
    }

    fn word(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        match &self.input[start..self.pos] {
            b"True" => Ok(Literal::Bool(true)),
            b"False" => Ok(Literal::Bool(false)),
            b"None" => Ok(Literal::None),
            b"inf" => Ok(Literal::Float(f64::INFINITY)),
            b"nan" => Ok(Literal::Float(f64::NAN)),
            _ => {
                self.pos = start;
                Err(self.unexpected())
            }
        }
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        if matches!(self.input[self.pos], b'-' | b'+') {
            self.pos += 1;
        }
        if self.input[self.pos..].starts_with(b"inf") {
            self.pos += 3;
            let negative = self.input[start] == b'-';
            return Ok(Literal::Float(if negative { f64::NEG_INFINITY } else { f64::INFINITY }));
        }
        let mut is_float = false;
        while let Some(&b) = self.input.get(self.pos) {
            match b {
                b'0'..=b'9' => {}
                b'.' | b'e' | b'E' => is_float = true,
                b'-' | b'+' if matches!(self.input[self.pos - 1], b'e' | b'E') => {}
                _ => break,
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| LiteralError::InvalidNumber(String::new()))?;
        if is_float {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| LiteralError::InvalidNumber(text.to_string()))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| LiteralError::InvalidNumber(text.to_string()))
        }
    }
}
