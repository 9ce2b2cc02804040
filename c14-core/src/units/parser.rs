//! Parser for unit strings as they appear in dataset attributes.
//!
//! Accepted forms include `gC/m2/day`, `gC m-2 d-1`, `gC m^-2 day^-1`,
//! `gC per m**2 per month` and `(gC/m2)/day`.
//!
//! ```text
//! expression = term (('/' | 'per') term)*
//! term       = factor (('*' | '·' | ' ') factor)*
//! factor     = (symbol | '(' expression ')') exponent?
//! exponent   = ('^' | '**')? '-'? digits
//! ```

use super::dimension::Dimension;
use super::registry::UNIT_REGISTRY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitParseError {
    #[error("empty unit string")]
    Empty,
    #[error("unknown unit: '{0}'")]
    UnknownUnit(String),
    #[error("invalid exponent: '{0}'")]
    InvalidExponent(String),
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },
    #[error("{0}")]
    Malformed(String),
}

/// A unit as a product of registered symbols raised to integer powers.
///
/// `gC/m2/day` is held as `{day: -1, gC: 1, m: -2}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedUnit {
    components: BTreeMap<String, i32>,
}

impl ParsedUnit {
    #[must_use]
    pub fn dimensionless() -> Self {
        Self::default()
    }

    fn single(symbol: String, exp: i32) -> Self {
        Self::from_components([(symbol, exp)].into_iter().collect())
    }

    #[must_use]
    pub fn from_components(components: BTreeMap<String, i32>) -> Self {
        Self {
            components: components
                .into_iter()
                .filter(|(_, exp)| *exp != 0)
                .collect(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, UnitParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(UnitParseError::Empty);
        }
        if input == "1" || input.eq_ignore_ascii_case("dimensionless") {
            return Ok(Self::dimensionless());
        }

        let mut parser = UnitParser::new(input);
        let parsed = parser.parse_expression()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(parsed),
            Some(found) => Err(UnitParseError::UnexpectedChar {
                found,
                position: parser.pos,
            }),
        }
    }

    #[must_use]
    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    pub fn dimension(&self) -> Result<Dimension, UnitParseError> {
        self.components
            .iter()
            .try_fold(Dimension::dimensionless(), |acc, (symbol, &exp)| {
                let info = UNIT_REGISTRY
                    .lookup(symbol)
                    .ok_or_else(|| UnitParseError::UnknownUnit(symbol.clone()))?;
                Ok(acc * info.dimension.pow(exp as i8))
            })
    }

    /// Multiplier from this unit to the `kg`, `m`, `s` reference units.
    pub fn to_reference_factor(&self) -> Result<f64, UnitParseError> {
        self.components
            .iter()
            .try_fold(1.0, |acc, (symbol, &exp)| {
                let info = UNIT_REGISTRY
                    .lookup(symbol)
                    .ok_or_else(|| UnitParseError::UnknownUnit(symbol.clone()))?;
                Ok(acc * info.to_reference.powi(exp))
            })
    }

    fn combine(&self, other: &Self, sign: i32) -> Self {
        let mut components = self.components.clone();
        for (symbol, exp) in &other.components {
            *components.entry(symbol.clone()).or_insert(0) += sign * exp;
        }
        Self::from_components(components)
    }

    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        self.combine(other, 1)
    }

    #[must_use]
    pub fn divide(&self, other: &Self) -> Self {
        self.combine(other, -1)
    }

    #[must_use]
    pub fn pow(&self, exp: i32) -> Self {
        Self::from_components(
            self.components
                .iter()
                .map(|(symbol, e)| (symbol.clone(), e * exp))
                .collect(),
        )
    }

    /// Canonical spelling: positive powers, then `/`, then negative powers.
    #[must_use]
    pub fn normalized(&self) -> String {
        let render = |positive: bool| -> String {
            self.components
                .iter()
                .filter(|(_, &exp)| (exp > 0) == positive)
                .map(|(symbol, &exp)| match exp.abs() {
                    1 => symbol.clone(),
                    e => format!("{symbol}^{e}"),
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        let numerator = render(true);
        let denominator = render(false);
        match (numerator.is_empty(), denominator.is_empty()) {
            (true, true) => "1".to_string(),
            (false, true) => numerator,
            (true, false) => format!("1 / {denominator}"),
            (false, false) => format!("{numerator} / {denominator}"),
        }
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

struct UnitParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> UnitParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expression(&mut self) -> Result<ParsedUnit, UnitParseError> {
        let mut result = self.parse_term()?;
        loop {
            self.skip_whitespace();
            if self.eat('/') || self.eat_keyword("per") {
                let divisor = self.parse_term()?;
                result = result.divide(&divisor);
            } else {
                return Ok(result);
            }
        }
    }

    fn parse_term(&mut self) -> Result<ParsedUnit, UnitParseError> {
        let mut result = self.parse_factor()?;
        loop {
            self.skip_whitespace();
            if self.eat('*') || self.eat('\u{00B7}') {
                let factor = self.parse_factor()?;
                result = result.multiply(&factor);
                continue;
            }
            match self.peek() {
                Some(c) if (c.is_ascii_alphabetic() || c == '(') && !self.at_keyword("per") => {
                    let factor = self.parse_factor()?;
                    result = result.multiply(&factor);
                }
                _ => return Ok(result),
            }
        }
    }

    fn parse_factor(&mut self) -> Result<ParsedUnit, UnitParseError> {
        self.skip_whitespace();
        if self.eat('(') {
            let inner = self.parse_expression()?;
            self.skip_whitespace();
            if !self.eat(')') {
                return Err(UnitParseError::Malformed(
                    "missing closing parenthesis".into(),
                ));
            }
            let exp = self.parse_optional_exponent()?;
            return Ok(inner.pow(exp));
        }

        let symbol = self.parse_symbol()?;
        let exp = self.parse_optional_exponent()?;
        Ok(ParsedUnit::single(symbol, exp))
    }

    /// Reads a symbol, leaving trailing digits for the exponent unless the
    /// whole token is itself a registered unit.
    fn parse_symbol(&mut self) -> Result<String, UnitParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        let token = &self.input[start..self.pos];
        if token.is_empty() {
            return match self.peek() {
                Some(found) => Err(UnitParseError::UnexpectedChar {
                    found,
                    position: self.pos,
                }),
                None => Err(UnitParseError::Malformed("expected unit symbol".into())),
            };
        }

        let base_len = token.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if base_len == 0 {
            return Err(UnitParseError::UnknownUnit(token.to_string()));
        }
        if base_len < token.len() && UNIT_REGISTRY.lookup(token).is_none() {
            self.pos = start + base_len;
            return Ok(token[..base_len].to_string());
        }
        Ok(token.to_string())
    }

    fn parse_optional_exponent(&mut self) -> Result<i32, UnitParseError> {
        let before = self.pos;
        self.skip_whitespace();
        let had_marker = self.eat_str("**") || self.eat('^');
        if had_marker {
            self.skip_whitespace();
        } else {
            self.pos = before;
        }
        match self.peek() {
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_exponent(),
            _ if had_marker => Err(UnitParseError::Malformed(
                "expected exponent after '^'".into(),
            )),
            _ => Ok(1),
        }
    }

    fn parse_exponent(&mut self) -> Result<i32, UnitParseError> {
        let start = self.pos;
        self.eat('-');
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        text.parse()
            .map_err(|_| UnitParseError::InvalidExponent(text.to_string()))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.starts_with(keyword)
            && !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric())
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }
}
