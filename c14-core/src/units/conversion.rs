use super::dimension::Dimension;
use super::parser::{ParsedUnit, UnitParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("cannot convert from '{from_unit}' to '{to_unit}': incompatible dimensions ({from} vs {to})")]
    IncompatibleDimensions {
        from: Dimension,
        to: Dimension,
        from_unit: String,
        to_unit: String,
    },
    #[error("unit parse error: {0}")]
    Parse(#[from] UnitParseError),
}

/// A parsed unit that remembers how it was spelled.
///
/// Equality compares the parsed form: `gC/m2/day` equals `gC m-2 day-1`.
/// `d` and `day` stay distinct symbols even though they convert one to one.
///
/// ```
/// use c14_core::units::Unit;
///
/// let monthly = Unit::parse("gC/m2/month").unwrap();
/// let daily = Unit::parse("gC m-2 d-1").unwrap();
/// let factor = monthly.conversion_factor(&daily).unwrap();
/// assert!((factor - 1.0 / 30.4375).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    original: String,
    parsed: ParsedUnit,
}

impl Unit {
    pub fn parse(input: &str) -> Result<Self, UnitParseError> {
        Ok(Self {
            original: input.to_string(),
            parsed: ParsedUnit::parse(input)?,
        })
    }

    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn parsed(&self) -> &ParsedUnit {
        &self.parsed
    }

    #[must_use]
    pub fn normalized(&self) -> String {
        self.parsed.normalized()
    }

    pub fn dimension(&self) -> Result<Dimension, UnitParseError> {
        self.parsed.dimension()
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        matches!((self.dimension(), other.dimension()), (Ok(a), Ok(b)) if a == b)
    }

    /// Divides this unit by `other`, e.g. a stock unit by `day` to get a rate.
    #[must_use]
    pub fn per(&self, other: &Self) -> Self {
        Self {
            original: format!("({})/({})", self.original, other.original),
            parsed: self.parsed.divide(&other.parsed),
        }
    }

    /// Multiplier taking a value in `self` to a value in `target`.
    pub fn conversion_factor(&self, target: &Self) -> Result<f64, ConversionError> {
        let from = self.dimension()?;
        let to = target.dimension()?;
        if from != to {
            return Err(ConversionError::IncompatibleDimensions {
                from,
                to,
                from_unit: self.original.clone(),
                to_unit: target.original.clone(),
            });
        }
        Ok(self.parsed.to_reference_factor()? / target.parsed.to_reference_factor()?)
    }

    pub fn convert(&self, value: f64, target: &Self) -> Result<f64, ConversionError> {
        Ok(value * self.conversion_factor(target)?)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Conversion factor between two unit strings.
pub fn conversion_factor(from: &str, to: &str) -> Result<f64, ConversionError> {
    Unit::parse(from)?.conversion_factor(&Unit::parse(to)?)
}
