//! Physical dimensions used for carbon stock and flux units.
//!
//! Only the three base quantities that appear in land carbon bookkeeping
//! are tracked: mass, length and time. Stocks are `M L^-2`, fluxes are
//! `M L^-2 T^-1`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Mul, Neg, Sub};

/// Integer exponents of the base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
}

impl Dimension {
    #[must_use]
    pub const fn new(mass: i8, length: i8, time: i8) -> Self {
        Self { mass, length, time }
    }

    #[must_use]
    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0)
    }

    pub const MASS: Self = Self::new(1, 0, 0);
    pub const LENGTH: Self = Self::new(0, 1, 0);
    pub const TIME: Self = Self::new(0, 0, 1);
    pub const AREA: Self = Self::new(0, 2, 0);

    /// Carbon per unit area, e.g. `gC/m2`.
    pub const AREAL_DENSITY: Self = Self::new(1, -2, 0);

    /// Carbon per unit area per unit time, e.g. `gC/m2/day`.
    pub const AREAL_FLUX: Self = Self::new(1, -2, -1);

    #[must_use]
    pub const fn is_dimensionless(&self) -> bool {
        self.mass == 0 && self.length == 0 && self.time == 0
    }

    #[must_use]
    pub const fn pow(&self, exp: i8) -> Self {
        Self::new(self.mass * exp, self.length * exp, self.time * exp)
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
        )
    }
}

impl Sub for Dimension {
    type Output = Self;

    /// Division of quantities subtracts exponents.
    fn sub(self, rhs: Self) -> Self::Output {
        self * -rhs
    }
}

impl Neg for Dimension {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.pow(-1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let parts: Vec<String> = [(self.mass, "M"), (self.length, "L"), (self.time, "T")]
            .into_iter()
            .filter(|(exp, _)| *exp != 0)
            .map(|(exp, sym)| match exp {
                1 => sym.to_string(),
                _ => format!("{sym}^{exp}"),
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_is_density_per_time() {
        assert_eq!(Dimension::AREAL_DENSITY - Dimension::TIME, Dimension::AREAL_FLUX);
        assert_eq!(Dimension::MASS - Dimension::AREA, Dimension::AREAL_DENSITY);
    }

    #[test]
    fn display() {
        assert_eq!(Dimension::dimensionless().to_string(), "dimensionless");
        assert_eq!(Dimension::AREAL_FLUX.to_string(), "M L^-2 T^-1");
        assert_eq!(Dimension::LENGTH.pow(2).to_string(), "L^2");
    }
}
