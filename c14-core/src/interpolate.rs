//! One-dimensional interpolation of tabulated data.

use crate::errors::{C14Error, C14Result};
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Index `i` of the segment `[xs[i], xs[i + 1]]` used for `x`.
///
/// Points left of the table map to the first segment and points right of it
/// to the last, so the result is always a valid segment for `xs.len() >= 2`.
pub fn find_segment(xs: &[FloatValue], x: FloatValue) -> usize {
    let at_or_below = xs.partition_point(|&v| v <= x);
    at_or_below.saturating_sub(1).min(xs.len().saturating_sub(2))
}

pub trait InterpolationStrategy {
    fn interpolate(&self, xs: &[FloatValue], ys: &[FloatValue], x: FloatValue)
        -> C14Result<FloatValue>;
}

/// Straight lines between neighbouring points.
///
/// Outside the table the end segments are continued when `extrapolate` is
/// set, otherwise [`C14Error::ExtrapolationNotAllowed`] is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSplineStrategy {
    extrapolate: bool,
}

impl LinearSplineStrategy {
    pub fn new(extrapolate: bool) -> Self {
        Self { extrapolate }
    }
}

impl InterpolationStrategy for LinearSplineStrategy {
    fn interpolate(
        &self,
        xs: &[FloatValue],
        ys: &[FloatValue],
        x: FloatValue,
    ) -> C14Result<FloatValue> {
        let (lower, upper) = match (xs.first(), xs.last()) {
            (Some(&lower), Some(&upper)) if xs.len() >= 2 => (lower, upper),
            _ => {
                return Err(C14Error::InvalidArgument(
                    "linear interpolation needs at least two points".into(),
                ))
            }
        };
        if !self.extrapolate && !(lower..=upper).contains(&x) {
            return Err(C14Error::ExtrapolationNotAllowed {
                target: x,
                lower,
                upper,
            });
        }

        let i = find_segment(xs, x);
        let gradient = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]);
        Ok(ys[i] + gradient * (x - xs[i]))
    }
}

/// A table of `(x, y)` points together with the rule for reading between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolator<S: InterpolationStrategy> {
    xs: Vec<FloatValue>,
    ys: Vec<FloatValue>,
    strategy: S,
}

impl<S: InterpolationStrategy> Interpolator<S> {
    /// Builds an interpolator, sorting the points by `x`.
    ///
    /// Fails if the lengths differ, `x` values are missing or repeated, or
    /// fewer than two points are given.
    pub fn new(xs: Vec<FloatValue>, ys: Vec<FloatValue>, strategy: S) -> C14Result<Self> {
        if xs.len() != ys.len() {
            return Err(C14Error::InvalidArgument(format!(
                "interpolation table has {} x values but {} y values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(C14Error::InvalidArgument(
                "interpolation table needs at least two points".into(),
            ));
        }
        if xs.iter().any(|x| x.is_nan()) {
            return Err(C14Error::InvalidArgument(
                "interpolation table contains a missing x value".into(),
            ));
        }

        let mut points: Vec<_> = xs.into_iter().zip(ys).collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(w) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(C14Error::InvalidArgument(format!(
                "interpolation table repeats x = {}",
                w[0].0
            )));
        }
        let (xs, ys) = points.into_iter().unzip();
        Ok(Self { xs, ys, strategy })
    }

    pub fn interpolate(&self, x: FloatValue) -> C14Result<FloatValue> {
        self.strategy.interpolate(&self.xs, &self.ys, x)
    }

    pub fn xs(&self) -> &[FloatValue] {
        &self.xs
    }

    pub fn ys(&self) -> &[FloatValue] {
        &self.ys
    }

    /// Smallest and largest tabulated `x`.
    pub fn range(&self) -> (FloatValue, FloatValue) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }
}
