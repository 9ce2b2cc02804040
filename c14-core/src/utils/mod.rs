pub mod linear_algebra;

use num::Float;

/// Largest value ignoring NaN. NaN when nothing but NaN is present.
pub fn nan_max<F: Float, I: IntoIterator<Item = F>>(values: I) -> F {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(F::nan(), |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}
