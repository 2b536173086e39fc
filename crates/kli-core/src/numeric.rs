use crate::KliError;

/// Floating point type used throughout the engine
pub type Real = f64;

/// Comparison tolerances for derived values
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    if a == b {
        // covers matching infinities
        return true;
    }
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

/// Rejects NaN. Infinite values are legal (open bounds are infinite).
pub fn ensure_not_nan(v: Real, what: &'static str) -> Result<Real, KliError> {
    if v.is_nan() {
        Err(KliError::NonFinite { what, value: v })
    } else {
        Ok(v)
    }
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, KliError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(KliError::NonFinite { what, value: v })
    }
}
