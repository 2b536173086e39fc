//! Multi-variable dual numbers for forward-mode AD.
//!
//! `value` is the real part; `partials` holds one infinitesimal component per
//! seed variable, keyed by the handle of the Parameter that seeded it. Missing
//! keys are zero.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::{ParamId, Real};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dual {
    pub value: Real,
    pub partials: BTreeMap<ParamId, Real>,
}

impl Dual {
    pub fn constant(value: Real) -> Self {
        Self {
            value,
            partials: BTreeMap::new(),
        }
    }

    /// A seed: d(self)/d(id) = 1.
    pub fn variable(id: ParamId, value: Real) -> Self {
        Self {
            value,
            partials: BTreeMap::from([(id, 1.0)]),
        }
    }

    pub fn partial(&self, id: ParamId) -> Real {
        self.partials.get(&id).copied().unwrap_or(0.0)
    }

    /// Chain rule for a unary function with value `f` and derivative `df`.
    fn chain(&self, f: Real, df: Real) -> Self {
        Self {
            value: f,
            partials: self.partials.iter().map(|(&k, &d)| (k, d * df)).collect(),
        }
    }

    /// Linear combination `a*self + b*other` on the partials.
    fn combine(&self, a: Real, other: &Self, b: Real, value: Real) -> Self {
        let mut partials: BTreeMap<ParamId, Real> =
            self.partials.iter().map(|(&k, &d)| (k, a * d)).collect();
        for (&k, &d) in &other.partials {
            *partials.entry(k).or_insert(0.0) += b * d;
        }
        Self { value, partials }
    }

    pub fn exp(&self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    pub fn ln(&self) -> Self {
        self.chain(self.value.ln(), 1.0 / self.value)
    }

    pub fn log10(&self) -> Self {
        self.chain(
            self.value.log10(),
            1.0 / (self.value * std::f64::consts::LN_10),
        )
    }

    pub fn sin(&self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    pub fn cos(&self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }

    pub fn tan(&self) -> Self {
        let t = self.value.tan();
        self.chain(t, 1.0 + t * t)
    }

    pub fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s)
    }

    /// x^y = exp(y * ln(x)); the ln(x) term is skipped when y is constant so
    /// that negative bases with integral exponents stay finite.
    pub fn powf(&self, exponent: &Self) -> Self {
        let val_pow = self.value.powf(exponent.value);
        let d_base = exponent.value * self.value.powf(exponent.value - 1.0);
        if exponent.partials.is_empty() {
            return self.chain(val_pow, d_base);
        }
        let d_exp = val_pow * self.value.ln();
        self.combine(d_base, exponent, d_exp, val_pow)
    }
}

impl Add for &Dual {
    type Output = Dual;
    fn add(self, rhs: &Dual) -> Dual {
        self.combine(1.0, rhs, 1.0, self.value + rhs.value)
    }
}

impl Sub for &Dual {
    type Output = Dual;
    fn sub(self, rhs: &Dual) -> Dual {
        self.combine(1.0, rhs, -1.0, self.value - rhs.value)
    }
}

impl Mul for &Dual {
    type Output = Dual;
    fn mul(self, rhs: &Dual) -> Dual {
        self.combine(rhs.value, rhs, self.value, self.value * rhs.value)
    }
}

impl Div for &Dual {
    type Output = Dual;
    fn div(self, rhs: &Dual) -> Dual {
        let denom = rhs.value * rhs.value;
        self.combine(
            1.0 / rhs.value,
            rhs,
            -self.value / denom,
            self.value / rhs.value,
        )
    }
}

impl Neg for &Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        self.chain(-self.value, -1.0)
    }
}

impl From<Real> for Dual {
    fn from(value: Real) -> Self {
        Self::constant(value)
    }
}
