//! Unit-tagged scalar magnitudes.

use core::fmt;

use crate::units::Unit;
use crate::{KliError, KliResult, Real};

/// A magnitude expressed in a (possibly compound) registry unit.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quantity {
    magnitude: Real,
    unit: Unit,
}

impl Quantity {
    pub fn new(magnitude: Real, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    pub fn dimensionless(magnitude: Real) -> Self {
        Self::new(magnitude, Unit::dimensionless())
    }

    /// Build from a magnitude and a unit name resolved against the registry.
    pub fn parse(magnitude: Real, unit: &str) -> KliResult<Self> {
        Ok(Self::new(magnitude, Unit::parse(unit)?))
    }

    pub fn magnitude(&self) -> Real {
        self.magnitude
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn is_dimensionless(&self) -> bool {
        self.unit.is_dimensionless()
    }

    pub fn to(&self, unit: &Unit) -> KliResult<Self> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(Self::new(self.magnitude * factor, unit.clone()))
    }

    pub fn to_named(&self, unit: &str) -> KliResult<Self> {
        self.to(&Unit::parse(unit)?)
    }

    /// Magnitude in the named unit.
    pub fn magnitude_in(&self, unit: &str) -> KliResult<Real> {
        Ok(self.to_named(unit)?.magnitude)
    }

    /// Pure number for a dimensionless quantity, with any residual scale
    /// (e.g. `mV/V`) folded in.
    pub fn as_number(&self) -> KliResult<Real> {
        if !self.unit.is_dimensionless() {
            return Err(KliError::unit(format!(
                "expected a dimensionless value, got {self}"
            )));
        }
        Ok(self.magnitude * self.unit.scale())
    }

    pub fn try_add(&self, rhs: &Self) -> KliResult<Self> {
        let rhs = rhs.to(&self.unit)?;
        Ok(Self::new(self.magnitude + rhs.magnitude, self.unit.clone()))
    }

    pub fn try_sub(&self, rhs: &Self) -> KliResult<Self> {
        let rhs = rhs.to(&self.unit)?;
        Ok(Self::new(self.magnitude - rhs.magnitude, self.unit.clone()))
    }

    pub fn try_mul(&self, rhs: &Self) -> KliResult<Self> {
        Ok(Self::new(self.magnitude * rhs.magnitude, self.unit.try_mul(&rhs.unit)?))
    }

    pub fn try_div(&self, rhs: &Self) -> KliResult<Self> {
        Ok(Self::new(self.magnitude / rhs.magnitude, self.unit.try_div(&rhs.unit)?))
    }

    pub fn neg(&self) -> Self {
        Self::new(-self.magnitude, self.unit.clone())
    }

    /// `self ^ exponent`. The exponent must be dimensionless; a dimensional base
    /// additionally needs an integral exponent.
    pub fn pow(&self, exponent: &Self) -> KliResult<Self> {
        let n = exponent.as_number()?;
        if self.unit.is_dimensionless() {
            return Ok(Self::dimensionless(self.as_number()?.powf(n)));
        }
        if n.fract() != 0.0 || n.abs() > f64::from(i8::MAX) {
            return Err(KliError::unit(format!(
                "cannot raise {self} to non-integral power {n}"
            )));
        }
        let n = n as i32;
        Ok(Self::new(self.magnitude.powi(n), self.unit.powi(n)?))
    }

    /// Apply a transcendental function; the argument must be dimensionless.
    pub fn map_number(&self, f: impl Fn(Real) -> Real) -> KliResult<Self> {
        Ok(Self::dimensionless(f(self.as_number()?)))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.symbol().is_empty() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.unit)
        }
    }
}

impl From<Real> for Quantity {
    fn from(magnitude: Real) -> Self {
        Self::dimensionless(magnitude)
    }
}
