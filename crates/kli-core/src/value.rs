//! Evaluation results: either a plain unit-tagged quantity or a dual number.
//!
//! Dual values carry magnitudes with the unit stripped. A Parameter seeds its
//! dual in its own declared unit, and plain quantities entering a dual
//! computation contribute their magnitude in their own unit as a constant.

use core::fmt;

use crate::dual::Dual;
use crate::quantity::Quantity;
use crate::{KliResult, ParamId, Real};

/// Which representation an evaluation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Plain,
    Dual,
}

impl Mode {
    pub fn from_ad(ad: bool) -> Self {
        if ad { Mode::Dual } else { Mode::Plain }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Plain(Quantity),
    Dual(Dual),
}

/// Functions callable from formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Sqrt,
}

impl MathFn {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => MathFn::Exp,
            "log" | "ln" => MathFn::Log,
            "log10" => MathFn::Log10,
            "sin" => MathFn::Sin,
            "cos" => MathFn::Cos,
            "tan" => MathFn::Tan,
            "sqrt" => MathFn::Sqrt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Sqrt => "sqrt",
        }
    }

    fn plain(self, x: Real) -> Real {
        match self {
            MathFn::Exp => x.exp(),
            MathFn::Log => x.ln(),
            MathFn::Log10 => x.log10(),
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
            MathFn::Tan => x.tan(),
            MathFn::Sqrt => x.sqrt(),
        }
    }

    fn dual(self, x: &Dual) -> Dual {
        match self {
            MathFn::Exp => x.exp(),
            MathFn::Log => x.ln(),
            MathFn::Log10 => x.log10(),
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
            MathFn::Tan => x.tan(),
            MathFn::Sqrt => x.sqrt(),
        }
    }
}

impl Value {
    /// A bare constant in the requested mode.
    pub fn constant(x: Real, mode: Mode) -> Self {
        match mode {
            Mode::Plain => Value::Plain(Quantity::dimensionless(x)),
            Mode::Dual => Value::Dual(Dual::constant(x)),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Value::Plain(_) => Mode::Plain,
            Value::Dual(_) => Mode::Dual,
        }
    }

    /// Magnitude with units stripped.
    pub fn magnitude(&self) -> Real {
        match self {
            Value::Plain(q) => q.magnitude(),
            Value::Dual(d) => d.value,
        }
    }

    /// Partial derivative with respect to a seed Parameter; zero for plain values.
    pub fn partial(&self, id: ParamId) -> Real {
        match self {
            Value::Plain(_) => 0.0,
            Value::Dual(d) => d.partial(id),
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Plain(q) => Some(q),
            Value::Dual(_) => None,
        }
    }

    pub fn as_dual(&self) -> Option<&Dual> {
        match self {
            Value::Dual(d) => Some(d),
            Value::Plain(_) => None,
        }
    }

    /// Coerce into a dual, keeping the plain magnitude in its own unit.
    pub fn to_dual(&self) -> Dual {
        match self {
            Value::Plain(q) => Dual::constant(q.magnitude()),
            Value::Dual(d) => d.clone(),
        }
    }

    /// Pure number; plain values must be dimensionless.
    pub fn as_f64(&self) -> KliResult<Real> {
        match self {
            Value::Plain(q) => q.as_number(),
            Value::Dual(d) => Ok(d.value),
        }
    }

    pub fn add(&self, rhs: &Self) -> KliResult<Self> {
        match (self, rhs) {
            (Value::Plain(a), Value::Plain(b)) => Ok(Value::Plain(a.try_add(b)?)),
            _ => Ok(Value::Dual(&self.to_dual() + &rhs.to_dual())),
        }
    }

    pub fn sub(&self, rhs: &Self) -> KliResult<Self> {
        match (self, rhs) {
            (Value::Plain(a), Value::Plain(b)) => Ok(Value::Plain(a.try_sub(b)?)),
            _ => Ok(Value::Dual(&self.to_dual() - &rhs.to_dual())),
        }
    }

    pub fn mul(&self, rhs: &Self) -> KliResult<Self> {
        match (self, rhs) {
            (Value::Plain(a), Value::Plain(b)) => Ok(Value::Plain(a.try_mul(b)?)),
            _ => Ok(Value::Dual(&self.to_dual() * &rhs.to_dual())),
        }
    }

    pub fn div(&self, rhs: &Self) -> KliResult<Self> {
        match (self, rhs) {
            (Value::Plain(a), Value::Plain(b)) => Ok(Value::Plain(a.try_div(b)?)),
            _ => Ok(Value::Dual(&self.to_dual() / &rhs.to_dual())),
        }
    }

    pub fn pow(&self, rhs: &Self) -> KliResult<Self> {
        match (self, rhs) {
            (Value::Plain(a), Value::Plain(b)) => Ok(Value::Plain(a.pow(b)?)),
            _ => Ok(Value::Dual(self.to_dual().powf(&rhs.to_dual()))),
        }
    }

    pub fn neg(&self) -> Self {
        match self {
            Value::Plain(q) => Value::Plain(q.neg()),
            Value::Dual(d) => Value::Dual(-d),
        }
    }

    pub fn apply(&self, f: MathFn) -> KliResult<Self> {
        match self {
            Value::Plain(q) => Ok(Value::Plain(q.map_number(|x| f.plain(x))?)),
            Value::Dual(d) => Ok(Value::Dual(f.dual(d))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Plain(q) => write!(f, "{q}"),
            Value::Dual(d) => {
                write!(f, "{}", d.value)?;
                for (id, p) in &d.partials {
                    write!(f, " + {p}·d[{id}]")?;
                }
                Ok(())
            }
        }
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Plain(q)
    }
}

impl From<Dual> for Value {
    fn from(d: Dual) -> Self {
        Value::Dual(d)
    }
}
