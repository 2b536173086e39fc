// kli-core/src/units.rs

use core::fmt;

use uom::si::f64::{
    Capacitance, ElectricCharge, ElectricCurrent, ElectricPotential, ElectricalConductance,
    ElectricalResistance, Frequency, Length, Mass, ThermodynamicTemperature, Time,
};
use uom::si::{
    capacitance, electric_charge, electric_current, electric_potential, electrical_conductance,
    electrical_resistance, frequency, length, mass, thermodynamic_temperature, time,
};

use crate::{KliError, KliResult};

/// Exponents of the SI base dimensions (time, length, mass, current, temperature).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimensions([i8; 5]);

impl Dimensions {
    pub const NONE: Self = Self([0, 0, 0, 0, 0]);
    pub const TIME: Self = Self([1, 0, 0, 0, 0]);
    pub const FREQUENCY: Self = Self([-1, 0, 0, 0, 0]);
    pub const LENGTH: Self = Self([0, 1, 0, 0, 0]);
    pub const MASS: Self = Self([0, 0, 1, 0, 0]);
    pub const CURRENT: Self = Self([0, 0, 0, 1, 0]);
    pub const TEMPERATURE: Self = Self([0, 0, 0, 0, 1]);
    pub const CHARGE: Self = Self([1, 0, 0, 1, 0]);
    pub const VOLTAGE: Self = Self([-3, 2, 1, -1, 0]);
    pub const CONDUCTANCE: Self = Self([3, -2, -1, 2, 0]);
    pub const RESISTANCE: Self = Self([-3, 2, 1, -2, 0]);
    pub const CAPACITANCE: Self = Self([4, -2, -1, 2, 0]);

    pub fn is_dimensionless(self) -> bool {
        self == Self::NONE
    }

    /// Exponents multiplied by `n`.
    pub fn checked_powi(self, n: i32) -> KliResult<Self> {
        self.try_map(|e| i32::from(e).checked_mul(n).and_then(|v| i8::try_from(v).ok()))
            .ok_or_else(|| KliError::unit(format!("({self})^{n} is out of exponent range")))
    }

    /// Dimensions of a product.
    pub fn checked_mul(self, rhs: Self) -> KliResult<Self> {
        self.try_zip(rhs, i8::checked_add)
            .ok_or_else(|| KliError::unit(format!("({self})*({rhs}) is out of exponent range")))
    }

    /// Dimensions of a quotient.
    pub fn checked_div(self, rhs: Self) -> KliResult<Self> {
        self.try_zip(rhs, i8::checked_sub)
            .ok_or_else(|| KliError::unit(format!("({self})/({rhs}) is out of exponent range")))
    }

    fn try_map(self, f: impl Fn(i8) -> Option<i8>) -> Option<Self> {
        let mut out = self.0;
        for e in &mut out {
            *e = f(*e)?;
        }
        Some(Self(out))
    }

    fn try_zip(self, rhs: Self, f: impl Fn(i8, i8) -> Option<i8>) -> Option<Self> {
        let mut out = self.0;
        for (e, r) in out.iter_mut().zip(rhs.0) {
            *e = f(*e, r)?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let names = ["s", "m", "kg", "A", "K"];
        let mut first = true;
        for (name, exp) in names.iter().zip(self.0) {
            if exp == 0 {
                continue;
            }
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if exp == 1 {
                write!(f, "{name}")?;
            } else {
                write!(f, "{name}^{exp}")?;
            }
        }
        Ok(())
    }
}

/// A unit from the fixed registry, or a product/quotient/power of registry units.
///
/// `scale` converts one of this unit into coherent SI base units.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    symbol: String,
    dims: Dimensions,
    scale: f64,
}

impl Unit {
    pub fn dimensionless() -> Self {
        Self {
            symbol: String::new(),
            dims: Dimensions::NONE,
            scale: 1.0,
        }
    }

    /// Resolve a unit expression such as `kHz`, `1/mV` or `mS/cm^2`.
    pub fn parse(expr: &str) -> KliResult<Self> {
        let trimmed = expr.trim();
        if let Some(unit) = lookup(trimmed) {
            return Ok(unit);
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = UnitParser {
            tokens: &tokens,
            pos: 0,
            source: trimmed,
        };
        let parsed = parser.parse_product()?;
        if parser.pos != tokens.len() {
            return Err(KliError::unit(format!(
                "trailing input in unit expression '{trimmed}'"
            )));
        }
        Ok(Self {
            symbol: trimmed.to_string(),
            ..parsed
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless()
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.dims == other.dims
    }

    /// Factor `k` such that `x [self] == x * k [to]`.
    pub fn conversion_factor(&self, to: &Self) -> KliResult<f64> {
        if !self.is_compatible(to) {
            return Err(KliError::unit(format!(
                "cannot convert '{}' ({}) to '{}' ({})",
                self.display_symbol(),
                self.dims,
                to.display_symbol(),
                to.dims
            )));
        }
        Ok(self.scale / to.scale)
    }

    pub fn powi(&self, n: i32) -> KliResult<Self> {
        let symbol = match n {
            _ if self.symbol.is_empty() => String::new(),
            1 => self.symbol.clone(),
            _ => format!("{}^{n}", wrap(&self.symbol)),
        };
        Ok(Self {
            symbol,
            dims: self.dims.checked_powi(n)?,
            scale: self.scale.powi(n),
        })
    }

    /// Product unit. Fails only if an exponent leaves the `i8` range.
    pub fn try_mul(&self, rhs: &Self) -> KliResult<Self> {
        let symbol = match (self.symbol.is_empty(), rhs.symbol.is_empty()) {
            (true, _) => rhs.symbol.clone(),
            (_, true) => self.symbol.clone(),
            _ => format!("{}*{}", self.symbol, wrap(&rhs.symbol)),
        };
        Ok(Self {
            symbol,
            dims: self.dims.checked_mul(rhs.dims)?,
            scale: self.scale * rhs.scale,
        })
    }

    pub fn try_div(&self, rhs: &Self) -> KliResult<Self> {
        let symbol = match (self.symbol.is_empty(), rhs.symbol.is_empty()) {
            (_, true) => self.symbol.clone(),
            (true, false) => format!("1/{}", wrap(&rhs.symbol)),
            _ => format!("{}/{}", self.symbol, wrap(&rhs.symbol)),
        };
        Ok(Self {
            symbol,
            dims: self.dims.checked_div(rhs.dims)?,
            scale: self.scale / rhs.scale,
        })
    }

    fn display_symbol(&self) -> &str {
        if self.symbol.is_empty() {
            "dimensionless"
        } else {
            &self.symbol
        }
    }
}

fn wrap(symbol: &str) -> String {
    if symbol.contains(['*', '/', '^']) {
        format!("({symbol})")
    } else {
        symbol.to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Look up a single registry name. Scale factors come from `uom`.
pub fn lookup(name: &str) -> Option<Unit> {
    let (dims, scale) = match name {
        "" | "1" | "dimensionless" => (Dimensions::NONE, 1.0),

        "s" | "second" => (Dimensions::TIME, 1.0),
        "ms" | "millisecond" => (
            Dimensions::TIME,
            Time::new::<time::millisecond>(1.0).get::<time::second>(),
        ),
        "us" | "microsecond" => (
            Dimensions::TIME,
            Time::new::<time::microsecond>(1.0).get::<time::second>(),
        ),

        "Hz" | "hertz" => (Dimensions::FREQUENCY, 1.0),
        "kHz" | "kilohertz" => (
            Dimensions::FREQUENCY,
            Frequency::new::<frequency::kilohertz>(1.0).get::<frequency::hertz>(),
        ),

        "V" | "volt" => (Dimensions::VOLTAGE, 1.0),
        "mV" | "millivolt" => (
            Dimensions::VOLTAGE,
            ElectricPotential::new::<electric_potential::millivolt>(1.0)
                .get::<electric_potential::volt>(),
        ),
        "uV" | "microvolt" => (
            Dimensions::VOLTAGE,
            ElectricPotential::new::<electric_potential::microvolt>(1.0)
                .get::<electric_potential::volt>(),
        ),

        "S" | "siemens" => (Dimensions::CONDUCTANCE, 1.0),
        "mS" | "millisiemens" => (
            Dimensions::CONDUCTANCE,
            siemens_of(ElectricalConductance::new::<electrical_conductance::millisiemens>(1.0)),
        ),
        "uS" | "microsiemens" => (
            Dimensions::CONDUCTANCE,
            siemens_of(ElectricalConductance::new::<electrical_conductance::microsiemens>(1.0)),
        ),
        "nS" | "nanosiemens" => (
            Dimensions::CONDUCTANCE,
            siemens_of(ElectricalConductance::new::<electrical_conductance::nanosiemens>(1.0)),
        ),
        "pS" | "picosiemens" => (
            Dimensions::CONDUCTANCE,
            siemens_of(ElectricalConductance::new::<electrical_conductance::picosiemens>(1.0)),
        ),

        "A" | "ampere" => (Dimensions::CURRENT, 1.0),
        "mA" | "milliampere" => (
            Dimensions::CURRENT,
            ElectricCurrent::new::<electric_current::milliampere>(1.0)
                .get::<electric_current::ampere>(),
        ),
        "uA" | "microampere" => (
            Dimensions::CURRENT,
            ElectricCurrent::new::<electric_current::microampere>(1.0)
                .get::<electric_current::ampere>(),
        ),
        "nA" | "nanoampere" => (
            Dimensions::CURRENT,
            ElectricCurrent::new::<electric_current::nanoampere>(1.0)
                .get::<electric_current::ampere>(),
        ),
        "pA" | "picoampere" => (
            Dimensions::CURRENT,
            ElectricCurrent::new::<electric_current::picoampere>(1.0)
                .get::<electric_current::ampere>(),
        ),

        "m" | "meter" => (Dimensions::LENGTH, 1.0),
        "cm" | "centimeter" => (
            Dimensions::LENGTH,
            Length::new::<length::centimeter>(1.0).get::<length::meter>(),
        ),
        "mm" | "millimeter" => (
            Dimensions::LENGTH,
            Length::new::<length::millimeter>(1.0).get::<length::meter>(),
        ),
        "um" | "micrometer" => (
            Dimensions::LENGTH,
            Length::new::<length::micrometer>(1.0).get::<length::meter>(),
        ),

        "kg" | "kilogram" => (Dimensions::MASS, 1.0),
        "g" | "gram" => (
            Dimensions::MASS,
            Mass::new::<mass::gram>(1.0).get::<mass::kilogram>(),
        ),

        "F" | "farad" => (Dimensions::CAPACITANCE, 1.0),
        "uF" | "microfarad" => (
            Dimensions::CAPACITANCE,
            Capacitance::new::<capacitance::microfarad>(1.0).get::<capacitance::farad>(),
        ),
        "nF" | "nanofarad" => (
            Dimensions::CAPACITANCE,
            Capacitance::new::<capacitance::nanofarad>(1.0).get::<capacitance::farad>(),
        ),
        "pF" | "picofarad" => (
            Dimensions::CAPACITANCE,
            Capacitance::new::<capacitance::picofarad>(1.0).get::<capacitance::farad>(),
        ),

        "ohm" => (Dimensions::RESISTANCE, 1.0),
        "kohm" | "kiloohm" => (
            Dimensions::RESISTANCE,
            ElectricalResistance::new::<electrical_resistance::kiloohm>(1.0)
                .get::<electrical_resistance::ohm>(),
        ),
        "Mohm" | "megaohm" => (
            Dimensions::RESISTANCE,
            ElectricalResistance::new::<electrical_resistance::megaohm>(1.0)
                .get::<electrical_resistance::ohm>(),
        ),
        "Gohm" | "gigaohm" => (
            Dimensions::RESISTANCE,
            ElectricalResistance::new::<electrical_resistance::gigaohm>(1.0)
                .get::<electrical_resistance::ohm>(),
        ),

        "C" | "coulomb" => (
            Dimensions::CHARGE,
            ElectricCharge::new::<electric_charge::coulomb>(1.0).get::<electric_charge::coulomb>(),
        ),
        "K" | "kelvin" => (
            Dimensions::TEMPERATURE,
            ThermodynamicTemperature::new::<thermodynamic_temperature::kelvin>(1.0)
                .get::<thermodynamic_temperature::kelvin>(),
        ),

        _ => return None,
    };
    let symbol = if dims.is_dimensionless() {
        String::new()
    } else {
        name.to_string()
    };
    Some(Unit {
        symbol,
        dims,
        scale,
    })
}

#[inline]
fn siemens_of(g: ElectricalConductance) -> f64 {
    g.get::<electrical_conductance::siemens>()
}

#[derive(Debug, Clone, PartialEq)]
enum UnitToken {
    Name(String),
    Int(i32),
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> KliResult<Vec<UnitToken>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '-' {
            let mut digits = String::new();
            digits.push(c);
            chars.next();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let n = digits
                .parse()
                .map_err(|_| KliError::unit(format!("bad exponent '{digits}' in '{input}'")))?;
            tokens.push(UnitToken::Int(n));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(UnitToken::Name(ident));
        } else {
            chars.next();
            let tok = match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    UnitToken::Caret
                }
                '*' => UnitToken::Star,
                '/' => UnitToken::Slash,
                '^' => UnitToken::Caret,
                '(' => UnitToken::LParen,
                ')' => UnitToken::RParen,
                other => {
                    return Err(KliError::unit(format!(
                        "unexpected '{other}' in unit expression '{input}'"
                    )));
                }
            };
            tokens.push(tok);
        }
    }
    Ok(tokens)
}

struct UnitParser<'a> {
    tokens: &'a [UnitToken],
    pos: usize,
    source: &'a str,
}

impl UnitParser<'_> {
    fn peek(&self) -> Option<&UnitToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<UnitToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_product(&mut self) -> KliResult<Unit> {
        let mut acc = self.parse_power()?;
        loop {
            match self.peek() {
                Some(UnitToken::Star) => {
                    self.pos += 1;
                    let rhs = self.parse_power()?;
                    acc = acc.try_mul(&rhs)?;
                }
                Some(UnitToken::Slash) => {
                    self.pos += 1;
                    let rhs = self.parse_power()?;
                    acc = acc.try_div(&rhs)?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn parse_power(&mut self) -> KliResult<Unit> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&UnitToken::Caret) {
            self.pos += 1;
            match self.next() {
                Some(UnitToken::Int(n)) => return base.powi(n),
                _ => {
                    return Err(KliError::unit(format!(
                        "expected integer exponent in '{}'",
                        self.source
                    )));
                }
            }
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> KliResult<Unit> {
        match self.next() {
            Some(UnitToken::Name(name)) => lookup(&name)
                .ok_or_else(|| KliError::unit(format!("unknown unit '{name}'"))),
            Some(UnitToken::Int(1)) => Ok(Unit::dimensionless()),
            Some(UnitToken::LParen) => {
                let inner = self.parse_product()?;
                match self.next() {
                    Some(UnitToken::RParen) => Ok(inner),
                    _ => Err(KliError::unit(format!("expected ')' in '{}'", self.source))),
                }
            }
            _ => Err(KliError::unit(format!(
                "malformed unit expression '{}'",
                self.source
            ))),
        }
    }
}
