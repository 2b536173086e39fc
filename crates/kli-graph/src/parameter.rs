//! Bounded, optionally log-scaled, unit-tagged leaf values.

use core::fmt;

use kli_core::{Dual, KliError, ParamId, Quantity, Real, Unit, ensure_finite};
use tracing::{debug, warn};

use crate::error::GraphResult;
use crate::graph::{AliasTarget, NodeRef, ParamGraph};
use crate::validate;

/// How an optimizer drives the parameter through `assign_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    #[default]
    Linear,
    Log,
}

/// Whether the parameter's own value is live.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Binding {
    #[default]
    Owned,
    /// The stored value is kept but inert until `unmap`.
    Aliased(AliasTarget),
}

/// A named scalar leaf.
///
/// `value`, `default` and the bounds are magnitudes in `unit`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub(crate) id: ParamId,
    pub(crate) name: String,
    pub(crate) value: Real,
    pub(crate) default: Real,
    pub(crate) lower: Real,
    pub(crate) upper: Real,
    pub(crate) unit: Unit,
    pub(crate) scaling: Scaling,
    pub(crate) ad: bool,
    pub(crate) binding: Binding,
}

impl Parameter {
    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored magnitude (inert while aliased).
    pub fn value(&self) -> Real {
        self.value
    }

    pub fn default(&self) -> Real {
        self.default
    }

    pub fn lower(&self) -> Real {
        self.lower
    }

    pub fn upper(&self) -> Real {
        self.upper
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    pub fn is_log(&self) -> bool {
        self.scaling == Scaling::Log
    }

    pub fn is_ad(&self) -> bool {
        self.ad
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn alias(&self) -> Option<&AliasTarget> {
        match &self.binding {
            Binding::Owned => None,
            Binding::Aliased(target) => Some(target),
        }
    }

    pub fn is_remapped(&self) -> bool {
        matches!(self.binding, Binding::Aliased(_))
    }

    /// Stored value as a quantity.
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.value, self.unit.clone())
    }

    /// AD shadow of the stored value, seeded on this parameter.
    pub fn dual(&self) -> Dual {
        Dual::variable(self.id, self.value)
    }

    /// False only for the unconstrained bounds of the current scaling:
    /// `(-inf, inf)` when linear, `[0, inf)` when log.
    pub fn constrained(&self) -> bool {
        let open_above = self.upper == Real::INFINITY;
        match self.scaling {
            Scaling::Linear => !(self.lower == Real::NEG_INFINITY && open_above),
            Scaling::Log => !(self.lower == 0.0 && open_above),
        }
    }

    /// Multi-line summary: value, scaling, bounds, default and alias.
    pub fn summary(&self) -> String {
        let scaling = match self.scaling {
            Scaling::Linear => "Linear scaling",
            Scaling::Log => "Log scaling",
        };
        let constraint = if self.constrained() {
            "constrained"
        } else {
            "unconstrained"
        };
        let mut s = format!(
            "Parameter: {self}\n   {scaling} ({constraint}) in [{}, {}] {}\n   Defaults to: {}",
            self.lower,
            self.upper,
            self.unit,
            Quantity::new(self.default, self.unit.clone())
        );
        if let Binding::Aliased(target) = &self.binding {
            s.push_str(&format!("\n   REMAPPED --> {target}"));
        }
        s
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Binding::Owned => write!(f, "{} = {}", self.name, self.quantity()),
            Binding::Aliased(target) => write!(f, "{} --> {target}", self.name),
        }
    }
}

/// Construction arguments for a parameter.
///
/// ```
/// use kli_graph::{ParamGraph, ParameterDef};
///
/// let mut graph = ParamGraph::new();
/// let q = graph
///     .add_parameter(ParameterDef::new("q", 1.0 / 6.0).units("kHz").log())
///     .unwrap();
/// assert_eq!(graph.parameter(q).unwrap().lower(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    name: String,
    value: Real,
    units: Option<String>,
    default: Option<Real>,
    scaling: Scaling,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, value: Real) -> Self {
        Self {
            name: name.into(),
            value,
            units: None,
            default: None,
            scaling: Scaling::Linear,
        }
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn default_value(mut self, default: Real) -> Self {
        self.default = Some(default);
        self
    }

    pub fn log(mut self) -> Self {
        self.scaling = Scaling::Log;
        self
    }

    pub fn scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }
}

impl ParamGraph {
    /// Add a parameter. Bounds start at `[0, inf)` for log scaling and
    /// `(-inf, inf)` otherwise; the default falls back to the initial value.
    pub fn add_parameter(&mut self, def: ParameterDef) -> GraphResult<ParamId> {
        let unit = match &def.units {
            Some(u) => Unit::parse(u)?,
            None => Unit::dimensionless(),
        };
        let lower = match def.scaling {
            Scaling::Linear => Real::NEG_INFINITY,
            Scaling::Log => 0.0,
        };
        let id = ParamId::from_index(self.params.len() as u32);
        let param = Parameter {
            id,
            name: def.name,
            value: def.value,
            default: def.default.unwrap_or(def.value),
            lower,
            upper: Real::INFINITY,
            unit,
            scaling: def.scaling,
            ad: false,
            binding: Binding::Owned,
        };
        validate::check_parameter(&param)?;
        debug!(name = %param.name, %id, "parameter added");
        self.params.push(param);
        Ok(id)
    }

    /// Apply `f` to a copy of the parameter and commit it only if every
    /// bound and log-domain invariant still holds.
    fn mutate_parameter(
        &mut self,
        id: ParamId,
        f: impl FnOnce(&mut Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        let mut candidate = self.parameter(id)?.clone();
        f(&mut candidate)?;
        validate::check_parameter(&candidate)?;
        *self.parameter_mut(id)? = candidate;
        Ok(())
    }

    /// Set the stored value, converting default and bounds to `units` first.
    pub fn assign(&mut self, id: ParamId, value: Real, units: Option<&str>) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            if let Some(u) = units {
                convert_units(p, &Unit::parse(u)?)?;
            }
            p.value = ensure_finite(value, "assigned value")?;
            Ok(())
        })
    }

    /// Log-scaled parameters store `exp(log_value)`; linear ones store it as is.
    pub fn assign_log(
        &mut self,
        id: ParamId,
        log_value: Real,
        units: Option<&str>,
    ) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            if let Some(u) = units {
                convert_units(p, &Unit::parse(u)?)?;
            }
            let value = match p.scaling {
                Scaling::Log => log_value.exp(),
                Scaling::Linear => log_value,
            };
            p.value = ensure_finite(value, "assigned value")?;
            Ok(())
        })
    }

    /// Re-express value, default and bounds in a compatible unit.
    pub fn set_units(&mut self, id: ParamId, units: &str) -> GraphResult<()> {
        let unit = Unit::parse(units)?;
        self.mutate_parameter(id, |p| convert_units(p, &unit))
    }

    pub fn set_default(&mut self, id: ParamId, default: Real) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.default = default;
            Ok(())
        })
    }

    pub fn set_upper(&mut self, id: ParamId, upper: Real) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.upper = upper;
            Ok(())
        })
    }

    pub fn set_lower(&mut self, id: ParamId, lower: Real) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.lower = lower;
            Ok(())
        })
    }

    /// Bounds `[0, inf)`.
    pub fn set_positive(&mut self, id: ParamId) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.lower = 0.0;
            p.upper = Real::INFINITY;
            Ok(())
        })
    }

    /// Bounds `(-inf, inf)`.
    pub fn set_real(&mut self, id: ParamId) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.lower = Real::NEG_INFINITY;
            p.upper = Real::INFINITY;
            Ok(())
        })
    }

    /// Switch to log scaling. A negative lower bound is raised to zero.
    pub fn set_log(&mut self, id: ParamId) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            if p.lower < 0.0 {
                warn!(
                    name = %p.name,
                    lower = p.lower,
                    "lower limit of range is negative; setting to zero"
                );
                p.lower = 0.0;
            }
            p.scaling = Scaling::Log;
            Ok(())
        })
    }

    pub fn set_linear(&mut self, id: ParamId) -> GraphResult<()> {
        self.mutate_parameter(id, |p| {
            p.scaling = Scaling::Linear;
            Ok(())
        })
    }

    /// Rename in place. Spaces keyed by the old name fail `integrity` until rebuilt.
    pub fn rename(&mut self, id: ParamId, name: impl Into<String>) -> GraphResult<()> {
        let name = name.into();
        self.mutate_parameter(id, |p| {
            p.name = name;
            Ok(())
        })
    }

    /// Make the parameter defer to `target`, propagating this parameter's
    /// AD mode onto it. Fails if the target depends on this parameter.
    pub fn remap(&mut self, id: ParamId, target: impl Into<AliasTarget>) -> GraphResult<()> {
        let target = target.into();
        let previous = std::mem::replace(
            &mut self.parameter_mut(id)?.binding,
            Binding::Aliased(target.clone()),
        );
        if let Err(err) = validate::check_acyclic(self, NodeRef::Param(id)) {
            self.parameter_mut(id)?.binding = previous;
            return Err(err);
        }
        let ad = self.parameter(id)?.ad;
        if let AliasTarget::Node(node) = &target {
            self.set_ad(*node, ad)?;
        }
        debug!(name = %self.parameter(id)?.name, %target, "parameter remapped");
        Ok(())
    }

    /// Drop aliasing; the stored value becomes live again.
    pub fn unmap(&mut self, id: ParamId) -> GraphResult<()> {
        let p = self.parameter_mut(id)?;
        if p.is_remapped() {
            debug!(name = %p.name, "parameter unmapped");
        }
        p.binding = Binding::Owned;
        Ok(())
    }
}

fn convert_units(p: &mut Parameter, unit: &Unit) -> GraphResult<()> {
    let factor = p.unit.conversion_factor(unit).map_err(|err| match err {
        KliError::Unit { what } => KliError::unit(format!("parameter '{}': {what}", p.name)),
        other => other,
    })?;
    p.value *= factor;
    p.default *= factor;
    p.lower *= factor;
    p.upper *= factor;
    p.unit = unit.clone();
    Ok(())
}
