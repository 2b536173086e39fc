//! Read helpers for callers outside the graph (simulators, reports).

use kli_core::{Dimensions, KliError, Mode, Quantity, Real, Unit, Value};

use crate::error::GraphResult;
use crate::graph::{NodeRef, ParamGraph};

/// Current value in the node's own mode.
pub fn value(graph: &ParamGraph, node: NodeRef) -> GraphResult<Value> {
    graph.evaluate(node)
}

/// Current value as a plain quantity, regardless of AD flags.
pub fn quantity(graph: &ParamGraph, node: NodeRef) -> GraphResult<Quantity> {
    match graph.evaluate_with(node, Mode::Plain)? {
        Value::Plain(q) => Ok(q),
        Value::Dual(d) => Ok(Quantity::dimensionless(d.value)),
    }
}

/// Magnitude with units stripped. Use cautiously: the unit is whatever the
/// formula produced.
pub fn magnitude(graph: &ParamGraph, node: NodeRef) -> GraphResult<Real> {
    Ok(graph.evaluate(node)?.magnitude())
}

/// Magnitude after conversion to `unit`.
pub fn magnitude_in(graph: &ParamGraph, node: NodeRef, unit: &str) -> GraphResult<Real> {
    Ok(quantity(graph, node)?.magnitude_in(unit)?)
}

/// Like [`magnitude_in`], but a dual value passes through untouched since
/// it already carries the declared unit's magnitude.
pub fn value_in(graph: &ParamGraph, node: NodeRef, unit: &str) -> GraphResult<Value> {
    match graph.evaluate(node)? {
        Value::Plain(q) => Ok(Value::Plain(q.to_named(unit)?)),
        dual => Ok(dual),
    }
}

/// Pure number; fails with a unit error unless the value is dimensionless.
pub fn as_f64(graph: &ParamGraph, node: NodeRef) -> GraphResult<Real> {
    Ok(graph.evaluate(node)?.as_f64()?)
}

/// Output units a caller prefers, picked by dimension.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreferredUnits {
    pub time: Option<String>,
    pub voltage: Option<String>,
    pub conductance: Option<String>,
}

impl PreferredUnits {
    /// The preferred unit for `dims`, if one is set and known.
    pub fn for_dims(&self, dims: Dimensions) -> GraphResult<Option<Unit>> {
        let slots = [
            (Dimensions::TIME, &self.time),
            (Dimensions::VOLTAGE, &self.voltage),
            (Dimensions::CONDUCTANCE, &self.conductance),
        ];
        for (d, name) in slots {
            if d == dims {
                if let Some(name) = name {
                    let unit = Unit::parse(name)?;
                    if unit.dims() != d {
                        return Err(KliError::unit(format!(
                            "preferred unit '{name}' does not match its slot"
                        ))
                        .into());
                    }
                    return Ok(Some(unit));
                }
            }
        }
        Ok(None)
    }
}

/// Magnitude in the preferred unit for the value's dimension, or in its
/// native unit when no preference applies.
pub fn magnitude_preferred(
    graph: &ParamGraph,
    node: NodeRef,
    preferred: &PreferredUnits,
) -> GraphResult<Real> {
    let q = quantity(graph, node)?;
    match preferred.for_dims(q.unit().dims())? {
        Some(unit) => Ok(q.to(&unit)?.magnitude()),
        None => Ok(q.magnitude()),
    }
}
