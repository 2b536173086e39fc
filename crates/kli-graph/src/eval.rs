//! Transitive evaluation and AD mode propagation.
//!
//! `evaluate` uses the node's own AD flag; `evaluate_with` forces one mode
//! through the whole walk. Inside an Expression every operand is evaluated in
//! the Expression's mode, so flags below it do not matter. A Parameter aliased
//! to another node is read through, so `evaluate` of the alias uses the
//! target's flag.

use std::collections::BTreeSet;

use kli_core::{Mode, ParamId, Real, Value};
use tracing::{debug, trace};

use crate::error::{GraphError, GraphResult};
use crate::formula::{BinOp, Formula};
use crate::graph::{AliasTarget, NodeRef, ParamGraph};
use crate::parameter::Binding;

impl ParamGraph {
    pub fn evaluate(&self, node: NodeRef) -> GraphResult<Value> {
        if let NodeRef::Param(id) = node {
            if let Binding::Aliased(AliasTarget::Node(target)) = self.parameter(id)?.binding {
                return self.evaluate(target);
            }
        }
        self.evaluate_with(node, Mode::from_ad(self.is_ad(node)?))
    }

    pub fn evaluate_with(&self, node: NodeRef, mode: Mode) -> GraphResult<Value> {
        match node {
            NodeRef::Param(id) => self.eval_parameter(id, mode),
            NodeRef::Expr(id) => {
                let e = self.expression(id)?;
                if e.frozen {
                    if let Some(cached) = e.cache.as_ref().filter(|v| v.mode() == mode) {
                        return Ok(cached.clone());
                    }
                }
                let value = self.eval_formula(&e.tree, mode)?;
                trace!(name = %e.name, %value, "expression evaluated");
                Ok(value)
            }
        }
    }

    fn eval_parameter(&self, id: ParamId, mode: Mode) -> GraphResult<Value> {
        let p = self.parameter(id)?;
        match (&p.binding, mode) {
            (Binding::Aliased(AliasTarget::Node(target)), _) => self.evaluate_with(*target, mode),
            (Binding::Aliased(AliasTarget::Constant(q)), Mode::Plain) => Ok(Value::Plain(q.clone())),
            (Binding::Aliased(AliasTarget::Constant(q)), Mode::Dual) => {
                Ok(Value::constant(q.magnitude(), Mode::Dual))
            }
            (Binding::Owned, Mode::Plain) => Ok(Value::Plain(p.quantity())),
            (Binding::Owned, Mode::Dual) => Ok(Value::Dual(p.dual())),
        }
    }

    fn eval_formula(&self, f: &Formula, mode: Mode) -> GraphResult<Value> {
        Ok(match f {
            Formula::Number(n) => Value::constant(*n, mode),
            Formula::Param(id) => self.eval_parameter(*id, mode)?,
            Formula::Expr(id) => self.evaluate_with(NodeRef::Expr(*id), mode)?,
            Formula::Neg(inner) => self.eval_formula(inner, mode)?.neg(),
            Formula::Binary(op, l, r) => {
                let a = self.eval_formula(l, mode)?;
                let b = self.eval_formula(r, mode)?;
                match op {
                    BinOp::Add => a.add(&b)?,
                    BinOp::Sub => a.sub(&b)?,
                    BinOp::Mul => a.mul(&b)?,
                    BinOp::Div => a.div(&b)?,
                    BinOp::Pow => a.pow(&b)?,
                }
            }
            Formula::Call(func, arg) => self.eval_formula(arg, mode)?.apply(*func)?,
        })
    }

    /// Toggle dual mode on a node and everything it reads: a Parameter's
    /// alias target, or an Expression's whole sub-Space. Each node is
    /// visited once.
    pub fn set_ad(&mut self, node: NodeRef, ad: bool) -> GraphResult<()> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![node];
        while let Some(node) = pending.pop() {
            if !seen.insert(node) {
                continue;
            }
            match node {
                NodeRef::Param(id) => {
                    let p = self.parameter_mut(id)?;
                    p.ad = ad;
                    if let Binding::Aliased(AliasTarget::Node(target)) = p.binding {
                        pending.push(target);
                    }
                }
                NodeRef::Expr(id) => {
                    let e = self.expression_mut(id)?;
                    e.ad = ad;
                    debug!(name = %e.name, ad, "expression AD mode set");
                    pending.extend(e.space.nodes());
                }
            }
        }
        Ok(())
    }

    pub fn on_ad(&mut self, node: NodeRef) -> GraphResult<()> {
        self.set_ad(node, true)
    }

    pub fn off_ad(&mut self, node: NodeRef) -> GraphResult<()> {
        self.set_ad(node, false)
    }

    /// d(node)/d(param) by evaluating in dual mode.
    pub fn partial(&self, node: NodeRef, param: ParamId) -> GraphResult<Real> {
        Ok(self.evaluate_with(node, Mode::Dual)?.partial(param))
    }

    /// d(node)/d(name), where `name` is a Parameter reachable from `node`.
    pub fn partial_by_name(&self, node: NodeRef, name: &str) -> GraphResult<Real> {
        let params = self.get_parameters(node)?;
        let id = params.get(name).copied().ok_or_else(|| GraphError::NameResolution {
            name: name.to_string(),
            formula: self
                .describe(node)
                .unwrap_or_else(|_| node.to_string()),
        })?;
        self.partial(node, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterDef;
    use kli_core::{Tolerances, nearly_equal};

    fn close(a: f64, b: f64) -> bool {
        nearly_equal(a, b, Tolerances { abs: 1e-9, rel: 1e-6 })
    }

    #[test]
    fn alias_to_node_and_constant() {
        let mut g = ParamGraph::new();
        let v0 = g.add_parameter(ParameterDef::new("V0", -65.0).units("mV")).unwrap();
        let v = g.add_parameter(ParameterDef::new("VOLTAGE", 0.0).units("mV")).unwrap();
        g.remap(v, NodeRef::Param(v0)).unwrap();
        let q = g.evaluate(NodeRef::Param(v)).unwrap();
        assert!(close(q.magnitude(), -65.0));

        g.remap(v, kli_core::Quantity::parse(-0.07, "V").unwrap()).unwrap();
        let q = g.evaluate(NodeRef::Param(v)).unwrap();
        assert!(close(q.as_quantity().unwrap().magnitude_in("mV").unwrap(), -70.0));
        let d = g.evaluate_with(NodeRef::Param(v), Mode::Dual).unwrap();
        assert!(close(d.magnitude(), -0.07));
        assert!(d.as_dual().unwrap().partials.is_empty());

        g.unmap(v).unwrap();
        assert!(close(g.evaluate(NodeRef::Param(v)).unwrap().magnitude(), 0.0));
    }

    #[test]
    fn derivative_through_nested_expressions() {
        let mut g = ParamGraph::new();
        let x = g.add_parameter(ParameterDef::new("x", 0.5)).unwrap();
        let y = g.add_parameter(ParameterDef::new("y", 2.0)).unwrap();
        let inner = g
            .add_expression("inner", "sin(x)*y", &[NodeRef::Param(x), NodeRef::Param(y)])
            .unwrap();
        let outer = g
            .add_expression("outer", "exp(inner) + x**2", &[NodeRef::Expr(inner)])
            .unwrap();
        g.on_ad(NodeRef::Expr(outer)).unwrap();
        assert!(g.is_ad(NodeRef::Param(x)).unwrap());

        let v = g.evaluate(NodeRef::Expr(outer)).unwrap();
        let s = 0.5_f64.sin() * 2.0;
        assert!(close(v.magnitude(), s.exp() + 0.25));
        assert!(close(v.partial(x), s.exp() * 0.5_f64.cos() * 2.0 + 1.0));
        assert!(close(v.partial(y), s.exp() * 0.5_f64.sin()));
        assert!(close(
            g.partial_by_name(NodeRef::Expr(outer), "y").unwrap(),
            v.partial(y)
        ));
        assert!(g.partial_by_name(NodeRef::Expr(outer), "z").is_err());

        g.off_ad(NodeRef::Expr(outer)).unwrap();
        assert_eq!(g.evaluate(NodeRef::Expr(outer)).unwrap().mode(), Mode::Plain);
    }

    #[test]
    fn remap_propagates_ad_mode() {
        let mut g = ParamGraph::new();
        let a = g.add_parameter(ParameterDef::new("a", 1.0)).unwrap();
        let b = g.add_parameter(ParameterDef::new("b", 4.0)).unwrap();
        g.on_ad(NodeRef::Param(a)).unwrap();
        g.remap(a, NodeRef::Param(b)).unwrap();
        assert!(g.is_ad(NodeRef::Param(b)).unwrap());
        let v = g.evaluate(NodeRef::Param(a)).unwrap();
        assert!(close(v.partial(b), 1.0));
        assert!(close(v.partial(a), 0.0));
    }

    #[test]
    fn alias_reads_with_the_target_flag() {
        let mut g = ParamGraph::new();
        let p = g.add_parameter(ParameterDef::new("p", 1.0)).unwrap();
        let t = g.add_parameter(ParameterDef::new("t", 4.0)).unwrap();
        g.remap(p, NodeRef::Param(t)).unwrap();
        g.on_ad(NodeRef::Param(t)).unwrap();
        assert!(!g.is_ad(NodeRef::Param(p)).unwrap());

        let via_alias = g.evaluate(NodeRef::Param(p)).unwrap();
        assert_eq!(via_alias, g.evaluate(NodeRef::Param(t)).unwrap());
        assert_eq!(via_alias.mode(), Mode::Dual);
        assert_eq!(
            g.evaluate_with(NodeRef::Param(p), Mode::Plain).unwrap().mode(),
            Mode::Plain
        );
    }

    #[test]
    fn frozen_cache_respects_mode() {
        let mut g = ParamGraph::new();
        let x = g.add_parameter(ParameterDef::new("x", 3.0)).unwrap();
        let e = g.add_expression("e", "2*x", &[NodeRef::Param(x)]).unwrap();
        g.freeze(e).unwrap();
        g.assign(x, 4.0, None).unwrap();
        assert!(close(g.evaluate(NodeRef::Expr(e)).unwrap().magnitude(), 6.0));
        let d = g.evaluate_with(NodeRef::Expr(e), Mode::Dual).unwrap();
        assert!(close(d.magnitude(), 8.0));
        assert!(close(d.partial(x), 2.0));
    }
}
