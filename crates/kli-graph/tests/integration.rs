//! Integration tests for kli-graph.

use kli_core::{ExprId, Mode, ParamId, Tolerances, nearly_equal};
use kli_graph::resolve::{magnitude, magnitude_in};
use kli_graph::{GraphError, NodeRef, ParamGraph, ParameterDef, Space, fit};

fn close(a: f64, b: f64) -> bool {
    nearly_equal(a, b, Tolerances { abs: 1e-9, rel: 1e-6 })
}

/// Two-gate voltage-dependent rate model.
struct Channel {
    graph: ParamGraph,
    v0: ParamId,
    voltage: ParamId,
    offset: ParamId,
    ta1: ParamId,
    tk1: ParamId,
    d1: ParamId,
    k1: ParamId,
    d2: ParamId,
    k2: ParamId,
    vr: ExprId,
    tau1: ExprId,
    k_1: ExprId,
    a1: ExprId,
    b1: ExprId,
    a2: ExprId,
    b2: ExprId,
}

fn channel() -> Channel {
    let mut g = ParamGraph::new();
    let mut p = |def: ParameterDef| g.add_parameter(def).unwrap();
    let ta1 = p(ParameterDef::new("ta1", 4.4).units("ms").log());
    let tk1 = p(ParameterDef::new("tk1", -0.025).units("1/mV"));
    let d1 = p(ParameterDef::new("d1", 21.0).units("mV"));
    let k1 = p(ParameterDef::new("k1", 0.2).units("1/mV"));
    let ta2 = p(ParameterDef::new("ta2", 2.6).units("ms").log());
    let tk2 = p(ParameterDef::new("tk2", -0.007).units("1/mV"));
    let d2 = p(ParameterDef::new("d2", 43.0).units("mV"));
    let k2 = p(ParameterDef::new("k2", 0.036).units("1/mV"));
    let v0 = p(ParameterDef::new("V0", -65.0).units("mV"));
    let voltage = p(ParameterDef::new("VOLTAGE", -65.0).units("mV"));
    let offset = p(ParameterDef::new("OFFSET", 65.0).units("mV"));

    use NodeRef::{Expr as E, Param as P};
    g.remap(voltage, P(v0)).unwrap();
    let vr = g
        .add_expression("vr", "VOLTAGE + OFFSET", &[P(voltage), P(offset)])
        .unwrap();
    let tau1 = g
        .add_expression("tau1", "ta1*exp(tk1*vr)", &[P(ta1), P(tk1), E(vr)])
        .unwrap();
    let k_1 = g
        .add_expression(
            "K1",
            "exp((k2*(d2-vr))-(k1*(d1-vr)))",
            &[P(k1), P(k2), P(d1), P(d2), E(vr)],
        )
        .unwrap();
    let tau2 = g
        .add_expression("tau2", "ta2*exp(tk2*vr)", &[P(ta2), P(tk2), E(vr)])
        .unwrap();
    let k_2 = g
        .add_expression("K2", "exp(-(k2*(d2-vr)))", &[P(k2), P(d2), E(vr)])
        .unwrap();
    let a1 = g
        .add_expression("a1", "K1/(tau1*(K1+1))", &[E(k_1), E(tau1)])
        .unwrap();
    let b1 = g
        .add_expression("b1", "1/(tau1*(K1+1))", &[E(k_1), E(tau1)])
        .unwrap();
    let a2 = g
        .add_expression("a2", "K2/(tau2*(K2+1))", &[E(k_2), E(tau2)])
        .unwrap();
    let b2 = g
        .add_expression("b2", "1/(tau2*(K2+1))", &[E(k_2), E(tau2)])
        .unwrap();

    Channel {
        graph: g,
        v0,
        voltage,
        offset,
        ta1,
        tk1,
        d1,
        k1,
        d2,
        k2,
        vr,
        tau1,
        k_1,
        a1,
        b1,
        a2,
        b2,
    }
}

/// Closed form of a1 and b1 (per ms) at relative voltage `vr` (mV).
fn gate1(vr: f64) -> (f64, f64) {
    let tau1 = 4.4 * (-0.025 * vr).exp();
    let k1 = (0.036 * (43.0 - vr) - 0.2 * (21.0 - vr)).exp();
    (k1 / (tau1 * (k1 + 1.0)), 1.0 / (tau1 * (k1 + 1.0)))
}

#[test]
fn scenario_vr_follows_alias_target() {
    let mut c = channel();
    let vr = NodeRef::Expr(c.vr);
    assert!(close(magnitude_in(&c.graph, vr, "mV").unwrap(), 0.0));

    c.graph.assign(c.v0, -70.0, None).unwrap();
    assert!(close(magnitude_in(&c.graph, vr, "mV").unwrap(), -5.0));
    assert!(close(magnitude_in(&c.graph, vr, "V").unwrap(), -0.005));
}

#[test]
fn scenario_q_rate_parameter() {
    let mut g = ParamGraph::new();
    let q = g
        .add_parameter(ParameterDef::new("q", 1.0 / 6.0).units("kHz").log())
        .unwrap();
    let p = g.parameter(q).unwrap();
    assert_eq!((p.lower(), p.upper()), (0.0, f64::INFINITY));

    g.assign(q, 0.3, Some("kHz")).unwrap();
    assert!(close(g.parameter(q).unwrap().value(), 0.3));
    assert!(g.assign(q, -0.1, Some("kHz")).unwrap_err().is_validation());
    g.assign_log(q, 2.0_f64.ln(), None).unwrap();
    assert!(close(g.parameter(q).unwrap().value(), 2.0));
}

#[test]
fn rates_match_closed_form() {
    let mut c = channel();
    for v in [-65.0, -40.0, -100.0] {
        c.graph.assign(c.v0, v, None).unwrap();
        let (a1, b1) = gate1(v + 65.0);
        assert!(close(magnitude(&c.graph, NodeRef::Expr(c.a1)).unwrap(), a1));
        assert!(close(magnitude(&c.graph, NodeRef::Expr(c.b1)).unwrap(), b1));
        assert!(close(
            magnitude_in(&c.graph, NodeRef::Expr(c.a1), "kHz").unwrap(),
            a1
        ));
        assert!(close(
            magnitude_in(&c.graph, NodeRef::Expr(c.tau1), "s").unwrap(),
            4.4e-3 * (-0.025 * (v + 65.0)).exp()
        ));
    }
    assert!(magnitude_in(&c.graph, NodeRef::Expr(c.a2), "mV").unwrap_err().is_unit());
}

#[test]
fn expression_closure_collects_every_parameter() {
    let c = channel();
    let names: Vec<String> = c
        .graph
        .get_parameters(NodeRef::Expr(c.a1))
        .unwrap()
        .into_keys()
        .collect();
    assert_eq!(
        names,
        ["OFFSET", "VOLTAGE", "d1", "d2", "k1", "k2", "ta1", "tk1"]
    );
    let exprs = c.graph.get_expressions(NodeRef::Expr(c.b2)).unwrap();
    assert_eq!(exprs.len(), 4);
    assert!(exprs.contains_key("vr"));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut c = channel();
    let imposter = c
        .graph
        .add_parameter(ParameterDef::new("VOLTAGE", -30.0).units("mV"))
        .unwrap();
    let err = c
        .graph
        .add_expression(
            "bad",
            "vr + VOLTAGE",
            &[NodeRef::Expr(c.vr), NodeRef::Param(imposter)],
        )
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::NameCollision {
            name: "VOLTAGE".into()
        }
    );

    let mut s = Space::from_items(&c.graph, &[NodeRef::Expr(c.vr)]).unwrap();
    s.append_parameter(&c.graph, c.voltage).unwrap();
    assert_eq!(s.len(), 3);
}

#[test]
fn remap_and_unmap_round_trip() {
    let mut c = channel();
    let vr = NodeRef::Expr(c.vr);
    let before = magnitude(&c.graph, vr).unwrap();

    c.graph.remap(c.offset, NodeRef::Param(c.d1)).unwrap();
    assert!(close(
        magnitude(&c.graph, NodeRef::Param(c.offset)).unwrap(),
        magnitude(&c.graph, NodeRef::Param(c.d1)).unwrap()
    ));
    assert!(close(magnitude(&c.graph, vr).unwrap(), -65.0 + 21.0));

    c.graph.unmap(c.offset).unwrap();
    assert_eq!(magnitude(&c.graph, vr).unwrap(), before);
}

#[test]
fn remap_into_own_dependent_is_cyclic() {
    let mut c = channel();
    let err = c
        .graph
        .remap(c.voltage, NodeRef::Expr(c.tau1))
        .unwrap_err();
    assert!(matches!(err, GraphError::CyclicDependency { .. }));
    assert!(close(
        magnitude_in(&c.graph, NodeRef::Expr(c.vr), "mV").unwrap(),
        0.0
    ));
}

#[test]
fn ad_matches_finite_differences() {
    let mut c = channel();
    let a1 = NodeRef::Expr(c.a1);
    c.graph.assign(c.v0, -50.0, None).unwrap();
    let wrt = [c.ta1, c.tk1, c.d1, c.k1, c.d2, c.k2, c.v0];
    let grad = fit::gradient(&c.graph, a1, &wrt).unwrap();

    for (&id, &ad) in wrt.iter().zip(&grad) {
        let x = c.graph.parameter(id).unwrap().value();
        let h = 1e-6 * x.abs().max(1.0);
        c.graph.assign(id, x + h, None).unwrap();
        let up = magnitude(&c.graph, a1).unwrap();
        c.graph.assign(id, x - h, None).unwrap();
        let down = magnitude(&c.graph, a1).unwrap();
        c.graph.assign(id, x, None).unwrap();
        let fd = (up - down) / (2.0 * h);
        assert!(
            nearly_equal(ad, fd, Tolerances { abs: 1e-8, rel: 1e-5 }),
            "{}: ad {ad} vs fd {fd}",
            c.graph.parameter(id).unwrap().name()
        );
    }
}

#[test]
fn ad_mode_propagates_through_alias() {
    let mut c = channel();
    c.graph.on_ad(NodeRef::Expr(c.b1)).unwrap();
    assert!(c.graph.is_ad(NodeRef::Param(c.v0)).unwrap());
    let v = c.graph.evaluate(NodeRef::Expr(c.b1)).unwrap();
    assert_eq!(v.mode(), Mode::Dual);
    assert!(v.partial(c.v0) != 0.0);
    assert_eq!(v.partial(c.voltage), 0.0);
    let (_, b1) = gate1(0.0);
    assert!(close(v.magnitude(), b1));
    assert_eq!(v.partial(c.offset), v.partial(c.v0));

    c.graph.off_ad(NodeRef::Expr(c.b1)).unwrap();
    assert_eq!(
        c.graph.evaluate(NodeRef::Expr(c.b1)).unwrap().mode(),
        Mode::Plain
    );
}

#[test]
fn frozen_rates_ignore_parameter_changes() {
    let mut c = channel();
    let k = NodeRef::Expr(c.k_1);
    let before = magnitude(&c.graph, k).unwrap();
    c.graph.freeze(c.k_1).unwrap();
    c.graph.assign(c.k1, 0.3, None).unwrap();
    assert_eq!(magnitude(&c.graph, k).unwrap(), before);
    c.graph.thaw(c.k_1).unwrap();
    assert!(magnitude(&c.graph, k).unwrap() != before);
}

#[test]
fn optimizer_boundary() {
    let mut c = channel();
    let params = [c.ta1, c.tk1];
    let start = fit::current_log_vector(&c.graph, &params).unwrap();
    assert!(close(start[0], 4.4_f64.ln()));
    assert!(close(start[1], -0.025));

    fit::assign_log_all(&mut c.graph, &params, &[1.0, -0.01]).unwrap();
    assert!(close(c.graph.parameter(c.ta1).unwrap().value(), 1.0_f64.exp()));
    let out = fit::experiment(&c.graph, &[NodeRef::Expr(c.a1), NodeRef::Expr(c.b1)]).unwrap();
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|x| x.is_finite() && *x > 0.0));

    assert!(fit::assign_log_all(&mut c.graph, &params, &[1.0]).is_err());
}

#[test]
fn space_summary_lists_rates() {
    let c = channel();
    let s = c.graph.space_of(NodeRef::Expr(c.vr)).unwrap();
    let text = s.summary(&c.graph).unwrap();
    assert!(text.starts_with(" Parameters:"));
    assert!(text.contains("VOLTAGE --> V0"));
    assert!(text.contains("OFFSET = 65 mV"));
}

#[test]
fn deep_expression_chain_stays_tractable() {
    let mut g = ParamGraph::new();
    let x = g.add_parameter(ParameterDef::new("x", 1.0)).unwrap();
    let k = g.add_parameter(ParameterDef::new("k", 3.0)).unwrap();
    let mut top = g.add_expression("e0", "x+1", &[NodeRef::Param(x)]).unwrap();
    for d in 1..40 {
        let prev = format!("e{}", d - 1);
        top = g
            .add_expression(format!("e{d}"), &format!("{prev}+1"), &[NodeRef::Expr(top)])
            .unwrap();
    }
    let node = NodeRef::Expr(top);
    assert!(close(magnitude(&g, node).unwrap(), 41.0));
    assert_eq!(g.get_expressions(node).unwrap().len(), 40);
    assert_eq!(g.get_parameters(node).unwrap().len(), 1);

    g.on_ad(node).unwrap();
    assert!(g.is_ad(NodeRef::Param(x)).unwrap());
    assert!(close(g.evaluate(node).unwrap().partial(x), 1.0));

    g.remap(x, NodeRef::Param(k)).unwrap();
    assert!(g.is_ad(NodeRef::Param(k)).unwrap());
    assert!(close(magnitude(&g, node).unwrap(), 43.0));
    assert!(matches!(
        g.remap(k, node).unwrap_err(),
        GraphError::CyclicDependency { .. }
    ));

    g.reexpress(top, Some("e38*2"), None).unwrap();
    assert!(close(magnitude(&g, node).unwrap(), 84.0));
    g.unmap_expression(top).unwrap();
    assert!(close(magnitude(&g, node).unwrap(), 80.0));
    g.off_ad(node).unwrap();
    assert_eq!(g.evaluate(node).unwrap().mode(), Mode::Plain);
}

#[test]
fn runaway_unit_powers_are_unit_errors() {
    let mut g = ParamGraph::new();
    let x = g.add_parameter(ParameterDef::new("x", 2.0).units("mV")).unwrap();
    let err = g
        .add_expression("y", "x**40 * x**40", &[NodeRef::Param(x)])
        .unwrap_err();
    assert!(err.is_unit());
    assert!(g.expressions().is_empty());
    assert!(g.add_expression("y", "x**40", &[NodeRef::Param(x)]).is_ok());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn log_parameter_stays_positive(x in -30.0_f64..30.0) {
            let mut g = ParamGraph::new();
            let q = g.add_parameter(ParameterDef::new("q", 1.0).units("kHz").log()).unwrap();
            g.assign_log(q, x, None).unwrap();
            let p = g.parameter(q).unwrap();
            prop_assert!(p.value() > 0.0);
            prop_assert!(p.lower() >= 0.0);
            prop_assert!(nearly_equal(p.value().ln(), x, Tolerances::default()));
        }

        #[test]
        fn linear_assign_log_is_identity(x in -1.0e6_f64..1.0e6) {
            let mut g = ParamGraph::new();
            let v = g.add_parameter(ParameterDef::new("V1", 20.0).units("mV")).unwrap();
            g.assign_log(v, x, None).unwrap();
            prop_assert_eq!(g.parameter(v).unwrap().value(), x);
        }

        #[test]
        fn rejected_assign_keeps_log_domain(x in -10.0_f64..10.0) {
            let mut g = ParamGraph::new();
            let q = g.add_parameter(ParameterDef::new("q", 0.5).log()).unwrap();
            let ok = g.assign(q, x, None).is_ok();
            let p = g.parameter(q).unwrap();
            prop_assert_eq!(ok, x > 0.0);
            prop_assert!(p.value() > 0.0);
        }
    }
}
