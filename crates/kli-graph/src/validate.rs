//! Graph validation logic.

use std::collections::BTreeSet;

use kli_core::{KliError, KliResult, ensure_not_nan};

use crate::error::{GraphError, GraphResult};
use crate::graph::{AliasTarget, NodeRef, ParamGraph};
use crate::parameter::{Binding, Parameter};
use crate::space::Space;

/// Check the bound and log-domain invariants of a single parameter.
pub(crate) fn check_parameter(p: &Parameter) -> KliResult<()> {
    let fail = |what: String| -> KliResult<()> { Err(KliError::validation(&p.name, what)) };

    if p.name.is_empty() {
        return fail("name must not be empty".into());
    }
    ensure_not_nan(p.value, "parameter value")?;
    ensure_not_nan(p.default, "parameter default")?;
    ensure_not_nan(p.lower, "parameter lower bound")?;
    ensure_not_nan(p.upper, "parameter upper bound")?;

    if p.lower > p.upper {
        return fail(format!("lower bound {} exceeds upper bound {}", p.lower, p.upper));
    }
    if p.value < p.lower || p.value > p.upper {
        return fail(format!(
            "value {} outside [{}, {}]",
            p.value, p.lower, p.upper
        ));
    }
    if p.default < p.lower || p.default > p.upper {
        return fail(format!(
            "default {} outside [{}, {}]",
            p.default, p.lower, p.upper
        ));
    }
    if p.is_log() {
        if p.lower < 0.0 {
            return fail(format!("log scaling needs lower >= 0, got {}", p.lower));
        }
        if p.value <= 0.0 {
            return fail(format!("log scaling needs value > 0, got {}", p.value));
        }
        if p.default <= 0.0 {
            return fail(format!("log scaling needs default > 0, got {}", p.default));
        }
        if p.upper <= 0.0 {
            return fail(format!("log scaling needs upper > 0, got {}", p.upper));
        }
    }
    Ok(())
}

/// Every key names its entry and every handle exists in the arena.
pub(crate) fn check_space(graph: &ParamGraph, space: &Space) -> GraphResult<()> {
    for (key, &id) in space.param_entries() {
        let p = graph.parameter(id).map_err(|_| GraphError::Integrity {
            what: format!("parameter key '{key}' holds an unknown handle {id}"),
        })?;
        if p.name() != key {
            return Err(GraphError::Integrity {
                what: format!("parameter key '{key}' refers to '{}'", p.name()),
            });
        }
    }
    for (key, &id) in space.expr_entries() {
        let e = graph.expression(id).map_err(|_| GraphError::Integrity {
            what: format!("expression key '{key}' holds an unknown handle {id}"),
        })?;
        if e.name() != key {
            return Err(GraphError::Integrity {
                what: format!("expression key '{key}' refers to '{}'", e.name()),
            });
        }
    }
    Ok(())
}

/// Direct dependencies: sub-Space members of an expression, or the alias
/// target of a parameter.
pub(crate) fn dependencies(graph: &ParamGraph, node: NodeRef) -> GraphResult<Vec<NodeRef>> {
    match node {
        NodeRef::Param(id) => Ok(match graph.parameter(id)?.binding() {
            Binding::Aliased(AliasTarget::Node(target)) => vec![*target],
            _ => Vec::new(),
        }),
        NodeRef::Expr(id) => {
            let space = graph.expression(id)?.space();
            Ok(space
                .param_ids()
                .map(NodeRef::Param)
                .chain(space.expr_ids().map(NodeRef::Expr))
                .collect())
        }
    }
}

/// Fail if `start` can reach itself. Nodes shared by several paths are fine;
/// only a repeat on the current path is a cycle.
pub(crate) fn check_acyclic(graph: &ParamGraph, start: NodeRef) -> GraphResult<()> {
    let mut path = Vec::new();
    let mut done = BTreeSet::new();
    walk(graph, start, &mut path, &mut done)
}

fn walk(
    graph: &ParamGraph,
    node: NodeRef,
    path: &mut Vec<NodeRef>,
    done: &mut BTreeSet<NodeRef>,
) -> GraphResult<()> {
    if path.contains(&node) {
        return Err(GraphError::CyclicDependency {
            name: graph.name_of(node)?.to_string(),
        });
    }
    // finished nodes cannot reach anything on the current path
    if done.contains(&node) {
        return Ok(());
    }
    path.push(node);
    for dep in dependencies(graph, node)? {
        walk(graph, dep, path, done)?;
    }
    path.pop();
    done.insert(node);
    Ok(())
}
