//! Optimizer boundary: vectors of raw values in, plain numbers out.
//!
//! An optimizer works on an ordered list of Parameters and a matching list of
//! unconstrained values. `assign_log_all` maps those values into the model,
//! `experiment` reads back the plain magnitudes a simulator needs, and
//! `gradient` gives partials of one node in the same order.

use kli_core::{KliError, Mode, ParamId, Real};
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::graph::{NodeRef, ParamGraph};
use crate::parameter::Scaling;

fn check_lengths(params: &[ParamId], values: &[Real]) -> GraphResult<()> {
    if params.len() != values.len() {
        return Err(KliError::InvalidArg {
            what: format!(
                "{} parameters but {} values",
                params.len(),
                values.len()
            ),
        }
        .into());
    }
    Ok(())
}

/// Run `f` on a scratch copy and commit only if every assignment succeeds.
fn all_or_nothing(
    graph: &mut ParamGraph,
    f: impl FnOnce(&mut ParamGraph) -> GraphResult<()>,
) -> GraphResult<()> {
    let mut scratch = graph.clone();
    f(&mut scratch)?;
    *graph = scratch;
    Ok(())
}

/// `assign` pairwise. Nothing changes if any value is rejected.
pub fn assign_all(graph: &mut ParamGraph, params: &[ParamId], values: &[Real]) -> GraphResult<()> {
    check_lengths(params, values)?;
    all_or_nothing(graph, |g| {
        for (&id, &v) in params.iter().zip(values) {
            g.assign(id, v, None)?;
        }
        Ok(())
    })
}

/// `assign_log` pairwise. Nothing changes if any value is rejected.
pub fn assign_log_all(
    graph: &mut ParamGraph,
    params: &[ParamId],
    values: &[Real],
) -> GraphResult<()> {
    check_lengths(params, values)?;
    all_or_nothing(graph, |g| {
        for (&id, &v) in params.iter().zip(values) {
            g.assign_log(id, v, None)?;
        }
        Ok(())
    })?;
    trace!(count = params.len(), "optimizer point assigned");
    Ok(())
}

/// Inverse of [`assign_log_all`] at the current stored values.
pub fn current_log_vector(graph: &ParamGraph, params: &[ParamId]) -> GraphResult<Vec<Real>> {
    params
        .iter()
        .map(|&id| {
            let p = graph.parameter(id)?;
            Ok::<_, GraphError>(match p.scaling() {
                Scaling::Log => p.value().ln(),
                Scaling::Linear => p.value(),
            })
        })
        .collect()
}

/// Plain magnitudes of `nodes`, each in the unit its evaluation produces.
pub fn experiment(graph: &ParamGraph, nodes: &[NodeRef]) -> GraphResult<Vec<Real>> {
    nodes
        .iter()
        .map(|&n| Ok::<_, GraphError>(graph.evaluate_with(n, Mode::Plain)?.magnitude()))
        .collect()
}

/// Partials of `node` with respect to `params`, in order; zero where the
/// node does not depend on a parameter.
pub fn gradient(graph: &ParamGraph, node: NodeRef, params: &[ParamId]) -> GraphResult<Vec<Real>> {
    let value = graph.evaluate_with(node, Mode::Dual)?;
    params
        .iter()
        .map(|&id| {
            graph.parameter(id)?;
            Ok::<_, GraphError>(value.partial(id))
        })
        .collect()
}
