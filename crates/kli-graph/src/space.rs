//! Deduplicating name → handle containers.

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;

use kli_core::{ExprId, Id, ParamId};
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::graph::{NodeRef, ParamGraph};
use crate::validate;

/// Name → Parameter and name → Expression maps over one graph.
///
/// Every key equals the name of the node it maps to, and a name already
/// present may only be merged again with the same handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Space {
    params: BTreeMap<String, ParamId>,
    exprs: BTreeMap<String, ExprId>,
}

fn insert_unique(map: &mut BTreeMap<String, Id>, name: &str, id: Id) -> GraphResult<()> {
    match map.entry(name.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(id);
            Ok(())
        }
        Entry::Occupied(slot) if *slot.get() == id => Ok(()),
        Entry::Occupied(_) => Err(GraphError::NameCollision {
            name: name.to_string(),
        }),
    }
}

impl Space {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge the transitive closure of every item: a Parameter contributes
    /// itself, an Expression itself plus everything it contains.
    pub fn from_items(graph: &ParamGraph, items: &[NodeRef]) -> GraphResult<Self> {
        let mut space = Self::empty();
        for &item in items {
            let closure = Self::closure(graph, item)?;
            space.merge_unchecked(&closure)?;
        }
        validate::check_space(graph, &space)?;
        Ok(space)
    }

    /// Closure of a single node.
    pub(crate) fn closure(graph: &ParamGraph, node: NodeRef) -> GraphResult<Self> {
        let mut space = Self::empty();
        let mut path = Vec::new();
        let mut done = BTreeSet::new();
        space.collect(graph, node, &mut path, &mut done)?;
        Ok(space)
    }

    /// Depth-first over sub-Spaces. `path` holds the Expressions being
    /// expanded, `done` those already fully merged.
    fn collect(
        &mut self,
        graph: &ParamGraph,
        node: NodeRef,
        path: &mut Vec<ExprId>,
        done: &mut BTreeSet<ExprId>,
    ) -> GraphResult<()> {
        match node {
            NodeRef::Param(id) => insert_unique(&mut self.params, graph.parameter(id)?.name(), id),
            NodeRef::Expr(id) => {
                let e = graph.expression(id)?;
                if path.contains(&id) {
                    return Err(GraphError::CyclicDependency {
                        name: e.name().to_string(),
                    });
                }
                if done.contains(&id) {
                    return Ok(());
                }
                insert_unique(&mut self.exprs, e.name(), id)?;
                path.push(id);
                for p in e.space().param_ids() {
                    self.collect(graph, NodeRef::Param(p), path, done)?;
                }
                for x in e.space().expr_ids() {
                    self.collect(graph, NodeRef::Expr(x), path, done)?;
                }
                path.pop();
                done.insert(id);
                Ok(())
            }
        }
    }

    fn merge_unchecked(&mut self, other: &Space) -> GraphResult<()> {
        for (name, &id) in &other.params {
            insert_unique(&mut self.params, name, id)?;
        }
        for (name, &id) in &other.exprs {
            insert_unique(&mut self.exprs, name, id)?;
        }
        Ok(())
    }

    /// Merge both maps of `other`. Nothing changes on failure.
    pub fn merge(&mut self, graph: &ParamGraph, other: &Space) -> GraphResult<()> {
        let mut candidate = self.clone();
        candidate.merge_unchecked(other)?;
        validate::check_space(graph, &candidate)?;
        debug!(
            params = candidate.params.len(),
            exprs = candidate.exprs.len(),
            "spaces merged"
        );
        *self = candidate;
        Ok(())
    }

    /// Insert a single node by its current name. Nothing changes on failure.
    pub fn append(&mut self, graph: &ParamGraph, item: NodeRef) -> GraphResult<()> {
        let mut candidate = self.clone();
        match item {
            NodeRef::Param(id) => {
                insert_unique(&mut candidate.params, graph.parameter(id)?.name(), id)?
            }
            NodeRef::Expr(id) => {
                insert_unique(&mut candidate.exprs, graph.expression(id)?.name(), id)?
            }
        }
        validate::check_space(graph, &candidate)?;
        *self = candidate;
        Ok(())
    }

    pub fn append_parameter(&mut self, graph: &ParamGraph, id: ParamId) -> GraphResult<()> {
        self.append(graph, NodeRef::Param(id))
    }

    pub fn append_expression(&mut self, graph: &ParamGraph, id: ExprId) -> GraphResult<()> {
        self.append(graph, NodeRef::Expr(id))
    }

    pub fn param(&self, name: &str) -> Option<ParamId> {
        self.params.get(name).copied()
    }

    pub fn expr(&self, name: &str) -> Option<ExprId> {
        self.exprs.get(name).copied()
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Param(id) => self.params.values().any(|&p| p == id),
            NodeRef::Expr(id) => self.exprs.values().any(|&e| e == id),
        }
    }

    pub fn param_entries(&self) -> impl Iterator<Item = (&String, &ParamId)> {
        self.params.iter()
    }

    pub fn expr_entries(&self) -> impl Iterator<Item = (&String, &ExprId)> {
        self.exprs.iter()
    }

    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.params.values().copied()
    }

    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.exprs.values().copied()
    }

    /// Parameters and Expressions, Parameters first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.param_ids()
            .map(NodeRef::Param)
            .chain(self.expr_ids().map(NodeRef::Expr))
    }

    pub fn len(&self) -> usize {
        self.params.len() + self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.exprs.is_empty()
    }

    /// Switch every contained node, and everything below it, to dual mode.
    pub fn on_ad(&self, graph: &mut ParamGraph) -> GraphResult<()> {
        self.set_ad(graph, true)
    }

    pub fn off_ad(&self, graph: &mut ParamGraph) -> GraphResult<()> {
        self.set_ad(graph, false)
    }

    fn set_ad(&self, graph: &mut ParamGraph, ad: bool) -> GraphResult<()> {
        for node in self.nodes() {
            graph.set_ad(node, ad)?;
        }
        Ok(())
    }

    /// Remove aliasing from every contained Parameter and from every
    /// Parameter below a contained Expression.
    pub fn unmap(&self, graph: &mut ParamGraph) -> GraphResult<()> {
        for id in self.param_ids() {
            graph.unmap(id)?;
        }
        for id in self.expr_ids() {
            graph.unmap_expression(id)?;
        }
        Ok(())
    }

    /// Re-check that keys still match names, e.g. after a rename.
    pub fn integrity(&self, graph: &ParamGraph) -> GraphResult<()> {
        validate::check_space(graph, self)
    }

    /// Listing of Expressions with their current value, then Parameters.
    pub fn summary(&self, graph: &ParamGraph) -> GraphResult<String> {
        if self.is_empty() {
            return Ok(" Empty Expression/Parameter Space".to_string());
        }
        let mut s = String::new();
        if !self.exprs.is_empty() {
            s.push_str(" Expressions:");
            for (name, &id) in &self.exprs {
                let e = graph.expression(id)?;
                let value = graph.evaluate(NodeRef::Expr(id))?;
                s.push_str(&format!("\n  {name} = {} = {value}", e.formula()));
            }
        }
        if !self.params.is_empty() {
            if !s.is_empty() {
                s.push('\n');
            }
            s.push_str(" Parameters:");
            for &id in self.params.values() {
                s.push_str(&format!("\n  {}", graph.describe(NodeRef::Param(id))?));
            }
        }
        Ok(s)
    }
}

impl ParamGraph {
    /// The Space a node lives in: an Expression's own sub-Space, or a
    /// singleton for a Parameter.
    pub fn space_of(&self, node: NodeRef) -> GraphResult<Space> {
        match node {
            NodeRef::Expr(id) => Ok(self.expression(id)?.space().clone()),
            NodeRef::Param(_) => Space::from_items(self, &[node]),
        }
    }

    /// Every Parameter reachable from `node`, by name.
    pub fn get_parameters(&self, node: NodeRef) -> GraphResult<BTreeMap<String, ParamId>> {
        Ok(Space::closure(self, node)?.params)
    }

    /// Every Expression reachable from `node` (itself included), by name.
    pub fn get_expressions(&self, node: NodeRef) -> GraphResult<BTreeMap<String, ExprId>> {
        Ok(Space::closure(self, node)?.exprs)
    }
}
