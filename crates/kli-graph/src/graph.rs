//! Arena holding every Parameter and Expression of a model.

use core::fmt;

use kli_core::{ExprId, ParamId, Quantity};

use crate::error::{GraphError, GraphResult};
use crate::expression::Expression;
use crate::parameter::Parameter;

/// Handle of any node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Param(ParamId),
    Expr(ExprId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Param(id) => write!(f, "param#{id}"),
            NodeRef::Expr(id) => write!(f, "expr#{id}"),
        }
    }
}

/// What an aliased Parameter defers to.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasTarget {
    Node(NodeRef),
    Constant(Quantity),
}

impl From<NodeRef> for AliasTarget {
    fn from(node: NodeRef) -> Self {
        AliasTarget::Node(node)
    }
}

impl From<Quantity> for AliasTarget {
    fn from(q: Quantity) -> Self {
        AliasTarget::Constant(q)
    }
}

impl From<f64> for AliasTarget {
    fn from(x: f64) -> Self {
        AliasTarget::Constant(Quantity::dimensionless(x))
    }
}

impl fmt::Display for AliasTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasTarget::Node(node) => write!(f, "{node}"),
            AliasTarget::Constant(q) => write!(f, "{q}"),
        }
    }
}

/// The model arena.
///
/// Nodes are never removed individually; the whole graph is dropped at once.
/// Handles are only meaningful for the graph that issued them.
#[derive(Debug, Clone, Default)]
pub struct ParamGraph {
    pub(crate) params: Vec<Parameter>,
    pub(crate) exprs: Vec<Expression>,
}

impl ParamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return all parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    /// Return all expressions.
    pub fn expressions(&self) -> &[Expression] {
        &self.exprs
    }

    pub fn parameter(&self, id: ParamId) -> GraphResult<&Parameter> {
        self.params
            .get(id.index() as usize)
            .ok_or(GraphError::IdNotFound { what: "ParamId" })
    }

    pub fn expression(&self, id: ExprId) -> GraphResult<&Expression> {
        self.exprs
            .get(id.index() as usize)
            .ok_or(GraphError::IdNotFound { what: "ExprId" })
    }

    pub(crate) fn parameter_mut(&mut self, id: ParamId) -> GraphResult<&mut Parameter> {
        self.params
            .get_mut(id.index() as usize)
            .ok_or(GraphError::IdNotFound { what: "ParamId" })
    }

    pub(crate) fn expression_mut(&mut self, id: ExprId) -> GraphResult<&mut Expression> {
        self.exprs
            .get_mut(id.index() as usize)
            .ok_or(GraphError::IdNotFound { what: "ExprId" })
    }

    pub fn name_of(&self, node: NodeRef) -> GraphResult<&str> {
        match node {
            NodeRef::Param(id) => Ok(self.parameter(id)?.name()),
            NodeRef::Expr(id) => Ok(self.expression(id)?.name()),
        }
    }

    /// Whether the node currently evaluates in dual mode.
    pub fn is_ad(&self, node: NodeRef) -> GraphResult<bool> {
        match node {
            NodeRef::Param(id) => Ok(self.parameter(id)?.is_ad()),
            NodeRef::Expr(id) => Ok(self.expression(id)?.is_ad()),
        }
    }

    /// First parameter registered under `name`, if any.
    pub fn find_parameter(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name() == name).map(|p| p.id())
    }

    /// First expression registered under `name`, if any.
    pub fn find_expression(&self, name: &str) -> Option<ExprId> {
        self.exprs.iter().find(|e| e.name() == name).map(|e| e.id())
    }

    /// One-line rendering: `name = value` or `name --> target`.
    pub fn describe(&self, node: NodeRef) -> GraphResult<String> {
        match node {
            NodeRef::Param(id) => {
                let p = self.parameter(id)?;
                Ok(match p.alias() {
                    Some(AliasTarget::Node(target)) => {
                        format!("{} --> {}", p.name(), self.name_of(*target)?)
                    }
                    Some(AliasTarget::Constant(q)) => format!("{} --> {q}", p.name()),
                    None => format!("{p}"),
                })
            }
            NodeRef::Expr(id) => {
                let e = self.expression(id)?;
                Ok(format!("{} = {}", e.name(), e.formula()))
            }
        }
    }
}
