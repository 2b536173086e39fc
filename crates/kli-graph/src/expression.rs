//! Named formulas over a closed Space of Parameters and Expressions.

use core::fmt;

use kli_core::{ExprId, KliError, Value};
use tracing::debug;

use crate::error::GraphResult;
use crate::formula::{self, Formula};
use crate::graph::{NodeRef, ParamGraph};
use crate::space::Space;
use crate::validate;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub(crate) id: ExprId,
    pub(crate) name: String,
    pub(crate) formula: String,
    pub(crate) tree: Formula,
    pub(crate) space: Space,
    pub(crate) ad: bool,
    pub(crate) frozen: bool,
    /// Value from the last freeze/thaw.
    pub(crate) cache: Option<Value>,
}

impl Expression {
    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source text as given.
    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn tree(&self) -> &Formula {
        &self.tree
    }

    /// The nodes this formula may reference.
    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn is_ad(&self) -> bool {
        self.ad
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn cached(&self) -> Option<&Value> {
        self.cache.as_ref()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula)
    }
}

impl ParamGraph {
    /// Compile `formula` against the closure of `items` and evaluate it once.
    ///
    /// Nothing is added if parsing, name resolution or the first evaluation
    /// fails.
    pub fn add_expression(
        &mut self,
        name: impl Into<String>,
        formula: &str,
        items: &[NodeRef],
    ) -> GraphResult<ExprId> {
        let name = name.into();
        if name.is_empty() {
            return Err(KliError::InvalidArg {
                what: "expression name must not be empty".into(),
            }
            .into());
        }
        let space = Space::from_items(self, items)?;
        let tree = formula::compile(&formula::parse(formula)?, &space, formula)?;

        let id = ExprId::from_index(self.exprs.len() as u32);
        self.exprs.push(Expression {
            id,
            name,
            formula: formula.to_string(),
            tree,
            space,
            ad: false,
            frozen: false,
            cache: None,
        });
        if let Err(err) = self.thaw(id) {
            self.exprs.pop();
            return Err(err);
        }
        debug!(name = %self.exprs[id.index() as usize].name, %id, "expression added");
        Ok(id)
    }

    /// Evaluate now and serve that value until `thaw`.
    pub fn freeze(&mut self, id: ExprId) -> GraphResult<Value> {
        let value = self.evaluate(NodeRef::Expr(id))?;
        let e = self.expression_mut(id)?;
        e.cache = Some(value.clone());
        e.frozen = true;
        debug!(name = %e.name, "expression frozen");
        Ok(value)
    }

    /// Recompute on every read. The fresh value is kept for display.
    pub fn thaw(&mut self, id: ExprId) -> GraphResult<Value> {
        self.expression_mut(id)?.frozen = false;
        let value = self.evaluate(NodeRef::Expr(id))?;
        self.expression_mut(id)?.cache = Some(value.clone());
        Ok(value)
    }

    /// Replace the formula and/or the item list, then re-resolve, re-check
    /// for cycles and thaw. The previous definition is restored on failure.
    pub fn reexpress(
        &mut self,
        id: ExprId,
        formula: Option<&str>,
        items: Option<&[NodeRef]>,
    ) -> GraphResult<()> {
        let previous = self.expression(id)?.clone();
        let space = match items {
            Some(items) => Space::from_items(self, items)?,
            None => previous.space.clone(),
        };
        let text = formula.unwrap_or(&previous.formula).to_string();
        let tree = formula::compile(&formula::parse(&text)?, &space, &text)?;
        {
            let e = self.expression_mut(id)?;
            e.formula = text;
            e.tree = tree;
            e.space = space;
        }
        let result = validate::check_acyclic(self, NodeRef::Expr(id))
            .and_then(|()| self.thaw(id).map(|_| ()));
        if let Err(err) = result {
            *self.expression_mut(id)? = previous;
            return Err(err);
        }
        let e = self.expression(id)?;
        debug!(name = %e.name, formula = %e.formula, "expression reexpressed");
        Ok(())
    }

    /// Remove aliasing from every Parameter below this Expression. The
    /// sub-Space already lists nested Expressions' Parameters.
    pub fn unmap_expression(&mut self, id: ExprId) -> GraphResult<()> {
        let params: Vec<_> = self.expression(id)?.space().param_ids().collect();
        for pid in params {
            self.unmap(pid)?;
        }
        Ok(())
    }

    /// Formula, value, nested Expressions and Parameters.
    pub fn expression_summary(&self, id: ExprId) -> GraphResult<String> {
        let e = self.expression(id)?;
        let value = self.evaluate(NodeRef::Expr(id))?;
        let mut s = format!("Expression: {} = {value}, where", e.formula);
        let nested: Vec<_> = e.space.expr_entries().collect();
        if !nested.is_empty() {
            s.push_str("\n Nested Expressions:");
            for (name, &nid) in nested {
                let inner = self.expression(nid)?;
                let v = self.evaluate(NodeRef::Expr(nid))?;
                s.push_str(&format!("\n   {name} = {} = {v}", inner.formula));
            }
        }
        if e.space.param_ids().next().is_some() {
            s.push_str("\n Parameters:");
            for pid in e.space.param_ids() {
                s.push_str(&format!("\n   {}", self.describe(NodeRef::Param(pid))?));
            }
        }
        Ok(s)
    }
}
