//! kli-graph: parameter/expression graph for ion-channel models.
//!
//! Provides:
//! - Arena of bounded, unit-tagged Parameters and named Expressions
//! - Formula compiler resolving names to handles once, at construction
//! - Spaces: name → handle maps merged by identity
//! - Plain or forward-mode AD evaluation, aliasing and cycle checks
//! - Read helpers and an optimizer boundary
//!
//! # Example
//!
//! ```
//! use kli_graph::{NodeRef, ParamGraph, ParameterDef};
//!
//! let mut graph = ParamGraph::new();
//! let v0 = graph.add_parameter(ParameterDef::new("V0", -65.0).units("mV")).unwrap();
//! let voltage = graph.add_parameter(ParameterDef::new("VOLTAGE", 0.0).units("mV")).unwrap();
//! let offset = graph.add_parameter(ParameterDef::new("OFFSET", 65.0).units("mV")).unwrap();
//! graph.remap(voltage, NodeRef::Param(v0)).unwrap();
//!
//! let vr = graph
//!     .add_expression("vr", "VOLTAGE + OFFSET", &[NodeRef::Param(voltage), NodeRef::Param(offset)])
//!     .unwrap();
//! graph.assign(v0, -70.0, None).unwrap();
//!
//! let v = kli_graph::resolve::magnitude_in(&graph, NodeRef::Expr(vr), "mV").unwrap();
//! assert!((v + 5.0).abs() < 1e-12);
//! ```

pub mod error;
mod eval;
pub mod expression;
pub mod fit;
pub mod formula;
pub mod graph;
pub mod parameter;
pub mod resolve;
pub mod space;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use error::{GraphError, GraphResult};
pub use expression::Expression;
pub use formula::{BinOp, Formula};
pub use graph::{AliasTarget, NodeRef, ParamGraph};
pub use parameter::{Binding, Parameter, ParameterDef, Scaling};
pub use resolve::PreferredUnits;
pub use space::Space;
