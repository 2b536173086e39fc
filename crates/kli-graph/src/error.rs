//! Graph-specific error types.

use kli_core::KliError;
use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while building, merging, mutating or evaluating the graph.
///
/// Bound and unit violations surface as `Core`, wrapping the `KliError` raised
/// by the numeric layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Two distinct objects share a name inside one Space.
    #[error("Name collision: '{name}' already refers to a different object")]
    NameCollision { name: String },

    /// A formula references a name absent from its Space.
    #[error("Undefined name '{name}' in formula '{formula}'")]
    NameResolution { name: String, formula: String },

    /// A formula could not be parsed.
    #[error("Malformed formula '{formula}': {what}")]
    Formula { formula: String, what: String },

    /// A node would (transitively) depend on itself.
    #[error("Cyclic dependency through '{name}'")]
    CyclicDependency { name: String },

    /// A Space key does not match its entry.
    #[error("Space integrity violated: {what}")]
    Integrity { what: String },

    /// Handle not present in the arena.
    #[error("{what} not found in graph")]
    IdNotFound { what: &'static str },

    #[error(transparent)]
    Core(#[from] KliError),
}

impl GraphError {
    pub fn is_validation(&self) -> bool {
        matches!(self, GraphError::Core(KliError::Validation { .. }))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, GraphError::Core(KliError::Unit { .. }))
    }
}
