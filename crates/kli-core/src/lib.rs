//! kli-core: numeric foundation for the kli parameter graph.
//!
//! Contains:
//! - units (fixed unit registry backed by uom SI scale factors)
//! - quantity (unit-tagged magnitudes with dimension-checked arithmetic)
//! - dual (multi-variable forward-mode AD numbers)
//! - value (plain-or-dual evaluation results and formula math functions)
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact handles for arena objects)
//! - error (shared error types)

pub mod dual;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod quantity;
pub mod units;
pub mod value;

pub use dual::Dual;
pub use error::{KliError, KliResult};
pub use ids::*;
pub use numeric::*;
pub use quantity::Quantity;
pub use units::{Dimensions, Unit};
pub use value::{MathFn, Mode, Value};
