//! # Constraint Model
//!
//! Value types for declarative security and timing constraints, and the
//! algebra providers use to realize them:
//!
//! - [`ConstraintSet::combine`] unions two sets, failing on contradictory requirements.
//! - [`reduce`] projects a set onto what a [`ConstraintSupport`] can realize.
//!   Unsupported requirements fail the negotiation; unsupported preferences are
//!   dropped.
//!
//! Alternatives hold if any element holds. When several hold, the first in
//! declaration order is chosen.

mod reduce;
mod set;
mod types;

pub use reduce::{reduce, ConstraintSupport};
pub use set::{combine, ConstraintSet};
pub use types::{Constraint, ConstraintKind};
