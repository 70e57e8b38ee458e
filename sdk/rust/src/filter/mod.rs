//! Filter predicate engine
//!
//! [`FilterSpec`] is the validated JSON filter grammar; [`DataPlaneFilter`]
//! is the same tree compiled against a [`Schema`](crate::types::Schema) and
//! evaluated over rows.

mod compiled;
mod spec;

pub use compiled::{ColumnBinding, DataPlaneFilter};
pub use spec::{CompoundOperator, FilterOperator, FilterSpec, validate};
