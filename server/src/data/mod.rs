//! Table storage layer
//!
//! - `registry` - Named tables and their header requirements
//! - `loader` - Table spec and CSV file discovery
//! - `error` - Error type for both

pub mod error;
pub mod loader;
pub mod registry;

pub use error::DataError;
pub use loader::{LoadReport, TableLoader};
pub use registry::{HeaderRequirement, RegisteredTable, TableRegistry};
