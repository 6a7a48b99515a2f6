//! Reference data: metric definitions and the conditions they diagnose.

pub mod loader;
pub mod table;

pub use loader::{load_table, read_rows, RawTable, Row, TableError};
pub use table::{Condition, MetricDefinition, ReferenceTable, TableSources};
