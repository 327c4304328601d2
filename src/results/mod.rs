//! Rows and result sets returned by the execution engine.

mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::CustomDbRow;
pub(crate) use row::index_columns;
