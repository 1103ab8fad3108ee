pub mod csv_source;
pub mod errors;
pub mod infer;
pub mod loader;
pub mod model;
pub mod sqlite_source;
pub mod writer;

pub use errors::{LoadError, TableError, WriteError};
pub use loader::{load_source, SourceFormat, SourceRequest};
pub use model::{ColumnData, ColumnSpec, ColumnType, Table, Value};
pub use sqlite_source::{list_sqlite_tables, TableSelection};
pub use writer::write_delimited;
