//! Destination databases that accept a full-table replacement.

use std::fmt;

use crate::common::*;
use crate::delimited::ParsedTable;

mod memory;
mod postgres;
mod table_name;

pub use self::memory::{MemoryDatabase, StoredTable};
pub use self::postgres::PostgresDatabase;
pub use self::table_name::TableName;

/// Somewhere we can write a whole table at once.
#[async_trait]
pub trait Database: fmt::Debug + Send + Sync {
    /// Replace `table_name` with `table`: drop any existing table by that name,
    /// create it with `table`'s columns, and insert all of `table`'s rows.
    ///
    /// Returns the number of rows written.
    async fn replace_table(&self, table_name: &TableName, table: &ParsedTable) -> Result<u64>;
}
