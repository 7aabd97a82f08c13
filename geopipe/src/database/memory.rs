//! An in-process database, for tests.

use std::{collections::BTreeMap, sync::Mutex};

use crate::common::*;
use crate::delimited::{Column, ParsedTable};

/// A table as stored by [`MemoryDatabase`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Keeps tables in memory. Cloning shares the same tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<BTreeMap<TableName, StoredTable>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of a table, if it exists.
    pub fn table(&self, table_name: &TableName) -> Option<StoredTable> {
        self.lock().get(table_name).cloned()
    }

    /// Put a table in place directly, as if some earlier process had created
    /// it.
    pub fn insert_table(&self, table_name: TableName, table: StoredTable) {
        self.lock().insert(table_name, table);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<TableName, StoredTable>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn replace_table(&self, table_name: &TableName, table: &ParsedTable) -> Result<u64> {
        let stored = StoredTable {
            columns: table.columns.clone(),
            rows: table.rows.clone(),
        };
        let mut tables = self.lock();
        if tables.remove(table_name).is_some() {
            debug!("dropped existing in-memory table {}", table_name);
        }
        tables.insert(table_name.clone(), stored);
        Ok(table.rows.len() as u64)
    }
}
