//! Shared handle to an in-memory database.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sqlsession_core::{Connector, Result};

use crate::catalog::{Catalog, TableDef};
use crate::connection::MemoryConnection;

/// A named in-memory database.
///
/// Cloning the handle shares the catalog: every connection opened from any
/// clone sees the same committed rows. Tables are declared up front, either
/// through [`MemoryDatabase::builder`] or [`MemoryDatabase::create_table`];
/// the SQL surface has no `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    name: Arc<str>,
    catalog: Arc<Mutex<Catalog>>,
}

impl MemoryDatabase {
    /// An empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            catalog: Arc::new(Mutex::new(Catalog::default())),
        }
    }

    pub fn builder() -> MemoryDatabaseBuilder {
        MemoryDatabaseBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a table. Fails if a table with that name already exists.
    pub fn create_table(&self, def: TableDef) -> Result<()> {
        let name = def.name().to_string();
        self.catalog().create_table(def)?;
        tracing::debug!(database = %self.name, table = %name, "table created");
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog().table_names().map(str::to_string).collect()
    }

    /// Number of committed rows in `table`, or `None` if there is no such
    /// table. Uncommitted inserts of open connections are not counted.
    pub fn committed_rows(&self, table: &str) -> Option<usize> {
        self.catalog().table(table).ok().map(|t| t.rows.len())
    }

    /// Open a connection.
    pub fn connect(&self) -> MemoryConnection {
        let id = self.catalog().next_connection_id();
        tracing::debug!(database = %self.name, connection = id, "connection opened");
        MemoryConnection::new(self.clone(), id)
    }

    /// Lock the catalog. A panic while holding the lock leaves the catalog
    /// in a consistent state, so poisoning is ignored.
    pub(crate) fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl Connector for MemoryDatabase {
    type Conn = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        Ok(MemoryDatabase::connect(self))
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }
}

/// Builder for a [`MemoryDatabase`] with pre-existing tables.
///
/// ```
/// use sqlsession_memory::{MemoryDatabase, TableDef};
///
/// let db = MemoryDatabase::builder()
///     .name("testdb")
///     .table(TableDef::new("table_1").auto_increment("id").column("some_field"))
///     .build()
///     .unwrap();
/// assert_eq!(db.committed_rows("table_1"), Some(0));
/// ```
#[derive(Debug, Default)]
pub struct MemoryDatabaseBuilder {
    name: Option<String>,
    tables: Vec<TableDef>,
}

impl MemoryDatabaseBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn table(mut self, def: TableDef) -> Self {
        self.tables.push(def);
        self
    }

    /// Fails on an invalid or duplicate table definition.
    pub fn build(self) -> Result<MemoryDatabase> {
        let db = match self.name {
            Some(name) => MemoryDatabase::new(name),
            None => MemoryDatabase::default(),
        };
        for def in self.tables {
            db.create_table(def)?;
        }
        Ok(db)
    }
}
