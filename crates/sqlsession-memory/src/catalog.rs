//! Table definitions and committed table state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sqlsession_core::error::{Error, QueryErrorKind, Result};
use sqlsession_core::{ColumnInfo, Value};

/// The shape of a table: ordered columns and an optional auto-increment
/// column.
///
/// ```
/// use sqlsession_memory::TableDef;
///
/// let table_1 = TableDef::new("table_1")
///     .auto_increment("id")
///     .column("some_field");
/// assert_eq!(table_1.columns(), ["id", "some_field"]);
/// assert_eq!(table_1.auto_increment_column(), Some("id"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    columns: Vec<String>,
    auto_increment: Option<usize>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            auto_increment: None,
        }
    }

    /// Append a plain column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    /// Append the auto-increment column. A table has at most one; declaring
    /// another moves the counter to the new column.
    pub fn auto_increment(mut self, name: impl Into<String>) -> Self {
        self.auto_increment = Some(self.columns.len());
        self.columns.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn auto_increment_column(&self) -> Option<&str> {
        self.auto_increment
            .and_then(|i| self.columns.get(i))
            .map(String::as_str)
    }

    pub(crate) fn auto_increment_index(&self) -> Option<usize> {
        self.auto_increment
    }

    /// Position of `column`. Column names compare case-insensitively, as in
    /// MySQL.
    pub(crate) fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::query(
                QueryErrorKind::Syntax,
                "table name must not be empty",
            ));
        }
        if self.columns.is_empty() {
            return Err(Error::query(
                QueryErrorKind::Syntax,
                format!("table '{}' must have at least one column", self.name),
            ));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i]
                .iter()
                .any(|c| c.eq_ignore_ascii_case(column))
            {
                return Err(Error::query(
                    QueryErrorKind::Syntax,
                    format!("Duplicate column name '{column}'"),
                ));
            }
        }
        Ok(())
    }
}

/// Committed state of one table.
#[derive(Debug)]
pub(crate) struct Table {
    pub(crate) def: TableDef,
    pub(crate) column_info: Arc<ColumnInfo>,
    pub(crate) rows: Vec<Vec<Value>>,
    /// Next value the auto-increment counter hands out.
    pub(crate) next_id: i64,
    /// Connections holding uncommitted inserts into this table.
    pub(crate) writers: BTreeSet<u64>,
}

impl Table {
    fn new(def: TableDef) -> Self {
        let column_info = Arc::new(ColumnInfo::new(def.columns.clone()));
        Self {
            def,
            column_info,
            rows: Vec::new(),
            next_id: 1,
            writers: BTreeSet::new(),
        }
    }

    /// Hand out the next auto-increment id. Ids are never given back.
    pub(crate) fn reserve_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// An explicit id moves the counter past it, as InnoDB does.
    pub(crate) fn observe_id(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
    }

    pub(crate) fn has_id(&self, column: usize, id: i64) -> bool {
        self.rows
            .iter()
            .any(|row| row.get(column).and_then(Value::as_i64) == Some(id))
    }

    /// Whether a connection other than `connection` has uncommitted rows here.
    pub(crate) fn locked_by_other(&self, connection: u64) -> bool {
        self.writers.iter().any(|&writer| writer != connection)
    }

    pub(crate) fn truncate(&mut self) -> usize {
        let removed = self.rows.len();
        self.rows.clear();
        self.next_id = 1;
        removed
    }
}

/// All tables of one in-memory database.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    tables: BTreeMap<String, Table>,
    next_connection_id: u64,
}

impl Catalog {
    pub(crate) fn create_table(&mut self, def: TableDef) -> Result<()> {
        def.validate()?;
        if self.tables.contains_key(def.name()) {
            return Err(Error::query(
                QueryErrorKind::Database,
                format!("Table '{}' already exists", def.name()),
            ));
        }
        self.tables.insert(def.name().to_string(), Table::new(def));
        Ok(())
    }

    pub(crate) fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| unknown_table(name))
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| unknown_table(name))
    }

    pub(crate) fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Drop every write claim held by `connection`.
    pub(crate) fn release_writer(&mut self, connection: u64) {
        for table in self.tables.values_mut() {
            table.writers.remove(&connection);
        }
    }

    pub(crate) fn next_connection_id(&mut self) -> u64 {
        self.next_connection_id += 1;
        self.next_connection_id
    }
}

fn unknown_table(name: &str) -> Error {
    Error::query(
        QueryErrorKind::NotFound,
        format!("Table '{name}' doesn't exist"),
    )
}
