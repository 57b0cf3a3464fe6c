//! Connections to an in-memory database.
//!
//! Transaction behavior follows InnoDB closely enough for session tests:
//!
//! - auto-increment ids are taken from the table's counter when the insert
//!   runs and are not handed back on rollback
//! - rows inserted inside a transaction are visible only to the inserting
//!   connection until it commits
//! - `TRUNCATE` commits the connection's pending work first, then empties the
//!   table and resets its counter to 1
//! - closing or dropping a connection discards pending work
//! - `TRUNCATE` of a table another connection has uncommitted inserts into
//!   fails with a lock wait timeout instead of blocking
//!
//! Outside a transaction every statement commits immediately.

use std::sync::Arc;

use sqlsession_core::error::{
    ConnectionErrorKind, Error, QueryError, QueryErrorKind, TransactionError,
    TransactionErrorKind,
};
use sqlsession_core::{
    ColumnInfo, Connection, ExecResult, IsolationLevel, Result, Row, Value,
};

use crate::catalog::Catalog;
use crate::database::MemoryDatabase;
use crate::sql::{self, Expr, Projection, Statement};

/// A row inserted inside the open transaction, not yet visible to others.
#[derive(Debug)]
struct PendingInsert {
    table: String,
    values: Vec<Value>,
}

/// One connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    id: u64,
    transaction: Option<IsolationLevel>,
    pending: Vec<PendingInsert>,
    closed: bool,
}

impl MemoryConnection {
    pub(crate) fn new(db: MemoryDatabase, id: u64) -> Self {
        Self {
            db,
            id,
            transaction: None,
            pending: Vec::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Isolation level of the open transaction. Visibility is always that of
    /// READ COMMITTED; the level is recorded, not enforced.
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.transaction
    }

    /// Number of rows inserted by the open transaction.
    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::connection(
                ConnectionErrorKind::Disconnected,
                "connection is closed",
            ))
        } else {
            Ok(())
        }
    }

    fn execute_statement(&mut self, statement: Statement, params: &[Value]) -> Result<ExecResult> {
        match statement {
            Statement::Insert {
                table,
                columns,
                rows,
            } => self.insert(&table, columns.as_deref(), &rows, params),
            Statement::Select { table, projection } => self.select(&table, &projection),
            Statement::Truncate { table } => self.truncate(&table),
            Statement::Begin => {
                // START TRANSACTION inside a transaction commits the old one.
                self.commit_pending();
                self.transaction = Some(IsolationLevel::RepeatableRead);
                Ok(ExecResult::default())
            }
            Statement::Commit => {
                self.commit_pending();
                Ok(ExecResult::default())
            }
            Statement::Rollback => {
                self.discard_pending();
                Ok(ExecResult::default())
            }
        }
    }

    fn insert(
        &mut self,
        table: &str,
        columns: Option<&[String]>,
        rows: &[Vec<Expr>],
        params: &[Value],
    ) -> Result<ExecResult> {
        let mut catalog = self.db.catalog();
        let target = catalog.table_mut(table)?;
        let width = target.def.columns().len();

        let positions: Vec<usize> = match columns {
            Some(names) => {
                let mut positions = Vec::with_capacity(names.len());
                for name in names {
                    let index = target.def.index_of(name).ok_or_else(|| {
                        Error::query(
                            QueryErrorKind::Syntax,
                            format!("Unknown column '{name}' in 'field list'"),
                        )
                    })?;
                    if positions.contains(&index) {
                        return Err(Error::query(
                            QueryErrorKind::Syntax,
                            format!("Column '{name}' specified twice"),
                        ));
                    }
                    positions.push(index);
                }
                positions
            }
            None => (0..width).collect(),
        };

        let mut built = Vec::with_capacity(rows.len());
        for (n, exprs) in rows.iter().enumerate() {
            if exprs.len() != positions.len() {
                return Err(Error::query(
                    QueryErrorKind::Syntax,
                    format!("Column count doesn't match value count at row {}", n + 1),
                ));
            }
            let mut values = vec![Value::Null; width];
            for (&position, expr) in positions.iter().zip(exprs) {
                values[position] = match expr {
                    Expr::Literal(v) => v.clone(),
                    Expr::Param(i) => params.get(*i).cloned().unwrap_or(Value::Null),
                };
            }
            built.push(values);
        }

        let mut first_id = None;
        if let Some(auto) = target.def.auto_increment_index() {
            let column = target.def.columns()[auto].clone();
            for i in 0..built.len() {
                let id = match explicit_id(&built[i][auto], &column)? {
                    Some(id) => {
                        let taken = target.has_id(auto, id)
                            || self.pending.iter().any(|p| {
                                p.table == table && p.values[auto].as_i64() == Some(id)
                            })
                            || built[..i].iter().any(|row| row[auto].as_i64() == Some(id));
                        if taken {
                            return Err(Error::query(
                                QueryErrorKind::Constraint,
                                format!("Duplicate entry '{id}' for key 'PRIMARY'"),
                            ));
                        }
                        target.observe_id(id);
                        id
                    }
                    None => target.reserve_id(),
                };
                built[i][auto] = Value::BigInt(id);
                first_id.get_or_insert(id);
            }
        }

        let count = built.len() as u64;
        if self.transaction.is_some() {
            target.writers.insert(self.id);
            self.pending
                .extend(built.into_iter().map(|values| PendingInsert {
                    table: table.to_string(),
                    values,
                }));
        } else {
            target.rows.extend(built);
        }

        tracing::debug!(
            connection = self.id,
            table,
            rows = count,
            pending = self.transaction.is_some(),
            "insert"
        );
        Ok(ExecResult {
            rows: Vec::new(),
            rows_affected: count,
            last_insert_id: first_id.and_then(|id| u64::try_from(id).ok()),
        })
    }

    fn select(&self, table: &str, projection: &Projection) -> Result<ExecResult> {
        let catalog = self.db.catalog();
        let source = catalog.table(table)?;

        let (columns, positions): (Arc<ColumnInfo>, Vec<usize>) = match projection {
            Projection::All => (
                Arc::clone(&source.column_info),
                (0..source.def.columns().len()).collect(),
            ),
            Projection::Columns(names) => {
                let positions = names
                    .iter()
                    .map(|name| {
                        source.def.index_of(name).ok_or_else(|| {
                            Error::query(
                                QueryErrorKind::Syntax,
                                format!("Unknown column '{name}' in 'field list'"),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (Arc::new(ColumnInfo::new(names.clone())), positions)
            }
        };

        let own = self
            .pending
            .iter()
            .filter(|p| p.table == table)
            .map(|p| &p.values);
        let rows: Vec<Row> = source
            .rows
            .iter()
            .chain(own)
            .map(|values| {
                let projected = positions.iter().map(|&i| values[i].clone()).collect();
                Row::with_columns(Arc::clone(&columns), projected)
            })
            .collect();

        tracing::debug!(connection = self.id, table, rows = rows.len(), "select");
        Ok(ExecResult::from_rows(rows))
    }

    fn truncate(&mut self, table: &str) -> Result<ExecResult> {
        // Implicit commit, even when the table turns out not to exist.
        self.commit_pending();
        let mut catalog = self.db.catalog();
        let target = catalog.table_mut(table)?;
        // InnoDB would wait on the other transaction's lock; there is no
        // waiting here, so fail as if the wait had timed out.
        if target.locked_by_other(self.id) {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: None,
                sqlstate: Some("HY000".to_string()),
                message: "Lock wait timeout exceeded; try restarting transaction".to_string(),
                source: None,
            }));
        }
        let removed = target.truncate();
        tracing::debug!(connection = self.id, table, removed, "truncate");
        Ok(ExecResult::default())
    }

    /// Publish pending rows and end the transaction.
    fn commit_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        if count > 0 {
            let mut catalog = self.db.catalog();
            publish(&mut catalog, pending);
            catalog.release_writer(self.id);
        }
        if self.transaction.take().is_some() {
            tracing::debug!(connection = self.id, rows = count, "transaction committed");
        }
    }

    fn discard_pending(&mut self) {
        let count = self.pending.len();
        if count > 0 {
            self.pending.clear();
            self.db.catalog().release_writer(self.id);
        }
        if self.transaction.take().is_some() {
            tracing::debug!(connection = self.id, rows = count, "transaction rolled back");
        }
    }

    fn end_transaction(&mut self, statement: &str) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_none() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: format!("{} without an open transaction", statement),
            }));
        }
        Ok(())
    }
}

/// Move pending rows into their tables. Tables are never dropped, so every
/// pending row still has a home.
fn publish(catalog: &mut Catalog, pending: Vec<PendingInsert>) {
    for insert in pending {
        if let Ok(table) = catalog.table_mut(&insert.table) {
            table.rows.push(insert.values);
        }
    }
}

/// The explicit value given for the auto-increment column, if any. NULL and
/// 0 ask for a generated id.
fn explicit_id(value: &Value, column: &str) -> Result<Option<i64>> {
    let id = match value {
        Value::Null => return Ok(None),
        Value::Text(s) => s.trim().parse::<i64>().ok(),
        other => other.as_i64(),
    };
    match id {
        Some(0) => Ok(None),
        Some(id) => Ok(Some(id)),
        None => Err(Error::query(
            QueryErrorKind::Database,
            format!(
                "Incorrect integer value for column '{column}': {}",
                value.type_name()
            ),
        )),
    }
}

impl Connection for MemoryConnection {
    #[tracing::instrument(level = "trace", skip(self, params), fields(connection = self.id))]
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.ensure_open()?;
        let parsed = sql::parse(sql)?;
        if parsed.param_count != params.len() {
            return Err(Error::query(
                QueryErrorKind::Syntax,
                format!(
                    "statement has {} placeholders but {} parameters were bound",
                    parsed.param_count,
                    params.len()
                ),
            )
            .with_sql(sql));
        }
        tracing::trace!(statement = parsed.statement.kind(), "parsed");
        self.execute_statement(parsed.statement, params)
            .map_err(|e| e.with_sql(sql))
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "a transaction is already open on this connection".to_string(),
            }));
        }
        self.transaction = Some(isolation);
        tracing::debug!(
            connection = self.id,
            isolation = isolation.as_sql(),
            "transaction started"
        );
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")?;
        self.commit_pending();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK")?;
        self.discard_pending();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn ping(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.pending.is_empty() {
            tracing::debug!(
                connection = self.id,
                rows = self.pending.len(),
                "discarding uncommitted rows on close"
            );
            self.pending.clear();
            self.db.catalog().release_writer(self.id);
        }
        self.transaction = None;
        self.closed = true;
        tracing::debug!(connection = self.id, "connection closed");
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
