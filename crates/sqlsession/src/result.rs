//! Statement results.

use std::ops::Index;

use sqlsession_core::{Error, ExecResult, Result, Row};

/// Rows and counters produced by one statement.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    rows_affected: u64,
    last_insert_id: Option<u64>,
}

impl ResultSet {
    /// Take all rows.
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The first row, or [`Error::NoRows`] when there is none.
    pub fn first(&self) -> Result<&Row> {
        self.rows.first().ok_or(Error::NoRows)
    }

    /// The only row. Fails with [`Error::NoRows`] or
    /// [`Error::MultipleRows`] unless there is exactly one.
    pub fn one(&self) -> Result<&Row> {
        match self.rows.as_slice() {
            [row] => Ok(row),
            [] => Err(Error::NoRows),
            rows => Err(Error::MultipleRows(rows.len())),
        }
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Id generated by an insert into an auto-increment table.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl From<ExecResult> for ResultSet {
    fn from(result: ExecResult) -> Self {
        Self {
            rows: result.rows,
            rows_affected: result.rows_affected,
            last_insert_id: result.last_insert_id,
        }
    }
}

/// Panics when `index` is out of bounds, like slice indexing.
impl Index<usize> for ResultSet {
    type Output = Row;

    fn index(&self, index: usize) -> &Row {
        &self.rows[index]
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
