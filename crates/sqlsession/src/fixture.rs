//! Per-test table fixtures.
//!
//! [`TableFixture::setup`] seeds a table through its own session and commits;
//! the returned guard truncates the table when it goes out of scope, so the
//! next test starts from an empty table even if this one fails.
//!
//! ```
//! use sqlsession::prelude::*;
//!
//! let db = MemoryDatabase::builder()
//!     .table(TableDef::new("table_1").auto_increment("id").column("some_field"))
//!     .build()?;
//! let sessions = SessionFactory::new(Engine::new(db.clone()), SessionConfig::default());
//!
//! {
//!     let _fixture = TableFixture::setup(
//!         &sessions,
//!         "table_1",
//!         "INSERT INTO table_1 (some_field) VALUES (:some_field);",
//!         &params! { "some_field" => "hello world" },
//!     )?;
//!     assert_eq!(db.committed_rows("table_1"), Some(1));
//! }
//! assert_eq!(db.committed_rows("table_1"), Some(0));
//! # Ok::<(), sqlsession::Error>(())
//! ```

use sqlsession_core::{Connector, Params, Result};

use crate::engine::SessionFactory;

/// Guard that truncates its table on drop.
#[derive(Debug)]
pub struct TableFixture<K: Connector> {
    factory: SessionFactory<K>,
    table: String,
    torn_down: bool,
}

impl<K: Connector> TableFixture<K> {
    /// Run `seed_sql` with `seed_params` in a new session and commit.
    ///
    /// A failing seed is returned as is; no guard exists yet, so nothing is
    /// truncated.
    #[tracing::instrument(level = "debug", skip(factory, seed_params))]
    pub fn setup(
        factory: &SessionFactory<K>,
        table: &str,
        seed_sql: &str,
        seed_params: &Params,
    ) -> Result<Self> {
        factory.with_session(|s| {
            s.execute(seed_sql, seed_params)?;
            s.commit()
        })?;
        tracing::debug!(table, "fixture seeded");
        Ok(Self {
            factory: factory.clone(),
            table: table.to_string(),
            torn_down: false,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Factory for the sessions of the test body.
    pub fn factory(&self) -> &SessionFactory<K> {
        &self.factory
    }

    /// Truncate now and report failures.
    pub fn teardown(mut self) -> Result<()> {
        self.truncate()
    }

    fn truncate(&mut self) -> Result<()> {
        self.torn_down = true;
        let sql = format!("TRUNCATE {};", self.table);
        self.factory.with_session(|s| {
            s.execute_raw(&sql)?;
            s.commit()
        })?;
        tracing::debug!(table = %self.table, "fixture torn down");
        Ok(())
    }
}

impl<K: Connector> Drop for TableFixture<K> {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Err(e) = self.truncate() {
            tracing::warn!(table = %self.table, error = %e, "fixture teardown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, SessionConfig};
    use sqlsession_core::error::QueryErrorKind;
    use sqlsession_core::{Error, params};
    use sqlsession_memory::{MemoryDatabase, TableDef};

    fn factory() -> (MemoryDatabase, SessionFactory<MemoryDatabase>) {
        let db = MemoryDatabase::builder()
            .table(
                TableDef::new("table_1")
                    .auto_increment("id")
                    .column("some_field"),
            )
            .build()
            .unwrap();
        let factory = SessionFactory::new(Engine::new(db.clone()), SessionConfig::default());
        (db, factory)
    }

    const SEED: &str = "INSERT INTO table_1 (some_field) VALUES (:some_field);";

    #[test]
    fn explicit_teardown_empties_the_table() {
        let (db, factory) = factory();
        let fixture =
            TableFixture::setup(&factory, "table_1", SEED, &params! { "some_field" => "a" })
                .unwrap();
        assert_eq!(fixture.table(), "table_1");
        assert_eq!(db.committed_rows("table_1"), Some(1));

        fixture.teardown().unwrap();
        assert_eq!(db.committed_rows("table_1"), Some(0));
    }

    #[test]
    fn failed_seed_returns_the_error() {
        let (db, factory) = factory();
        let err = TableFixture::setup(&factory, "table_1", SEED, &Params::new()).unwrap_err();
        match err {
            Error::Query(q) => assert_eq!(q.kind, QueryErrorKind::Syntax),
            other => panic!("expected Syntax, got {other:?}"),
        }
        assert_eq!(db.committed_rows("table_1"), Some(0));
    }

    #[test]
    fn failed_teardown_is_reported() {
        let db = MemoryDatabase::new("testdb");
        db.create_table(TableDef::new("t").column("a")).unwrap();
        let factory = SessionFactory::new(Engine::new(db), SessionConfig::default());
        let mut fixture = TableFixture::setup(
            &factory,
            "t",
            "INSERT INTO t (a) VALUES (:a)",
            &params! { "a" => 1 },
        )
        .unwrap();
        fixture.table = "missing".to_string();
        assert!(fixture.teardown().is_err());
    }

    #[test]
    fn failed_teardown_in_drop_does_not_panic() {
        let db = MemoryDatabase::new("testdb");
        db.create_table(TableDef::new("t").column("a")).unwrap();
        let factory = SessionFactory::new(Engine::new(db), SessionConfig::default());
        let mut fixture = TableFixture::setup(
            &factory,
            "t",
            "INSERT INTO t (a) VALUES (:a)",
            &params! { "a" => 1 },
        )
        .unwrap();
        fixture.table = "missing".to_string();
        drop(fixture);
    }
}
