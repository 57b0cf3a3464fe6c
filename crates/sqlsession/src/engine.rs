//! Engines and session factories.

use std::fmt;
use std::sync::Arc;

use sqlsession_core::{Connector, Result};

use crate::session::{Session, SessionConfig};

/// A database target: wraps the [`Connector`] that opens connections to it.
pub struct Engine<K: Connector> {
    connector: K,
}

impl<K: Connector> Engine<K> {
    pub fn new(connector: K) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Open a raw connection, outside any session.
    #[tracing::instrument(level = "debug", skip(self), fields(target = %self.connector.describe()))]
    pub fn connect(&self) -> Result<K::Conn> {
        let conn = self.connector.connect()?;
        tracing::debug!("connection established");
        Ok(conn)
    }
}

impl<K: Connector> fmt::Debug for Engine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("target", &self.connector.describe())
            .finish()
    }
}

/// Opens sessions against one engine with one configuration.
///
/// Cloning is cheap and shares the engine.
pub struct SessionFactory<K: Connector> {
    engine: Arc<Engine<K>>,
    config: SessionConfig,
}

impl<K: Connector> SessionFactory<K> {
    /// Accepts an [`Engine`] or an `Arc<Engine>` shared with other factories.
    pub fn new(engine: impl Into<Arc<Engine<K>>>, config: SessionConfig) -> Self {
        Self {
            engine: engine.into(),
            config,
        }
    }

    pub fn engine(&self) -> &Engine<K> {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a new session on a fresh connection.
    pub fn open(&self) -> Result<Session<K::Conn>> {
        let conn = self.engine.connect()?;
        Ok(Session::new(conn, self.config))
    }

    /// Same as [`open`](Self::open).
    pub fn session(&self) -> Result<Session<K::Conn>> {
        self.open()
    }

    /// Run `f` in a new session and release the session afterwards.
    ///
    /// The session is released on every exit path: on success it is closed
    /// and a release failure is returned; when `f` fails or panics it is
    /// dropped, which rolls back and logs release failures. Work that `f`
    /// does not commit is rolled back.
    pub fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session<K::Conn>) -> Result<T>,
    {
        let mut session = self.open()?;
        match f(&mut session) {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(e) => {
                drop(session);
                Err(e)
            }
        }
    }
}

impl<K: Connector> Clone for SessionFactory<K> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: self.config,
        }
    }
}

impl<K: Connector> fmt::Debug for SessionFactory<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish()
    }
}
