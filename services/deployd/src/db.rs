//! SQLite-backed storage for the history log and the automation set.
//!
//! One database file holds both concerns: the append-only `events`
//! table and the `automation` flag set. WAL mode keeps concurrent
//! readers cheap; the connection is behind a mutex since release
//! execution, the automator, and API reads all share it.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use slipway_id::{EventId, ServiceId};

use crate::automator::AutomationStore;
use crate::history::{Event, EventReader, EventWriter, HistoryError};

/// Errors from opening or migrating the database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The daemon's durable state: history events and automation flags.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                service TEXT NOT NULL,
                message TEXT NOT NULL,
                stamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_service ON events(namespace, service);

            CREATE TABLE IF NOT EXISTS automation (
                namespace TEXT NOT NULL,
                service TEXT NOT NULL,
                PRIMARY KEY (namespace, service)
            );
            "#,
        )?;
        Ok(())
    }

    fn query_events(
        &self,
        where_clause: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Event>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT id, namespace, service, message, stamp FROM events WHERE {where_clause} ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bind, |row| {
            let id: i64 = row.get(0)?;
            let namespace: String = row.get(1)?;
            let service: String = row.get(2)?;
            let message: String = row.get(3)?;
            let stamp: String = row.get(4)?;
            Ok((id, namespace, service, message, stamp))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, namespace, service, message, stamp) = row?;
            let stamp = DateTime::parse_from_rfc3339(&stamp)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
                .with_timezone(&Utc);
            events.push(Event {
                id: EventId::new(id),
                service: ServiceId::new(namespace, service),
                message,
                stamp,
            });
        }
        Ok(events)
    }
}

impl EventWriter for Database {
    fn log_event(&self, service: &ServiceId, message: &str) -> Result<(), HistoryError> {
        let stamp = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (namespace, service, message, stamp) VALUES (?1, ?2, ?3, ?4)",
            params![service.namespace(), service.name(), message, stamp],
        )
        .map_err(|e| HistoryError::Storage(e.to_string()))?;
        debug!(service = %service, message = %message, "Logged history event");
        Ok(())
    }
}

impl EventReader for Database {
    fn events_for_service(&self, service: &ServiceId) -> Result<Vec<Event>, HistoryError> {
        self.query_events(
            "namespace = ?1 AND service = ?2",
            &[
                &service.namespace() as &dyn rusqlite::ToSql,
                &service.name() as &dyn rusqlite::ToSql,
            ],
        )
        .map_err(|e| HistoryError::Storage(e.to_string()))
    }

    fn all_events(&self, namespace: &str) -> Result<Vec<Event>, HistoryError> {
        self.query_events("namespace = ?1", &[&namespace as &dyn rusqlite::ToSql])
            .map_err(|e| HistoryError::Storage(e.to_string()))
    }
}

impl AutomationStore for Database {
    fn automate(&self, service: &ServiceId) -> Result<(), crate::automator::AutomationError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO automation (namespace, service) VALUES (?1, ?2)",
            params![service.namespace(), service.name()],
        )
        .map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?;
        Ok(())
    }

    fn deautomate(&self, service: &ServiceId) -> Result<(), crate::automator::AutomationError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM automation WHERE namespace = ?1 AND service = ?2",
            params![service.namespace(), service.name()],
        )
        .map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?;
        Ok(())
    }

    fn is_automated(&self, service: &ServiceId) -> Result<bool, crate::automator::AutomationError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM automation WHERE namespace = ?1 AND service = ?2",
                params![service.namespace(), service.name()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?;
        Ok(found.is_some())
    }

    fn automated_services(&self) -> Result<Vec<ServiceId>, crate::automator::AutomationError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT namespace, service FROM automation ORDER BY namespace, service")
            .map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let namespace: String = row.get(0)?;
                let service: String = row.get(1)?;
                Ok(ServiceId::new(namespace, service))
            })
            .map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?;

        let mut services = Vec::new();
        for row in rows {
            services.push(row.map_err(|e| crate::automator::AutomationError::Storage(e.to_string()))?);
        }
        Ok(services)
    }
}
