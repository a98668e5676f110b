//! The history log: an append-only, per-service event stream.
//!
//! Writers append one timestamped message at a time; readers see a
//! service's events in timestamp order. Events are never edited or
//! removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_id::{EventId, ServiceId};

/// One history event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub service: ServiceId,
    pub message: String,
    pub stamp: DateTime<Utc>,
}

/// Errors from the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store: {0}")]
    Storage(String),
}

/// Append access to the history log.
pub trait EventWriter: Send + Sync {
    /// Append one event for a service, stamped now.
    fn log_event(&self, service: &ServiceId, message: &str) -> Result<(), HistoryError>;
}

/// Read access to the history log.
pub trait EventReader: Send + Sync {
    /// Events for one service, oldest first.
    fn events_for_service(&self, service: &ServiceId) -> Result<Vec<Event>, HistoryError>;

    /// Events for every service in a namespace, oldest first.
    fn all_events(&self, namespace: &str) -> Result<Vec<Event>, HistoryError>;
}
