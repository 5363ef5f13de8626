//! Audit trail for logins, auction lifecycle and cluster changes
//!
//! Every entry is emitted on the `audit` tracing target. When a sink file is
//! configured, entries are also appended to it as JSON lines.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Audit log event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEventType {
    AuthSuccess,
    AuthFailure,
    AuctionCreated,
    AuctionClosed,
    StateRepaired,
    StateTransferred,
    ReplicaJoined,
    ReplicaLeft,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventType,
    pub actor: String,          // username, replica id or "coordinator"
    pub target: Option<String>, // auction id or replica id
    pub message: String,
    pub meta: Option<serde_json::Value>,
}

/// Audit logger (singleton)
pub struct AuditLogger {
    file: Mutex<Option<File>>,
}

pub static AUDIT_LOGGER: Lazy<AuditLogger> = Lazy::new(AuditLogger::new);

impl AuditLogger {
    /// Create a logger with no file sink
    pub fn new() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Start appending entries to `path`.
    pub fn set_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        if let Ok(mut sink) = self.file.lock() {
            *sink = Some(file);
        }
        Ok(())
    }

    /// Log an audit entry
    pub fn log(&self, entry: AuditEntry) {
        let line = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
        if let Ok(mut sink) = self.file.lock() {
            if let Some(file) = sink.as_mut() {
                let _ = writeln!(file, "{}", line);
            }
        }
        tracing::info!(target: "audit", "{}", line);
    }

    /// Convenience for logging an event
    pub fn log_event(
        &self,
        event: AuditEventType,
        actor: impl Into<String>,
        target: Option<String>,
        message: impl Into<String>,
        meta: Option<serde_json::Value>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target,
            message: message.into(),
            meta,
        };
        self.log(entry);
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
