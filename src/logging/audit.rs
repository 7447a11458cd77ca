//! Audit trail of ledger and board transitions
//!
//! Events are appended to a JSONL file, one line per successful transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::Role;

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FavorCreated,
    ProofRequested,
    SettlementRequested,
    FavorSettled,
    RequestCreated,
    RewardAdded,
    RequestClaimed,
    RequestCompleted,
    RequestWithdrawn,
    LeaderboardReconciled,
}

/// One audited transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Favor or public request id
    pub entity_id: String,
    /// Acting user id
    pub actor: Option<String>,
    /// Actor's role relative to the entity
    pub role: Option<Role>,
    /// Status after the transition
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: EventType, entity_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            entity_id: entity_id.into(),
            actor: None,
            role: None,
            status: None,
            metadata: None,
        }
    }

    pub fn with_actor(mut self, user_id: &str, role: Role) -> Self {
        self.actor = Some(user_id.to_string());
        self.role = Some(role);
        self
    }

    pub fn with_status(mut self, status: impl ToString) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger; a no-op until `init_file` is called
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start appending events to `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    /// Append an event; failures are logged and never fail the transition
    pub async fn log(&self, event: AuditEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }

    /// Current log file, if any
    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(EventType::FavorSettled, "favor-1")
            .with_actor("user-2", Role::Creditor)
            .with_status("settled");

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("favor_settled"));
        assert!(jsonl.contains("CREDITOR"));
        assert!(!jsonl.contains("metadata"));
    }

    #[tokio::test]
    async fn test_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let logger = AuditLogger::new();
        // Not initialized yet: dropped silently
        logger.log(AuditEvent::new(EventType::RequestCreated, "r-0")).await;

        logger.init_file(path.clone()).await.unwrap();
        logger.log(AuditEvent::new(EventType::RequestCreated, "r-1")).await;
        logger
            .log(AuditEvent::new(EventType::RequestClaimed, "r-1").with_status("claimed"))
            .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.entity_id, "r-1");
        assert_eq!(logger.path().await, Some(path));
    }
}
