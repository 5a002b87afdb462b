/// Audit logging for rule loads and packet decisions
///
/// This module provides structured, opt-in logging of which rule set was
/// loaded and what it decided, so a decision can be traced back to the exact
/// rule file (by fingerprint) that produced it.
use crate::core::loader::RuleSetFingerprint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// File name of the audit log inside the state directory
pub const AUDIT_LOG_NAME: &str = "audit.log";

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoadRules,
    CheckPacket,
    BatchCheck,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    /// Creates a new audit event
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push(AUDIT_LOG_NAME);

        Ok(Self { log_path })
    }

    /// Creates an audit log writing to an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// Lines that are not valid events are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }

    /// Returns the path to the audit log file
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Writes an event, logging instead of failing if the write does not succeed
async fn write_event(audit: &AuditLog, event: AuditEvent) {
    if let Err(e) = audit.log(event).await {
        tracing::warn!(
            "Failed to write audit log {}: {}",
            audit.path().display(),
            e
        );
    }
}

/// Logs a rule file load
///
/// # Arguments
///
/// * `audit` - Log to append to
/// * `path` - Rule file that was read
/// * `loaded` - Rule count and fingerprint, if loading succeeded
/// * `error` - Error message if loading failed
pub async fn log_load(
    audit: &AuditLog,
    path: &Path,
    loaded: Option<(usize, &RuleSetFingerprint)>,
    error: Option<String>,
) {
    let details = match loaded {
        Some((rule_count, fingerprint)) => serde_json::json!({
            "path": path.display().to_string(),
            "rule_count": rule_count,
            "fingerprint": fingerprint,
        }),
        None => serde_json::json!({ "path": path.display().to_string() }),
    };
    let event = AuditEvent::new(EventType::LoadRules, error.is_none(), details, error);
    write_event(audit, event).await;
}

/// Logs a single packet decision
///
/// `packet` is the query as given, `decision` is `None` if it was rejected
/// as invalid.
pub async fn log_check(
    audit: &AuditLog,
    fingerprint: &RuleSetFingerprint,
    packet: &str,
    decision: Option<bool>,
    error: Option<String>,
) {
    let details = serde_json::json!({
        "fingerprint": fingerprint,
        "packet": packet,
        "accepted": decision,
    });
    let event = AuditEvent::new(EventType::CheckPacket, error.is_none(), details, error);
    write_event(audit, event).await;
}

/// Logs a batch of packet decisions
pub async fn log_batch(
    audit: &AuditLog,
    fingerprint: &RuleSetFingerprint,
    total: usize,
    accepted: usize,
    invalid: usize,
) {
    let details = serde_json::json!({
        "fingerprint": fingerprint,
        "total": total,
        "accepted": accepted,
        "invalid": invalid,
    });
    let event = AuditEvent::new(EventType::BatchCheck, invalid == 0, details, None);
    write_event(audit, event).await;
}
