//! Append-only, encrypted audit log (spec §4.5) with total ordering given
//! by `(timestamp, sequence)`, the sequence coming from a `Watermark` so
//! concurrent appends never tie.
//!
//! Entries are written as one encrypted frame per file; a file rotates to a
//! fresh `audit-YYYYMMDD-HHMMSS.log` once it would exceed 64 MiB or once it
//! has been open for 24 hours, whichever comes first. `read_all` stitches
//! every rotated file in the directory back into one ordered stream.

use crate::watermark::Watermark;
use aegis_core::{AuditEntryId, ConfigError, EntityIdType, SessionId, UserId};
use aegis_crypto::AppendOnlyStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

/// A file rotates once it would exceed this many bytes...
const MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// ...or once it has been open this long, whichever comes first.
fn max_file_age() -> chrono::Duration {
    chrono::Duration::hours(24)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub sequence: i64,
    pub actor: Option<UserId>,
    pub username: Option<String>,
    pub action: String,
    pub resource: String,
    pub target: Option<String>,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<SessionId>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Everything `AuditLog::record` needs for one entry. Named fields instead
/// of a dozen positional arguments, mirroring the `resource`/`context` split
/// the `LogEvent` primitive is specified with.
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub actor: Option<UserId>,
    pub username: Option<String>,
    pub action: String,
    pub resource: String,
    pub target: Option<String>,
    pub details: HashMap<String, Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<SessionId>,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Option<Duration>,
}

struct CurrentFile {
    store: AppendOnlyStore,
    opened_at: DateTime<Utc>,
}

pub struct AuditLog {
    dir: PathBuf,
    secret: String,
    watermark: Watermark,
    current: Mutex<CurrentFile>,
}

impl AuditLog {
    /// Open (creating if needed) the rotating log in `dir`, starting a fresh
    /// `audit-YYYYMMDD-HHMMSS.log` file.
    pub fn open(dir: impl Into<PathBuf>, secret: impl Into<String>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        let secret = secret.into();
        let store = Self::open_new_file(&dir, &secret)?;
        Ok(Self {
            dir,
            secret,
            watermark: Watermark::new(),
            current: Mutex::new(CurrentFile {
                store,
                opened_at: Utc::now(),
            }),
        })
    }

    fn open_new_file(dir: &Path, secret: &str) -> Result<AppendOnlyStore, ConfigError> {
        let filename = format!("audit-{}.log", Utc::now().format("%Y%m%d-%H%M%S"));
        AppendOnlyStore::open("audit-log", dir.join(filename), secret)
    }

    async fn rotate_if_needed(&self, current: &mut CurrentFile, incoming_len: u64) -> io::Result<()> {
        let too_old = Utc::now() - current.opened_at >= max_file_age();
        let too_big = current.store.file_len().await + incoming_len > MAX_FILE_BYTES;
        if too_old || too_big {
            let store = Self::open_new_file(&self.dir, &self.secret)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            *current = CurrentFile {
                store,
                opened_at: Utc::now(),
            };
        }
        Ok(())
    }

    pub async fn record(&self, event: AuditEvent) -> io::Result<AuditEntry> {
        let entry = AuditEntry {
            id: AuditEntryId::generate(),
            timestamp: Utc::now(),
            sequence: self.watermark.next(),
            actor: event.actor,
            username: event.username,
            action: event.action,
            resource: event.resource,
            target: event.target,
            details: event.details,
            ip: event.ip,
            user_agent: event.user_agent,
            session_id: event.session_id,
            success: event.success,
            error: event.error,
            duration_ms: event.duration.map(|d| d.as_millis() as u64),
        };
        let bytes = serde_json::to_vec(&entry).expect("audit entry serializes");

        let mut current = self.current.lock().await;
        self.rotate_if_needed(&mut current, bytes.len() as u64).await?;
        current.store.append(&bytes).await?;
        Ok(entry)
    }

    /// Every entry across every rotated file, in `(timestamp, sequence)`
    /// order.
    pub async fn read_all(&self) -> Vec<AuditEntry> {
        let mut paths = Vec::new();
        if let Ok(mut read_dir) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(dir_entry)) = read_dir.next_entry().await {
                let path = dir_entry.path();
                let is_audit_file = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("audit-") && n.ends_with(".log"))
                    .unwrap_or(false);
                if is_audit_file {
                    paths.push(path);
                }
            }
        }
        // Filenames are `audit-YYYYMMDD-HHMMSS.log`, so lexical order is
        // chronological order.
        paths.sort();

        let mut entries: Vec<AuditEntry> = Vec::new();
        for path in paths {
            let Ok(store) = AppendOnlyStore::open("audit-log", path, &self.secret) else {
                continue;
            };
            let frames = store.read_all().await.unwrap_or_default();
            entries.extend(frames.iter().filter_map(|f| serde_json::from_slice(f).ok()));
        }
        entries.sort_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, resource: &str, success: bool) -> AuditEvent {
        AuditEvent {
            action: action.to_string(),
            resource: resource.to_string(),
            success,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn appended_entries_are_returned_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), "0123456789abcdef0123456789abcdef").unwrap();
        log.record(event("login", "session", true)).await.unwrap();
        log.record(event("login", "session", false)).await.unwrap();
        let entries = log.read_all().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].success);
        assert!(!entries[1].success);
        assert!(entries[1].sequence > entries[0].sequence);
    }

    #[tokio::test]
    async fn carries_the_full_attribute_set() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), "0123456789abcdef0123456789abcdef").unwrap();
        let user = UserId::generate();
        let session = SessionId::generate();
        let recorded = log
            .record(AuditEvent {
                actor: Some(user),
                username: Some("alice".to_string()),
                action: "login".to_string(),
                resource: "session".to_string(),
                target: Some("alice".to_string()),
                ip: Some("127.0.0.1".to_string()),
                user_agent: Some("curl/8".to_string()),
                session_id: Some(session),
                success: true,
                error: None,
                duration: Some(Duration::from_millis(12)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recorded.username.as_deref(), Some("alice"));
        assert_eq!(recorded.session_id, Some(session));
        assert_eq!(recorded.duration_ms, Some(12));

        let entries = log.read_all().await;
        assert_eq!(entries[0].actor, Some(user));
        assert_eq!(entries[0].resource, "session");
    }

    #[tokio::test]
    async fn rotates_to_a_new_file_once_the_size_threshold_is_crossed() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), "0123456789abcdef0123456789abcdef").unwrap();
        {
            let mut current = log.current.lock().await;
            // Simulate the current file already sitting at the rotation
            // threshold without writing 64 MiB of real frames.
            current.store.append(&vec![0u8; MAX_FILE_BYTES as usize]).await.unwrap();
        }
        log.record(event("login", "session", true)).await.unwrap();

        let mut log_files = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            log_files.push(entry.path());
        }
        assert_eq!(log_files.len(), 2, "expected a rotated file alongside the original");
    }

    #[tokio::test]
    async fn rotates_once_the_current_file_is_older_than_the_age_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), "0123456789abcdef0123456789abcdef").unwrap();
        {
            let mut current = log.current.lock().await;
            current.opened_at = Utc::now() - chrono::Duration::hours(25);
        }
        log.record(event("login", "session", true)).await.unwrap();

        let mut log_files = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            log_files.push(entry.path());
        }
        assert_eq!(log_files.len(), 2, "expected a rotated file alongside the original");
    }
}
