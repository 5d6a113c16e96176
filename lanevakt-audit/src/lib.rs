//! # lanevakt-audit
//!
//! Append-only, hash-chained record of every state-changing action.
//!
//! Each entry binds `(timestamp, action, details, previous_hash)` under a
//! 256-bit BLAKE3 digest, persisted as one self-describing JSON record per
//! line, newest last. The chain starts from a well-known zero hash and can be
//! verified after the fact by replaying it in full. Entries are never mutated
//! or deleted; integrity problems surface only through [`AuditLog::verify`],
//! which reports every violation instead of stopping at the first — the log
//! is a forensic record, not a live invariant enforced on write.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// `previous_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit log failure conditions. Verification mismatches are not errors;
/// they are reported through [`VerifyReport`].
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One persisted audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp_ms: u64,
    pub action: String,
    pub details: Value,
    pub previous_hash: String,
    pub hash: String,
}

/// Outcome of a full-chain verification scan.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub entries: usize,
}

/// Hash preimage; field order is the canonical serialization order.
#[derive(Serialize)]
struct Preimage<'a> {
    timestamp_ms: u64,
    action: &'a str,
    details: &'a Value,
    previous_hash: &'a str,
}

fn compute_hash(
    timestamp_ms: u64,
    action: &str,
    details: &Value,
    previous_hash: &str,
) -> Result<String, AuditError> {
    let bytes = serde_json::to_vec(&Preimage {
        timestamp_ms,
        action,
        details,
        previous_hash,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(16)]
}

/// The hash-chained audit log.
///
/// The last-hash cursor is the only shared mutable resource across
/// components; appends serialize on an internal mutex so no two entries can
/// ever compute against a stale `previous_hash`. No other component computes
/// or stores `previous_hash`.
pub struct AuditLog {
    path: PathBuf,
    cursor: Mutex<String>,
}

impl AuditLog {
    /// Opens (or creates) the audit store at `path`, restoring the last-hash
    /// cursor from the newest persisted entry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let cursor = match Self::load_last_hash(&path) {
            Ok(Some(hash)) => hash,
            Ok(None) => GENESIS_HASH.to_string(),
            Err(e) => {
                warn!(error = %e, "could not restore audit cursor, starting fresh");
                GENESIS_HASH.to_string()
            }
        };

        Ok(Self {
            path,
            cursor: Mutex::new(cursor),
        })
    }

    fn load_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        match content.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => {
                let entry: AuditEntry = serde_json::from_str(line)?;
                Ok(Some(entry.hash))
            }
            None => Ok(None),
        }
    }

    /// Appends one entry to the chain and advances the cursor.
    ///
    /// Effectively atomic per process: hash computation, persistence, and the
    /// cursor update happen under one lock.
    pub fn append(&self, action: &str, details: Value) -> Result<AuditEntry, AuditError> {
        let mut cursor = self.cursor.lock();

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let previous_hash = cursor.clone();
        let hash = compute_hash(timestamp_ms, action, &details, &previous_hash)?;

        let entry = AuditEntry {
            timestamp_ms,
            action: action.to_string(),
            details,
            previous_hash,
            hash,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;

        cursor.clone_from(&entry.hash);
        debug!(action, hash = short(&entry.hash), "audit entry appended");
        Ok(entry)
    }

    /// Replays the persisted chain from the genesis hash, collecting every
    /// linkage or digest violation with its entry index.
    pub fn verify(&self) -> VerifyReport {
        let mut errors = Vec::new();
        let mut entries = 0usize;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return VerifyReport {
                    valid: false,
                    errors: vec![format!("verification failed: {e}")],
                    entries: 0,
                }
            }
        };

        let mut expected_previous = GENESIS_HASH.to_string();
        for (i, line) in content.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            entries += 1;
            let entry: AuditEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(format!("malformed entry {i}: {e}"));
                    continue;
                }
            };

            if entry.previous_hash != expected_previous {
                errors.push(format!(
                    "chain broken at entry {i}: expected previousHash {}, got {}",
                    short(&expected_previous),
                    short(&entry.previous_hash)
                ));
            }

            match compute_hash(
                entry.timestamp_ms,
                &entry.action,
                &entry.details,
                &entry.previous_hash,
            ) {
                Ok(computed) if computed != entry.hash => errors.push(format!(
                    "hash mismatch at entry {i}: computed {}, stored {}",
                    short(&computed),
                    short(&entry.hash)
                )),
                Ok(_) => {}
                Err(e) => errors.push(format!("entry {i} not hashable: {e}")),
            }

            expected_previous = entry.hash;
        }

        VerifyReport {
            valid: errors.is_empty(),
            errors,
            entries,
        }
    }

    /// Current chain head hash.
    pub fn last_hash(&self) -> String {
        self.cursor.lock().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_in(dir: &tempfile::TempDir) -> AuditLog {
        AuditLog::open(dir.path().join("audit.jsonl")).unwrap()
    }

    #[test]
    fn empty_chain_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        let report = log.verify();
        assert!(report.valid);
        assert_eq!(report.entries, 0);
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        let entry = log.append("COLLECTOR_START", json!({"collector": "polling"})).unwrap();
        assert_eq!(entry.previous_hash, GENESIS_HASH);
        assert_eq!(log.last_hash(), entry.hash);
    }

    #[test]
    fn untouched_chain_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        for i in 0..5 {
            log.append("ALERT_SENT", json!({"i": i})).unwrap();
        }
        let report = log.verify();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.entries, 5);
    }

    #[test]
    fn tampered_details_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        log.append("ALERT_SENT", json!({"value": 1})).unwrap();
        log.append("ALERT_SENT", json!({"value": 2})).unwrap();
        log.append("ALERT_SENT", json!({"value": 3})).unwrap();

        let tampered = fs::read_to_string(log.path())
            .unwrap()
            .replace("\"value\":2", "\"value\":99");
        fs::write(log.path(), tampered).unwrap();

        let report = log.verify();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("hash mismatch at entry 1")));
    }

    #[test]
    fn tampered_link_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        let first = log.append("A", json!({})).unwrap();
        log.append("B", json!({})).unwrap();

        let tampered = fs::read_to_string(log.path())
            .unwrap()
            .replace(&first.hash, &"f".repeat(64));
        fs::write(log.path(), tampered).unwrap();

        let report = log.verify();
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn cursor_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let head = {
            let log = AuditLog::open(&path).unwrap();
            log.append("A", json!({})).unwrap();
            log.append("B", json!({})).unwrap().hash
        };

        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.last_hash(), head);
        reopened.append("C", json!({})).unwrap();
        assert!(reopened.verify().valid);
    }

    #[test]
    fn verification_collects_all_problems() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        for i in 0..4 {
            log.append("A", json!({"i": i})).unwrap();
        }

        let tampered = fs::read_to_string(log.path())
            .unwrap()
            .replace("\"i\":0", "\"i\":7")
            .replace("\"i\":2", "\"i\":8");
        fs::write(log.path(), tampered).unwrap();

        let report = log.verify();
        assert!(!report.valid);
        assert!(report.errors.len() >= 2);
    }
}
