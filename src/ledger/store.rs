//! The activity ledger: load, atomic save, and per-record operations.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::ledger::format::{LedgerFile, INDENT};
use crate::model::record::{AttachmentRecord, AttachmentStatus, EmailRecord, LedgerState};

/// Default look-back window when no checkpoint exists.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Counts reported in run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub emails: usize,
    pub attachments: usize,
    pub processed: usize,
    pub pending_emails: usize,
}

/// Persistent record of fetched messages and downloaded attachments.
///
/// Every operation takes the lock for its own duration only. Sequences of
/// calls (check-then-insert) are not atomic as a whole.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    lookback: Duration,
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Load the ledger at `path`, or start empty if the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error: falling back to
    /// an empty ledger would re-download everything and lose statuses.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_lookback(path, Duration::days(DEFAULT_LOOKBACK_DAYS))
    }

    /// Like [`Ledger::load`] with a custom default look-back window.
    pub fn load_with_lookback(path: impl AsRef<Path>, lookback: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match std::fs::read(&path) {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger yet, starting empty");
                LedgerState::default()
            }
            Err(e) => return Err(HarvestError::io(&path, e)),
        };

        debug!(
            path = %path.display(),
            emails = state.emails.len(),
            attachments = state.attachments.len(),
            "Loaded ledger"
        );

        Ok(Self {
            path,
            lookback,
            state: RwLock::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full ledger to disk.
    ///
    /// The data goes to a sibling `.tmp` file first, is synced, and then
    /// renamed over the destination, so an interrupted save leaves the
    /// previous ledger intact.
    pub fn save(&self) -> Result<()> {
        let bytes = {
            let state = self.read();
            encode(&self.path, &LedgerFile::from(&*state))?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let tmp_path = temp_path_for(&self.path);
        write_synced(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            HarvestError::io(&self.path, e)
        })?;

        info!(path = %self.path.display(), bytes = bytes.len(), "Saved ledger");
        Ok(())
    }

    pub fn has_email(&self, id: &str) -> bool {
        self.read().emails.contains_key(id)
    }

    /// Insert or overwrite an email record.
    pub fn put_email(&self, id: &str, record: EmailRecord) -> Result<()> {
        if id.is_empty() {
            return Err(HarvestError::InvalidArgument(
                "email ID cannot be empty".into(),
            ));
        }
        self.write().emails.insert(id.to_string(), record);
        Ok(())
    }

    pub fn get_email(&self, id: &str) -> Result<EmailRecord> {
        self.read()
            .emails
            .get(id)
            .cloned()
            .ok_or_else(|| HarvestError::not_found("email", id))
    }

    /// Set or clear the "attachments still missing" flag of an email.
    pub fn mark_attachments_pending(&self, id: &str, pending: bool) -> Result<()> {
        let mut state = self.write();
        let email = state
            .emails
            .get_mut(id)
            .ok_or_else(|| HarvestError::not_found("email", id))?;
        email.attachments_pending = pending;
        Ok(())
    }

    /// IDs of emails whose attachments did not all download, sorted.
    pub fn pending_email_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .read()
            .emails
            .values()
            .filter(|e| e.attachments_pending)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Insert or overwrite the record for `content_hash`.
    pub fn put_attachment(&self, content_hash: &str, record: AttachmentRecord) -> Result<()> {
        if content_hash.is_empty() {
            return Err(HarvestError::InvalidArgument(
                "content hash cannot be empty".into(),
            ));
        }
        if record.email_id.is_empty() {
            return Err(HarvestError::InvalidArgument(format!(
                "email ID cannot be empty (attachment '{}')",
                record.filename
            )));
        }
        self.write()
            .attachments
            .insert(content_hash.to_string(), record);
        Ok(())
    }

    pub fn get_attachment(&self, content_hash: &str) -> Result<AttachmentRecord> {
        self.read()
            .attachments
            .get(content_hash)
            .cloned()
            .ok_or_else(|| HarvestError::not_found("attachment", content_hash))
    }

    pub fn update_attachment_status(
        &self,
        content_hash: &str,
        status: AttachmentStatus,
    ) -> Result<()> {
        let mut state = self.write();
        let record = state
            .attachments
            .get_mut(content_hash)
            .ok_or_else(|| HarvestError::not_found("attachment", content_hash))?;
        record.status = status;
        Ok(())
    }

    /// Point the record for `content_hash` at a new on-disk filename.
    pub fn rename_attachment(&self, content_hash: &str, filename: &str) -> Result<()> {
        if filename.is_empty() {
            return Err(HarvestError::InvalidArgument(
                "filename cannot be empty".into(),
            ));
        }
        let mut state = self.write();
        let record = state
            .attachments
            .get_mut(content_hash)
            .ok_or_else(|| HarvestError::not_found("attachment", content_hash))?;
        record.filename = filename.to_string();
        Ok(())
    }

    /// Find the attachment currently stored under `filename`.
    ///
    /// Linear scan: filenames are not the key and change on rename. When
    /// several records share a name, a processed one wins so that an
    /// already-renamed file is never picked up as unprocessed.
    pub fn find_attachment_by_filename(&self, filename: &str) -> Option<(String, AttachmentRecord)> {
        let state = self.read();
        let mut found: Option<(&String, &AttachmentRecord)> = None;
        for (hash, record) in &state.attachments {
            if record.filename != filename {
                continue;
            }
            match found {
                Some((_, prev)) if prev.is_processed() => {}
                _ => found = Some((hash, record)),
            }
        }
        found.map(|(h, r)| (h.clone(), r.clone()))
    }

    /// Stored checkpoint, or `now - lookback` when there is none.
    ///
    /// Fails with [`HarvestError::Decode`] if the stored value is not a
    /// valid RFC 3339 timestamp.
    pub fn last_fetch_time(&self) -> Result<DateTime<Utc>> {
        let raw = self.read().last_fetch_time.clone();
        match raw {
            None => Ok(Utc::now() - self.lookback),
            Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| HarvestError::Decode {
                    path: self.path.clone(),
                    reason: format!("invalid lastFetchTime '{raw}': {e}"),
                }),
        }
    }

    /// Whether a checkpoint is stored at all (readable or not).
    pub fn has_fetch_checkpoint(&self) -> bool {
        self.read().last_fetch_time.is_some()
    }

    /// Store the fetch checkpoint.
    pub fn set_last_fetch_time(&self, at: DateTime<Utc>) {
        self.write().last_fetch_time = Some(at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    /// Default look-back window used when there is no checkpoint.
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// A copy of the whole in-memory state.
    pub fn snapshot(&self) -> LedgerState {
        self.read().clone()
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.read();
        LedgerStats {
            emails: state.emails.len(),
            attachments: state.attachments.len(),
            processed: state
                .attachments
                .values()
                .filter(|a| a.is_processed())
                .count(),
            pending_emails: state
                .emails
                .values()
                .filter(|e| e.attachments_pending)
                .count(),
        }
    }

    // A panic while holding the lock cannot leave a record half-written,
    // so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<LedgerState> {
    let file: LedgerFile = serde_json::from_slice(bytes).map_err(|e| HarvestError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    file.into_state().map_err(|reason| HarvestError::Decode {
        path: path.to_path_buf(),
        reason,
    })
}

fn encode(path: &Path, file: &LedgerFile) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    file.serialize(&mut ser).map_err(|e| HarvestError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;
    buf.push(b'\n');
    Ok(buf)
}

/// Sibling temporary path: `activity.json` → `activity.json.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| HarvestError::io(path, e))?;
    file.write_all(bytes).map_err(|e| HarvestError::io(path, e))?;
    file.sync_all().map_err(|e| HarvestError::io(path, e))?;
    Ok(())
}
