//! Attachment download: fetch bytes, hash, write, record.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::ledger::Ledger;
use crate::mail::MailClient;
use crate::model::message::MessagePart;
use crate::model::record::AttachmentRecord;

/// Name used when a part has no usable filename.
const FALLBACK_NAME: &str = "attachment.pdf";

/// Outcome of one successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub content_hash: String,
    /// Final on-disk name (may carry a `_N` suffix).
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Download one attachment part of `message_id` into `dir` and record it.
///
/// If `dir/<name>` already holds different content, the new file is saved
/// under a suffixed name instead of overwriting it. Identical content is
/// rewritten in place. The ledger record is keyed by content hash, so the
/// same bytes arriving under another name update the existing record.
///
/// Returns `Ok(None)` when the same bytes were already processed by the
/// classifier: nothing is written and the record is left as it is.
pub fn download_attachment<C: MailClient + ?Sized>(
    client: &C,
    ledger: &Ledger,
    dir: &Path,
    message_id: &str,
    part: &MessagePart,
) -> Result<Option<Downloaded>> {
    if message_id.is_empty() {
        return Err(HarvestError::InvalidArgument("message ID is empty".into()));
    }
    if part.filename.is_empty() {
        return Err(HarvestError::InvalidArgument(
            "attachment filename is empty".into(),
        ));
    }

    let bytes = client.get_attachment_bytes(message_id, &part.attachment_ref)?;
    let hash = content_hash(&bytes);

    if let Ok(existing) = ledger.get_attachment(&hash) {
        if existing.is_processed() {
            debug!(
                hash = %hash,
                filename = %existing.filename,
                message_id,
                "Content already processed, keeping existing file"
            );
            return Ok(None);
        }
        if existing.filename != sanitize_filename(&part.filename) {
            debug!(
                hash = %hash,
                previous = %existing.filename,
                current = %part.filename,
                "Same content already recorded under another name"
            );
        }
    }

    std::fs::create_dir_all(dir).map_err(|e| HarvestError::io(dir, e))?;

    let wanted = dir.join(sanitize_filename(&part.filename));
    let path = match file_hash(&wanted)? {
        Some(existing) if existing != hash => {
            let free = unique_path(&wanted);
            warn!(
                existing = %wanted.display(),
                new = %free.display(),
                "Different attachment with the same name already on disk, keeping both"
            );
            free
        }
        _ => wanted,
    };

    write_atomic(&path, &bytes)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    ledger.put_attachment(&hash, AttachmentRecord::new(&filename, message_id))?;

    info!(path = %path.display(), message_id, "Downloaded attachment");
    Ok(Some(Downloaded {
        content_hash: hash,
        filename,
        path,
        size: bytes.len() as u64,
    }))
}

/// Reduce an attachment name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut i = 1u32;
    loop {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Hash of the file at `path`, or `None` if there is no such file.
fn file_hash(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(content_hash(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HarvestError::io(path, e)),
    }
}

/// Write through a hidden `.part` sibling so a crash never leaves a
/// truncated PDF under the final name.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let part_path = path.with_file_name(format!(".{name}.part"));

    let mut file = File::create(&part_path).map_err(|e| HarvestError::io(&part_path, e))?;
    file.write_all(bytes)
        .map_err(|e| HarvestError::io(&part_path, e))?;
    file.sync_all().map_err(|e| HarvestError::io(&part_path, e))?;
    drop(file);

    std::fs::rename(&part_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&part_path);
        HarvestError::io(path, e)
    })
}
