//! On-disk ledger format.
//!
//! ```text
//! {
//!     "lastFetchTime": "2024-10-05T08:00:00Z",      (omitted when absent)
//!     "emails": [
//!         { "id", "date", "subject", "senderName", "senderEmail",
//!           "attachmentsPending" (omitted when false) }
//!     ],
//!     "attachments": [
//!         { "contentHash", "filename", "emailId", "status" (omitted when unset) }
//!     ]
//! }
//! ```
//!
//! In memory both collections are maps; on disk they are sequences sorted
//! by key so that successive saves produce stable diffs.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::model::record::{AttachmentRecord, EmailRecord, LedgerState};

/// Indentation used when writing the ledger.
pub const INDENT: &[u8] = b"    ";

/// Serialized form of the whole ledger.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub emails: Vec<EmailRecord>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<AttachmentEntry>,
}

/// An attachment record together with its content hash.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentEntry {
    #[serde(default)]
    pub content_hash: String,
    #[serde(flatten)]
    pub record: AttachmentRecord,
}

/// Accept `null` where a sequence is expected.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&LedgerState> for LedgerFile {
    fn from(state: &LedgerState) -> Self {
        let mut emails: Vec<EmailRecord> = state.emails.values().cloned().collect();
        emails.sort_by(|a, b| a.id.cmp(&b.id));

        let mut attachments: Vec<AttachmentEntry> = state
            .attachments
            .iter()
            .map(|(hash, record)| AttachmentEntry {
                content_hash: hash.clone(),
                record: record.clone(),
            })
            .collect();
        attachments.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));

        Self {
            last_fetch_time: state.last_fetch_time.clone(),
            emails,
            attachments,
        }
    }
}

impl LedgerFile {
    /// Convert into the in-memory aggregate.
    ///
    /// Fails with a reason when an attachment entry has no content hash,
    /// since such an entry cannot be keyed. Duplicate keys keep the last
    /// entry.
    pub fn into_state(self) -> std::result::Result<LedgerState, String> {
        let mut emails = HashMap::with_capacity(self.emails.len());
        for email in self.emails {
            if let Some(prev) = emails.insert(email.id.clone(), email) {
                warn!(id = %prev.id, "Duplicate email entry in ledger, keeping the last one");
            }
        }

        let mut attachments = HashMap::with_capacity(self.attachments.len());
        for (i, entry) in self.attachments.into_iter().enumerate() {
            if entry.content_hash.is_empty() {
                return Err(format!(
                    "attachment entry #{i} ('{}') has no contentHash",
                    entry.record.filename
                ));
            }
            if attachments
                .insert(entry.content_hash.clone(), entry.record)
                .is_some()
            {
                warn!(hash = %entry.content_hash, "Duplicate attachment entry in ledger, keeping the last one");
            }
        }

        Ok(LedgerState {
            last_fetch_time: self.last_fetch_time.filter(|t| !t.trim().is_empty()),
            emails,
            attachments,
        })
    }
}
