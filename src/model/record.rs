//! Records kept in the activity ledger.
//!
//! Emails are keyed by the provider's message ID, attachments by the
//! SHA-256 of their raw bytes. The filename of an attachment changes when
//! it is renamed; its content hash never does.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata recorded for one remote message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// Provider message ID (same as the ledger key).
    pub id: String,

    /// Message date normalized to UTC.
    pub date: DateTime<Utc>,

    pub subject: String,

    /// Display name from the `From` header (may be empty).
    pub sender_name: String,

    /// Bare address from the `From` header.
    pub sender_email: String,

    /// Set while at least one PDF attachment of this message is still
    /// missing on disk because its download failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub attachments_pending: bool,
}

/// Processing status of an attachment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentStatus {
    /// Downloaded, not (yet) renamed by the classifier.
    #[default]
    #[serde(rename = "")]
    Unset,
    /// Renamed by the classifier. Never touched again.
    #[serde(rename = "processed")]
    Processed,
}

impl AttachmentStatus {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Processed => "processed",
        }
    }
}

impl std::fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata recorded for one downloaded attachment.
///
/// The content hash is the map key and is not repeated here; the on-disk
/// entry carries it explicitly (see [`crate::ledger::format`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    /// Current on-disk filename inside the attachments directory.
    pub filename: String,

    /// ID of the message this attachment came from.
    pub email_id: String,

    #[serde(default, skip_serializing_if = "AttachmentStatus::is_unset")]
    pub status: AttachmentStatus,
}

impl AttachmentRecord {
    /// A freshly downloaded attachment with no status.
    pub fn new(filename: impl Into<String>, email_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            email_id: email_id.into(),
            status: AttachmentStatus::Unset,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == AttachmentStatus::Processed
    }
}

/// The full persisted aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// Raw RFC 3339 checkpoint of the last successful fetch.
    ///
    /// Kept as text so that an unreadable value only affects the fetch
    /// window, not the ability to load the ledger.
    pub last_fetch_time: Option<String>,
    pub emails: HashMap<String, EmailRecord>,
    pub attachments: HashMap<String, AttachmentRecord>,
}
