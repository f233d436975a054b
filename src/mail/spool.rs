//! Mail provider backed by a directory of `.eml` files.
//!
//! Each file is one message; its stem is the message ID. This is how the
//! batch job is fed when messages are delivered by an external fetcher
//! (fetchmail, a Gmail export, ...) instead of a live API.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use mail_parser::{Message, MessageParser, MimeHeaders};
use tracing::{debug, warn};

use super::MailClient;
use crate::error::{HarvestError, Result};
use crate::model::message::{MessagePart, RemoteMessage, PDF_MIME_TYPE};
use crate::parser::date::parse_date;

/// Reads messages from `<dir>/<id>.eml`.
#[derive(Debug, Clone)]
pub struct SpoolClient {
    dir: PathBuf,
}

impl SpoolClient {
    /// Open a spool directory. Fails if it is not a readable directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(HarvestError::Remote(format!(
                "spool directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    fn message_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(HarvestError::Remote(format!("invalid message ID '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.eml")))
    }

    fn read_raw(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.message_path(id)?;
        std::fs::read(&path)
            .map_err(|e| HarvestError::Remote(format!("cannot read '{}': {e}", path.display())))
    }
}

impl MailClient for SpoolClient {
    fn list_message_ids(&self, after: NaiveDate, filter: &str) -> Result<Vec<String>> {
        let want_pdf = filter.contains("filename:pdf");
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| {
            HarvestError::Remote(format!("cannot list '{}': {e}", self.dir.display()))
        })?;

        let mut ids = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let is_eml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("eml"));
            if !is_eml || !path.is_file() {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            let raw = match std::fs::read(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable spool file");
                    continue;
                }
            };
            let Some(msg) = MessageParser::default().parse(&raw) else {
                warn!(path = %path.display(), "Skipping unparseable spool file");
                continue;
            };

            let dated_ok = message_date(&msg).map_or(true, |d| d >= after);
            let pdf_ok = !want_pdf || to_parts(&msg).iter().any(MessagePart::is_pdf);
            if dated_ok && pdf_ok {
                ids.push(id);
            } else {
                debug!(id = %id, dated_ok, pdf_ok, "Spool message filtered out");
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn get_message(&self, id: &str) -> Result<RemoteMessage> {
        let raw = self.read_raw(id)?;
        let msg = MessageParser::default()
            .parse(&raw)
            .ok_or_else(|| HarvestError::Remote(format!("message '{id}' is not valid MIME")))?;

        let mut headers = Vec::new();
        if let Some(subject) = msg.subject() {
            headers.push(("Subject".to_string(), subject.to_string()));
        }
        if let Some(from) = from_header(&msg) {
            headers.push(("From".to_string(), from));
        }
        if let Some(date) = msg.date() {
            headers.push(("Date".to_string(), date.to_rfc3339()));
        }

        Ok(RemoteMessage {
            id: id.to_string(),
            headers,
            parts: to_parts(&msg),
        })
    }

    fn get_attachment_bytes(&self, message_id: &str, attachment_ref: &str) -> Result<Vec<u8>> {
        let index: usize = attachment_ref.parse().map_err(|_| {
            HarvestError::Remote(format!("invalid attachment reference '{attachment_ref}'"))
        })?;
        let raw = self.read_raw(message_id)?;
        let msg = MessageParser::default().parse(&raw).ok_or_else(|| {
            HarvestError::Remote(format!("message '{message_id}' is not valid MIME"))
        })?;
        msg.attachments()
            .nth(index)
            .map(|part| part.contents().to_vec())
            .ok_or_else(|| {
                HarvestError::Remote(format!(
                    "message '{message_id}' has no attachment #{index}"
                ))
            })
    }
}

fn message_date(msg: &Message<'_>) -> Option<NaiveDate> {
    let rfc3339 = msg.date()?.to_rfc3339();
    parse_date(&rfc3339).map(|d| d.date_naive())
}

/// Rebuild a `Name <email>` header from the decoded first sender.
fn from_header(msg: &Message<'_>) -> Option<String> {
    let addr = msg.from()?.first()?;
    let email = addr.address.as_deref().unwrap_or_default();
    match addr.name.as_deref() {
        Some(name) if !name.is_empty() => Some(format!("{name} <{email}>")),
        _ => Some(email.to_string()),
    }
}

fn to_parts(msg: &Message<'_>) -> Vec<MessagePart> {
    msg.attachments()
        .enumerate()
        .map(|(idx, part)| {
            let mime_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            // Some senders label PDFs as octet-stream; trust the extension then.
            let filename = part.attachment_name().unwrap_or_default().to_string();
            let mime_type = if mime_type.eq_ignore_ascii_case("application/octet-stream")
                && filename.to_ascii_lowercase().ends_with(".pdf")
            {
                PDF_MIME_TYPE.to_string()
            } else {
                mime_type
            };
            MessagePart {
                filename,
                mime_type,
                attachment_ref: idx.to_string(),
            }
        })
        .collect()
}
