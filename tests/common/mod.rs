//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use pdfharvest::error::{HarvestError, Result};
use pdfharvest::mail::MailClient;
use pdfharvest::model::message::{MessagePart, RemoteMessage, PDF_MIME_TYPE};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Copy every fixture `.eml` into `dest`.
pub fn copy_spool(dest: &Path) {
    std::fs::create_dir_all(dest).unwrap();
    for entry in std::fs::read_dir(fixture("spool")).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), dest.join(entry.file_name())).unwrap();
    }
}

/// Provider that serves messages from memory and counts blob fetches.
#[derive(Default)]
pub struct MemoryClient {
    messages: Vec<RemoteMessage>,
    blobs: HashMap<(String, String), Vec<u8>>,
    pub blob_fetches: Mutex<usize>,
}

impl MemoryClient {
    pub fn with_message(mut self, id: &str, from: &str, subject: &str, date: &str) -> Self {
        self.messages.push(RemoteMessage {
            id: id.to_string(),
            headers: vec![
                ("From".to_string(), from.to_string()),
                ("Subject".to_string(), subject.to_string()),
                ("Date".to_string(), date.to_string()),
            ],
            parts: Vec::new(),
        });
        self
    }

    pub fn with_pdf(mut self, id: &str, filename: &str, bytes: &[u8]) -> Self {
        let msg = self.messages.iter_mut().find(|m| m.id == id).unwrap();
        let attachment_ref = format!("{id}-{}", msg.parts.len());
        msg.parts.push(MessagePart {
            filename: filename.to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
            attachment_ref: attachment_ref.clone(),
        });
        self.blobs.insert((id.to_string(), attachment_ref), bytes.to_vec());
        self
    }

    pub fn fetches(&self) -> usize {
        *self.blob_fetches.lock().unwrap()
    }
}

impl MailClient for MemoryClient {
    fn list_message_ids(&self, _after: NaiveDate, _filter: &str) -> Result<Vec<String>> {
        Ok(self.messages.iter().map(|m| m.id.clone()).collect())
    }

    fn get_message(&self, id: &str) -> Result<RemoteMessage> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| HarvestError::Remote(format!("404 {id}")))
    }

    fn get_attachment_bytes(&self, message_id: &str, attachment_ref: &str) -> Result<Vec<u8>> {
        *self.blob_fetches.lock().unwrap() += 1;
        self.blobs
            .get(&(message_id.to_string(), attachment_ref.to_string()))
            .cloned()
            .ok_or_else(|| HarvestError::Remote(format!("404 {attachment_ref}")))
    }
}
