//! Email intake: record each new message once, then fetch its PDFs.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use super::attachment::{download_attachment, Downloaded};
use crate::error::{HarvestError, ItemFailure};
use crate::ledger::Ledger;
use crate::mail::MailClient;
use crate::model::message::RemoteMessage;
use crate::model::record::EmailRecord;
use crate::model::sender::Sender;
use crate::parser::date::parse_date;

/// Subject stored when the header is missing.
pub const NO_SUBJECT: &str = "No Subject";

/// What one intake pass did.
#[derive(Debug, Default)]
pub struct IntakeReport {
    /// Messages returned by the provider listing.
    pub listed: usize,
    /// Messages skipped because the ledger already had them.
    pub skipped: usize,
    /// New email records written.
    pub recorded: usize,
    /// Previously recorded messages whose missing attachments were retried.
    pub retried: usize,
    /// PDF parts whose content was already processed and left alone.
    pub unchanged: usize,
    pub downloaded: Vec<Downloaded>,
    pub failures: Vec<ItemFailure>,
}

impl IntakeReport {
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded.iter().map(|d| d.size).sum()
    }
}

/// Build the ledger record for a message from its headers.
///
/// Missing subject becomes [`NO_SUBJECT`]; an unparseable or missing date
/// becomes the current time.
pub fn extract_metadata(msg: &RemoteMessage) -> EmailRecord {
    let subject = msg
        .header("Subject")
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let sender = msg.header("From").map(Sender::parse).unwrap_or_default();

    let date = match msg.header("Date").and_then(parse_date) {
        Some(date) => date,
        None => {
            warn!(id = %msg.id, "Missing or unparseable Date header, using current time");
            chrono::Utc::now()
        }
    };

    EmailRecord {
        id: msg.id.clone(),
        date,
        subject,
        sender_name: sender.name,
        sender_email: sender.email,
        attachments_pending: false,
    }
}

/// Drives intake of a batch of message IDs.
pub struct EmailIntake<'a, C: MailClient + ?Sized> {
    client: &'a C,
    ledger: &'a Ledger,
    attachments_dir: &'a Path,
}

impl<'a, C: MailClient + ?Sized> EmailIntake<'a, C> {
    pub fn new(client: &'a C, ledger: &'a Ledger, attachments_dir: &'a Path) -> Self {
        Self {
            client,
            ledger,
            attachments_dir,
        }
    }

    /// Process `listed` in order, then every recorded message that still
    /// has attachments pending and was not part of the listing.
    ///
    /// Never fails as a whole: per-message problems end up in
    /// [`IntakeReport::failures`].
    pub fn ingest(
        &self,
        listed: &[String],
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> IntakeReport {
        let mut report = IntakeReport {
            listed: listed.len(),
            ..Default::default()
        };

        let seen: HashSet<&str> = listed.iter().map(String::as_str).collect();
        let pending: Vec<String> = self
            .ledger
            .pending_email_ids()
            .into_iter()
            .filter(|id| !seen.contains(id.as_str()))
            .collect();

        let total = listed.len() + pending.len();
        for (i, id) in listed.iter().chain(pending.iter()).enumerate() {
            if let Some(cb) = progress {
                cb(i, total);
            }
            self.ingest_one(id, &mut report);
        }
        if let Some(cb) = progress {
            cb(total, total);
        }

        info!(
            listed = report.listed,
            skipped = report.skipped,
            recorded = report.recorded,
            retried = report.retried,
            downloaded = report.downloaded.len(),
            unchanged = report.unchanged,
            failed = report.failures.len(),
            "Intake finished"
        );
        report
    }

    fn ingest_one(&self, id: &str, report: &mut IntakeReport) {
        if id.is_empty() {
            report.failures.push(ItemFailure::new(
                "process_message",
                id,
                HarvestError::InvalidArgument("message ID is empty".into()),
            ));
            return;
        }

        let retry = match self.ledger.get_email(id) {
            Ok(existing) if existing.attachments_pending => true,
            Ok(_) => {
                debug!(id, "Skipping message, already processed");
                report.skipped += 1;
                return;
            }
            Err(_) => false,
        };

        let msg = match self.client.get_message(id) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(id, error = %e, "Failed to get message");
                report.failures.push(ItemFailure::new("get_message", id, e));
                return;
            }
        };

        if retry {
            report.retried += 1;
            info!(id, "Retrying attachments of a previously recorded message");
        } else {
            let record = extract_metadata(&msg);
            debug!(
                id,
                date = %record.date,
                subject = %record.subject,
                sender = %record.sender_email,
                "Recording email"
            );
            if let Err(e) = self.ledger.put_email(id, record) {
                report.failures.push(ItemFailure::new("put_email", id, e));
                return;
            }
            report.recorded += 1;
        }

        let mut all_ok = true;
        for part in msg.pdf_parts() {
            match download_attachment(self.client, self.ledger, self.attachments_dir, id, part) {
                Ok(Some(done)) => report.downloaded.push(done),
                Ok(None) => report.unchanged += 1,
                Err(e) => {
                    all_ok = false;
                    warn!(id, filename = %part.filename, error = %e, "Failed to download attachment");
                    report.failures.push(ItemFailure::new(
                        "download_attachment",
                        format!("{id}/{}", part.filename),
                        e,
                    ));
                }
            }
        }

        if retry == all_ok {
            // Flag flips: a new record with failures, or a retry that succeeded.
            if let Err(e) = self.ledger.mark_attachments_pending(id, !all_ok) {
                report
                    .failures
                    .push(ItemFailure::new("mark_attachments_pending", id, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::fake::FakeClient;
    use crate::model::record::AttachmentStatus;

    fn msg(headers: &[(&str, &str)]) -> RemoteMessage {
        RemoteMessage {
            id: "m1".into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            parts: vec![],
        }
    }

    #[test]
    fn test_extract_metadata_full() {
        let rec = extract_metadata(&msg(&[
            ("Subject", "Facture IKUTO"),
            ("From", "IKUTO <test@ikuto.com>"),
            ("Date", "Sat, 05 Oct 2024 10:00:00 +0000"),
        ]));
        assert_eq!(rec.id, "m1");
        assert_eq!(rec.subject, "Facture IKUTO");
        assert_eq!(rec.sender_name, "IKUTO");
        assert_eq!(rec.sender_email, "test@ikuto.com");
        assert_eq!(rec.date.to_rfc3339(), "2024-10-05T10:00:00+00:00");
    }

    #[test]
    fn test_extract_metadata_defaults() {
        let before = chrono::Utc::now();
        let rec = extract_metadata(&msg(&[("From", "test@example.com"), ("Date", "soon")]));
        assert_eq!(rec.subject, NO_SUBJECT);
        assert_eq!(rec.sender_name, "");
        assert_eq!(rec.sender_email, "test@example.com");
        assert!(rec.date >= before);
    }

    fn setup() -> (tempfile::TempDir, Ledger, FakeClient) {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(tmp.path().join("activity.json")).unwrap();
        let mut client = FakeClient::default();
        client.add("m1", "IKUTO <b@ikuto.fr>", "Facture Octobre", "Sat, 05 Oct 2024 10:00:00 +0000");
        client.add_pdf("m1", "x.pdf", b"%PDF-x");
        client.add("m2", "Other <o@example.com>", "Hello", "Sun, 06 Oct 2024 10:00:00 +0000");
        client.add_pdf("m2", "y.pdf", b"%PDF-y");
        (tmp, ledger, client)
    }

    #[test]
    fn test_ingest_records_and_downloads() {
        let (tmp, ledger, client) = setup();
        let dir = tmp.path().join("attachments");
        let intake = EmailIntake::new(&client, &ledger, &dir);

        let report = intake.ingest(&["m1".to_string(), "m2".to_string()], None);
        assert_eq!(report.recorded, 2);
        assert_eq!(report.downloaded.len(), 2);
        assert!(report.failures.is_empty());
        assert!(ledger.has_email("m1"));
        assert!(dir.join("x.pdf").exists());
        assert!(dir.join("y.pdf").exists());
    }

    #[test]
    fn test_second_ingest_is_a_no_op() {
        let (tmp, ledger, client) = setup();
        let dir = tmp.path().join("attachments");
        let intake = EmailIntake::new(&client, &ledger, &dir);
        let ids = vec!["m1".to_string(), "m2".to_string()];

        intake.ingest(&ids, None);
        let before = ledger.get_email("m1").unwrap();
        let calls = client.attachment_calls.borrow().len();

        let report = intake.ingest(&ids, None);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.recorded, 0);
        assert_eq!(ledger.get_email("m1").unwrap(), before);
        assert_eq!(client.attachment_calls.borrow().len(), calls);
    }

    #[test]
    fn test_failed_download_is_retried_on_next_pass() {
        let (tmp, ledger, client) = setup();
        let dir = tmp.path().join("attachments");
        let intake = EmailIntake::new(&client, &ledger, &dir);

        client.fail_blob("m1", "att-0");
        let report = intake.ingest(&["m1".to_string(), "m2".to_string()], None);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].op, "download_attachment");
        assert_eq!(report.downloaded.len(), 1);
        assert!(ledger.has_email("m1"));
        assert_eq!(ledger.pending_email_ids(), vec!["m1"]);
        let recorded = ledger.get_email("m1").unwrap();

        // Next run: the listing no longer returns m1, but it is retried.
        client.heal_blobs();
        let report = intake.ingest(&[], None);
        assert_eq!(report.retried, 1);
        assert_eq!(report.downloaded.len(), 1);
        assert!(report.failures.is_empty());
        assert!(ledger.pending_email_ids().is_empty());
        assert!(dir.join("x.pdf").exists());

        let after = ledger.get_email("m1").unwrap();
        assert_eq!(after.subject, recorded.subject);
        assert_eq!(after.date, recorded.date);
    }

    #[test]
    fn test_missing_message_is_item_failure() {
        let (tmp, ledger, client) = setup();
        let dir = tmp.path().join("attachments");
        let intake = EmailIntake::new(&client, &ledger, &dir);

        let report = intake.ingest(&["ghost".to_string(), "m1".to_string(), String::new()], None);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].op, "get_message");
        assert_eq!(report.failures[1].op, "process_message");
        assert!(!ledger.has_email("ghost"));
        assert!(ledger.has_email("m1"));
    }

    #[test]
    fn test_progress_reaches_total() {
        let (tmp, ledger, client) = setup();
        let dir = tmp.path().join("attachments");
        let intake = EmailIntake::new(&client, &ledger, &dir);
        let last = std::cell::Cell::new((0, 0));
        intake.ingest(
            &["m1".to_string(), "m2".to_string()],
            Some(&|cur, total| last.set((cur, total))),
        );
        assert_eq!(last.get(), (2, 2));
    }

    #[test]
    fn test_retry_keeps_processed_sibling_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(tmp.path().join("activity.json")).unwrap();
        let dir = tmp.path().join("attachments");
        let mut client = FakeClient::default();
        client.add("m1", "IKUTO <b@ikuto.fr>", "Facture Octobre", "Sat, 05 Oct 2024 10:00:00 +0000");
        client.add_pdf("m1", "x.pdf", b"%PDF-x");
        client.add_pdf("m1", "annexe.pdf", b"%PDF-annexe");
        client.fail_blob("m1", "att-1");
        let intake = EmailIntake::new(&client, &ledger, &dir);

        let first = intake.ingest(&["m1".to_string()], None);
        assert_eq!(first.failures.len(), 1);
        let hash = first.downloaded[0].content_hash.clone();

        // The classifier renames the invoice before the retry happens.
        std::fs::rename(dir.join("x.pdf"), dir.join("2024-10-facture-IKUTO.pdf")).unwrap();
        ledger
            .rename_attachment(&hash, "2024-10-facture-IKUTO.pdf")
            .unwrap();
        ledger
            .update_attachment_status(&hash, AttachmentStatus::Processed)
            .unwrap();
        let processed = ledger.get_attachment(&hash).unwrap();

        client.heal_blobs();
        let retry = intake.ingest(&[], None);
        assert_eq!(retry.retried, 1);
        assert_eq!(retry.unchanged, 1);
        assert_eq!(retry.downloaded.len(), 1);
        assert_eq!(retry.downloaded[0].filename, "annexe.pdf");
        assert!(retry.failures.is_empty());

        assert_eq!(ledger.get_attachment(&hash).unwrap(), processed);
        assert!(!dir.join("x.pdf").exists());
        assert!(ledger.pending_email_ids().is_empty());
    }
}
