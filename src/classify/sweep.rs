//! Directory sweep: rename vendor invoices that have not been handled yet.

use std::path::Path;

use tracing::{debug, info, warn};

use super::rule::VendorRule;
use crate::error::{HarvestError, ItemFailure, Result};
use crate::ledger::Ledger;
use crate::intake::content_hash;
use crate::model::record::{AttachmentRecord, AttachmentStatus};

/// What one sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// PDF files looked at.
    pub scanned: usize,
    /// `(old, new)` filenames of renamed attachments.
    pub renamed: Vec<(String, String)>,
    /// Files with no ledger record.
    pub orphans: usize,
    /// Files whose record was already processed.
    pub already_processed: usize,
    /// Files whose email did not match the rule.
    pub unmatched: usize,
    /// Files found under a name their record did not carry, matched by content.
    pub repaired: usize,
    pub failures: Vec<ItemFailure>,
}

/// Walk `dir` once and rename every unprocessed PDF whose email matches
/// `rule`.
///
/// Only a missing or unreadable directory fails the sweep; problems with
/// individual files are collected in [`SweepReport::failures`]. Running the
/// sweep again without new downloads changes nothing.
pub fn sweep(ledger: &Ledger, dir: &Path, rule: &VendorRule) -> Result<SweepReport> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| HarvestError::io(dir, e))?;

    let mut names: Vec<String> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| HarvestError::io(dir, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && is_pdf_name(&name) {
            names.push(name);
        }
    }
    names.sort();

    let mut report = SweepReport::default();
    for name in names {
        report.scanned += 1;
        sweep_one(ledger, dir, rule, &name, &mut report);
    }

    info!(
        dir = %dir.display(),
        scanned = report.scanned,
        renamed = report.renamed.len(),
        orphans = report.orphans,
        repaired = report.repaired,
        failed = report.failures.len(),
        "Sweep finished"
    );
    Ok(report)
}

fn sweep_one(ledger: &Ledger, dir: &Path, rule: &VendorRule, name: &str, report: &mut SweepReport) {
    let found = ledger
        .find_attachment_by_filename(name)
        .or_else(|| repair_by_content(ledger, dir, name, report));
    let Some((hash, record)) = found else {
        debug!(file = name, "No ledger record, leaving file alone");
        report.orphans += 1;
        return;
    };
    if record.is_processed() {
        report.already_processed += 1;
        return;
    }

    let email = match ledger.get_email(&record.email_id) {
        Ok(email) => email,
        Err(e) => {
            warn!(file = name, email_id = %record.email_id, error = %e, "Cannot resolve email for attachment");
            report.failures.push(ItemFailure::new("get_email", name, e));
            return;
        }
    };

    if !rule.matches(&email) {
        report.unmatched += 1;
        return;
    }

    let target = rule.target_filename(&email);
    if target != name {
        let from = dir.join(name);
        let to = dir.join(&target);
        if to.exists() {
            let e = HarvestError::io(
                &to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target file exists"),
            );
            warn!(file = name, target = %target, "Rename target already exists");
            report.failures.push(ItemFailure::new("rename", name, e));
            return;
        }
        if let Err(e) = std::fs::rename(&from, &to) {
            warn!(file = name, target = %target, error = %e, "Rename failed");
            report
                .failures
                .push(ItemFailure::new("rename", name, HarvestError::io(&to, e)));
            return;
        }
    }

    let updated = ledger
        .rename_attachment(&hash, &target)
        .and_then(|()| ledger.update_attachment_status(&hash, AttachmentStatus::Processed));
    if let Err(e) = updated {
        report
            .failures
            .push(ItemFailure::new("update_attachment", name, e));
        return;
    }

    info!(from = name, to = %target, "Renamed attachment");
    report.renamed.push((name.to_string(), target));
}

/// Match a file with no filename record by its content hash.
///
/// A file renamed on disk whose record still carries the old name (the
/// ledger was not saved afterwards) is reattached to its record. Only done
/// when the recorded name no longer exists, so a plain copy stays an orphan.
fn repair_by_content(
    ledger: &Ledger,
    dir: &Path,
    name: &str,
    report: &mut SweepReport,
) -> Option<(String, AttachmentRecord)> {
    let bytes = match std::fs::read(dir.join(name)) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(file = name, error = %e, "Cannot read file for content lookup");
            return None;
        }
    };
    let hash = content_hash(&bytes);
    let record = ledger.get_attachment(&hash).ok()?;
    if dir.join(&record.filename).exists() {
        return None;
    }

    if let Err(e) = ledger.rename_attachment(&hash, name) {
        report
            .failures
            .push(ItemFailure::new("update_attachment", name, e));
        return None;
    }
    info!(file = name, recorded = %record.filename, "Reattached file to its record by content");
    report.repaired += 1;
    Some((
        hash,
        AttachmentRecord {
            filename: name.to_string(),
            ..record
        },
    ))
}

fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::EmailRecord;
    use chrono::{TimeZone, Utc};

    fn setup() -> (tempfile::TempDir, Ledger, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(tmp.path().join("activity.json")).unwrap();
        let dir = tmp.path().join("attachments");
        std::fs::create_dir_all(&dir).unwrap();
        (tmp, ledger, dir)
    }

    fn add(ledger: &Ledger, dir: &Path, id: &str, name: &str, subject: &str, file: &str) {
        ledger
            .put_email(
                id,
                EmailRecord {
                    id: id.into(),
                    date: Utc.with_ymd_and_hms(2024, 10, 5, 10, 0, 0).unwrap(),
                    subject: subject.into(),
                    sender_name: name.into(),
                    sender_email: "x@example.com".into(),
                    attachments_pending: false,
                },
            )
            .unwrap();
        ledger
            .put_attachment(&format!("hash-{id}"), AttachmentRecord::new(file, id))
            .unwrap();
        std::fs::write(dir.join(file), id).unwrap();
    }

    #[test]
    fn test_renames_matching_invoice() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m1", "IKUTO", "Facture Octobre", "x.pdf");

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.renamed, vec![("x.pdf".to_string(), "2024-10-facture-IKUTO.pdf".to_string())]);
        assert!(!dir.join("x.pdf").exists());
        assert!(dir.join("2024-10-facture-IKUTO.pdf").exists());

        let rec = ledger.get_attachment("hash-m1").unwrap();
        assert_eq!(rec.filename, "2024-10-facture-IKUTO.pdf");
        assert!(rec.is_processed());
    }

    #[test]
    fn test_leaves_non_matching_untouched() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m2", "Other", "Hello", "y.pdf");

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert!(report.renamed.is_empty());
        assert_eq!(report.unmatched, 1);
        assert!(dir.join("y.pdf").exists());
        assert!(!ledger.get_attachment("hash-m2").unwrap().is_processed());
    }

    #[test]
    fn test_orphans_and_non_pdfs_skipped() {
        let (_tmp, ledger, dir) = setup();
        std::fs::write(dir.join("stray.pdf"), "x").unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.join("sub.pdf")).unwrap();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.orphans, 1);
        assert!(report.failures.is_empty());
        assert!(dir.join("stray.pdf").exists());
    }

    #[test]
    fn test_second_sweep_changes_nothing() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m1", "IKUTO", "Facture", "x.pdf");
        sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        let before = ledger.snapshot();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert!(report.renamed.is_empty());
        assert_eq!(report.already_processed, 1);
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_existing_target_is_item_failure() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m1", "IKUTO", "Facture", "x.pdf");
        std::fs::write(dir.join("2024-10-facture-IKUTO.pdf"), "older").unwrap();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, HarvestError::Io { .. }));
        assert!(dir.join("x.pdf").exists());
        assert!(!ledger.get_attachment("hash-m1").unwrap().is_processed());
    }

    #[test]
    fn test_missing_email_is_item_failure() {
        let (_tmp, ledger, dir) = setup();
        ledger
            .put_attachment("hash-z", AttachmentRecord::new("z.pdf", "gone"))
            .unwrap();
        std::fs::write(dir.join("z.pdf"), "z").unwrap();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].op, "get_email");
    }

    #[test]
    fn test_missing_dir_is_structural() {
        let (tmp, ledger, _dir) = setup();
        let err = sweep(&ledger, &tmp.path().join("nope"), &VendorRule::default()).unwrap_err();
        assert!(matches!(err, HarvestError::Io { .. }));
    }

    #[test]
    fn test_renamed_file_with_stale_record_is_reattached() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m1", "IKUTO", "Facture Octobre", "x.pdf");
        // Same bytes under the real content hash, file already at the target
        // name while the record still says x.pdf.
        let bytes = std::fs::read(dir.join("x.pdf")).unwrap();
        let hash = content_hash(&bytes);
        ledger
            .put_attachment(&hash, AttachmentRecord::new("x.pdf", "m1"))
            .unwrap();
        std::fs::rename(dir.join("x.pdf"), dir.join("2024-10-facture-IKUTO.pdf")).unwrap();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.orphans, 0);
        assert_eq!(report.repaired, 1);
        assert!(report.failures.is_empty());
        let rec = ledger.get_attachment(&hash).unwrap();
        assert_eq!(rec.filename, "2024-10-facture-IKUTO.pdf");
        assert!(rec.is_processed());

        let before = ledger.snapshot();
        let again = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(again.already_processed, 1);
        assert_eq!(again.repaired, 0);
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_copy_of_recorded_file_stays_orphan() {
        let (_tmp, ledger, dir) = setup();
        add(&ledger, &dir, "m2", "Other", "Hello", "y.pdf");
        let bytes = std::fs::read(dir.join("y.pdf")).unwrap();
        ledger
            .put_attachment(&content_hash(&bytes), AttachmentRecord::new("y.pdf", "m2"))
            .unwrap();
        std::fs::copy(dir.join("y.pdf"), dir.join("copy.pdf")).unwrap();

        let report = sweep(&ledger, &dir, &VendorRule::default()).unwrap();
        assert_eq!(report.orphans, 1);
        assert_eq!(report.repaired, 0);
    }
}
