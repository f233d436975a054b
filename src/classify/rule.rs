//! Vendor invoice rule: which emails' PDFs get renamed, and to what.

use crate::model::record::EmailRecord;

pub const DEFAULT_VENDOR_TAG: &str = "IKUTO";
pub const DEFAULT_KEYWORD: &str = "facture";

/// Matches invoices from one vendor by sender display name and subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRule {
    pub tag: String,
    pub keyword: String,
}

impl Default for VendorRule {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_TAG, DEFAULT_KEYWORD)
    }
}

impl VendorRule {
    pub fn new(tag: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            keyword: keyword.into(),
        }
    }

    /// Sender name equals the tag and the subject contains the keyword,
    /// both compared case-insensitively.
    pub fn matches(&self, email: &EmailRecord) -> bool {
        if self.tag.is_empty() || self.keyword.is_empty() {
            return false;
        }
        email.sender_name.trim().to_lowercase() == self.tag.to_lowercase()
            && email
                .subject
                .to_lowercase()
                .contains(&self.keyword.to_lowercase())
    }

    /// `<YYYY-MM>-<keyword>-<tag>.pdf`, dated by the email.
    pub fn target_filename(&self, email: &EmailRecord) -> String {
        format!(
            "{}-{}-{}.pdf",
            email.date.format("%Y-%m"),
            self.keyword,
            self.tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn email(name: &str, subject: &str) -> EmailRecord {
        EmailRecord {
            id: "m1".into(),
            date: Utc.with_ymd_and_hms(2024, 10, 5, 10, 0, 0).unwrap(),
            subject: subject.into(),
            sender_name: name.into(),
            sender_email: "billing@ikuto.fr".into(),
            attachments_pending: false,
        }
    }

    #[test]
    fn test_matches_case_insensitive() {
        let rule = VendorRule::default();
        assert!(rule.matches(&email("IKUTO", "Facture Octobre")));
        assert!(rule.matches(&email("ikuto", "votre FACTURE")));
    }

    #[test]
    fn test_no_match() {
        let rule = VendorRule::default();
        assert!(!rule.matches(&email("IKUTO", "Newsletter")));
        assert!(!rule.matches(&email("Other", "Facture")));
        assert!(!rule.matches(&email("IKUTO SAS", "Facture")));
        assert!(!VendorRule::new("", "facture").matches(&email("", "Facture")));
    }

    #[test]
    fn test_target_filename() {
        let rule = VendorRule::default();
        assert_eq!(
            rule.target_filename(&email("IKUTO", "Facture")),
            "2024-10-facture-IKUTO.pdf"
        );
    }
}
