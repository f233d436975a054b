//! Mail provider boundary.
//!
//! The pipeline only talks to a provider through [`MailClient`]. The crate
//! ships [`spool::SpoolClient`], which serves `.eml` files from a local
//! directory.

pub mod spool;

use chrono::NaiveDate;

use crate::error::Result;
use crate::model::message::RemoteMessage;

/// Operations the pipeline needs from a mail provider.
///
/// Every failure is reported as [`crate::error::HarvestError::Remote`].
pub trait MailClient {
    /// IDs of messages dated on or after `after` that match `filter`,
    /// in provider order.
    fn list_message_ids(&self, after: NaiveDate, filter: &str) -> Result<Vec<String>>;

    fn get_message(&self, id: &str) -> Result<RemoteMessage>;

    /// Raw (decoded) bytes of one attachment.
    fn get_attachment_bytes(&self, message_id: &str, attachment_ref: &str) -> Result<Vec<u8>>;
}

impl<T: MailClient + ?Sized> MailClient for &T {
    fn list_message_ids(&self, after: NaiveDate, filter: &str) -> Result<Vec<String>> {
        (**self).list_message_ids(after, filter)
    }

    fn get_message(&self, id: &str) -> Result<RemoteMessage> {
        (**self).get_message(id)
    }

    fn get_attachment_bytes(&self, message_id: &str, attachment_ref: &str) -> Result<Vec<u8>> {
        (**self).get_attachment_bytes(message_id, attachment_ref)
    }
}
