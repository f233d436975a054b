//! Fetch phase: turn provider messages into ledger records and files on disk.

pub mod attachment;
pub mod email;

pub use attachment::{content_hash, download_attachment, Downloaded};
pub use email::{extract_metadata, EmailIntake, IntakeReport};
