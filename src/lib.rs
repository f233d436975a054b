//! `pdfharvest`: pull PDF attachments out of a mailbox, exactly once.
//!
//! This crate provides the activity ledger, the fetch window, email and
//! attachment intake, and the vendor-invoice classifier that renames
//! downloaded files. The binary wires them to a `.eml` spool and a
//! desktop notifier.

pub mod classify;
pub mod config;
pub mod cursor;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod mail;
pub mod model;
pub mod notify;
pub mod parser;
pub mod pipeline;
