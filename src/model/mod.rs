//! Core data model types: ledger records, remote messages, and senders.

pub mod message;
pub mod record;
pub mod sender;
