//! Persistent activity ledger: which messages and attachments were handled.

pub mod format;
pub mod store;

pub use store::{Ledger, LedgerStats, DEFAULT_LOOKBACK_DAYS};
