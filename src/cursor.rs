//! Fetch window: which messages count as "new" for this run.
//!
//! The provider only filters by calendar date, so a run re-observes
//! messages from the partial day of the previous checkpoint. Message-ID
//! de-duplication in the ledger is what keeps intake exactly-once.

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::ledger::Ledger;

/// Provider filter used when the configuration does not override it.
pub const DEFAULT_QUERY_FILTER: &str = "has:attachment filename:pdf";

/// Lower date bound of the remote message query.
///
/// Uses the ledger checkpoint. When it is absent the ledger already answers
/// with the look-back window; when it is unreadable the look-back is
/// applied here. Both fallbacks are logged.
pub fn resolve_window_start(ledger: &Ledger) -> NaiveDate {
    let has_checkpoint = ledger.has_fetch_checkpoint();
    match ledger.last_fetch_time() {
        Ok(ts) if has_checkpoint => {
            debug!(since = %ts, "Resolved fetch window");
            ts.date_naive()
        }
        Ok(ts) => {
            info!(
                lookback_days = ledger.lookback().num_days(),
                since = %ts.date_naive(),
                "No fetch checkpoint yet, using look-back window"
            );
            ts.date_naive()
        }
        Err(e) => {
            let fallback = (Utc::now() - ledger.lookback()).date_naive();
            warn!(error = %e, fallback = %fallback, "Unreadable fetch checkpoint, using look-back window");
            fallback
        }
    }
}

/// Provider search query: `after:YYYY/MM/DD <filter>`.
pub fn search_query(start: NaiveDate, filter: &str) -> String {
    let filter = filter.trim();
    let after = start.format("%Y/%m/%d");
    if filter.is_empty() {
        format!("after:{after}")
    } else {
        format!("after:{after} {filter}")
    }
}
