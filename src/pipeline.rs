//! One batch run: fetch, checkpoint, sweep.

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::classify::{sweep, SweepReport, VendorRule};
use crate::cursor::{resolve_window_start, search_query, DEFAULT_QUERY_FILTER};
use crate::error::{aggregate, HarvestError, ItemFailure, Result};
use crate::intake::{EmailIntake, IntakeReport};
use crate::ledger::Ledger;
use crate::mail::MailClient;
use crate::notify::Notifier;

/// Everything a run needs besides the ledger and the collaborators.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub attachments_dir: PathBuf,
    pub query_filter: String,
    pub rule: VendorRule,
}

impl RunOptions {
    pub fn new(attachments_dir: impl Into<PathBuf>) -> Self {
        Self {
            attachments_dir: attachments_dir.into(),
            query_filter: DEFAULT_QUERY_FILTER.to_string(),
            rule: VendorRule::default(),
        }
    }
}

/// Outcome of a run that got past its structural steps.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Lower bound of the fetch window; `None` for a sweep-only run.
    pub window_start: Option<NaiveDate>,
    /// `None` for a sweep-only run.
    pub intake: Option<IntakeReport>,
    pub sweep: SweepReport,
}

impl RunSummary {
    /// Per-item failures of both phases, in the order they happened.
    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.intake
            .iter()
            .flat_map(|r| r.failures.iter())
            .chain(self.sweep.failures.iter())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// The aggregate batch error, if any item failed.
    pub fn batch_error(&self) -> Option<HarvestError> {
        aggregate("run", self.failures())
    }

    /// `Ok(self)` when nothing failed, the aggregate error otherwise.
    pub fn into_result(self) -> Result<Self> {
        match self.batch_error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Drives a run against one mail provider and one ledger.
pub struct Pipeline<'a, C: MailClient + ?Sized, N: Notifier + ?Sized> {
    client: &'a C,
    notifier: &'a N,
    ledger: &'a Ledger,
    options: RunOptions,
}

impl<'a, C: MailClient + ?Sized, N: Notifier + ?Sized> Pipeline<'a, C, N> {
    pub fn new(client: &'a C, notifier: &'a N, ledger: &'a Ledger, options: RunOptions) -> Self {
        Self {
            client,
            notifier,
            ledger,
            options,
        }
    }

    /// Full run: fetch new messages, save the checkpoint, then sweep.
    ///
    /// Returns `Err` only for structural failures (listing, attachments
    /// directory, ledger save). Item failures are in the summary, and the
    /// ledger is saved before it is returned.
    pub fn run(&self, progress: Option<&dyn Fn(usize, usize)>) -> Result<RunSummary> {
        let dir = &self.options.attachments_dir;
        std::fs::create_dir_all(dir).map_err(|e| HarvestError::io(dir, e))?;

        let (window_start, intake) = self.fetch(progress)?;
        self.ledger.save()?;
        info!(path = %self.ledger.path().display(), "Checkpoint saved");

        let sweep = self.sweep_phase()?;
        Ok(RunSummary {
            window_start: Some(window_start),
            intake: Some(intake),
            sweep,
        })
    }

    fn fetch(&self, progress: Option<&dyn Fn(usize, usize)>) -> Result<(NaiveDate, IntakeReport)> {
        // Stamped before listing so that nothing delivered during the run
        // falls before the next window.
        let started = Utc::now();
        let window_start = resolve_window_start(self.ledger);
        let filter = &self.options.query_filter;
        info!(query = %search_query(window_start, filter), "Listing messages");

        let ids = self.client.list_message_ids(window_start, filter)?;
        let message = if ids.is_empty() {
            format!("No messages found since last fetch: {window_start}")
        } else {
            format!(
                "Found {} messages with PDF attachments since {window_start}.",
                ids.len()
            )
        };
        info!("{message}");
        if let Err(e) = self.notifier.notify(&message) {
            warn!(error = %e, "Could not display notification");
        }

        let intake = EmailIntake::new(self.client, self.ledger, &self.options.attachments_dir)
            .ingest(&ids, progress);

        self.ledger.set_last_fetch_time(started);
        Ok((window_start, intake))
    }

    fn sweep_phase(&self) -> Result<SweepReport> {
        sweep_and_save(self.ledger, &self.options)
    }
}

/// Classifier pass alone, over whatever is already in the directory.
///
/// Needs no mail provider.
pub fn sweep_only(ledger: &Ledger, options: &RunOptions) -> Result<RunSummary> {
    Ok(RunSummary {
        sweep: sweep_and_save(ledger, options)?,
        ..Default::default()
    })
}

fn sweep_and_save(ledger: &Ledger, options: &RunOptions) -> Result<SweepReport> {
    let report = sweep(ledger, &options.attachments_dir, &options.rule)?;
    if !report.renamed.is_empty() {
        ledger.save()?;
    }
    Ok(report)
}
