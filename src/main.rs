//! CLI entry point for `pdfharvest`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use pdfharvest::config::{self, Config, Paths};
use pdfharvest::ledger::Ledger;
use pdfharvest::mail::spool::SpoolClient;
use pdfharvest::notify::{CommandNotifier, LogNotifier, Notifier};
use pdfharvest::pipeline::{self, Pipeline, RunOptions, RunSummary};

/// Exit status when the run finished but some items failed.
const EXIT_PARTIAL: u8 = 2;

/// Fetch new PDF attachments from the mail spool and rename vendor invoices.
#[derive(Parser)]
#[command(name = "pdfharvest", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: $PDFHARVEST_CONFIG or the user config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only rename files already in the attachments directory
    #[arg(long)]
    sweep_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let generated = match &cli.command {
        Some(Commands::Completions { shell }) => Some(cmd_completions(*shell)),
        Some(Commands::Manpage) => Some(cmd_manpage()),
        None => None,
    };
    if let Some(result) = generated {
        return match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let paths = Paths::resolve(&config);
    setup_logging(log_level, paths.as_ref().ok().map(|p| p.log_dir.as_path()));

    let result = paths
        .map_err(anyhow::Error::from)
        .and_then(|paths| cmd_run(&cli, &config, &paths));
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Set up tracing with stderr output and file logging in `log_dir`.
fn setup_logging(level: &str, log_dir: Option<&Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "pdfharvest.log");
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "pdfharvest", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// The batch run itself. Returns the exit code for a run that completed.
fn cmd_run(cli: &Cli, config: &Config, paths: &Paths) -> anyhow::Result<ExitCode> {
    paths
        .bootstrap()
        .context("Failed to create working directories")?;

    let lookback = chrono::Duration::days(config.fetch.lookback_days.max(0));
    let ledger = Ledger::load_with_lookback(&paths.ledger, lookback)
        .context("Failed to load activity ledger")?;

    let options = RunOptions {
        attachments_dir: paths.attachments_dir.clone(),
        query_filter: config.fetch.query_filter.clone(),
        rule: config.classify.rule(),
    };

    let start = Instant::now();
    let summary = if cli.sweep_only {
        pipeline::sweep_only(&ledger, &options)?
    } else {
        let client = SpoolClient::open(&paths.spool_dir)
            .context("Failed to open mail spool (set fetch.spool_dir)")?;
        let notifier: Box<dyn Notifier> = if config.notify.enabled {
            Box::new(CommandNotifier::new(
                &config.notify.program,
                &paths.attachments_dir,
            ))
        } else {
            Box::new(LogNotifier)
        };

        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} Fetching [{bar:40.cyan/blue}] {pos}/{len} messages")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        let summary = Pipeline::new(&client, notifier.as_ref(), &ledger, options).run(Some(
            &|current, total| {
                pb.set_length(total as u64);
                pb.set_position(current as u64);
            },
        ))?;
        pb.finish_and_clear();
        summary
    };

    print_summary(&summary, &ledger, start.elapsed());

    for failure in summary.failures() {
        eprintln!("  failed: {failure}");
    }
    match summary.batch_error() {
        Some(e) => {
            tracing::warn!(error = %e, "Run completed with failures");
            eprintln!("Warning: {e}");
            Ok(ExitCode::from(EXIT_PARTIAL))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

fn print_summary(summary: &RunSummary, ledger: &Ledger, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  Run complete:");
    if let Some(start) = summary.window_start {
        println!("  {:<25} {}", "Window start", start);
    }
    if let Some(intake) = &summary.intake {
        println!("  {:<25} {}", "Messages listed", intake.listed);
        println!("  {:<25} {}", "Already known", intake.skipped);
        println!("  {:<25} {}", "New emails", intake.recorded);
        if intake.retried > 0 {
            println!("  {:<25} {}", "Retried", intake.retried);
        }
        if intake.unchanged > 0 {
            println!("  {:<25} {}", "Already processed", intake.unchanged);
        }
        println!(
            "  {:<25} {} ({})",
            "Attachments downloaded",
            intake.downloaded.len(),
            format_size(intake.downloaded_bytes(), BINARY)
        );
    }
    println!("  {:<25} {}", "Invoices renamed", summary.sweep.renamed.len());
    for (from, to) in &summary.sweep.renamed {
        println!("    {from} -> {to}");
    }
    let stats = ledger.stats();
    println!(
        "  {:<25} {} emails, {} attachments ({} processed)",
        "Ledger", stats.emails, stats.attachments, stats.processed
    );
    if stats.pending_emails > 0 {
        println!("  {:<25} {}", "Emails awaiting retry", stats.pending_emails);
    }
    println!("  {:<25} {}", "Failures", summary.failure_count());
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);
    println!();
}
