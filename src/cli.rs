//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Charter Recon - match bank statements and QuickBooks exports against the ledger
#[derive(Parser)]
#[command(name = "charter-recon")]
#[command(about = "Fuzzy transaction reconciliation for charter bookkeeping", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Ledger database path (overrides db_path from the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML config file (falls back to $RECON_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a CSV file into the ledger (rows already present are skipped)
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Source format: bank, quickbooks, generic (auto-detected if not specified)
        #[arg(short, long)]
        source: Option<String>,

        /// Source label stored on each record (defaults to the format code)
        #[arg(short, long)]
        label: Option<String>,

        /// Parse and count without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Match source A against source B and report matched / unmatched sets
    Match {
        /// Source A CSV (the authoritative side, usually the bank statement)
        #[arg(long = "a")]
        a: PathBuf,

        /// Source A format (auto-detected if not specified)
        #[arg(long)]
        a_source: Option<String>,

        /// Source B CSV
        #[arg(long = "b", conflicts_with = "ledger_source", required_unless_present = "ledger_source")]
        b: Option<PathBuf>,

        /// Source B format (auto-detected if not specified)
        #[arg(long)]
        b_source: Option<String>,

        /// Use stored ledger records with this source label as source B
        #[arg(long)]
        ledger_source: Option<String>,

        /// Date window in days
        #[arg(long)]
        window: Option<i64>,

        /// Amount tolerance in cents
        #[arg(long)]
        tolerance: Option<i64>,

        /// Minimum combined score
        #[arg(long)]
        min_score: Option<f64>,

        /// Compare magnitudes only (sources with opposite sign conventions)
        #[arg(long)]
        sign_flip: bool,

        /// Write CSV / JSON / Markdown reports to this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Persist the run in the ledger database
        #[arg(long)]
        write: bool,
    },

    /// Find duplicate records in the ledger
    Dedup {
        /// Only check records with this source label
        #[arg(short, long)]
        source: Option<String>,

        /// Delete the duplicates (default is a dry run)
        #[arg(long)]
        write: bool,
    },

    /// Check a statement's opening + credits - debits against its closing balance
    Balance {
        /// Statement CSV
        #[arg(short, long)]
        file: PathBuf,

        /// Statement format (auto-detected if not specified)
        #[arg(short, long)]
        source: Option<String>,

        /// Opening balance, e.g. 1234.56
        #[arg(long, allow_hyphen_values = true)]
        opening: String,

        /// Closing balance
        #[arg(long, allow_hyphen_values = true)]
        closing: String,

        /// Period start date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Period end date (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Account name shown in the report
        #[arg(long, default_value = "Operating account")]
        account: String,

        /// Match statement rows against stored ledger records of this source
        /// and list the ones missing from the ledger
        #[arg(long)]
        ledger_source: Option<String>,
    },

    /// List stored match runs
    Runs,

    /// Per-source record counts in the ledger
    Sources,

    /// Browse a stored match run (latest if no id given)
    Review {
        /// Run id
        run_id: Option<String>,
    },
}
