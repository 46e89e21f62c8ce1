//! Charter Recon CLI - bank / QuickBooks / ledger reconciliation
//!
//! Usage:
//!   charter-recon import --file CSV            Import into the ledger (idempotent)
//!   charter-recon match --a CSV --b CSV        Match two sources, report unmatched
//!   charter-recon dedup [--write]              Find and remove duplicate ledger rows
//!   charter-recon balance --file CSV ...       Statement balance check (exit 2 if off)
//!   charter-recon review [RUN_ID]              Browse a stored run (TUI)

mod cli;
mod commands;

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use charter_recon::ReconConfig;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use commands::{BalanceRequest, MatchOverrides, MatchRequest, SideB};

/// Exit status when `balance` finds the statement out of balance
const BALANCE_MISMATCH_EXIT: i32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let mut config = ReconConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    debug!(db = %config.db_path.display(), "configuration resolved");

    let conn = commands::open_ledger(&config.db_path)?;

    match cli.command {
        Commands::Import {
            file,
            source,
            label,
            dry_run,
        } => commands::cmd_import(
            &conn,
            &config,
            &file,
            source.as_deref(),
            label.as_deref(),
            dry_run,
        ),
        Commands::Match {
            a,
            a_source,
            b,
            b_source,
            ledger_source,
            window,
            tolerance,
            min_score,
            sign_flip,
            out,
            write,
        } => {
            let side_b = match (&b, &ledger_source) {
                (Some(path), _) => SideB::File {
                    path,
                    source: b_source.as_deref(),
                },
                (None, Some(source)) => SideB::Ledger { source },
                (None, None) => anyhow::bail!("Either --b or --ledger-source is required"),
            };
            let req = MatchRequest {
                a_path: &a,
                a_source: a_source.as_deref(),
                b: side_b,
                overrides: MatchOverrides {
                    window,
                    tolerance,
                    min_score,
                    sign_flip,
                },
                out: out.as_deref(),
                write,
            };
            commands::cmd_match(&conn, &config, &req).map(|_| ())
        }
        Commands::Dedup { source, write } => {
            commands::cmd_dedup(&conn, &config, source.as_deref(), write).map(|_| ())
        }
        Commands::Balance {
            file,
            source,
            opening,
            closing,
            from,
            to,
            account,
            ledger_source,
        } => {
            let req = BalanceRequest {
                file: &file,
                source: source.as_deref(),
                opening: &opening,
                closing: &closing,
                from: &from,
                to: &to,
                account: &account,
                ledger_source: ledger_source.as_deref(),
            };
            if !commands::cmd_balance(&conn, &config, &req)? {
                drop(conn);
                std::process::exit(BALANCE_MISMATCH_EXIT);
            }
            Ok(())
        }
        Commands::Runs => commands::cmd_runs(&conn),
        Commands::Sources => commands::cmd_sources(&conn),
        Commands::Review { run_id } => run_review(&conn, run_id),
    }
}

#[cfg(feature = "tui")]
fn run_review(conn: &rusqlite::Connection, run_id: Option<String>) -> Result<()> {
    let run_id = match run_id {
        Some(id) => id,
        None => charter_recon::db::latest_run_id(conn)?
            .context("No match runs stored. Run `charter-recon match ... --write` first.")?,
    };

    let detail = charter_recon::get_run(conn, &run_id)?;
    println!("🖥️  Reviewing run {} (press 'q' to quit)", run_id);

    let mut app = ui::App::new(detail);
    ui::run_ui(&mut app)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_review(_conn: &rusqlite::Connection, _run_id: Option<String>) -> Result<()> {
    anyhow::bail!("TUI review not available; rebuild with --features tui, or use recon-server")
}
