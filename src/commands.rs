//! Command implementations for the charter-recon CLI

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use charter_recon::{
    db::{self, RecordFilter},
    parser::{self, DEFAULT_DATE_FORMATS},
    plan_cleanup, DeduplicationEngine, LoadOutcome, MatchConfig, Matcher, ReconConfig,
    Record, Reporter, RuleEngine, RunSummary, SourceKind, StatementMetadata,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use charter_recon::record::format_cents;

/// Overrides for the matching section given on the command line
#[derive(Debug, Default, Clone)]
pub struct MatchOverrides {
    pub window: Option<i64>,
    pub tolerance: Option<i64>,
    pub min_score: Option<f64>,
    pub sign_flip: bool,
}

impl MatchOverrides {
    pub fn apply(&self, base: &MatchConfig) -> MatchConfig {
        let mut config = base.clone();
        if let Some(window) = self.window {
            config.date_window_days = window;
        }
        if let Some(tolerance) = self.tolerance {
            config.amount_tolerance_cents = tolerance;
        }
        if let Some(min_score) = self.min_score {
            config.min_score = min_score;
        }
        if self.sign_flip {
            config.allow_sign_flip = true;
        }
        config
    }
}

pub fn open_ledger(path: &Path) -> Result<Connection> {
    db::open_database(path).with_context(|| format!("Failed to open ledger: {}", path.display()))
}

fn parse_kind(source: Option<&str>) -> Result<Option<SourceKind>> {
    source
        .map(|s| {
            s.parse::<SourceKind>().map_err(|_| {
                anyhow::anyhow!("Unknown source format: {} (use bank, quickbooks or generic)", s)
            })
        })
        .transpose()
}

fn load_rules(config: &ReconConfig) -> Result<Option<RuleEngine>> {
    match &config.rules.path {
        Some(path) => {
            let engine = RuleEngine::from_file(path)
                .with_context(|| format!("Failed to load vendor rules: {}", path.display()))?;
            Ok(Some(engine))
        }
        None => Ok(None),
    }
}

/// Parse a CSV file and apply vendor rules, reporting rejected rows
pub fn load_side(config: &ReconConfig, file: &Path, source: Option<&str>) -> Result<LoadOutcome> {
    let kind = parse_kind(source)?;
    let mut outcome = parser::load_file(file, kind, config.generic.clone())
        .with_context(|| format!("Failed to load {}", file.display()))?;

    for reject in &outcome.rejects {
        warn!(
            file = %reject.source_file,
            line = reject.line_number,
            reason = %reject.reason,
            "row rejected"
        );
    }

    if let Some(rules) = load_rules(config)? {
        let hits = rules.apply(&mut outcome.records);
        debug!(hits, rules = rules.rule_count(), "vendor rules applied");
    }

    Ok(outcome)
}

fn parse_cli_date(raw: &str, flag: &str) -> Result<NaiveDate> {
    parser::parse_date(raw, DEFAULT_DATE_FORMATS)
        .ok_or_else(|| anyhow::anyhow!("Invalid date for {}: {} (expected YYYY-MM-DD)", flag, raw))
}

fn parse_cli_amount(raw: &str, flag: &str) -> Result<i64> {
    parser::parse_amount(raw).ok_or_else(|| anyhow::anyhow!("Invalid amount for {}: {}", flag, raw))
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn cmd_import(
    conn: &Connection,
    config: &ReconConfig,
    file: &Path,
    source: Option<&str>,
    label: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let mut outcome = load_side(config, file, source)?;
    if let Some(label) = label {
        outcome.relabel(label);
    }

    println!("📥 Importing {}...", file.display());
    println!("   Parsed {} records, {} rejected", outcome.records.len(), outcome.rejects.len());

    if dry_run {
        let stats = db::count_new_records(conn, &outcome.records)?;
        println!(
            "🔍 Dry run: {} would be imported, {} already present",
            stats.inserted, stats.skipped_duplicates
        );
        return Ok(());
    }

    let stats = db::insert_records(conn, &outcome.records, "cli")?;
    println!(
        "✅ Imported {} records ({} duplicates skipped)",
        stats.inserted, stats.skipped_duplicates
    );
    Ok(())
}

// ============================================================================
// MATCH
// ============================================================================

/// Where source B comes from
pub enum SideB<'a> {
    File { path: &'a Path, source: Option<&'a str> },
    Ledger { source: &'a str },
}

pub struct MatchRequest<'a> {
    pub a_path: &'a Path,
    pub a_source: Option<&'a str>,
    pub b: SideB<'a>,
    pub overrides: MatchOverrides,
    pub out: Option<&'a Path>,
    pub write: bool,
}

pub fn cmd_match(conn: &Connection, config: &ReconConfig, req: &MatchRequest<'_>) -> Result<RunSummary> {
    let match_config = req.overrides.apply(&config.matching);
    let matcher = Matcher::new(match_config.clone()).context("Invalid matching configuration")?;

    let a = load_side(config, req.a_path, req.a_source)?.records;
    let label_a = a.first().map(|r| r.source.clone()).unwrap_or_else(|| "a".to_string());

    let (b, label_b) = match &req.b {
        SideB::File { path, source } => {
            let b = load_side(config, path, *source)?.records;
            let label = b.first().map(|r| r.source.clone()).unwrap_or_else(|| "b".to_string());
            (b, label)
        }
        SideB::Ledger { source } => {
            let b = load_ledger_window(conn, source, &a, match_config.date_window_days)?;
            (b, source.to_string())
        }
    };

    info!(a = a.len(), b = b.len(), "matching");
    let outcome = matcher.match_records(&a, &b);
    let summary = RunSummary::from_outcome(&label_a, &label_b, &outcome);

    println!("🔗 {}", summary.summary_line());

    if let Some(dir) = req.out {
        let reporter = Reporter::new(config.gst.rate);
        let written = reporter
            .write_all(dir, &summary, &match_config, &outcome)
            .with_context(|| format!("Failed to write reports to {}", dir.display()))?;
        for path in written {
            println!("   wrote {}", path.display());
        }
    }

    if req.write {
        db::save_run(conn, &summary, &match_config, &outcome)?;
        println!("💾 Saved run {}", summary.run_id);
    }

    Ok(summary)
}

/// Stored records of one source around the date span of `a`, widened by the window
fn load_ledger_window(conn: &Connection, source: &str, a: &[Record], window_days: i64) -> Result<Vec<Record>> {
    let window = chrono::Duration::days(window_days);
    let from = a
        .iter()
        .map(|r| r.date)
        .min()
        .map(|d| d.checked_sub_signed(window).unwrap_or(NaiveDate::MIN));
    let to = a
        .iter()
        .map(|r| r.date)
        .max()
        .map(|d| d.checked_add_signed(window).unwrap_or(NaiveDate::MAX));

    let stored = db::get_records(
        conn,
        &RecordFilter {
            source: Some(source),
            from,
            to,
        },
    )?;

    if stored.is_empty() {
        warn!(source, "no ledger records in range");
    }
    Ok(stored.into_iter().map(|s| s.record).collect())
}

// ============================================================================
// DEDUP
// ============================================================================

pub fn cmd_dedup(conn: &Connection, config: &ReconConfig, source: Option<&str>, write: bool) -> Result<usize> {
    let stored = db::get_records(
        conn,
        &RecordFilter {
            source,
            ..Default::default()
        },
    )?;
    let records: Vec<Record> = stored.iter().map(|s| s.record.clone()).collect();

    let engine = DeduplicationEngine::with_config(config.dedup.clone());
    let matches = engine.find_duplicates(&records);
    let plan = plan_cleanup(&records, &matches);

    println!("🔍 Checked {} records: {} duplicate matches", records.len(), matches.len());
    for m in &matches {
        println!(
            "   [{}] {:.2} {} | {} | {}",
            m.strategy.name(),
            m.confidence,
            records[m.index1],
            records[m.index2],
            m.reason
        );
    }
    if !plan.protected.is_empty() {
        println!("   {} records kept as reversal pairs", plan.protected.len());
    }

    let removal = plan.removal_indices();
    if removal.is_empty() {
        println!("✅ No duplicates to remove");
        return Ok(0);
    }

    if !write {
        println!("🔍 Dry run: {} records would be deleted (use --write)", removal.len());
        return Ok(0);
    }

    let ids: Vec<i64> = removal.iter().map(|&i| stored[i].id).collect();
    let deleted = db::delete_records(conn, &ids, "cli", "duplicate")?;
    println!("🗑️  Deleted {} duplicate records", deleted);
    Ok(deleted)
}

// ============================================================================
// BALANCE
// ============================================================================

pub struct BalanceRequest<'a> {
    pub file: &'a Path,
    pub source: Option<&'a str>,
    pub opening: &'a str,
    pub closing: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub account: &'a str,
    pub ledger_source: Option<&'a str>,
}

pub fn cmd_balance(conn: &Connection, config: &ReconConfig, req: &BalanceRequest<'_>) -> Result<bool> {
    let period_start = parse_cli_date(req.from, "--from")?;
    let period_end = parse_cli_date(req.to, "--to")?;
    if period_end < period_start {
        bail!("--to ({}) is before --from ({})", period_end, period_start);
    }

    let statement = StatementMetadata {
        account_name: req.account.to_string(),
        period_start,
        period_end,
        opening_balance_cents: parse_cli_amount(req.opening, "--opening")?,
        closing_balance_cents: parse_cli_amount(req.closing, "--closing")?,
    };

    let records = load_side(config, req.file, req.source)?.records;
    let mut report = config.balance.engine().reconcile(&records, &statement);

    if let Some(source) = req.ledger_source {
        let matcher = Matcher::new(config.matching.clone())?;
        let ledger = load_ledger_window(conn, source, &records, config.matching.date_window_days)?;
        let outcome = matcher.match_records(&records, &ledger);
        report = report.with_match_outcome(&outcome);
    }

    let icon = if report.is_balanced() { "✅" } else { "⚠️ " };
    println!("{} {}", icon, report.summary());
    println!(
        "   credits {}  debits {}",
        format_cents(report.total_credits_cents),
        format_cents(report.total_debits_cents)
    );
    for d in &report.discrepancies {
        println!("   [{:?}] {}", d.category, d.description);
    }

    Ok(report.is_balanced())
}

// ============================================================================
// RUNS / SOURCES
// ============================================================================

pub fn cmd_runs(conn: &Connection) -> Result<()> {
    let runs = db::list_runs(conn)?;
    if runs.is_empty() {
        println!("No match runs stored. Run `charter-recon match ... --write` first.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<20}  {:>7}  {:>7}  {:>7}  {:>6}",
        "RUN", "CREATED", "SOURCES", "MATCHED", "UNM A", "UNM B", "RATE"
    );
    for r in &runs {
        println!(
            "{:<36}  {:<16}  {:<20}  {:>7}  {:>7}  {:>7}  {:>5.1}%",
            r.run_id,
            r.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&format!("{} / {}", r.label_a, r.label_b), 20),
            r.matched,
            r.unmatched_a,
            r.unmatched_b,
            r.match_rate * 100.0
        );
    }
    Ok(())
}

pub fn cmd_sources(conn: &Connection) -> Result<()> {
    let stats = db::get_source_stats(conn)?;
    if stats.is_empty() {
        println!("Ledger is empty.");
        return Ok(());
    }
    for s in &stats {
        println!(
            "{:<12} {:>6} records  in {:>14}  out {:>14}  {}",
            s.source,
            s.record_count,
            format_cents(s.total_in_cents),
            format_cents(s.total_out_cents),
            s.date_range
        );
    }
    println!("Total: {} records", db::verify_count(conn)?);
    Ok(())
}

/// Truncate to `max` characters, appending "..." when cut
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", keep)
}

// ============================================================================
// TESTS
// ============================================================================
