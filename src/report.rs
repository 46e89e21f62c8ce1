// 📋 Reporter - matched / unmatched sets for human review
//
// Output directory layout:
//   matched.csv       one row per pair
//   unmatched_a.csv   every unmatched source-A record, once
//   unmatched_b.csv   every unmatched source-B record, once
//   report.json       summary + full outcome
//   summary.md        short Markdown summary

use crate::error::Result;
use crate::gst::{GstBreakdown, GstRate};
use crate::matcher::{MatchConfig, MatchOutcome, Unmatched};
use crate::record::{cents_to_decimal, format_cents};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub label_a: String,
    pub label_b: String,
    pub a_count: usize,
    pub b_count: usize,
    pub matched: usize,
    pub unmatched_a: usize,
    pub unmatched_b: usize,
    pub unmatched_a_cents: i64,
    pub unmatched_b_cents: i64,
    pub match_rate: f64,
}

impl RunSummary {
    pub fn from_outcome(label_a: &str, label_b: &str, outcome: &MatchOutcome) -> Self {
        RunSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            label_a: label_a.to_string(),
            label_b: label_b.to_string(),
            a_count: outcome.total_a(),
            b_count: outcome.total_b(),
            matched: outcome.pairs.len(),
            unmatched_a: outcome.unmatched_a.len(),
            unmatched_b: outcome.unmatched_b.len(),
            unmatched_a_cents: sum_cents(&outcome.unmatched_a),
            unmatched_b_cents: sum_cents(&outcome.unmatched_b),
            match_rate: outcome.match_rate(),
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} vs {}: {} matched, {} unmatched in {} ({}), {} unmatched in {} ({}), match rate {:.1}%",
            self.label_a,
            self.label_b,
            self.matched,
            self.unmatched_a,
            self.label_a,
            format_cents(self.unmatched_a_cents),
            self.unmatched_b,
            self.label_b,
            format_cents(self.unmatched_b_cents),
            self.match_rate * 100.0
        )
    }
}

fn sum_cents(items: &[Unmatched]) -> i64 {
    items.iter().map(|u| u.record.amount_cents).sum()
}

// ============================================================================
// CSV ROWS
// ============================================================================

#[derive(Debug, Serialize)]
struct MatchedRow<'a> {
    a_date: String,
    a_amount: String,
    a_description: &'a str,
    a_reference: &'a str,
    a_line: usize,
    b_date: String,
    b_amount: String,
    b_description: &'a str,
    b_reference: &'a str,
    b_line: usize,
    vendor: &'a str,
    category: &'a str,
    gst: String,
    date_diff_days: i64,
    amount_diff: String,
    score: String,
}

#[derive(Debug, Serialize)]
struct UnmatchedRow<'a> {
    source: &'a str,
    source_file: &'a str,
    line_number: usize,
    date: String,
    amount: String,
    description: &'a str,
    reference: &'a str,
    vendor: &'a str,
    category: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    summary: &'a RunSummary,
    config: &'a MatchConfig,
    outcome: &'a MatchOutcome,
}

// ============================================================================
// WRITERS
// ============================================================================

pub struct Reporter {
    gst_rate: GstRate,
}

impl Reporter {
    pub fn new(gst_rate: GstRate) -> Self {
        Reporter { gst_rate }
    }

    /// Write every report file into `dir`, creating it if needed
    pub fn write_all(
        &self,
        dir: &Path,
        summary: &RunSummary,
        config: &MatchConfig,
        outcome: &MatchOutcome,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let mut written = self.write_csv_reports(dir, outcome)?;

        let json_path = dir.join("report.json");
        write_json_report(&json_path, summary, config, outcome)?;
        written.push(json_path);

        let md_path = dir.join("summary.md");
        fs::write(&md_path, render_markdown_summary(summary, outcome))?;
        written.push(md_path);

        info!(dir = %dir.display(), files = written.len(), "reports written");
        Ok(written)
    }

    pub fn write_csv_reports(&self, dir: &Path, outcome: &MatchOutcome) -> Result<Vec<PathBuf>> {
        let matched_path = dir.join("matched.csv");
        self.write_matched(&matched_path, outcome)?;

        let a_path = dir.join("unmatched_a.csv");
        write_unmatched(&a_path, &outcome.unmatched_a)?;

        let b_path = dir.join("unmatched_b.csv");
        write_unmatched(&b_path, &outcome.unmatched_b)?;

        Ok(vec![matched_path, a_path, b_path])
    }

    fn write_matched(&self, path: &Path, outcome: &MatchOutcome) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        for pair in &outcome.pairs {
            let vendor = pair.a.vendor.as_deref().or(pair.b.vendor.as_deref()).unwrap_or("");
            let category = pair.a.category.as_deref().or(pair.b.category.as_deref()).unwrap_or("");

            // GST only applies to money going out
            let gst = if pair.a.is_withdrawal() {
                cents_to_decimal(GstBreakdown::from_gross(pair.a.amount_cents, self.gst_rate).gst_cents)
            } else {
                String::new()
            };

            wtr.serialize(MatchedRow {
                a_date: pair.a.date.to_string(),
                a_amount: cents_to_decimal(pair.a.amount_cents),
                a_description: &pair.a.description,
                a_reference: pair.a.reference.as_deref().unwrap_or(""),
                a_line: pair.a.line_number,
                b_date: pair.b.date.to_string(),
                b_amount: cents_to_decimal(pair.b.amount_cents),
                b_description: &pair.b.description,
                b_reference: pair.b.reference.as_deref().unwrap_or(""),
                b_line: pair.b.line_number,
                vendor,
                category,
                gst,
                date_diff_days: pair.date_diff_days,
                amount_diff: cents_to_decimal(pair.amount_diff_cents),
                score: format!("{:.3}", pair.score.total),
            })?;
        }

        wtr.flush()?;
        Ok(())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(GstRate::default())
    }
}

fn write_unmatched(path: &Path, items: &[Unmatched]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    for item in items {
        let r = &item.record;
        wtr.serialize(UnmatchedRow {
            source: &r.source,
            source_file: &r.source_file,
            line_number: r.line_number,
            date: r.date.to_string(),
            amount: cents_to_decimal(r.amount_cents),
            description: &r.description,
            reference: r.reference.as_deref().unwrap_or(""),
            vendor: r.vendor.as_deref().unwrap_or(""),
            category: r.category.as_deref().unwrap_or(""),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_json_report(
    path: &Path,
    summary: &RunSummary,
    config: &MatchConfig,
    outcome: &MatchOutcome,
) -> Result<()> {
    let report = JsonReport {
        summary,
        config,
        outcome,
    };
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

/// Markdown summary for the reviewer; lists the largest unmatched items
pub fn render_markdown_summary(summary: &RunSummary, outcome: &MatchOutcome) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Reconciliation: {} vs {}", summary.label_a, summary.label_b);
    let _ = writeln!(md);
    let _ = writeln!(md, "Run `{}` at {}", summary.run_id, summary.created_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(md);
    let _ = writeln!(md, "| | {} | {} |", summary.label_a, summary.label_b);
    let _ = writeln!(md, "|---|---:|---:|");
    let _ = writeln!(md, "| Records | {} | {} |", summary.a_count, summary.b_count);
    let _ = writeln!(md, "| Matched | {} | {} |", summary.matched, summary.matched);
    let _ = writeln!(md, "| Unmatched | {} | {} |", summary.unmatched_a, summary.unmatched_b);
    let _ = writeln!(
        md,
        "| Unmatched total | {} | {} |",
        format_cents(summary.unmatched_a_cents),
        format_cents(summary.unmatched_b_cents)
    );
    let _ = writeln!(md);
    let _ = writeln!(md, "Match rate: {:.1}%", summary.match_rate * 100.0);

    for (title, items) in [
        (&summary.label_a, &outcome.unmatched_a),
        (&summary.label_b, &outcome.unmatched_b),
    ] {
        if items.is_empty() {
            continue;
        }
        let mut largest: Vec<&Unmatched> = items.iter().collect();
        largest.sort_by_key(|u| std::cmp::Reverse(u.record.amount_cents.abs()));

        let _ = writeln!(md);
        let _ = writeln!(md, "## Largest unmatched in {}", title);
        let _ = writeln!(md);
        let _ = writeln!(md, "| Date | Amount | Description |");
        let _ = writeln!(md, "|---|---:|---|");
        for u in largest.iter().take(10) {
            let _ = writeln!(
                md,
                "| {} | {} | {} |",
                u.record.date,
                format_cents(u.record.amount_cents),
                u.record.description.replace('|', "/")
            );
        }
    }

    md
}

// ============================================================================
// TESTS
// ============================================================================
