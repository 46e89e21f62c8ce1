// 🧾 Record - the normalized row every source is loaded into
//
// Bank statements, QuickBooks exports and the ledger all end up as Records.
// Money is held as signed integer cents: deposits positive, withdrawals negative.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Source label ("bank", "quickbooks", "ledger", ...)
    pub source: String,

    /// Provenance
    pub source_file: String,
    pub line_number: usize,

    pub date: NaiveDate,
    pub amount_cents: i64,
    pub description: String,

    /// Cheque number, QuickBooks Num, or charter reserve number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Set by vendor normalization rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Record {
    pub fn new(
        source: impl Into<String>,
        date: NaiveDate,
        amount_cents: i64,
        description: impl Into<String>,
    ) -> Self {
        Record {
            source: source.into(),
            source_file: String::new(),
            line_number: 0,
            date,
            amount_cents,
            description: description.into(),
            reference: None,
            vendor: None,
            category: None,
        }
    }

    /// Builder pattern: add provenance
    pub fn with_provenance(mut self, source_file: impl Into<String>, line_number: usize) -> Self {
        self.source_file = source_file.into();
        self.line_number = line_number;
        self
    }

    /// Builder pattern: add reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        let trimmed = reference.trim();
        self.reference = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Hash of the row content: source, date, amount, description (case and
    /// whitespace folded) and reference. Provenance is not part of it, so
    /// identical rows share a content hash.
    pub fn content_hash(&self) -> String {
        sha256_hex(&self.content_key())
    }

    /// Storage key for the `occurrence`-th row with this content in one load.
    ///
    /// Re-importing the same file yields the same keys, while repeated
    /// identical rows within a file each get their own.
    pub fn idempotency_hash(&self, occurrence: usize) -> String {
        sha256_hex(&format!("{}#{}", self.content_key(), occurrence))
    }

    fn content_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.source,
            self.date.format("%Y-%m-%d"),
            self.amount_cents,
            collapse_whitespace(&self.description).to_lowercase(),
            self.reference.as_deref().unwrap_or("").to_lowercase(),
        )
    }

    pub fn is_deposit(&self) -> bool {
        self.amount_cents > 0
    }

    pub fn is_withdrawal(&self) -> bool {
        self.amount_cents < 0
    }

    /// Display name: normalized vendor when known, else the raw description
    pub fn display_name(&self) -> &str {
        self.vendor.as_deref().unwrap_or(&self.description)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:>12} {}",
            self.source,
            self.date,
            format_cents(self.amount_cents),
            self.description
        )
    }
}

// ============================================================================
// MONEY HELPERS
// ============================================================================

/// Format cents as a dollar string: -123456 -> "-$1,234.56"
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = abs / 100;
    let rem = abs % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{:02}", sign, grouped, rem)
}

/// Plain decimal rendering for CSV output: -123456 -> "-1234.56"
pub fn cents_to_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Idempotency hashes for a batch, numbering repeated rows in load order
pub fn idempotency_hashes(records: &[Record]) -> Vec<String> {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    records
        .iter()
        .map(|r| {
            let seen = occurrences.entry(r.content_key()).or_insert(0);
            let hash = r.idempotency_hash(*seen);
            *seen += 1;
            hash
        })
        .collect()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// TESTS
// ============================================================================
