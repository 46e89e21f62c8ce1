// 🏗️ Parser Framework - Record loader
// One trait, three parsers: bank statements, QuickBooks exports, mapped CSV

use crate::error::{ReconError, Result};
use crate::record::Record;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Formats tried in order when a parser has no explicit list.
/// Two-digit years go first: `%Y` would happily read "24" as year 24.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
];

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceKind - which family of export a file comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bank,
    QuickBooks,
    Generic,
}

impl SourceKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Bank => "Bank statement",
            SourceKind::QuickBooks => "QuickBooks export",
            SourceKind::Generic => "Mapped CSV",
        }
    }

    /// Short code, also the default `Record::source` label
    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::Bank => "bank",
            SourceKind::QuickBooks => "quickbooks",
            SourceKind::Generic => "generic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bank" | "statement" => Ok(SourceKind::Bank),
            "quickbooks" | "qb" | "qbo" => Ok(SourceKind::QuickBooks),
            "generic" | "csv" => Ok(SourceKind::Generic),
            other => Err(ReconError::UnknownSource(other.to_string())),
        }
    }
}

/// A row the loader could not turn into a Record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reject {
    pub source_file: String,
    pub line_number: usize,
    pub reason: String,
    pub raw_line: String,
}

/// Output of parser.parse(): good rows and rejected rows, never aborting on one bad row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub records: Vec<Record>,
    pub rejects: Vec<Reject>,
}

impl LoadOutcome {
    /// Override the source label on every record
    pub fn relabel(&mut self, label: &str) {
        for r in &mut self.records {
            r.source = label.to_string();
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// SourceParser - Core trait (minimal, required)
pub trait SourceParser: Send + Sync {
    /// Parse a file into records and rejects
    fn parse(&self, file_path: &Path) -> Result<LoadOutcome>;

    /// Get the source kind this parser handles
    fn source_kind(&self) -> SourceKind;

    /// Get parser version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// FileValidator - Optional capability: recognize a file by its header row
pub trait FileValidator {
    fn can_parse(&self, headers: &[String]) -> bool;
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

/// Which header names feed which Record field. Each field lists aliases,
/// matched case-insensitively against the header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub date: Vec<String>,

    /// Signed amount column
    pub amount: Vec<String>,

    /// Split amount columns, used when no signed amount column is present
    pub debit: Vec<String>,
    pub credit: Vec<String>,

    /// true: debit column is money out (bank statement convention).
    /// false: debit column is money in (accounting register convention).
    pub debit_is_outflow: bool,

    /// Joined with " - " when several are present
    pub description: Vec<String>,

    pub reference: Vec<String>,

    /// Empty = DEFAULT_DATE_FORMATS
    pub date_formats: Vec<String>,

    /// Flip the sign of every amount
    pub negate: bool,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping {
            date: aliases(&["date", "transaction date", "posted date", "posting date"]),
            amount: aliases(&["amount", "amount_numeric", "total"]),
            debit: aliases(&["debit", "withdrawal", "withdrawals", "debit amount"]),
            credit: aliases(&["credit", "deposit", "deposits", "credit amount"]),
            debit_is_outflow: true,
            description: aliases(&["description", "memo", "details", "payee"]),
            reference: aliases(&["reference", "ref", "num", "cheque", "check number", "reserve_number"]),
            date_formats: Vec::new(),
            negate: false,
        }
    }
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Header positions resolved from a mapping
#[derive(Debug)]
struct ResolvedColumns {
    date: usize,
    amount: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    description: Vec<usize>,
    reference: Option<usize>,
}

impl ColumnMapping {
    fn resolve(&self, headers: &[String]) -> Result<ResolvedColumns> {
        let find = |names: &[String]| -> Option<usize> {
            names.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            })
        };

        let date = find(&self.date).ok_or_else(|| {
            ReconError::Parse(format!("no date column (looked for {:?})", self.date))
        })?;

        let amount = find(&self.amount);
        let debit = find(&self.debit);
        let credit = find(&self.credit);
        if amount.is_none() && debit.is_none() && credit.is_none() {
            return Err(ReconError::Parse(
                "no amount, debit or credit column".to_string(),
            ));
        }

        let mut description: Vec<usize> = Vec::new();
        for name in &self.description {
            if let Some(pos) = headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name.trim())) {
                if !description.contains(&pos) {
                    description.push(pos);
                }
            }
        }

        Ok(ResolvedColumns {
            date,
            amount,
            debit,
            credit,
            description,
            reference: find(&self.reference),
        })
    }

    fn formats(&self) -> Vec<&str> {
        if self.date_formats.is_empty() {
            DEFAULT_DATE_FORMATS.to_vec()
        } else {
            self.date_formats.iter().map(String::as_str).collect()
        }
    }
}

// ============================================================================
// FIELD PARSING
// ============================================================================

/// Parse a money string into cents.
///
/// Accepts "$1,234.56", "-12.00", "12.00-", "(45.00)", "45.00 CR", "45.00 DR".
/// A third decimal rounds half up. Blank or non-numeric input gives None.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let mut s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;

    if s.ends_with("CR") {
        s.truncate(s.len() - 2);
    } else if s.ends_with("DR") {
        s.truncate(s.len() - 2);
        negative = !negative;
    }
    let mut s = s.trim().to_string();

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        s = s[1..s.len() - 1].to_string();
        negative = !negative;
    }
    if let Some(rest) = s.strip_suffix('-') {
        s = rest.to_string();
        negative = !negative;
    }

    let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    let (cleaned, sign_negative) = match cleaned.strip_prefix('-') {
        Some(rest) => (rest.to_string(), true),
        None => (cleaned.strip_prefix('+').unwrap_or(&cleaned).to_string(), false),
    };
    if sign_negative {
        negative = !negative;
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole_cents: i64 = if whole.is_empty() { 0 } else { whole.parse::<i64>().ok()?.checked_mul(100)? };

    let mut digits = frac.chars().map(|c| c as i64 - '0' as i64);
    let tens = digits.next().unwrap_or(0);
    let ones = digits.next().unwrap_or(0);
    let round_up = digits.next().map(|d| d >= 5).unwrap_or(false);
    let frac_cents = tens * 10 + ones + if round_up { 1 } else { 0 };

    let cents = whole_cents.checked_add(frac_cents)?;
    Some(if negative { -cents } else { cents })
}

/// Parse a date trying each format in order
pub fn parse_date(raw: &str, formats: &[&str]) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    // Timestamps: keep the date part only ("2024-03-01 14:22:10", "2024-03-01T14:22:10")
    let s = s.split(['T', ' ']).next().filter(|d| d.len() >= 8 && !s.contains(',')).unwrap_or(s);

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// ============================================================================
// SHARED CSV READER
// ============================================================================

fn file_label(file_path: &Path) -> String {
    file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string()
}

/// Read the header row only
pub fn read_headers(file_path: &Path) -> Result<Vec<String>> {
    let file = File::open(file_path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    Ok(reader.headers()?.iter().map(|h| h.trim_start_matches('\u{feff}').to_string()).collect())
}

fn read_mapped(file_path: &Path, mapping: &ColumnMapping, source: &str) -> Result<LoadOutcome> {
    let file = File::open(file_path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let columns = mapping.resolve(&headers)?;
    let formats = mapping.formats();
    let filename = file_label(file_path);

    let mut outcome = LoadOutcome::default();

    for result in reader.records() {
        let row = result?;
        let line_number = row.position().map(|p| p.line() as usize).unwrap_or(0);

        if row.iter().all(|field| field.is_empty()) {
            continue;
        }

        match build_record(&row, &columns, mapping, &formats, source) {
            Ok(Some(record)) => outcome
                .records
                .push(record.with_provenance(filename.clone(), line_number)),
            Ok(None) => {}
            Err(reason) => {
                debug!(file = %filename, line = line_number, %reason, "rejected row");
                outcome.rejects.push(Reject {
                    source_file: filename.clone(),
                    line_number,
                    reason,
                    raw_line: row.iter().collect::<Vec<_>>().join(","),
                });
            }
        }
    }

    if !outcome.rejects.is_empty() {
        warn!(
            file = %filename,
            rejected = outcome.rejects.len(),
            loaded = outcome.records.len(),
            "some rows could not be parsed"
        );
    }

    Ok(outcome)
}

/// Ok(None) = summary row to skip silently ("Total ...", opening balance lines)
fn build_record(
    row: &StringRecord,
    columns: &ResolvedColumns,
    mapping: &ColumnMapping,
    formats: &[&str],
    source: &str,
) -> std::result::Result<Option<Record>, String> {
    let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("").trim();

    let date_raw = field(Some(columns.date));
    if date_raw.is_empty() && row.iter().any(|f| f.to_lowercase().starts_with("total")) {
        return Ok(None);
    }
    let date = parse_date(date_raw, formats)
        .ok_or_else(|| format!("unparseable date '{}'", date_raw))?;

    let amount_cents = if let Some(idx) = columns.amount.filter(|&i| !field(Some(i)).is_empty()) {
        let raw = field(Some(idx));
        parse_amount(raw).ok_or_else(|| format!("unparseable amount '{}'", raw))?
    } else {
        let debit_raw = field(columns.debit);
        let credit_raw = field(columns.credit);
        if debit_raw.is_empty() && credit_raw.is_empty() {
            return Err("no amount".to_string());
        }
        let debit = if debit_raw.is_empty() {
            0
        } else {
            parse_amount(debit_raw).ok_or_else(|| format!("unparseable debit '{}'", debit_raw))?.abs()
        };
        let credit = if credit_raw.is_empty() {
            0
        } else {
            parse_amount(credit_raw).ok_or_else(|| format!("unparseable credit '{}'", credit_raw))?.abs()
        };
        if mapping.debit_is_outflow {
            credit - debit
        } else {
            debit - credit
        }
    };
    let amount_cents = if mapping.negate { -amount_cents } else { amount_cents };

    let description = columns
        .description
        .iter()
        .map(|&i| field(Some(i)))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" - ");

    let mut record = Record::new(source, date, amount_cents, description);
    let reference = field(columns.reference);
    if !reference.is_empty() {
        record = record.with_reference(reference);
    }

    Ok(Some(record))
}

// ============================================================================
// PARSERS
// ============================================================================

/// Bank statement: Date, Description, Withdrawal, Deposit[, Balance]
pub struct BankStatementParser {
    mapping: ColumnMapping,
}

impl BankStatementParser {
    pub fn new() -> Self {
        BankStatementParser {
            mapping: ColumnMapping {
                amount: aliases(&["amount"]),
                debit: aliases(&["withdrawal", "withdrawals", "debit", "debits", "money out"]),
                credit: aliases(&["deposit", "deposits", "credit", "credits", "money in"]),
                debit_is_outflow: true,
                description: aliases(&["description", "details", "transaction", "memo"]),
                reference: aliases(&["cheque", "cheque number", "check number", "reference"]),
                ..ColumnMapping::default()
            },
        }
    }
}

impl Default for BankStatementParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for BankStatementParser {
    fn parse(&self, file_path: &Path) -> Result<LoadOutcome> {
        read_mapped(file_path, &self.mapping, SourceKind::Bank.code())
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Bank
    }
}

impl FileValidator for BankStatementParser {
    fn can_parse(&self, headers: &[String]) -> bool {
        let has = |name: &str| headers.iter().any(|h| h.trim().eq_ignore_ascii_case(name));
        has("date")
            && (has("withdrawal") || has("withdrawals") || has("money out"))
            && (has("deposit") || has("deposits") || has("money in"))
    }
}

/// QuickBooks export: Date, Type, Num, Name, Memo, Amount (or Debit/Credit)
///
/// Register exports book a debit as money into the account.
pub struct QuickBooksParser {
    mapping: ColumnMapping,
}

impl QuickBooksParser {
    pub fn new() -> Self {
        QuickBooksParser {
            mapping: ColumnMapping {
                amount: aliases(&["amount"]),
                debit: aliases(&["debit"]),
                credit: aliases(&["credit"]),
                debit_is_outflow: false,
                description: aliases(&["name", "memo", "memo/description", "description"]),
                reference: aliases(&["num", "no.", "ref no."]),
                ..ColumnMapping::default()
            },
        }
    }
}

impl Default for QuickBooksParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for QuickBooksParser {
    fn parse(&self, file_path: &Path) -> Result<LoadOutcome> {
        read_mapped(file_path, &self.mapping, SourceKind::QuickBooks.code())
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::QuickBooks
    }
}

impl FileValidator for QuickBooksParser {
    fn can_parse(&self, headers: &[String]) -> bool {
        let has = |name: &str| headers.iter().any(|h| h.trim().eq_ignore_ascii_case(name));
        has("date") && (has("num") || has("no.")) && has("name")
    }
}

/// Any CSV, driven by a ColumnMapping (from config or defaults)
pub struct GenericCsvParser {
    mapping: ColumnMapping,
}

impl GenericCsvParser {
    pub fn new(mapping: ColumnMapping) -> Self {
        GenericCsvParser { mapping }
    }
}

impl Default for GenericCsvParser {
    fn default() -> Self {
        Self::new(ColumnMapping::default())
    }
}

impl SourceParser for GenericCsvParser {
    fn parse(&self, file_path: &Path) -> Result<LoadOutcome> {
        read_mapped(file_path, &self.mapping, SourceKind::Generic.code())
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Generic
    }
}

impl FileValidator for GenericCsvParser {
    fn can_parse(&self, headers: &[String]) -> bool {
        self.mapping.resolve(headers).is_ok()
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect source kind from filename, then from the header row
pub fn detect_source(file_path: &Path) -> Result<SourceKind> {
    let filename = file_label(file_path).to_lowercase();

    if filename.contains("quickbooks") || filename.contains("qb_") || filename.starts_with("qb") {
        return Ok(SourceKind::QuickBooks);
    }
    if filename.contains("statement") || filename.contains("bank") || filename.contains("cibc") || filename.contains("scotia") {
        return Ok(SourceKind::Bank);
    }

    let headers = read_headers(file_path)?;
    if QuickBooksParser::new().can_parse(&headers) {
        return Ok(SourceKind::QuickBooks);
    }
    if BankStatementParser::new().can_parse(&headers) {
        return Ok(SourceKind::Bank);
    }
    if GenericCsvParser::default().can_parse(&headers) {
        return Ok(SourceKind::Generic);
    }

    Err(ReconError::UnknownSource(format!(
        "{} (headers: {})",
        filename,
        headers.join(", ")
    )))
}

/// Get appropriate parser for a source kind
pub fn get_parser(kind: SourceKind, mapping: Option<ColumnMapping>) -> Box<dyn SourceParser> {
    match kind {
        SourceKind::Bank => Box::new(BankStatementParser::new()),
        SourceKind::QuickBooks => Box::new(QuickBooksParser::new()),
        SourceKind::Generic => Box::new(GenericCsvParser::new(mapping.unwrap_or_default())),
    }
}

/// Detect (unless given), pick the parser, parse
pub fn load_file(
    file_path: &Path,
    kind: Option<SourceKind>,
    mapping: Option<ColumnMapping>,
) -> Result<LoadOutcome> {
    let kind = match kind {
        Some(k) => k,
        None => detect_source(file_path)?,
    };
    let parser = get_parser(kind, mapping);
    debug!(file = %file_path.display(), kind = %kind, version = parser.version(), "parsing");
    parser.parse(file_path)
}

// ============================================================================
// TESTS
// ============================================================================
