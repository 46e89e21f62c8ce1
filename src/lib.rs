// Charter Recon - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod deduplication;
pub mod error;
pub mod gst;
pub mod matcher;
pub mod parser;
pub mod reconciliation;
pub mod record;
pub mod report;
pub mod rules;
pub mod scoring;

// Re-export commonly used types
pub use config::ReconConfig;
pub use db::{
    delete_records, get_records, get_run, get_source_stats, insert_event, insert_records,
    list_runs, open_database, save_run, setup_database, verify_count, Event, ImportStats,
    RecordFilter, RunDetail, SourceStat, StoredRecord,
};
pub use deduplication::{
    plan_cleanup, CleanupPlan, DedupConfig, DeduplicationEngine, DuplicateMatch, MatchStrategy,
};
pub use error::{ReconError, Result};
pub use gst::{GstBreakdown, GstRate};
pub use matcher::{MatchConfig, MatchOutcome, MatchPair, Matcher, Unmatched};
pub use parser::{
    detect_source, get_parser, load_file, ColumnMapping, LoadOutcome, Reject, SourceKind,
    SourceParser,
};
pub use reconciliation::{
    Discrepancy, DiscrepancyCategory, ReconciliationEngine, ReconciliationReport,
    ReconciliationResult, StatementMetadata,
};
pub use record::{format_cents, Record};
pub use report::{Reporter, RunSummary};
pub use rules::{Classification, RuleEngine, VendorRule};
pub use scoring::{ScoreBreakdown, ScoreWeights, Scorer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
