// 🔍 Deduplication Engine - Detect duplicate records within one source
// Three strategies: Exact Match, Fuzzy Match, Reversal Pair
//
// Exact and fuzzy duplicates can be cleaned up. Reversal pairs (a charge and
// its NSF / refund reversal) are reported for review and never deleted.

use crate::record::Record;
use crate::scoring::description_similarity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Exact match: same content hash
    ExactMatch,

    /// Fuzzy match: similar date (±1 day), similar amount (±$0.50), similar text
    FuzzyMatch,

    /// Reversal pair: close dates, opposite amounts (NSF, chargeback, refund)
    ReversalPair,
}

impl MatchStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            MatchStrategy::ExactMatch => "exact",
            MatchStrategy::FuzzyMatch => "fuzzy",
            MatchStrategy::ReversalPair => "reversal",
        }
    }

    /// Whether a match of this kind may lead to a deletion
    pub fn is_removable(&self) -> bool {
        !matches!(self, MatchStrategy::ReversalPair)
    }
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Index of first record (always < index2)
    pub index1: usize,

    /// Index of second record
    pub index2: usize,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// Which strategy detected this match
    pub strategy: MatchStrategy,

    /// Human-readable reason
    pub reason: String,
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Confidence reported for exact matches (default: 0.99)
    pub exact_match_confidence: f64,

    /// Minimum confidence for fuzzy matches (default: 0.70)
    pub fuzzy_match_threshold: f64,

    /// Confidence reported for reversal pairs (default: 0.90)
    pub reversal_confidence: f64,

    /// Amount tolerance for fuzzy matching in cents (default: 50)
    pub fuzzy_amount_tolerance_cents: i64,

    /// Date tolerance for fuzzy matching in days (default: 1)
    pub fuzzy_date_tolerance_days: i64,

    /// Max days between a charge and its reversal (default: 10)
    pub reversal_window_days: i64,

    /// Minimum text similarity for fuzzy matches (default: 0.80)
    pub min_text_similarity: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            exact_match_confidence: 0.99,
            fuzzy_match_threshold: 0.70,
            reversal_confidence: 0.90,
            fuzzy_amount_tolerance_cents: 50,
            fuzzy_date_tolerance_days: 1,
            reversal_window_days: 10,
            min_text_similarity: 0.80,
        }
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine {
    config: DedupConfig,
}

impl DeduplicationEngine {
    /// Create engine with default thresholds
    pub fn new() -> Self {
        DeduplicationEngine {
            config: DedupConfig::default(),
        }
    }

    pub fn with_config(config: DedupConfig) -> Self {
        DeduplicationEngine { config }
    }

    /// Find all duplicate matches in a list of records
    pub fn find_duplicates(&self, records: &[Record]) -> Vec<DuplicateMatch> {
        let hashes: Vec<String> = records.iter().map(|r| r.content_hash()).collect();
        let mut matches = Vec::new();

        // Compare each record with every other record
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                let r1 = &records[i];
                let r2 = &records[j];

                // Different sources are the matcher's job, not ours
                if r1.source != r2.source {
                    continue;
                }

                // Try exact match first (highest confidence)
                if hashes[i] == hashes[j] {
                    matches.push(self.exact_match(i, j, r1));
                    continue;
                }

                // Try reversal pair detection
                if let Some(m) = self.check_reversal_pair(i, j, r1, r2) {
                    matches.push(m);
                    continue;
                }

                // Try fuzzy match (lowest confidence)
                if let Some(m) = self.check_fuzzy_match(i, j, r1, r2) {
                    matches.push(m);
                }
            }
        }

        matches
    }

    /// Strategy 1: Exact Match
    fn exact_match(&self, i: usize, j: usize, r: &Record) -> DuplicateMatch {
        DuplicateMatch {
            index1: i,
            index2: j,
            confidence: self.config.exact_match_confidence,
            strategy: MatchStrategy::ExactMatch,
            reason: format!(
                "Exact match: {} | {} | {}",
                r.date,
                crate::record::format_cents(r.amount_cents),
                r.description
            ),
        }
    }

    /// Strategy 2: Reversal Pair
    /// Close dates, opposite amounts, same counterparty
    fn check_reversal_pair(
        &self,
        i: usize,
        j: usize,
        r1: &Record,
        r2: &Record,
    ) -> Option<DuplicateMatch> {
        if r1.amount_cents == 0 || r1.amount_cents + r2.amount_cents != 0 {
            return None;
        }

        let date_diff = (r1.date - r2.date).num_days().abs();
        if date_diff > self.config.reversal_window_days {
            return None;
        }

        let text = description_similarity(r1.display_name(), r2.display_name());
        let mentions_reversal = [r1, r2].iter().any(|r| looks_like_reversal(&r.description));
        if text < self.config.min_text_similarity && !mentions_reversal {
            return None;
        }

        Some(DuplicateMatch {
            index1: i,
            index2: j,
            confidence: self.config.reversal_confidence,
            strategy: MatchStrategy::ReversalPair,
            reason: format!(
                "Reversal pair: {} {} ↔ {} {}",
                r1.date,
                crate::record::format_cents(r1.amount_cents),
                r2.date,
                crate::record::format_cents(r2.amount_cents)
            ),
        })
    }

    /// Strategy 3: Fuzzy Match
    /// Similar date (±1 day), similar amount (±$0.50), similar text → 70%+ confidence
    fn check_fuzzy_match(
        &self,
        i: usize,
        j: usize,
        r1: &Record,
        r2: &Record,
    ) -> Option<DuplicateMatch> {
        // Same sign only: a charge is never a duplicate of a deposit
        if r1.amount_cents.signum() != r2.amount_cents.signum() {
            return None;
        }

        let date_diff = (r1.date - r2.date).num_days().abs();
        if date_diff > self.config.fuzzy_date_tolerance_days {
            return None;
        }

        let amount_diff = (r1.amount_cents - r2.amount_cents).abs();
        if amount_diff > self.config.fuzzy_amount_tolerance_cents {
            return None;
        }

        let text_score = description_similarity(r1.display_name(), r2.display_name());
        if text_score < self.config.min_text_similarity {
            return None;
        }

        // Calculate confidence based on how close the match is
        let date_score =
            1.0 - (date_diff as f64 / (self.config.fuzzy_date_tolerance_days as f64 + 1.0));
        let amount_score =
            1.0 - (amount_diff as f64 / (self.config.fuzzy_amount_tolerance_cents as f64 + 1.0));

        // Weighted average: date 30%, amount 40%, text 30%
        let confidence = date_score * 0.3 + amount_score * 0.4 + text_score * 0.3;
        if confidence < self.config.fuzzy_match_threshold {
            return None;
        }

        Some(DuplicateMatch {
            index1: i,
            index2: j,
            confidence,
            strategy: MatchStrategy::FuzzyMatch,
            reason: format!(
                "Fuzzy match: {} ≈ {} | {} ≈ {} | {} ≈ {}",
                r1.date,
                r2.date,
                crate::record::format_cents(r1.amount_cents),
                crate::record::format_cents(r2.amount_cents),
                r1.description,
                r2.description
            ),
        })
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_reversal(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["nsf", "reversal", "reversed", "returned", "chargeback", "refund", "correction"]
        .iter()
        .any(|kw| lower.contains(kw))
}

// ============================================================================
// CLEANUP PLAN
// ============================================================================

/// Which records to keep and which to delete after deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupPlan {
    /// One group per duplicate cluster: (survivor, removed)
    pub groups: Vec<DuplicateGroup>,

    /// Indices linked by a reversal pair; never in `groups[].removed`
    pub protected: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub keep: usize,
    pub remove: Vec<usize>,
}

impl CleanupPlan {
    pub fn removal_indices(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self.groups.iter().flat_map(|g| g.remove.iter().copied()).collect();
        all.sort_unstable();
        all
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Cluster exact/fuzzy duplicates and keep one survivor per cluster.
///
/// The survivor is the record with the lowest (source_file, line_number),
/// falling back to input order. Records that take part in a reversal pair
/// are never removed; a cluster with only protected members keeps them all.
pub fn plan_cleanup(records: &[Record], matches: &[DuplicateMatch]) -> CleanupPlan {
    let protected: HashSet<usize> = matches
        .iter()
        .filter(|m| !m.strategy.is_removable())
        .flat_map(|m| [m.index1, m.index2])
        .collect();

    let mut parent: Vec<usize> = (0..records.len()).collect();
    for m in matches.iter().filter(|m| m.strategy.is_removable()) {
        union(&mut parent, m.index1, m.index2);
    }

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..records.len() {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut groups = Vec::new();
    for (_, mut members) in clusters {
        if members.len() < 2 {
            continue;
        }

        members.sort_by(|&x, &y| {
            let rx = &records[x];
            let ry = &records[y];
            (rx.source_file.as_str(), rx.line_number, x).cmp(&(ry.source_file.as_str(), ry.line_number, y))
        });

        let keep = members[0];
        let remove: Vec<usize> = members[1..]
            .iter()
            .copied()
            .filter(|i| !protected.contains(i))
            .collect();

        if !remove.is_empty() {
            groups.push(DuplicateGroup { keep, remove });
        }
    }

    let mut protected: Vec<usize> = protected.into_iter().collect();
    protected.sort_unstable();

    CleanupPlan { groups, protected }
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    // Path compression
    let mut cur = i;
    while parent[cur] != root {
        let next = parent[cur];
        parent[cur] = root;
        cur = next;
    }
    root
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_record(date: &str, cents: i64, description: &str, line: usize) -> Record {
        Record::new(
            "bank",
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            cents,
            description,
        )
        .with_provenance("test.csv", line)
    }

    #[test]
    fn test_exact_match() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-25", -4599, "SHELL  CANADA", 3),
        ];
        let matches = engine.find_duplicates(&records);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::ExactMatch);
        assert!(matches[0].confidence >= 0.95);
    }

    #[test]
    fn test_different_sources_ignored() {
        let engine = DeduplicationEngine::new();

        let mut other = create_test_record("2024-12-25", -4599, "Shell Canada", 2);
        other.source = "quickbooks".to_string();
        let records = vec![create_test_record("2024-12-25", -4599, "Shell Canada", 2), other];

        assert!(engine.find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_fuzzy_match_date_tolerance() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-26", -4599, "Shell Canada", 3),
        ];
        let matches = engine.find_duplicates(&records);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::FuzzyMatch);
        assert!(matches[0].confidence >= 0.70);
    }

    #[test]
    fn test_fuzzy_match_amount_tolerance() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-25", -4625, "Shell Canada #44", 3),
        ];
        let matches = engine.find_duplicates(&records);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::FuzzyMatch);
    }

    #[test]
    fn test_reversal_pair_detection() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-20", -100000, "Heffner Auto Finance", 2),
            create_test_record("2024-12-23", 100000, "NSF RETURNED ITEM", 3),
        ];
        let matches = engine.find_duplicates(&records);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::ReversalPair);
        assert!(!matches[0].strategy.is_removable());
    }

    #[test]
    fn test_no_match_different_amounts() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-25", -5000, "Shell Canada", 3),
        ];
        assert!(engine.find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_no_match_different_dates() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-27", -4599, "Shell Canada", 3),
        ];
        assert!(engine.find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_no_match_different_vendors() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 2),
            create_test_record("2024-12-25", -4599, "Telus Mobility", 3),
        ];
        assert!(engine.find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_cleanup_keeps_earliest_line() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-25", -4599, "Shell Canada", 9),
            create_test_record("2024-12-25", -4599, "Shell Canada", 4),
            create_test_record("2024-12-25", -4599, "Shell Canada", 7),
            create_test_record("2024-12-25", -1200, "Tim Hortons", 5),
        ];
        let matches = engine.find_duplicates(&records);
        let plan = plan_cleanup(&records, &matches);

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].keep, 1);
        assert_eq!(plan.removal_indices(), vec![0, 2]);
    }

    #[test]
    fn test_cleanup_never_removes_reversal_members() {
        let engine = DeduplicationEngine::new();

        let records = vec![
            create_test_record("2024-12-20", -100000, "Heffner Auto Finance", 2),
            create_test_record("2024-12-20", -100000, "Heffner Auto Finance", 3),
            create_test_record("2024-12-22", 100000, "Heffner Auto Finance reversal", 4),
        ];
        let matches = engine.find_duplicates(&records);
        let plan = plan_cleanup(&records, &matches);

        for idx in &plan.protected {
            assert!(!plan.removal_indices().contains(idx));
        }
        assert!(plan.protected.contains(&2));
    }

    #[test]
    fn test_cleanup_empty_when_no_duplicates() {
        let records = vec![create_test_record("2024-12-25", -4599, "Shell Canada", 2)];
        let plan = plan_cleanup(&records, &[]);
        assert!(plan.is_empty());
        assert!(plan.removal_indices().is_empty());
    }
}
