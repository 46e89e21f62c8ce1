// 🔗 Candidate Matcher - pair source A against source B
//
// A candidate pair must sit inside the date window AND the amount tolerance.
// Candidates are scored, then assigned one-to-one, best score first.
//
// Invariants of a MatchOutcome:
//   - every A record is either in exactly one pair or in unmatched_a
//   - every B record is either in exactly one pair or in unmatched_b
//   - every pair is within window and tolerance
//   - identical inputs produce identical outcomes

use crate::error::{ReconError, Result};
use crate::record::Record;
use crate::scoring::{ScoreBreakdown, ScoreWeights, Scorer};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Max days between the two dates (default: 5)
    pub date_window_days: i64,

    /// Max cents between the two amounts (default: 2)
    pub amount_tolerance_cents: i64,

    /// Candidates scoring below this are discarded (default: 0.50)
    pub min_score: f64,

    pub weights: ScoreWeights,

    /// Compare magnitudes only, for sources that book the same money with
    /// opposite signs (ledger payments vs bank deposits)
    pub allow_sign_flip: bool,
}

/// Upper bound on the date window: one hundred years
pub const MAX_DATE_WINDOW_DAYS: i64 = 36_500;

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            date_window_days: 5,
            amount_tolerance_cents: 2,
            min_score: 0.50,
            weights: ScoreWeights::default(),
            allow_sign_flip: false,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_DATE_WINDOW_DAYS).contains(&self.date_window_days) {
            return Err(ReconError::Config(format!(
                "date_window_days must be within [0, {}] (got {})",
                MAX_DATE_WINDOW_DAYS, self.date_window_days
            )));
        }
        if self.amount_tolerance_cents < 0 {
            return Err(ReconError::Config(format!(
                "amount_tolerance_cents must be >= 0 (got {})",
                self.amount_tolerance_cents
            )));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ReconError::Config(format!(
                "min_score must be within [0, 1] (got {})",
                self.min_score
            )));
        }
        if !self.weights.is_valid() {
            return Err(ReconError::Config(
                "weights must be non-negative and not all zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Amount difference under this config's sign convention
    pub fn amount_diff(&self, a_cents: i64, b_cents: i64) -> i64 {
        let direct = (a_cents - b_cents).abs();
        if self.allow_sign_flip {
            direct.min((a_cents + b_cents).abs())
        } else {
            direct
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPair {
    pub a_index: usize,
    pub b_index: usize,
    pub a: Record,
    pub b: Record,
    pub score: ScoreBreakdown,
    pub date_diff_days: i64,
    pub amount_diff_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unmatched {
    pub index: usize,
    pub record: Record,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Ordered by a_index
    pub pairs: Vec<MatchPair>,
    pub unmatched_a: Vec<Unmatched>,
    pub unmatched_b: Vec<Unmatched>,
}

impl MatchOutcome {
    pub fn total_a(&self) -> usize {
        self.pairs.len() + self.unmatched_a.len()
    }

    pub fn total_b(&self) -> usize {
        self.pairs.len() + self.unmatched_b.len()
    }

    /// Fraction of source A that found a partner
    pub fn match_rate(&self) -> f64 {
        let total = self.total_a();
        if total == 0 {
            return 0.0;
        }
        self.pairs.len() as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    a_index: usize,
    b_index: usize,
    score: ScoreBreakdown,
    date_diff_days: i64,
    amount_diff_cents: i64,
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct Matcher {
    config: MatchConfig,
    scorer: Scorer,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Result<Self> {
        config.validate()?;
        let scorer = Scorer::new(
            config.weights,
            config.date_window_days,
            config.amount_tolerance_cents,
        );
        Ok(Matcher { config, scorer })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match every A record against at most one B record
    pub fn match_records(&self, source_a: &[Record], source_b: &[Record]) -> MatchOutcome {
        let mut candidates = self.collect_candidates(source_a, source_b);
        debug!(
            a = source_a.len(),
            b = source_b.len(),
            candidates = candidates.len(),
            "scored candidate pairs"
        );

        candidates.sort_by(compare_candidates);

        let mut a_used = vec![false; source_a.len()];
        let mut b_used = vec![false; source_b.len()];
        let mut pairs = Vec::new();

        for c in candidates {
            if a_used[c.a_index] || b_used[c.b_index] {
                continue;
            }
            a_used[c.a_index] = true;
            b_used[c.b_index] = true;

            pairs.push(MatchPair {
                a_index: c.a_index,
                b_index: c.b_index,
                a: source_a[c.a_index].clone(),
                b: source_b[c.b_index].clone(),
                score: c.score,
                date_diff_days: c.date_diff_days,
                amount_diff_cents: c.amount_diff_cents,
            });
        }

        pairs.sort_by_key(|p| p.a_index);

        MatchOutcome {
            pairs,
            unmatched_a: collect_unmatched(source_a, &a_used),
            unmatched_b: collect_unmatched(source_b, &b_used),
        }
    }

    /// Every (a, b) inside the window and tolerance, scoring >= min_score.
    ///
    /// B is sorted by date once so each A only walks its own window.
    fn collect_candidates(&self, source_a: &[Record], source_b: &[Record]) -> Vec<Candidate> {
        let mut b_by_date: Vec<usize> = (0..source_b.len()).collect();
        b_by_date.sort_by_key(|&j| (source_b[j].date, j));

        let window = chrono::Duration::days(self.config.date_window_days);
        let mut candidates = Vec::new();

        for (i, a) in source_a.iter().enumerate() {
            let earliest = a.date.checked_sub_signed(window).unwrap_or(NaiveDate::MIN);
            let latest = a.date.checked_add_signed(window).unwrap_or(NaiveDate::MAX);

            let start = b_by_date.partition_point(|&j| source_b[j].date < earliest);

            for &j in &b_by_date[start..] {
                let b = &source_b[j];
                if b.date > latest {
                    break;
                }

                let amount_diff = self.config.amount_diff(a.amount_cents, b.amount_cents);
                if amount_diff > self.config.amount_tolerance_cents {
                    continue;
                }

                let date_diff = (a.date - b.date).num_days().abs();
                let score = self.scorer.score(a, b, date_diff, amount_diff);
                if score.total < self.config.min_score {
                    continue;
                }

                candidates.push(Candidate {
                    a_index: i,
                    b_index: j,
                    score,
                    date_diff_days: date_diff,
                    amount_diff_cents: amount_diff,
                });
            }
        }

        candidates
    }
}

/// Best score first; ties broken by closer date, closer amount, then input order
fn compare_candidates(x: &Candidate, y: &Candidate) -> Ordering {
    y.score
        .total
        .total_cmp(&x.score.total)
        .then(x.date_diff_days.cmp(&y.date_diff_days))
        .then(x.amount_diff_cents.cmp(&y.amount_diff_cents))
        .then(x.a_index.cmp(&y.a_index))
        .then(x.b_index.cmp(&y.b_index))
}

fn collect_unmatched(records: &[Record], used: &[bool]) -> Vec<Unmatched> {
    records
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(index, record)| Unmatched {
            index,
            record: record.clone(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn rec(source: &str, day: u32, cents: i64, desc: &str) -> Record {
        Record::new(
            source,
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            cents,
            desc,
        )
    }

    fn matcher() -> Matcher {
        Matcher::new(MatchConfig::default()).unwrap()
    }

    fn assert_invariants(outcome: &MatchOutcome, config: &MatchConfig, a_len: usize, b_len: usize) {
        let mut seen_a = HashSet::new();
        let mut seen_b = HashSet::new();

        for p in &outcome.pairs {
            assert!(seen_a.insert(p.a_index), "A {} matched twice", p.a_index);
            assert!(seen_b.insert(p.b_index), "B {} matched twice", p.b_index);
            assert!(p.amount_diff_cents <= config.amount_tolerance_cents);
            assert!(p.date_diff_days <= config.date_window_days);
            assert_eq!(
                config.amount_diff(p.a.amount_cents, p.b.amount_cents),
                p.amount_diff_cents
            );
        }
        for u in &outcome.unmatched_a {
            assert!(seen_a.insert(u.index), "A {} reported twice", u.index);
        }
        for u in &outcome.unmatched_b {
            assert!(seen_b.insert(u.index), "B {} reported twice", u.index);
        }

        assert_eq!(seen_a.len(), a_len);
        assert_eq!(seen_b.len(), b_len);
    }

    #[test]
    fn test_exact_match() {
        let a = vec![rec("bank", 3, -12550, "FAS GAS #221")];
        let b = vec![rec("quickbooks", 3, -12550, "Fas Gas")];

        let outcome = matcher().match_records(&a, &b);

        assert_eq!(outcome.pairs.len(), 1);
        assert!(outcome.unmatched_a.is_empty());
        assert!(outcome.unmatched_b.is_empty());
        assert_eq!(outcome.match_rate(), 1.0);
    }

    #[test]
    fn test_outside_window_is_unmatched() {
        let a = vec![rec("bank", 1, -12550, "Fas Gas")];
        let b = vec![rec("quickbooks", 7, -12550, "Fas Gas")];

        let outcome = matcher().match_records(&a, &b);

        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_a.len(), 1);
        assert_eq!(outcome.unmatched_b.len(), 1);
    }

    #[test]
    fn test_window_edge_is_inclusive() {
        let a = vec![rec("bank", 1, -12550, "Fas Gas")];
        let b = vec![rec("quickbooks", 6, -12550, "Fas Gas")];

        let outcome = matcher().match_records(&a, &b);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].date_diff_days, 5);
    }

    #[test]
    fn test_amount_tolerance() {
        let a = vec![rec("bank", 3, -10000, "Telus"), rec("bank", 3, -20000, "Rogers")];
        let b = vec![rec("ledger", 3, -10002, "Telus"), rec("ledger", 3, -20003, "Rogers")];

        let outcome = matcher().match_records(&a, &b);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].a.description, "Telus");
        assert_eq!(outcome.pairs[0].amount_diff_cents, 2);
        assert_eq!(outcome.unmatched_a.len(), 1);
        assert_eq!(outcome.unmatched_a[0].record.description, "Rogers");
    }

    #[test]
    fn test_one_to_one_prefers_best_candidate() {
        // Two identical charges, two bookings: each should pair with the closer date
        let a = vec![rec("bank", 10, -5000, "Esso"), rec("bank", 12, -5000, "Esso")];
        let b = vec![rec("ledger", 12, -5000, "Esso"), rec("ledger", 10, -5000, "Esso")];

        let outcome = matcher().match_records(&a, &b);

        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[0].a_index, 0);
        assert_eq!(outcome.pairs[0].b_index, 1);
        assert_eq!(outcome.pairs[1].a_index, 1);
        assert_eq!(outcome.pairs[1].b_index, 0);
        assert!(outcome.pairs.iter().all(|p| p.date_diff_days == 0));
    }

    #[test]
    fn test_text_breaks_amount_ties() {
        let a = vec![rec("bank", 5, -8000, "CANADIAN TIRE #339")];
        let b = vec![
            rec("ledger", 5, -8000, "Telus Mobility"),
            rec("ledger", 5, -8000, "Canadian Tire"),
        ];

        let outcome = matcher().match_records(&a, &b);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].b_index, 1);
        assert_eq!(outcome.unmatched_b.len(), 1);
        assert_eq!(outcome.unmatched_b[0].index, 0);
    }

    #[test]
    fn test_min_score_filters_weak_candidates() {
        let config = MatchConfig {
            min_score: 0.95,
            ..MatchConfig::default()
        };
        let m = Matcher::new(config).unwrap();

        let a = vec![rec("bank", 1, -8000, "Canadian Tire")];
        let b = vec![rec("ledger", 5, -8000, "Telus Mobility")];

        let outcome = m.match_records(&a, &b);
        assert!(outcome.pairs.is_empty());
    }

    #[test]
    fn test_sign_flip() {
        let a = vec![rec("bank", 2, 45000, "Deposit charter 012345")];
        let b = vec![rec("ledger", 2, -45000, "Payment charter 012345")];

        let strict = matcher().match_records(&a, &b);
        assert!(strict.pairs.is_empty());

        let flipping = Matcher::new(MatchConfig {
            allow_sign_flip: true,
            ..MatchConfig::default()
        })
        .unwrap();
        let outcome = flipping.match_records(&a, &b);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].amount_diff_cents, 0);
    }

    #[test]
    fn test_invariants_on_mixed_batch() {
        let config = MatchConfig::default();
        let m = Matcher::new(config.clone()).unwrap();

        let a = vec![
            rec("bank", 1, -5000, "Esso"),
            rec("bank", 1, -5000, "Esso"),
            rec("bank", 2, -12345, "Heffner Auto"),
            rec("bank", 9, 250000, "Deposit"),
            rec("bank", 20, -999, "Service charge"),
        ];
        let b = vec![
            rec("ledger", 2, -5001, "Esso"),
            rec("ledger", 3, -12345, "Heffner"),
            rec("ledger", 11, 250000, "Square payout"),
            rec("ledger", 28, -999, "Monthly fee"),
        ];

        let outcome = m.match_records(&a, &b);
        assert_invariants(&outcome, &config, a.len(), b.len());

        let again = m.match_records(&a, &b);
        let key = |o: &MatchOutcome| o.pairs.iter().map(|p| (p.a_index, p.b_index)).collect::<Vec<_>>();
        assert_eq!(key(&outcome), key(&again));
    }

    #[test]
    fn test_empty_inputs() {
        let outcome = matcher().match_records(&[], &[rec("ledger", 1, 100, "x")]);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_b.len(), 1);
        assert_eq!(outcome.match_rate(), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = MatchConfig {
            min_score: 1.5,
            ..MatchConfig::default()
        };
        assert!(matches!(Matcher::new(bad), Err(ReconError::Config(_))));

        let bad = MatchConfig {
            date_window_days: -1,
            ..MatchConfig::default()
        };
        assert!(Matcher::new(bad).is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let bad = MatchConfig {
            date_window_days: 200_000_000,
            ..MatchConfig::default()
        };
        assert!(matches!(Matcher::new(bad), Err(ReconError::Config(_))));

        let widest = MatchConfig {
            date_window_days: MAX_DATE_WINDOW_DAYS,
            ..MatchConfig::default()
        };
        let a = vec![Record::new("bank", NaiveDate::MIN, -100, "Opening fee")];
        let b = vec![Record::new("ledger", NaiveDate::MAX, -100, "Opening fee")];
        let outcome = Matcher::new(widest).unwrap().match_records(&a, &b);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_a.len(), 1);
    }
}
