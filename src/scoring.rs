// 🎯 Scorer - rank match candidates
//
// score = w_date * date_score + w_amount * amount_score + w_text * text_score
//
// Every component lives in [0.0, 1.0]; weights are normalized to sum 1,
// so the combined score does too.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Banking noise that says nothing about who the counterparty is
const NOISE_WORDS: &[&str] = &[
    "pos", "purchase", "debit", "credit", "visa", "mastercard", "mc", "interac", "e-transfer",
    "etransfer", "transfer", "payment", "pmt", "ach", "des", "id", "ref", "txn", "memo",
    "online", "bill", "preauthorized", "pre-auth", "withdrawal", "deposit", "branch", "atm",
    "fee", "the", "inc", "ltd", "corp",
];

// ============================================================================
// WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub date: f64,
    pub amount: f64,
    pub text: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            date: 0.3,
            amount: 0.4,
            text: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.date + self.amount + self.text
    }

    pub fn is_valid(&self) -> bool {
        self.date >= 0.0 && self.amount >= 0.0 && self.text >= 0.0 && self.total() > 0.0
    }

    /// Rescale so the weights sum to 1.0
    pub fn normalized(&self) -> ScoreWeights {
        let total = self.total();
        if total <= 0.0 {
            return ScoreWeights::default();
        }
        ScoreWeights {
            date: self.date / total,
            amount: self.amount / total,
            text: self.text / total,
        }
    }
}

// ============================================================================
// SCORE BREAKDOWN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub date_score: f64,
    pub amount_score: f64,
    pub text_score: f64,
    pub total: f64,
}

pub struct Scorer {
    weights: ScoreWeights,
    date_window_days: i64,
    amount_tolerance_cents: i64,
}

impl Scorer {
    pub fn new(weights: ScoreWeights, date_window_days: i64, amount_tolerance_cents: i64) -> Self {
        Scorer {
            weights: weights.normalized(),
            date_window_days: date_window_days.max(0),
            amount_tolerance_cents: amount_tolerance_cents.max(0),
        }
    }

    /// Score a candidate pair whose date/amount differences are already known
    /// to be inside the window and tolerance.
    pub fn score(&self, a: &Record, b: &Record, date_diff_days: i64, amount_diff_cents: i64) -> ScoreBreakdown {
        let date_score = 1.0 - (date_diff_days as f64 / (self.date_window_days as f64 + 1.0));
        let amount_score =
            1.0 - (amount_diff_cents as f64 / (self.amount_tolerance_cents as f64 + 1.0));
        let text_score = text_similarity(a, b);

        let total = self.weights.date * date_score.clamp(0.0, 1.0)
            + self.weights.amount * amount_score.clamp(0.0, 1.0)
            + self.weights.text * text_score;

        ScoreBreakdown {
            date_score,
            amount_score,
            text_score,
            total: total.clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// TEXT SIMILARITY
// ============================================================================

/// Text similarity between two records in [0.0, 1.0].
///
/// Matching references (cheque number, reserve number) settle it outright.
/// Otherwise the better of Jaro-Winkler over the normalized text and word
/// overlap, each computed on vendor when both sides have one.
pub fn text_similarity(a: &Record, b: &Record) -> f64 {
    if let (Some(ra), Some(rb)) = (&a.reference, &b.reference) {
        if ra.eq_ignore_ascii_case(rb) {
            return 1.0;
        }
    }

    let (left, right) = match (&a.vendor, &b.vendor) {
        (Some(va), Some(vb)) => (va.as_str(), vb.as_str()),
        _ => (a.description.as_str(), b.description.as_str()),
    };

    description_similarity(left, right)
}

pub fn description_similarity(left: &str, right: &str) -> f64 {
    let a = normalize_text(left);
    let b = normalize_text(right);

    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    // One contains the other: "shell" vs "shell canada 4521"
    let contains = !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a));
    let contains_score = if contains { 0.9 } else { 0.0 };

    let jw = strsim::jaro_winkler(&a, &b);
    let overlap = token_overlap(&a, &b);

    jw.max(overlap).max(contains_score).clamp(0.0, 1.0)
}

/// Lowercase, strip punctuation, collapse whitespace, drop noise words
/// and bare numbers (store numbers, card suffixes).
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .filter(|w| !NOISE_WORDS.contains(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard overlap of significant words (>= 3 chars)
fn token_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split(' ').filter(|w| w.len() >= 3).collect();
    let words_b: HashSet<&str> = b.split(' ').filter(|w| w.len() >= 3).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let common = words_a.intersection(&words_b).count() as f64;
    let union = words_a.union(&words_b).count() as f64;
    common / union
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(desc: &str) -> Record {
        Record::new("bank", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), -10000, desc)
    }

    #[test]
    fn test_normalize_drops_noise_and_numbers() {
        assert_eq!(normalize_text("POS PURCHASE - SHELL #4521 CALGARY"), "shell calgary");
        assert_eq!(normalize_text("  Interac e-Transfer  John  "), "john");
    }

    #[test]
    fn test_identical_descriptions_score_one() {
        assert_eq!(description_similarity("Fas Gas Plus", "FAS GAS PLUS"), 1.0);
    }

    #[test]
    fn test_contained_description_scores_high() {
        let s = description_similarity("SHELL", "Shell Canada Products 4521");
        assert!(s >= 0.9, "score was {}", s);
    }

    #[test]
    fn test_unrelated_descriptions_score_low() {
        let s = description_similarity("Canadian Tire", "Telus Mobility");
        assert!(s < 0.7, "score was {}", s);
    }

    #[test]
    fn test_reference_match_wins() {
        let a = rec("Cheque").with_reference("019233");
        let b = rec("Heffner Auto Finance").with_reference("019233");
        assert_eq!(text_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_vendor_preferred_over_description() {
        let mut a = rec("PRE-AUTH HEFFNER AUTO FC 8812");
        let mut b = rec("Heffner Lexus Toyota lease");
        a.vendor = Some("Heffner".to_string());
        b.vendor = Some("Heffner".to_string());
        assert_eq!(text_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_weights_normalize() {
        let w = ScoreWeights { date: 1.0, amount: 2.0, text: 1.0 }.normalized();
        assert!((w.total() - 1.0).abs() < 1e-9);
        assert!((w.amount - 0.5).abs() < 1e-9);

        assert!(!ScoreWeights { date: 0.0, amount: 0.0, text: 0.0 }.is_valid());
        assert!(!ScoreWeights { date: -1.0, amount: 1.0, text: 1.0 }.is_valid());
    }

    #[test]
    fn test_exact_pair_scores_one() {
        let scorer = Scorer::new(ScoreWeights::default(), 5, 2);
        let a = rec("Fas Gas");
        let b = rec("FAS GAS");
        let s = scorer.score(&a, &b, 0, 0);
        assert!((s.total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_date_distance_lowers_score() {
        let scorer = Scorer::new(ScoreWeights::default(), 5, 2);
        let a = rec("Fas Gas");
        let b = rec("Fas Gas");
        let near = scorer.score(&a, &b, 1, 0);
        let far = scorer.score(&a, &b, 5, 0);
        assert!(near.total > far.total);
        assert!(far.total > 0.0);
    }
}
