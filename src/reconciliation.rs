// ⚖️ Reconciliation Engine - Validate balances match
//
//   opening_balance + total_credits - total_debits = closing_balance
//
// Only records dated inside the statement period count toward the balance.
// Records outside it are reported as date mismatches.

use crate::matcher::MatchOutcome;
use crate::record::{format_cents, Record};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// All balances match
    Balanced {
        opening_balance_cents: i64,
        total_credits_cents: i64,
        total_debits_cents: i64,
        closing_balance_cents: i64,
    },

    /// Off by less than the major threshold
    MinorDiscrepancy {
        expected_balance_cents: i64,
        actual_balance_cents: i64,
        difference_cents: i64,
        tolerance_cents: i64,
    },

    /// Off by the major threshold or more
    MajorDiscrepancy {
        expected_balance_cents: i64,
        actual_balance_cents: i64,
        difference_cents: i64,
        missing_transactions: Vec<String>,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        !self.is_balanced()
    }

    pub fn difference_cents(&self) -> i64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0,
            ReconciliationResult::MinorDiscrepancy { difference_cents, .. } => *difference_cents,
            ReconciliationResult::MajorDiscrepancy { difference_cents, .. } => *difference_cents,
        }
    }
}

// ============================================================================
// STATEMENT METADATA (from bank statements)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub account_name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: i64,
}

impl StatementMetadata {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }

    pub fn period_label(&self) -> String {
        format!("{} to {}", self.period_start, self.period_end)
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub statement: StatementMetadata,
    pub result: ReconciliationResult,
    pub transaction_count: usize,
    pub total_credits_cents: i64,
    pub total_debits_cents: i64,
    pub calculated_balance_cents: i64,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.result.is_balanced()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {} ({}): {} transactions, calculated {}, expected {}, difference {}",
            self.statement.account_name,
            self.statement.period_label(),
            self.transaction_count,
            format_cents(self.calculated_balance_cents),
            format_cents(self.statement.closing_balance_cents),
            format_cents(self.result.difference_cents())
        )
    }

    /// Add a MissingTransaction discrepancy for every statement-side record
    /// the matcher left unpaired. Source A of the outcome is the statement.
    pub fn with_match_outcome(mut self, outcome: &MatchOutcome) -> Self {
        let mut missing = Vec::new();

        for u in &outcome.unmatched_a {
            let r = &u.record;
            if !self.statement.contains(r.date) {
                continue;
            }
            let description = format!(
                "{} {} {} (line {}) not found in ledger",
                r.date,
                format_cents(r.amount_cents),
                r.description,
                r.line_number
            );
            missing.push(description.clone());
            self.discrepancies.push(Discrepancy {
                description,
                amount_cents: r.amount_cents,
                category: DiscrepancyCategory::MissingTransaction,
            });
        }

        if let ReconciliationResult::MajorDiscrepancy {
            missing_transactions,
            ..
        } = &mut self.result
        {
            missing_transactions.extend(missing);
        }

        self
    }

    pub fn discrepancies_of(&self, category: DiscrepancyCategory) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies.iter().filter(move |d| d.category == category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub description: String,
    pub amount_cents: i64,
    pub category: DiscrepancyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    MissingTransaction,
    DuplicateTransaction,
    AmountMismatch,
    DateMismatch,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    /// Differences below this count as balanced (default: 1 cent)
    pub tolerance_cents: i64,

    /// Threshold for minor vs major discrepancy (default: $10.00)
    pub major_discrepancy_threshold_cents: i64,
}

/// Differences below one cent balance
pub const DEFAULT_TOLERANCE_CENTS: i64 = 1;

/// $10 and over is a major discrepancy
pub const DEFAULT_MAJOR_THRESHOLD_CENTS: i64 = 1000;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_TOLERANCE_CENTS, DEFAULT_MAJOR_THRESHOLD_CENTS)
    }

    pub fn with_thresholds(tolerance_cents: i64, major_threshold_cents: i64) -> Self {
        ReconciliationEngine {
            tolerance_cents,
            major_discrepancy_threshold_cents: major_threshold_cents,
        }
    }

    /// Reconcile statement records against the statement's balances
    pub fn reconcile(&self, records: &[Record], statement: &StatementMetadata) -> ReconciliationReport {
        let in_period: Vec<&Record> = records.iter().filter(|r| statement.contains(r.date)).collect();

        let total_credits_cents = self.calculate_credits(&in_period);
        let total_debits_cents = self.calculate_debits(&in_period);

        let calculated_balance_cents =
            statement.opening_balance_cents + total_credits_cents - total_debits_cents;
        let difference_cents = (calculated_balance_cents - statement.closing_balance_cents).abs();

        let result = if difference_cents < self.tolerance_cents {
            ReconciliationResult::Balanced {
                opening_balance_cents: statement.opening_balance_cents,
                total_credits_cents,
                total_debits_cents,
                closing_balance_cents: statement.closing_balance_cents,
            }
        } else if difference_cents < self.major_discrepancy_threshold_cents {
            ReconciliationResult::MinorDiscrepancy {
                expected_balance_cents: statement.closing_balance_cents,
                actual_balance_cents: calculated_balance_cents,
                difference_cents,
                tolerance_cents: self.tolerance_cents,
            }
        } else {
            ReconciliationResult::MajorDiscrepancy {
                expected_balance_cents: statement.closing_balance_cents,
                actual_balance_cents: calculated_balance_cents,
                difference_cents,
                missing_transactions: vec![],
            }
        };

        let discrepancies = self.detect_discrepancies(records, statement, difference_cents);

        ReconciliationReport {
            statement: statement.clone(),
            result,
            transaction_count: in_period.len(),
            total_credits_cents,
            total_debits_cents,
            calculated_balance_cents,
            discrepancies,
            reconciled_at: chrono::Utc::now(),
        }
    }

    fn calculate_credits(&self, records: &[&Record]) -> i64 {
        records.iter().filter(|r| r.is_deposit()).map(|r| r.amount_cents).sum()
    }

    /// As a positive total
    fn calculate_debits(&self, records: &[&Record]) -> i64 {
        records.iter().filter(|r| r.is_withdrawal()).map(|r| -r.amount_cents).sum()
    }

    fn detect_discrepancies(
        &self,
        records: &[Record],
        statement: &StatementMetadata,
        difference_cents: i64,
    ) -> Vec<Discrepancy> {
        let mut discrepancies = Vec::new();

        if difference_cents >= self.tolerance_cents {
            discrepancies.push(Discrepancy {
                description: format!("Balance mismatch: {} difference", format_cents(difference_cents)),
                amount_cents: difference_cents,
                category: DiscrepancyCategory::AmountMismatch,
            });
        }

        for r in records.iter().filter(|r| !statement.contains(r.date)) {
            discrepancies.push(Discrepancy {
                description: format!(
                    "{} {} dated outside {}",
                    r.description,
                    r.date,
                    statement.period_label()
                ),
                amount_cents: r.amount_cents,
                category: DiscrepancyCategory::DateMismatch,
            });
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        for r in records {
            let count = seen.entry(r.content_hash()).or_insert(0);
            *count += 1;
            if *count == 2 {
                discrepancies.push(Discrepancy {
                    description: format!(
                        "{} {} {} appears more than once",
                        r.date,
                        format_cents(r.amount_cents),
                        r.description
                    ),
                    amount_cents: r.amount_cents,
                    category: DiscrepancyCategory::DuplicateTransaction,
                });
            }
        }

        discrepancies
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
