// 🏷️ Vendor Rules - Rules as Data
// Standardize vendor names and assign categories from a JSON rules file
//
// [
//   { "id": "fuel-shell", "pattern": "SHELL*", "vendor": "Shell", "category": "Fuel", "priority": 10 }
// ]

use crate::error::{ReconError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern to match (supports wildcards with *)
    pub pattern: String,

    /// Canonical vendor name
    #[serde(default)]
    pub vendor: Option<String>,

    /// Category to assign
    #[serde(default)]
    pub category: Option<String>,

    /// Priority (higher = applied first)
    #[serde(default)]
    pub priority: i32,
}

impl VendorRule {
    /// Check if pattern matches the given text (case-insensitive).
    ///
    /// Without `*` the pattern matches anywhere in the text. With `*` the
    /// pattern is anchored: "SHELL*" must start the text, "*RENTAL" must end it.
    pub fn matches(&self, text: &str) -> bool {
        let pattern = self.pattern.trim().to_lowercase();
        let text = text.trim().to_lowercase();

        if pattern.is_empty() {
            return false;
        }
        if !pattern.contains('*') {
            return text.contains(&pattern);
        }

        wildcard_match(&pattern, &text)
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text.starts_with(first) {
        return false;
    }

    let mut rest = &text[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub rule_id: Option<String>,
}

// ============================================================================
// RULE ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<VendorRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let rules: Vec<VendorRule> = serde_json::from_str(&content).map_err(|e| {
            ReconError::Config(format!("invalid rules file {}: {}", path.display(), e))
        })?;

        debug!(count = rules.len(), path = %path.display(), "loaded vendor rules");
        Ok(RuleEngine::from_rules(rules))
    }

    /// Create engine from a list of rules (stable: equal priorities keep file order)
    pub fn from_rules(mut rules: Vec<VendorRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleEngine { rules }
    }

    pub fn add_rule(&mut self, rule: VendorRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First matching rule by priority
    pub fn classify(&self, text: &str) -> Classification {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| Classification {
                vendor: rule.vendor.clone(),
                category: rule.category.clone(),
                rule_id: Some(rule.id.clone()),
            })
            .unwrap_or_default()
    }

    /// Set vendor/category on every record a rule matches. Returns the hit count.
    ///
    /// Existing values are only overwritten by a rule that provides one.
    pub fn apply(&self, records: &mut [Record]) -> usize {
        let mut hits = 0;
        for record in records.iter_mut() {
            let result = self.classify(&record.description);
            if result.rule_id.is_none() {
                continue;
            }
            hits += 1;
            if result.vendor.is_some() {
                record.vendor = result.vendor;
            }
            if result.category.is_some() {
                record.category = result.category;
            }
        }
        hits
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rule(id: &str, pattern: &str, vendor: &str, priority: i32) -> VendorRule {
        VendorRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            vendor: Some(vendor.to_string()),
            category: None,
            priority,
        }
    }

    #[test]
    fn test_substring_pattern() {
        let r = rule("fasgas", "FAS GAS", "Fas Gas", 0);
        assert!(r.matches("POS FAS GAS PLUS #221"));
        assert!(r.matches("fas gas"));
        assert!(!r.matches("SHELL"));
    }

    #[test]
    fn test_wildcard_pattern() {
        let r = rule("shell", "SHELL*", "Shell", 0);
        assert!(r.matches("SHELL C04521 CALGARY"));
        assert!(r.matches("shell"));
        assert!(!r.matches("POS SHELL"));

        let r = rule("rental", "*CAR*RENTAL", "Rental", 0);
        assert!(r.matches("BUDGET CAR AND TRUCK RENTAL"));
        assert!(!r.matches("BUDGET CAR AND TRUCK RENTALS LTD"));
    }

    #[test]
    fn test_priority_and_declaration_order() {
        let engine = RuleEngine::from_rules(vec![
            rule("general", "HEFFNER*", "Heffner", 1),
            rule("first-tie", "HEFFNER AUTO*", "Heffner Auto", 50),
            rule("second-tie", "HEFFNER AUTO FC*", "Heffner Finance", 50),
        ]);

        let result = engine.classify("HEFFNER AUTO FC 8812");
        assert_eq!(result.vendor.as_deref(), Some("Heffner Auto"));
        assert_eq!(result.rule_id.as_deref(), Some("first-tie"));
    }

    #[test]
    fn test_no_match() {
        let engine = RuleEngine::new();
        let result = engine.classify("UNKNOWN VENDOR");
        assert_eq!(result, Classification::default());
    }

    #[test]
    fn test_apply_sets_vendor_and_category() {
        let mut engine = RuleEngine::new();
        engine.add_rule(VendorRule {
            id: "telus".to_string(),
            pattern: "TELUS".to_string(),
            vendor: Some("Telus".to_string()),
            category: Some("Telephone".to_string()),
            priority: 0,
        });

        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mut records = vec![
            Record::new("bank", date, -8512, "PREAUTHORIZED DEBIT TELUS MOBILITY"),
            Record::new("bank", date, -1500, "Coffee"),
        ];

        let hits = engine.apply(&mut records);

        assert_eq!(hits, 1);
        assert_eq!(records[0].vendor.as_deref(), Some("Telus"));
        assert_eq!(records[0].category.as_deref(), Some("Telephone"));
        assert_eq!(records[1].vendor, None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"id": "esso", "pattern": "ESSO*", "vendor": "Esso", "category": "Fuel", "priority": 5}]"#,
        )
        .unwrap();

        let engine = RuleEngine::from_file(&path).unwrap();
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(engine.classify("ESSO 1234").category.as_deref(), Some("Fuel"));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(RuleEngine::from_file(&path), Err(ReconError::Config(_))));
    }
}
