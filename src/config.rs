// ⚙️ Configuration - TOML file over built-in defaults
//
// db_path = "recon.db"
//
// [matching]
// date_window_days = 5
// amount_tolerance_cents = 2
// min_score = 0.5
//
// [dedup]
// fuzzy_amount_tolerance_cents = 50
//
// [gst]
// rate = 0.05
//
// [balance]
// tolerance_cents = 1
// major_threshold_cents = 1000
//
// [rules]
// path = "vendor_rules.json"

use crate::deduplication::DedupConfig;
use crate::error::{ReconError, Result};
use crate::gst::GstRate;
use crate::matcher::MatchConfig;
use crate::parser::ColumnMapping;
use crate::reconciliation::{ReconciliationEngine, DEFAULT_MAJOR_THRESHOLD_CENTS, DEFAULT_TOLERANCE_CENTS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var naming a config file when --config is not given
pub const CONFIG_ENV: &str = "RECON_CONFIG";

pub const DEFAULT_DB_PATH: &str = "recon.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub db_path: PathBuf,
    pub matching: MatchConfig,
    pub dedup: DedupConfig,
    pub gst: GstSection,
    pub balance: BalanceSection,
    pub rules: RulesSection,

    /// Column mapping for `--source generic` files
    pub generic: Option<ColumnMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GstSection {
    pub rate: GstRate,
}

/// Statement balance thresholds, in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceSection {
    pub tolerance_cents: i64,
    pub major_threshold_cents: i64,
}

impl Default for BalanceSection {
    fn default() -> Self {
        BalanceSection {
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
            major_threshold_cents: DEFAULT_MAJOR_THRESHOLD_CENTS,
        }
    }
}

impl BalanceSection {
    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::with_thresholds(self.tolerance_cents, self.major_threshold_cents)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    /// Vendor rules JSON; none = no normalization
    pub path: Option<PathBuf>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        ReconConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            matching: MatchConfig::default(),
            dedup: DedupConfig::default(),
            gst: GstSection::default(),
            balance: BalanceSection::default(),
            rules: RulesSection::default(),
            generic: None,
        }
    }
}

impl ReconConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ReconConfig = toml::from_str(content)
            .map_err(|e| ReconError::Config(format!("invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ReconError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Explicit path first, then $RECON_CONFIG, then defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.matching.validate()?;

        let d = &self.dedup;
        for (name, value) in [
            ("dedup.exact_match_confidence", d.exact_match_confidence),
            ("dedup.fuzzy_match_threshold", d.fuzzy_match_threshold),
            ("dedup.reversal_confidence", d.reversal_confidence),
            ("dedup.min_text_similarity", d.min_text_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReconError::Config(format!(
                    "{} must be within [0, 1] (got {})",
                    name, value
                )));
            }
        }
        if d.fuzzy_amount_tolerance_cents < 0 || d.fuzzy_date_tolerance_days < 0 || d.reversal_window_days < 0 {
            return Err(ReconError::Config(
                "dedup tolerances and windows must be >= 0".to_string(),
            ));
        }

        let b = &self.balance;
        if b.tolerance_cents < 1 || b.major_threshold_cents < b.tolerance_cents {
            return Err(ReconError::Config(format!(
                "balance thresholds need 1 <= tolerance_cents <= major_threshold_cents (got {} and {})",
                b.tolerance_cents, b.major_threshold_cents
            )));
        }

        if !self.gst.rate.is_valid() {
            return Err(ReconError::Config(format!(
                "gst.rate must be within [0, 1) (got {})",
                self.gst.rate.0
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconConfig::default();
        assert_eq!(config.db_path, PathBuf::from("recon.db"));
        assert_eq!(config.matching.date_window_days, 5);
        assert_eq!(config.matching.amount_tolerance_cents, 2);
        assert_eq!(config.gst.rate, GstRate::ALBERTA);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReconConfig::from_toml(
            r#"
            db_path = "ledger.db"

            [matching]
            date_window_days = 3
            allow_sign_flip = true

            [matching.weights]
            text = 0.5

            [rules]
            path = "rules.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("ledger.db"));
        assert_eq!(config.matching.date_window_days, 3);
        assert_eq!(config.matching.amount_tolerance_cents, 2);
        assert!(config.matching.allow_sign_flip);
        assert_eq!(config.matching.weights.text, 0.5);
        assert_eq!(config.matching.weights.amount, 0.4);
        assert_eq!(config.rules.path, Some(PathBuf::from("rules.json")));
        assert_eq!(config.dedup, DedupConfig::default());
        assert_eq!(config.balance, BalanceSection::default());
    }

    #[test]
    fn test_generic_mapping_section() {
        let config = ReconConfig::from_toml(
            r#"
            [generic]
            date = ["Payout Date"]
            amount = ["Net"]
            date_formats = ["%d/%m/%Y"]
            "#,
        )
        .unwrap();

        let mapping = config.generic.unwrap();
        assert_eq!(mapping.date, vec!["Payout Date".to_string()]);
        assert_eq!(mapping.date_formats, vec!["%d/%m/%Y".to_string()]);
        assert!(!mapping.description.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            "[matching]\ndate_window_days = -1",
            "[matching]\ndate_window_days = 200000000",
            "[matching]\namount_tolerance_cents = -5",
            "[matching]\nmin_score = 1.5",
            "[matching.weights]\ndate = 0.0\namount = 0.0\ntext = 0.0",
            "[dedup]\nmin_text_similarity = 2.0",
            "[gst]\nrate = 1.2",
            "[balance]\ntolerance_cents = 0",
            "[balance]\ntolerance_cents = 500\nmajor_threshold_cents = 100",
        ];
        for content in bad {
            assert!(
                matches!(ReconConfig::from_toml(content), Err(ReconError::Config(_))),
                "should reject: {}",
                content
            );
        }
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ReconConfig::from_toml("matching = ["),
            Err(ReconError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recon.toml");
        fs::write(&path, "[gst]\nrate = 0.0\n").unwrap();

        let config = ReconConfig::load(Some(&path)).unwrap();
        assert_eq!(config.gst.rate, GstRate(0.0));

        let missing = dir.path().join("missing.toml");
        assert!(ReconConfig::load(Some(&missing)).is_err());
    }
}
