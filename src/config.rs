//! Application configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional JSON file,
//! `PASTURE_*` environment variables (a `.env` file is honoured by the
//! binary), then command-line flags applied by the caller.

use crate::error::{PastureError, Result};
use crate::narrator::{Locale, DEFAULT_PRECISION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest number of decimals the narrator will print.
pub const MAX_PRECISION: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Survey scores, one row per rater evaluation.
    pub scores_path: PathBuf,
    /// Class and geolocation per survey point.
    pub classes_path: PathBuf,
    pub model_path: PathBuf,
    pub locale: Locale,
    pub precision: usize,
    /// Upper bound on `DispFolhVerd_max_min_diff` in the disagreement overview.
    pub disagreement_cap: f64,
    pub separator: char,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scores_path: PathBuf::from("dados/dados_escores_processados.csv"),
            classes_path: PathBuf::from("dados/dados_geoloc_classe.csv"),
            model_path: PathBuf::from("dados/melhor_modelo.json"),
            locale: Locale::English,
            precision: DEFAULT_PRECISION,
            disagreement_cap: 6.0,
            separator: ',',
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_json::from_str(&text)?
            }
            None => AppConfig::default(),
        };
        let config = base.with_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PASTURE_*` overrides from `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PASTURE_SCORES_PATH") {
            self.scores_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PASTURE_CLASSES_PATH") {
            self.classes_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PASTURE_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PASTURE_LOCALE") {
            self.locale = v.parse()?;
        }
        if let Some(v) = lookup("PASTURE_PRECISION") {
            self.precision = v
                .trim()
                .parse()
                .map_err(|_| PastureError::Config(format!("PASTURE_PRECISION is not a number: {}", v)))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.precision > MAX_PRECISION {
            return Err(PastureError::Config(format!(
                "precision {} exceeds maximum {}",
                self.precision, MAX_PRECISION
            )));
        }
        if !(self.disagreement_cap > 0.0) {
            return Err(PastureError::Config(format!(
                "disagreement_cap must be positive, got {}",
                self.disagreement_cap
            )));
        }
        if !self.separator.is_ascii() {
            return Err(PastureError::Config(format!(
                "separator must be a single ASCII character, got {:?}",
                self.separator
            )));
        }
        Ok(())
    }
}
