//! Survey data loading and per-point aggregation.
//!
//! The survey export has one row per rater evaluation. Rows are grouped by
//! survey point and every score is summarised as mean, min, max and range
//! (`max - min`), then joined with the class/geolocation table.

use crate::config::AppConfig;
use crate::error::{PastureError, Result};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const POINT_ID: &str = "PontoID";
pub const POINT_NAME: &str = "Ponto";
pub const CLASS_COLUMN: &str = "CLASS_DED";
pub const LATITUDE: &str = "LAT";
pub const LONGITUDE: &str = "LON";

/// Survey columns that are identifiers or metadata, not scores.
pub const ID_COLUMNS: [&str; 7] = [
    "Ponto",
    "PontoID",
    "Data",
    "Campo",
    "Equipe",
    "Especie01",
    "Avaliador",
];

/// Classes grouped into the negative (not degraded) label.
pub const NEGATIVE_CLASSES: [&str; 2] = ["Não degradada", "Degradação Baixa"];

/// Scores too close to the target to be used as model inputs.
pub const EXCLUDED_SCORE_MARKERS: [&str; 2] = ["Degrad", "Manejo"];

/// Scores rated on the fixed 1–7 scale; anything else uses its observed range.
pub const SCALE_MIN: f64 = 1.0;
pub const SCALE_MAX: f64 = 7.0;
pub const OPEN_SCALE_SCORES: [&str; 1] = ["Altura"];

lazy_static! {
    /// `<score>_<aggregate>` column names.
    static ref AGGREGATE_COLUMN: Regex = Regex::new(r"^(.+)_(mean|min|max|max_min_diff)$")
        .expect("aggregate column pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregate {
    Mean,
    Min,
    Max,
    MaxMinDiff,
}

impl Aggregate {
    pub const ALL: [Aggregate; 4] = [
        Aggregate::Mean,
        Aggregate::Min,
        Aggregate::Max,
        Aggregate::MaxMinDiff,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Aggregate::Mean => "mean",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::MaxMinDiff => "max_min_diff",
        }
    }

    pub fn column(self, score: &str) -> String {
        format!("{}_{}", score, self.suffix())
    }

    fn expr(self, score: &str) -> Expr {
        let e = match self {
            Aggregate::Mean => col(score).mean(),
            Aggregate::Min => col(score).min(),
            Aggregate::Max => col(score).max(),
            Aggregate::MaxMinDiff => col(score).max() - col(score).min(),
        };
        e.alias(&self.column(score))
    }

    /// Split an aggregated column name into its score and aggregate.
    pub fn parse_column(name: &str) -> Option<(String, Aggregate)> {
        let caps = AGGREGATE_COLUMN.captures(name)?;
        let agg = match &caps[2] {
            "mean" => Aggregate::Mean,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            _ => Aggregate::MaxMinDiff,
        };
        Some((caps[1].to_string(), agg))
    }
}

/// Allowed interval and default for one model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl FeatureRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub fn read_csv(path: &Path, separator: char) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PastureError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }
    let df = LazyCsvReader::new(path)
        .with_separator(separator as u8)
        .with_infer_schema_length(Some(1000))
        .finish()?
        .collect()?;
    debug!("Read {} rows x {} columns from {:?}", df.height(), df.width(), path);
    Ok(df)
}

pub struct SurveyData {
    raw: DataFrame,
    classes: DataFrame,
    points: DataFrame,
    scores: Vec<String>,
}

impl SurveyData {
    pub fn load(config: &AppConfig) -> Result<Self> {
        let raw = read_csv(&config.scores_path, config.separator)?;
        let classes = read_csv(&config.classes_path, config.separator)?;
        Self::from_frames(raw, classes)
    }

    /// Aggregate rater rows per point and inner-join the class table.
    pub fn from_frames(raw: DataFrame, classes: DataFrame) -> Result<Self> {
        require_columns(&raw, &[POINT_ID], "survey scores")?;
        require_columns(&classes, &[POINT_ID, CLASS_COLUMN], "class table")?;

        let scores: Vec<String> = raw
            .get_column_names()
            .into_iter()
            .filter(|c| !ID_COLUMNS.contains(c))
            .map(|c| c.to_string())
            .collect();
        if scores.is_empty() {
            return Err(PastureError::Schema("survey scores have no score columns".to_string()));
        }

        let mut casts: Vec<Expr> = scores.iter().map(|s| col(s).cast(DataType::Float64)).collect();
        casts.push(col(POINT_ID).cast(DataType::String));
        let raw = raw.lazy().with_columns(casts).collect()?;
        let classes = classes
            .lazy()
            .with_columns([col(POINT_ID).cast(DataType::String)])
            .collect()?;

        let mut aggs: Vec<Expr> = scores
            .iter()
            .flat_map(|s| Aggregate::ALL.iter().map(move |a| a.expr(s)))
            .collect();
        let has_raw_name = raw.get_column_names().contains(&POINT_NAME);
        let has_class_name = classes.get_column_names().contains(&POINT_NAME);
        if has_raw_name && !has_class_name {
            aggs.push(col(POINT_NAME).first());
        }

        let points = raw
            .clone()
            .lazy()
            .group_by([col(POINT_ID)])
            .agg(aggs)
            .join(
                classes.clone().lazy(),
                [col(POINT_ID)],
                [col(POINT_ID)],
                JoinArgs::new(JoinType::Inner),
            )
            .sort_by_exprs([col(POINT_ID)], SortMultipleOptions::default())
            .collect()?;

        info!(
            "Aggregated {} survey rows into {} classified points ({} scores)",
            raw.height(),
            points.height(),
            scores.len()
        );

        Ok(Self {
            raw,
            classes,
            points,
            scores,
        })
    }

    pub fn scores(&self) -> &[String] {
        &self.scores
    }

    /// Scores used as model inputs.
    pub fn model_scores(&self) -> Vec<String> {
        self.scores
            .iter()
            .filter(|s| !EXCLUDED_SCORE_MARKERS.iter().any(|m| s.contains(m)))
            .cloned()
            .collect()
    }

    /// One row per classified point.
    pub fn points(&self) -> &DataFrame {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.height()
    }

    pub fn is_empty(&self) -> bool {
        self.points.height() == 0
    }

    /// Rater-level rows with class data attached; unclassified points are kept.
    pub fn detail(&self) -> Result<DataFrame> {
        let df = self
            .raw
            .clone()
            .lazy()
            .join(
                self.classes.clone().lazy(),
                [col(POINT_ID)],
                [col(POINT_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        Ok(df)
    }

    pub fn aggregated_columns(&self, agg: Aggregate) -> Vec<String> {
        self.scores.iter().map(|s| agg.column(s)).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.points.get_column_names().contains(&name)
    }

    /// Numeric column; nulls become NaN.
    pub fn column_f64(&self, name: &str) -> Result<Vec<f64>> {
        column_f64(&self.points, name)
    }

    /// Text column; nulls become empty strings.
    pub fn column_str(&self, name: &str) -> Result<Vec<String>> {
        column_str(&self.points, name)
    }

    pub fn point_ids(&self) -> Result<Vec<String>> {
        self.column_str(POINT_ID)
    }

    /// 1 for degraded points, 0 otherwise.
    pub fn targets(&self) -> Result<Vec<u8>> {
        Ok(self
            .column_str(CLASS_COLUMN)?
            .iter()
            .map(|c| target_for_class(c))
            .collect())
    }

    /// Row-major matrix of the named columns, one row per point.
    pub fn feature_matrix(&self, feature_names: &[String]) -> Result<Vec<Vec<f64>>> {
        let columns = feature_names
            .iter()
            .map(|f| self.column_f64(f))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..self.len())
            .map(|row| columns.iter().map(|c| c[row]).collect())
            .collect())
    }

    /// Input interval and default for each model feature.
    pub fn feature_ranges(&self, feature_names: &[String]) -> Result<Vec<FeatureRange>> {
        feature_names
            .iter()
            .map(|name| {
                let values: Vec<f64> = self
                    .column_f64(name)?
                    .into_iter()
                    .filter(|v| !v.is_nan())
                    .collect();
                if values.is_empty() {
                    return Err(PastureError::Schema(format!("column {} has no values", name)));
                }
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let score = Aggregate::parse_column(name)
                    .map(|(score, _)| score)
                    .unwrap_or_else(|| name.clone());
                let (min, max) = if OPEN_SCALE_SCORES.contains(&score.as_str()) {
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, max)
                } else {
                    (SCALE_MIN, SCALE_MAX)
                };
                Ok(FeatureRange {
                    name: name.clone(),
                    min,
                    max,
                    default: mean,
                })
            })
            .collect()
    }
}

pub fn target_for_class(class: &str) -> u8 {
    if NEGATIVE_CLASSES.contains(&class) {
        0
    } else {
        1
    }
}

pub fn require_columns(df: &DataFrame, required: &[&str], what: &str) -> Result<()> {
    let names = df.get_column_names();
    for c in required {
        if !names.contains(c) {
            return Err(PastureError::Schema(format!("{} is missing column {}", what, c)));
        }
    }
    Ok(())
}

pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| PastureError::Schema(format!("unknown column {}", name)))?
        .cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

pub fn column_str(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .map_err(|_| PastureError::Schema(format!("unknown column {}", name)))?
        .cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}
