//! Exploratory summaries over the aggregated survey points.
//!
//! Boxplots use Tukey's convention: quartiles by linear interpolation,
//! whiskers reaching the furthest value within 1.5 IQR of the box, anything
//! beyond listed as an outlier.

use crate::dataset::{Aggregate, SurveyData, CLASS_COLUMN};
use crate::error::{PastureError, Result};
use crate::model::DegradationClass;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Score whose range bounds the disagreement overview.
pub const DISAGREEMENT_FILTER_SCORE: &str = "DispFolhVerd";

const WHISKER_IQR: f64 = 1.5;

/// Column used to split points into groups or colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Observed class from the class table.
    Class,
    /// Class predicted by the model.
    Predicted,
}

impl FromStr for GroupBy {
    type Err = PastureError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CLASS_DED" | "class" => Ok(GroupBy::Class),
            "y_pred_class" | "predicted" => Ok(GroupBy::Predicted),
            other => Err(PastureError::Schema(format!("cannot group by {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub group: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxSummary {
    /// `None` when `values` holds no finite number.
    pub fn from_values(group: &str, values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - WHISKER_IQR * iqr;
        let high_fence = q3 + WHISKER_IQR * iqr;

        let inside = sorted.iter().copied().filter(|v| *v >= low_fence && *v <= high_fence);
        let lower_whisker = inside.clone().fold(f64::INFINITY, f64::min);
        let upper_whisker = inside.fold(f64::NEG_INFINITY, f64::max);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < low_fence || *v > high_fence)
            .collect();

        Some(Self {
            group: group.to_string(),
            count: sorted.len(),
            min: sorted[0],
            q1,
            median,
            q3,
            max: sorted[sorted.len() - 1],
            lower_whisker,
            upper_whisker,
            outliers,
        })
    }
}

impl fmt::Display for BoxSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<28} n={:<4} min={:.2} q1={:.2} median={:.2} q3={:.2} max={:.2} outliers={}",
            self.group,
            self.count,
            self.min,
            self.q1,
            self.median,
            self.q3,
            self.max,
            self.outliers.len()
        )
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

/// One boxplot per group, groups in lexical order.
pub fn grouped_boxplots(values: &[f64], groups: &[String]) -> Vec<BoxSummary> {
    groups
        .iter()
        .zip(values.iter().copied())
        .into_group_map()
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .filter_map(|(group, vals)| BoxSummary::from_values(group, &vals))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub group: String,
    pub x_column: String,
    pub y_column: String,
    pub points: Vec<(f64, f64)>,
}

pub struct Descriptive<'a> {
    data: &'a SurveyData,
    predicted: Vec<DegradationClass>,
}

impl<'a> Descriptive<'a> {
    /// `predicted` holds one class per point, in `data` row order.
    pub fn new(data: &'a SurveyData, predicted: Vec<DegradationClass>) -> Result<Self> {
        if predicted.len() != data.len() {
            return Err(PastureError::ShapeMismatch {
                what: "predictions per point".to_string(),
                expected: data.len(),
                got: predicted.len(),
            });
        }
        Ok(Self { data, predicted })
    }

    fn groups(&self, by: GroupBy) -> Result<Vec<String>> {
        match by {
            GroupBy::Class => self.data.column_str(CLASS_COLUMN),
            GroupBy::Predicted => Ok(self.predicted.iter().map(|c| c.label().to_string()).collect()),
        }
    }

    fn require(&self, column: &str, agg: Aggregate) -> Result<()> {
        match Aggregate::parse_column(column) {
            Some((_, a)) if a == agg && self.data.has_column(column) => Ok(()),
            _ => Err(PastureError::Schema(format!(
                "{} is not a {} score column",
                column,
                agg.suffix()
            ))),
        }
    }

    /// Distribution of a mean score per class.
    pub fn boxplot(&self, column: &str, by: GroupBy) -> Result<Vec<BoxSummary>> {
        self.require(column, Aggregate::Mean)?;
        Ok(grouped_boxplots(&self.data.column_f64(column)?, &self.groups(by)?))
    }

    /// Two mean scores against each other, one series per color group.
    pub fn scatter(&self, x: &str, y: &str, color_by: GroupBy) -> Result<Vec<ScatterSeries>> {
        self.require(x, Aggregate::Mean)?;
        self.require(y, Aggregate::Mean)?;
        let xs = self.data.column_f64(x)?;
        let ys = self.data.column_f64(y)?;
        let series = self
            .groups(color_by)?
            .into_iter()
            .zip(xs.into_iter().zip(ys))
            .filter(|(_, (x, y))| x.is_finite() && y.is_finite())
            .into_group_map()
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(group, points)| ScatterSeries {
                group,
                x_column: x.to_string(),
                y_column: y.to_string(),
                points,
            })
            .collect();
        Ok(series)
    }

    /// Rater disagreement (score range) for every score, one box per score,
    /// over points whose `DispFolhVerd` range is at most `cap`.
    pub fn disagreement_overview(&self, cap: f64) -> Result<Vec<BoxSummary>> {
        let filter_column = Aggregate::MaxMinDiff.column(DISAGREEMENT_FILTER_SCORE);
        let keep: Vec<bool> = if self.data.has_column(&filter_column) {
            self.data
                .column_f64(&filter_column)?
                .into_iter()
                .map(|v| v <= cap)
                .collect()
        } else {
            warn!("{} not present, disagreement overview is unfiltered", filter_column);
            vec![true; self.data.len()]
        };

        let mut summaries = Vec::new();
        for column in self.data.aggregated_columns(Aggregate::MaxMinDiff) {
            let values: Vec<f64> = self
                .data
                .column_f64(&column)?
                .into_iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v)
                .collect();
            if let Some(summary) = BoxSummary::from_values(&column, &values) {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Rater disagreement for one score, per class.
    pub fn disagreement_by_class(&self, column: &str, by: GroupBy) -> Result<Vec<BoxSummary>> {
        self.require(column, Aggregate::MaxMinDiff)?;
        Ok(grouped_boxplots(&self.data.column_f64(column)?, &self.groups(by)?))
    }
}
