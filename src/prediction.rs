//! Prediction requests.
//!
//! A request carries one value per model feature, checked against the input
//! ranges derived from the survey. The [`Predictor`] classifies the row,
//! attributes the log-odds to its features and narrates the result.

use crate::attribution::{Attribution, Attributor};
use crate::dataset::FeatureRange;
use crate::error::{PastureError, Result};
use crate::model::{DegradationClass, TreeEnsemble};
use crate::narrator::{presentation_order, ExplanationTrace, Narrative, Narrator};
use crate::waterfall::WaterfallChart;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Validated model input, in model feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInput {
    pub feature_names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureInput {
    /// Build an input from user `overrides` (keyed by feature name); any
    /// feature not supplied takes its range default.
    pub fn from_overrides(ranges: &[FeatureRange], overrides: &HashMap<String, f64>) -> Result<Self> {
        if let Some(unknown) = overrides.keys().find(|k| !ranges.iter().any(|r| &r.name == *k)) {
            return Err(PastureError::Schema(format!("unknown model feature {}", unknown)));
        }
        let mut values = Vec::with_capacity(ranges.len());
        for range in ranges {
            let value = overrides.get(&range.name).copied().unwrap_or(range.default);
            if !range.contains(value) {
                return Err(PastureError::InputOutOfRange {
                    feature: range.name.clone(),
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
            values.push(value);
        }
        Ok(Self {
            feature_names: ranges.iter().map(|r| r.name.clone()).collect(),
            values,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub generated_at: DateTime<Utc>,
    pub class: DegradationClass,
    pub probability: f64,
    pub attribution: Attribution,
    pub presentation_order: Vec<usize>,
    pub trace: ExplanationTrace,
    pub narrative: Vec<String>,
    pub waterfall: WaterfallChart,
}

impl PredictionReport {
    pub fn narrative_text(&self) -> String {
        self.narrative.join(" ")
    }
}

pub struct Predictor<'a, A: Attributor> {
    model: &'a TreeEnsemble,
    attributor: A,
    narrator: Narrator,
    max_display: usize,
}

impl<'a, A: Attributor> Predictor<'a, A> {
    pub fn new(model: &'a TreeEnsemble, attributor: A, narrator: Narrator, max_display: usize) -> Self {
        Self {
            model,
            attributor,
            narrator,
            max_display,
        }
    }

    pub fn predict(&self, input: &FeatureInput) -> Result<PredictionReport> {
        if input.feature_names.as_slice() != self.model.feature_names() {
            return Err(PastureError::Schema(format!(
                "input features {:?} do not match model features {:?}",
                input.feature_names,
                self.model.feature_names()
            )));
        }

        let attribution = self.attributor.attribute(&input.values)?;
        let probability = attribution.probability();
        let class = DegradationClass::from_probability(probability);
        let order = presentation_order(&attribution.contributions);
        let narrative = self.narrator.narrate(
            &attribution.feature_names,
            &attribution.contributions,
            attribution.baseline,
            probability,
            &order,
        )?;
        let waterfall = WaterfallChart::from_attribution(&attribution, self.max_display)?;

        info!("Predicted {} (p = {:.4})", class, probability);
        debug!("Baseline {:.4}, contributions {:?}", attribution.baseline, attribution.contributions);

        let Narrative { sentences, trace } = narrative;
        Ok(PredictionReport {
            generated_at: Utc::now(),
            class,
            probability,
            attribution,
            presentation_order: order,
            trace,
            narrative: sentences,
            waterfall,
        })
    }
}

/// Classify every row, e.g. all aggregated survey points.
pub fn predict_points(model: &TreeEnsemble, rows: &[Vec<f64>]) -> Result<Vec<DegradationClass>> {
    let classes = rows
        .iter()
        .map(|row| model.predict(row))
        .collect::<Result<Vec<_>>>()?;
    let degraded = classes
        .iter()
        .filter(|c| **c == DegradationClass::Degraded)
        .count();
    info!("Predicted {} points: {} degraded", classes.len(), degraded);
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::TreeShapAttributor;
    use crate::model::tests::TWO_FEATURE_MODEL;
    use crate::narrator::Locale;

    fn ranges() -> Vec<FeatureRange> {
        vec![
            FeatureRange {
                name: "Altura_mean".to_string(),
                min: 0.0,
                max: 10.0,
                default: 2.5,
            },
            FeatureRange {
                name: "Cupins_mean".to_string(),
                min: 1.0,
                max: 7.0,
                default: 3.0,
            },
        ]
    }

    #[test]
    fn test_defaults_and_overrides() {
        let overrides: HashMap<String, f64> = [("Cupins_mean".to_string(), 6.0)].into_iter().collect();
        let input = FeatureInput::from_overrides(&ranges(), &overrides).unwrap();
        assert_eq!(input.values, vec![2.5, 6.0]);
    }

    #[test]
    fn test_out_of_range_and_unknown() {
        let overrides: HashMap<String, f64> = [("Cupins_mean".to_string(), 7.5)].into_iter().collect();
        assert!(matches!(
            FeatureInput::from_overrides(&ranges(), &overrides),
            Err(PastureError::InputOutOfRange { .. })
        ));
        let overrides: HashMap<String, f64> = [("Invasoras_mean".to_string(), 2.0)].into_iter().collect();
        assert!(matches!(
            FeatureInput::from_overrides(&ranges(), &overrides),
            Err(PastureError::Schema(_))
        ));
    }

    #[test]
    fn test_report_is_consistent() {
        let model = TreeEnsemble::from_json(TWO_FEATURE_MODEL).unwrap();
        let predictor = Predictor::new(
            &model,
            TreeShapAttributor::new(&model),
            Narrator::new(Locale::English, 2),
            10,
        );
        let input = FeatureInput {
            feature_names: model.feature_names().to_vec(),
            values: vec![3.0, 5.0],
        };
        let report = predictor.predict(&input).unwrap();
        assert_eq!(report.class, DegradationClass::Degraded);
        assert!((report.probability - model.probability(&input.values).unwrap()).abs() < 1e-9);
        assert_eq!(report.narrative.len(), 4);
        assert!((report.trace.final_log_odds() - report.attribution.total_log_odds()).abs() < 1e-9);
        assert!((report.waterfall.output - 1.5).abs() < 1e-9);
        assert!(report.narrative_text().contains("DEGRADED"));
    }

    #[test]
    fn test_feature_order_must_match_model() {
        let model = TreeEnsemble::from_json(TWO_FEATURE_MODEL).unwrap();
        let predictor = Predictor::new(&model, TreeShapAttributor::new(&model), Narrator::default(), 10);
        let input = FeatureInput {
            feature_names: vec!["Cupins_mean".to_string(), "Altura_mean".to_string()],
            values: vec![5.0, 3.0],
        };
        assert!(matches!(predictor.predict(&input), Err(PastureError::Schema(_))));
    }

    #[test]
    fn test_predict_points() {
        let model = TreeEnsemble::from_json(TWO_FEATURE_MODEL).unwrap();
        let classes = predict_points(&model, &[vec![3.0, 5.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(classes, vec![DegradationClass::Degraded, DegradationClass::NotDegraded]);
    }
}
