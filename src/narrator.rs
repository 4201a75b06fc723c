//! Attribution Narrator
//!
//! Turns a baseline and per-feature log-odds contributions into an ordered,
//! human-readable account of how the prediction moved from the population
//! average to its final probability:
//! - a baseline sentence
//! - one sentence per feature, smallest impact first
//! - a closing sentence with the probability of the positive class

use crate::error::{PastureError, Result};
use crate::logistic::sigmoid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance for the caller-supplied final probability.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Decimal places used when none are configured.
pub const DEFAULT_PRECISION: usize = 2;

/// Wording of the generated sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Portuguese,
}

impl FromStr for Locale {
    type Err = PastureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Ok(Locale::English),
            "pt" | "pt-br" | "portuguese" => Ok(Locale::Portuguese),
            other => Err(PastureError::Config(format!("Unknown locale: {}", other))),
        }
    }
}

/// How a single contribution moved the log-odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increased,
    Decreased,
}

impl Direction {
    /// Zero counts as `Decreased`: only a strictly positive contribution increases.
    pub fn of(contribution: f64) -> Self {
        if contribution > 0.0 {
            Direction::Increased
        } else {
            Direction::Decreased
        }
    }

    pub fn word(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Direction::Increased, Locale::English) => "increased",
            (Direction::Decreased, Locale::English) => "decreased",
            (Direction::Increased, Locale::Portuguese) => "aumentou",
            (Direction::Decreased, Locale::Portuguese) => "diminuiu",
        }
    }
}

/// One point of the explanation trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Feature applied at this step; `None` for the baseline.
    pub feature: Option<usize>,
    pub log_odds: f64,
    pub probability: f64,
}

/// Running log-odds from the baseline through every contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTrace {
    pub steps: Vec<TraceStep>,
}

impl ExplanationTrace {
    pub fn log_odds(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.log_odds).collect()
    }

    pub fn final_log_odds(&self) -> f64 {
        self.steps.last().map(|s| s.log_odds).unwrap_or(0.0)
    }

    pub fn final_probability(&self) -> f64 {
        sigmoid(self.final_log_odds())
    }
}

/// Indices ordered by ascending `|contribution|`; ties keep input order.
pub fn presentation_order(contributions: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..contributions.len()).collect();
    order.sort_by(|&a, &b| contributions[a].abs().total_cmp(&contributions[b].abs()));
    order
}

/// `baseline + Σ contributions`, summed in input order.
pub fn total_log_odds(contributions: &[f64], baseline: f64) -> f64 {
    baseline + contributions.iter().sum::<f64>()
}

/// Neumaier-compensated running sum.
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn new(start: f64) -> Self {
        Self {
            sum: start,
            compensation: 0.0,
        }
    }

    fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Apply `contributions` to `baseline` in `order`. Intermediate steps use a
/// compensated sum; the last step is exactly [`total_log_odds`].
pub fn build_trace(contributions: &[f64], baseline: f64, order: &[usize]) -> Result<ExplanationTrace> {
    validate_order(order, contributions.len())?;

    let mut steps = Vec::with_capacity(order.len() + 1);
    let mut running = CompensatedSum::new(baseline);
    steps.push(TraceStep {
        feature: None,
        log_odds: baseline,
        probability: sigmoid(baseline),
    });
    for &i in order {
        running.add(contributions[i]);
        steps.push(TraceStep {
            feature: Some(i),
            log_odds: running.value(),
            probability: sigmoid(running.value()),
        });
    }
    if let Some(last) = steps.last_mut().filter(|s| s.feature.is_some()) {
        let total = total_log_odds(contributions, baseline);
        last.log_odds = total;
        last.probability = sigmoid(total);
    }
    Ok(ExplanationTrace { steps })
}

fn validate_order(order: &[usize], n: usize) -> Result<()> {
    if order.len() != n {
        return Err(PastureError::InvalidOrder(format!(
            "expected {} indices, got {}",
            n,
            order.len()
        )));
    }
    let mut seen = vec![false; n];
    for &i in order {
        if i >= n {
            return Err(PastureError::InvalidOrder(format!(
                "index {} out of range for {} features",
                i, n
            )));
        }
        if seen[i] {
            return Err(PastureError::InvalidOrder(format!("index {} repeated", i)));
        }
        seen[i] = true;
    }
    Ok(())
}

/// Generated explanation: the sentences plus the trace they were built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub sentences: Vec<String>,
    pub trace: ExplanationTrace,
}

impl fmt::Display for Narrative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sentences.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Narrator {
    locale: Locale,
    precision: usize,
}

impl Default for Narrator {
    fn default() -> Self {
        Self::new(Locale::English, DEFAULT_PRECISION)
    }
}

impl Narrator {
    pub fn new(locale: Locale, precision: usize) -> Self {
        Self { locale, precision }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Build the narrative. Every input check runs before the first sentence
    /// is written, so invalid input never yields partial text.
    pub fn narrate(
        &self,
        feature_names: &[String],
        contributions: &[f64],
        baseline: f64,
        final_probability: f64,
        order: &[usize],
    ) -> Result<Narrative> {
        if feature_names.len() != contributions.len() {
            return Err(PastureError::LengthMismatch {
                names: feature_names.len(),
                contributions: contributions.len(),
            });
        }
        if !baseline.is_finite() {
            return Err(PastureError::NonFinite("baseline".to_string()));
        }
        if let Some(i) = contributions.iter().position(|c| !c.is_finite()) {
            return Err(PastureError::NonFinite(format!(
                "contribution of '{}'",
                feature_names[i]
            )));
        }

        let trace = build_trace(contributions, baseline, order)?;
        let expected = sigmoid(total_log_odds(contributions, baseline));
        if !((final_probability - expected).abs() <= PROBABILITY_TOLERANCE) {
            return Err(PastureError::ProbabilityMismatch {
                supplied: final_probability,
                expected,
            });
        }

        let mut sentences = Vec::with_capacity(order.len() + 2);
        sentences.push(self.baseline_sentence(baseline));
        for step in &trace.steps[1..] {
            if let Some(i) = step.feature {
                sentences.push(self.feature_sentence(
                    &feature_names[i],
                    contributions[i],
                    step.probability,
                ));
            }
        }
        sentences.push(self.closing_sentence(final_probability));

        Ok(Narrative { sentences, trace })
    }

    fn percent(&self, p: f64) -> String {
        format!("{:.*}%", self.precision, p * 100.0)
    }

    fn baseline_sentence(&self, baseline: f64) -> String {
        let p = self.percent(sigmoid(baseline));
        match self.locale {
            Locale::English => format!(
                "The baseline (average) log-odds is {:.*}, which corresponds to an initial probability of degradation of {}.",
                self.precision, baseline, p
            ),
            Locale::Portuguese => format!(
                "O valor base (médio) de log-odds é de {:.*}, o que corresponde a uma probabilidade inicial de degradação igual a {}.",
                self.precision, baseline, p
            ),
        }
    }

    fn feature_sentence(&self, feature: &str, contribution: f64, running_probability: f64) -> String {
        let word = Direction::of(contribution).word(self.locale);
        let magnitude = contribution.abs();
        let p = self.percent(running_probability);
        match self.locale {
            Locale::English => format!(
                "The feature '{}' {} the log-odds by {:.*} units, which brought the probability to {}.",
                feature, word, self.precision, magnitude, p
            ),
            Locale::Portuguese => format!(
                "A variável '{}' {} o log-odds em {:.*} unidades, o que fez a probabilidade se tornar {}.",
                feature, word, self.precision, magnitude, p
            ),
        }
    }

    fn closing_sentence(&self, final_probability: f64) -> String {
        let p = self.percent(final_probability);
        match self.locale {
            Locale::English => format!(
                "Therefore, the final probability that the pasture is DEGRADED is {}.",
                p
            ),
            Locale::Portuguese => format!(
                "Assim, a probabilidade final de que a pastagem está DEGRADADA é {}.",
                p
            ),
        }
    }
}
