//! Waterfall chart data for an attribution.
//!
//! Bars run top to bottom by decreasing `|contribution|`. Log-odds accumulate
//! from the bottom: the lowest bar starts at the baseline and the top bar ends
//! at the model output. Features beyond `max_display - 1` fold into a single
//! "other features" bar at the bottom.

use crate::attribution::Attribution;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const DEFAULT_MAX_DISPLAY: usize = 10;

const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallBar {
    pub label: String,
    pub contribution: f64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallChart {
    pub baseline: f64,
    pub output: f64,
    pub bars: Vec<WaterfallBar>,
}

impl WaterfallChart {
    pub fn from_attribution(attribution: &Attribution, max_display: usize) -> Result<Self> {
        attribution.validate()?;
        let n = attribution.contributions.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            attribution.contributions[b]
                .abs()
                .total_cmp(&attribution.contributions[a].abs())
        });

        let max_display = max_display.max(1);
        let mut rows: Vec<(String, f64)> = Vec::with_capacity(max_display.min(n));
        if n > max_display {
            let shown = max_display - 1;
            for &i in &order[..shown] {
                rows.push((bar_label(attribution, i), attribution.contributions[i]));
            }
            let rest = &order[shown..];
            let folded: f64 = rest.iter().map(|&i| attribution.contributions[i]).sum();
            rows.push((format!("{} other features", rest.len()), folded));
        } else {
            for &i in &order {
                rows.push((bar_label(attribution, i), attribution.contributions[i]));
            }
        }

        let mut bars = Vec::with_capacity(rows.len());
        let mut running = attribution.baseline;
        for (label, contribution) in rows.into_iter().rev() {
            let start = running;
            running += contribution;
            bars.push(WaterfallBar {
                label,
                contribution,
                start,
                end: running,
            });
        }
        bars.reverse();

        Ok(Self {
            baseline: attribution.baseline,
            output: running,
            bars,
        })
    }

    /// Plain-text chart for terminals.
    pub fn render_text(&self) -> String {
        let scale = self
            .bars
            .iter()
            .map(|b| b.contribution.abs())
            .fold(0.0_f64, f64::max);
        let label_width = self.bars.iter().map(|b| b.label.chars().count()).max().unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "f(x) = {:.3}", self.output);
        for bar in &self.bars {
            let len = if scale > 0.0 {
                ((bar.contribution.abs() / scale) * BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            let glyph = if bar.contribution > 0.0 { '+' } else { '-' };
            let _ = writeln!(
                out,
                "{:>width$} | {:+.3} {}",
                bar.label,
                bar.contribution,
                glyph.to_string().repeat(len.max(1)),
                width = label_width
            );
        }
        let _ = writeln!(out, "E[f(X)] = {:.3}", self.baseline);
        out
    }
}

fn bar_label(attribution: &Attribution, i: usize) -> String {
    match attribution.values.get(i) {
        Some(v) => format!("{:.3} = {}", v, attribution.feature_names[i]),
        None => attribution.feature_names[i].clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribution(contributions: Vec<f64>) -> Attribution {
        let n = contributions.len();
        Attribution {
            feature_names: (0..n).map(|i| format!("f{}", i)).collect(),
            values: (0..n).map(|i| i as f64).collect(),
            baseline: 0.5,
            contributions,
        }
    }

    #[test]
    fn test_bars_sorted_and_stacked() {
        let chart = WaterfallChart::from_attribution(&attribution(vec![0.1, -0.7, 0.3]), 10).unwrap();
        let labels: Vec<&str> = chart.bars.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["1.000 = f1", "2.000 = f2", "0.000 = f0"]);
        // bottom bar starts at the baseline, top bar ends at the output
        assert_eq!(chart.bars[2].start, 0.5);
        assert!((chart.bars[0].end - chart.output).abs() < 1e-12);
        assert!((chart.output - 0.2).abs() < 1e-12);
        for pair in chart.bars.windows(2) {
            assert!((pair[0].start - pair[1].end).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fold_remaining_features() {
        let chart =
            WaterfallChart::from_attribution(&attribution(vec![0.05, -0.9, 0.4, 0.02, -0.01]), 3).unwrap();
        assert_eq!(chart.bars.len(), 3);
        assert_eq!(chart.bars[2].label, "3 other features");
        assert!((chart.bars[2].contribution - 0.06).abs() < 1e-12);
        assert!((chart.output - (0.5 + 0.05 - 0.9 + 0.4 + 0.02 - 0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_render_text() {
        let chart = WaterfallChart::from_attribution(&attribution(vec![0.2, -0.4]), 10).unwrap();
        let text = chart.render_text();
        assert!(text.starts_with("f(x) = 0.300"));
        assert!(text.contains("-0.400"));
        assert!(text.contains("+0.200"));
        assert!(text.trim_end().ends_with("E[f(X)] = 0.500"));
    }
}
