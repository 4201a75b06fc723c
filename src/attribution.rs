//! Feature attribution
//!
//! An [`Attributor`] splits one prediction's log-odds into a baseline plus a
//! signed contribution per feature. [`TreeShapAttributor`] computes exact
//! Shapley values for a tree ensemble with the path-dependent TreeSHAP
//! recursion, weighting unseen branches by node cover.

use crate::error::{PastureError, Result};
use crate::logistic::sigmoid;
use crate::model::{Node, Tree, TreeEnsemble};
use crate::narrator::total_log_odds;
use serde::{Deserialize, Serialize};

/// Baseline plus per-feature contributions for a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature_names: Vec<String>,
    /// Input values the contributions were computed for.
    #[serde(default)]
    pub values: Vec<f64>,
    pub baseline: f64,
    pub contributions: Vec<f64>,
}

impl Attribution {
    pub fn total_log_odds(&self) -> f64 {
        total_log_odds(&self.contributions, self.baseline)
    }

    pub fn probability(&self) -> f64 {
        sigmoid(self.total_log_odds())
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_names.len() != self.contributions.len() {
            return Err(PastureError::LengthMismatch {
                names: self.feature_names.len(),
                contributions: self.contributions.len(),
            });
        }
        if !self.values.is_empty() && self.values.len() != self.feature_names.len() {
            return Err(PastureError::ShapeMismatch {
                what: "attribution values".to_string(),
                expected: self.feature_names.len(),
                got: self.values.len(),
            });
        }
        Ok(())
    }
}

pub trait Attributor {
    fn feature_names(&self) -> &[String];

    fn attribute(&self, row: &[f64]) -> Result<Attribution>;
}

pub struct TreeShapAttributor<'a> {
    model: &'a TreeEnsemble,
    baseline: f64,
}

impl<'a> TreeShapAttributor<'a> {
    pub fn new(model: &'a TreeEnsemble) -> Self {
        let baseline = model.base_margin()
            + model.trees().iter().map(|t| t.expected_value()).sum::<f64>();
        Self { model, baseline }
    }

    /// Expected log-odds over the training population.
    pub fn baseline(&self) -> f64 {
        self.baseline
    }
}

impl Attributor for TreeShapAttributor<'_> {
    fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    fn attribute(&self, row: &[f64]) -> Result<Attribution> {
        self.model.check_row(row)?;
        let mut phi = vec![0.0; row.len()];
        for tree in self.model.trees() {
            tree_shap(tree, row, &mut phi);
        }
        Ok(Attribution {
            feature_names: self.model.feature_names().to_vec(),
            values: row.to_vec(),
            baseline: self.baseline,
            contributions: phi,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

impl PathElement {
    const EMPTY: PathElement = PathElement {
        feature: None,
        zero_fraction: 0.0,
        one_fraction: 0.0,
        pweight: 0.0,
    };
}

fn tree_shap(tree: &Tree, row: &[f64], phi: &mut [f64]) {
    recurse(tree, row, phi, 0, &[], 0, 1.0, 1.0, None);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    row: &[f64],
    phi: &mut [f64],
    node: usize,
    parent_path: &[PathElement],
    mut depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path[..depth].to_vec();
    path.push(PathElement::EMPTY);
    extend_path(&mut path, depth, zero_fraction, one_fraction, feature);

    match *tree.node(node) {
        Node::Leaf { value, .. } => {
            for i in 1..=depth {
                let w = unwound_path_sum(&path, depth, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                }
            }
        }
        Node::Split { feature: split, yes, no, .. } => {
            // `next` only returns None on leaves.
            let hot = tree.next(node, row).unwrap_or(yes);
            let cold = if hot == yes { no } else { yes };
            let total_cover = tree.node(yes).cover() + tree.node(no).cover();
            let hot_zero = tree.node(hot).cover() / total_cover;
            let cold_zero = tree.node(cold).cover() / total_cover;

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..=depth).find(|&k| path[k].feature == Some(split)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(&mut path, depth, k);
                depth -= 1;
                path.truncate(depth + 1);
            }

            recurse(tree, row, phi, hot, &path, depth + 1, hot_zero * incoming_zero, incoming_one, Some(split));
            recurse(tree, row, phi, cold, &path, depth + 1, cold_zero * incoming_zero, 0.0, Some(split));
        }
    }
}

fn extend_path(path: &mut [PathElement], depth: usize, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    path[depth] = PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    };
    let d = depth as f64;
    for i in (0..depth).rev() {
        let fi = i as f64;
        path[i + 1].pweight += one_fraction * path[i].pweight * (fi + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - fi) / (d + 1.0);
    }
}

fn unwind_path(path: &mut [PathElement], depth: usize, index: usize) {
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (d + 1.0) / ((fi + 1.0) * one);
            next_one_portion = tmp - path[i].pweight * zero * (d - fi) / (d + 1.0);
        } else {
            path[i].pweight = path[i].pweight * (d + 1.0) / (zero * (d - fi));
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

fn unwound_path_sum(path: &[PathElement], depth: usize, index: usize) -> f64 {
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((fi + 1.0) * one);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero * (d - fi) / (d + 1.0);
        } else if zero != 0.0 {
            total += (path[i].pweight / zero) / ((d - fi) / (d + 1.0));
        }
    }
    total
}
