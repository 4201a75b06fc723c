//! Gradient-boosted tree ensemble for the degradation classifier.
//!
//! Models are exported to JSON from the training environment. Each tree is a
//! flat node list where split nodes send `x < threshold` to `yes`, everything
//! else to `no`, and missing values (NaN) to `missing`.

use crate::error::{PastureError, Result};
use crate::logistic::{logit, sigmoid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Probability above which a pasture is classified as degraded.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationClass {
    Degraded,
    NotDegraded,
}

impl DegradationClass {
    pub fn from_probability(p: f64) -> Self {
        if p > DECISION_THRESHOLD {
            DegradationClass::Degraded
        } else {
            DegradationClass::NotDegraded
        }
    }

    pub fn from_label(label: u8) -> Self {
        if label == 1 {
            DegradationClass::Degraded
        } else {
            DegradationClass::NotDegraded
        }
    }

    /// Label used in maps and charts.
    pub fn label(self) -> &'static str {
        match self {
            DegradationClass::Degraded => "DEGRADADA",
            DegradationClass::NotDegraded => "NÃO DEGRADADA",
        }
    }

    pub fn color(self) -> [u8; 3] {
        match self {
            DegradationClass::Degraded => [255, 0, 0],
            DegradationClass::NotDegraded => [0, 255, 0],
        }
    }
}

impl fmt::Display for DegradationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Node as stored in the model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Split {
        split: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: Option<usize>,
        cover: f64,
    },
    Leaf {
        leaf: f64,
        cover: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Prior probability of the positive class.
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    pub feature_names: Vec<String>,
    pub trees: Vec<TreeSpec>,
}

fn default_base_score() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match *self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_spec(spec: &TreeSpec, n_features: usize, tree_index: usize) -> Result<Self> {
        if spec.nodes.is_empty() {
            return Err(PastureError::Model(format!("tree {} has no nodes", tree_index)));
        }
        let n = spec.nodes.len();
        let mut nodes = Vec::with_capacity(n);
        for (id, node) in spec.nodes.iter().enumerate() {
            let invalid = |msg: String| PastureError::Model(format!("tree {} node {}: {}", tree_index, id, msg));
            let node = match *node {
                NodeSpec::Split { split, threshold, yes, no, missing, cover } => {
                    if split >= n_features {
                        return Err(invalid(format!("feature {} out of range", split)));
                    }
                    let missing = missing.unwrap_or(yes);
                    for child in [yes, no, missing] {
                        // Children must come after their parent, which rules out cycles.
                        if child <= id || child >= n {
                            return Err(invalid(format!("invalid child {}", child)));
                        }
                    }
                    if missing != yes && missing != no {
                        return Err(invalid(format!("missing branch {} is neither child", missing)));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid("non-finite threshold".to_string()));
                    }
                    Node::Split { feature: split, threshold, yes, no, missing, cover }
                }
                NodeSpec::Leaf { leaf, cover } => {
                    if !leaf.is_finite() {
                        return Err(invalid("non-finite leaf value".to_string()));
                    }
                    Node::Leaf { value: leaf, cover }
                }
            };
            if !(node.cover() > 0.0) {
                return Err(invalid(format!("cover must be positive, got {}", node.cover())));
            }
            nodes.push(node);
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    /// Child taken by `row` at a split node.
    pub fn next(&self, id: usize, row: &[f64]) -> Option<usize> {
        match self.nodes[id] {
            Node::Split { feature, threshold, yes, no, missing, .. } => {
                let x = row[feature];
                Some(if x.is_nan() {
                    missing
                } else if x < threshold {
                    yes
                } else {
                    no
                })
            }
            Node::Leaf { .. } => None,
        }
    }

    pub fn leaf_value(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        while let Some(child) = self.next(id, row) {
            id = child;
        }
        match self.nodes[id] {
            Node::Leaf { value, .. } => value,
            Node::Split { .. } => unreachable!("traversal stops only at leaves"),
        }
    }

    /// Cover-weighted mean leaf value: the tree's output averaged over the
    /// training population.
    pub fn expected_value(&self) -> f64 {
        self.expected_from(0)
    }

    fn expected_from(&self, id: usize) -> f64 {
        match self.nodes[id] {
            Node::Leaf { value, .. } => value,
            Node::Split { yes, no, .. } => {
                let yes_cover = self.nodes[yes].cover();
                let no_cover = self.nodes[no].cover();
                (yes_cover * self.expected_from(yes) + no_cover * self.expected_from(no))
                    / (yes_cover + no_cover)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    base_margin: f64,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_spec(spec: ModelSpec) -> Result<Self> {
        if spec.feature_names.is_empty() {
            return Err(PastureError::Model("model declares no features".to_string()));
        }
        if !(spec.base_score > 0.0 && spec.base_score < 1.0) {
            return Err(PastureError::Model(format!(
                "base_score must be a probability in (0, 1), got {}",
                spec.base_score
            )));
        }
        let n_features = spec.feature_names.len();
        let trees = spec
            .trees
            .iter()
            .enumerate()
            .map(|(i, t)| Tree::from_spec(t, n_features, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            feature_names: spec.feature_names,
            base_margin: logit(spec.base_score),
            trees,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_spec(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let spec: ModelSpec = serde_json::from_reader(BufReader::new(file))?;
        let model = Self::from_spec(spec)?;
        info!(
            "Loaded model from {:?}: {} trees over {} features",
            path,
            model.trees.len(),
            model.feature_names.len()
        );
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn check_row(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.feature_names.len() {
            return Err(PastureError::ShapeMismatch {
                what: "row width".to_string(),
                expected: self.feature_names.len(),
                got: row.len(),
            });
        }
        Ok(())
    }

    /// Raw log-odds output.
    pub fn margin(&self, row: &[f64]) -> Result<f64> {
        self.check_row(row)?;
        Ok(self.base_margin + self.trees.iter().map(|t| t.leaf_value(row)).sum::<f64>())
    }

    pub fn probability(&self, row: &[f64]) -> Result<f64> {
        Ok(sigmoid(self.margin(row)?))
    }

    pub fn predict(&self, row: &[f64]) -> Result<DegradationClass> {
        Ok(DegradationClass::from_probability(self.probability(row)?))
    }
}
