pub mod attribution;
pub mod config;
pub mod dataset;
pub mod descriptive;
pub mod error;
pub mod logistic;
pub mod map;
pub mod model;
pub mod narrator;
pub mod prediction;
pub mod waterfall;

pub use attribution::{Attribution, Attributor, TreeShapAttributor};
pub use error::{PastureError, Result};
pub use logistic::sigmoid;
pub use narrator::{presentation_order, Locale, Narrative, Narrator};
