pub mod artifact;
pub mod model;
pub mod port;

pub use artifact::ModelArtifact;
pub use port::{ClassifierConfig, ClassifierPort, PortMode};

use common::Action;
use indicators::FeatureVector;

/// Result of classifying one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub action: Action,
    pub confidence: Option<f64>,
}

impl Classification {
    pub fn hold() -> Self {
        Self {
            action: Action::Hold,
            confidence: None,
        }
    }
}

/// All classifiers must satisfy this trait.
///
/// The input ordering is fixed by the model's artifact; implementations pick
/// their inputs out of the vector by name.
pub trait Classifier: Send + Sync {
    /// Human-readable name of the loaded model.
    fn name(&self) -> &str;

    /// Only complete feature vectors (`FeatureVector::is_complete`) are passed in.
    fn classify(&self, features: &FeatureVector) -> Classification;
}
