use tracing::debug;

use common::Action;
use indicators::{Feature, FeatureVector};

use crate::artifact::{LinearClass, TreeNode};
use crate::{Classification, Classifier};

/// Majority-vote ensemble of decision trees.
pub struct ForestModel {
    name: String,
    schema: Vec<Feature>,
    trees: Vec<Vec<TreeNode>>,
}

impl ForestModel {
    /// `trees` must already have passed `ModelArtifact::validate`.
    pub fn new(name: impl Into<String>, schema: Vec<Feature>, trees: Vec<Vec<TreeNode>>) -> Self {
        Self {
            name: name.into(),
            schema,
            trees,
        }
    }

    fn predict_tree(tree: &[TreeNode], x: &[f64]) -> Action {
        let mut idx = 0;
        loop {
            match &tree[idx] {
                TreeNode::Leaf { action } => return *action,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Classifier for ForestModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, features: &FeatureVector) -> Classification {
        let Some(x) = features.select(&self.schema) else {
            debug!(model = %self.name, "Model input incomplete, holding");
            return Classification::hold();
        };

        let mut votes = [0usize; 3];
        for tree in &self.trees {
            votes[slot(Self::predict_tree(tree, &x))] += 1;
        }

        let best = *votes.iter().max().unwrap_or(&0);
        let winners: Vec<usize> = (0..3).filter(|&i| votes[i] == best).collect();
        // ties go to Hold
        let action = if winners.len() == 1 {
            ACTIONS[winners[0]]
        } else {
            Action::Hold
        };
        Classification {
            action,
            confidence: Some(votes[slot(action)] as f64 / self.trees.len() as f64),
        }
    }
}

/// One linear score per class; argmax wins, softmax gives the confidence.
pub struct LinearModel {
    name: String,
    schema: Vec<Feature>,
    classes: Vec<LinearClass>,
}

impl LinearModel {
    pub fn new(name: impl Into<String>, schema: Vec<Feature>, classes: Vec<LinearClass>) -> Self {
        Self {
            name: name.into(),
            schema,
            classes,
        }
    }
}

impl Classifier for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, features: &FeatureVector) -> Classification {
        let Some(x) = features.select(&self.schema) else {
            debug!(model = %self.name, "Model input incomplete, holding");
            return Classification::hold();
        };

        let scores: Vec<f64> = self
            .classes
            .iter()
            .map(|c| c.bias + c.weights.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>())
            .collect();

        let Some((best, &top)) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            return Classification::hold();
        };
        if !top.is_finite() {
            debug!(model = %self.name, "Non-finite score, holding");
            return Classification::hold();
        }

        let denom: f64 = scores.iter().map(|s| (s - top).exp()).sum();
        Classification {
            action: self.classes[best].action,
            confidence: Some(1.0 / denom),
        }
    }
}

const ACTIONS: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

fn slot(action: Action) -> usize {
    match action {
        Action::Buy => 0,
        Action::Sell => 1,
        Action::Hold => 2,
    }
}
