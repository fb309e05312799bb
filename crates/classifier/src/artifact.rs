use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Action, Error, Result};
use indicators::Feature;

/// On-disk model artifact.
///
/// ```json
/// {
///   "name": "random_forest",
///   "version": "2024-06-01",
///   "features": ["close", "rsi", "macd"],
///   "model": { "kind": "forest", "trees": [[
///     { "split": { "feature": 1, "threshold": 60.0, "left": 1, "right": 2 } },
///     { "leaf": { "action": "hold" } },
///     { "leaf": { "action": "buy" } }
///   ]] }
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: String,
    /// Input names in training order.
    pub features: Vec<String>,
    pub model: ModelSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSpec {
    Forest { trees: Vec<Vec<TreeNode>> },
    Linear { classes: Vec<LinearClass> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeNode {
    /// Go to `left` when `x[feature] <= threshold`, otherwise `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { action: Action },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinearClass {
    pub action: Action,
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

/// Why an artifact could not be used.
#[derive(Debug)]
pub enum LoadError {
    /// Nothing at the path. The only case that falls through to the fallback.
    NotFound,
    Invalid(Error),
}

impl ModelArtifact {
    /// Read and validate an artifact file.
    pub fn load(path: &Path) -> Result<(Self, Vec<Feature>), LoadError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LoadError::NotFound),
            Err(e) => return Err(LoadError::Invalid(Error::Io(e))),
        };
        let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            LoadError::Invalid(Error::Artifact(format!("{}: {e}", path.display())))
        })?;
        let schema = artifact.validate().map_err(LoadError::Invalid)?;
        Ok((artifact, schema))
    }

    /// Check the artifact against the feature vector contract and its own
    /// internal consistency. Returns the resolved input schema.
    pub fn validate(&self) -> Result<Vec<Feature>> {
        if self.features.is_empty() {
            return Err(mismatch(&self.name, "artifact declares no input features"));
        }

        let mut schema = Vec::with_capacity(self.features.len());
        for name in &self.features {
            let feature: Feature = name.parse().map_err(|e| mismatch(&self.name, e))?;
            if schema.contains(&feature) {
                return Err(mismatch(&self.name, format!("feature '{name}' listed twice")));
            }
            schema.push(feature);
        }

        match &self.model {
            ModelSpec::Forest { trees } => {
                if trees.is_empty() {
                    return Err(mismatch(&self.name, "forest has no trees"));
                }
                for (t, tree) in trees.iter().enumerate() {
                    validate_tree(tree, schema.len()).map_err(|e| {
                        mismatch(&self.name, format!("tree {t}: {e}"))
                    })?;
                }
            }
            ModelSpec::Linear { classes } => {
                if classes.is_empty() {
                    return Err(mismatch(&self.name, "linear model has no classes"));
                }
                for class in classes {
                    if class.weights.len() != schema.len() {
                        return Err(mismatch(
                            &self.name,
                            format!(
                                "class {} has {} weights for {} features",
                                class.action,
                                class.weights.len(),
                                schema.len()
                            ),
                        ));
                    }
                }
            }
        }

        Ok(schema)
    }
}

fn validate_tree(nodes: &[TreeNode], n_features: usize) -> std::result::Result<(), String> {
    if nodes.is_empty() {
        return Err("empty tree".into());
    }
    for (i, node) in nodes.iter().enumerate() {
        if let TreeNode::Split {
            feature,
            left,
            right,
            ..
        } = node
        {
            if *feature >= n_features {
                return Err(format!("node {i} splits on feature index {feature} of {n_features}"));
            }
            // children strictly after their parent: rules out cycles
            for child in [left, right] {
                if *child <= i || *child >= nodes.len() {
                    return Err(format!("node {i} has invalid child {child}"));
                }
            }
        }
    }
    Ok(())
}

fn mismatch(name: &str, detail: impl std::fmt::Display) -> Error {
    Error::SchemaMismatch(format!("{name}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest(features: &[&str], trees: &str) -> ModelArtifact {
        let json = format!(
            r#"{{"name":"rf","version":"1","features":{},"model":{{"kind":"forest","trees":{trees}}}}}"#,
            serde_json::to_string(features).unwrap()
        );
        serde_json::from_str(&json).unwrap()
    }

    const STUMP: &str = r#"[[
        {"split":{"feature":0,"threshold":60.0,"left":1,"right":2}},
        {"leaf":{"action":"hold"}},
        {"leaf":{"action":"buy"}}
    ]]"#;

    #[test]
    fn valid_forest_resolves_schema() {
        let artifact = forest(&["rsi", "close"], STUMP);
        assert_eq!(artifact.validate().unwrap(), vec![Feature::Rsi, Feature::Close]);
    }

    #[test]
    fn unknown_feature_is_schema_mismatch() {
        let artifact = forest(&["rsi", "bollinger_upper"], STUMP);
        assert!(matches!(artifact.validate(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn duplicate_feature_is_schema_mismatch() {
        let artifact = forest(&["rsi", "rsi"], STUMP);
        assert!(matches!(artifact.validate(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn split_index_out_of_range() {
        let tree = r#"[[
            {"split":{"feature":3,"threshold":1.0,"left":1,"right":2}},
            {"leaf":{"action":"hold"}},
            {"leaf":{"action":"buy"}}
        ]]"#;
        let artifact = forest(&["rsi"], tree);
        assert!(matches!(artifact.validate(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn backward_child_is_rejected() {
        let tree = r#"[[
            {"split":{"feature":0,"threshold":1.0,"left":0,"right":1}},
            {"leaf":{"action":"hold"}}
        ]]"#;
        let artifact = forest(&["rsi"], tree);
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn linear_weight_count_must_match() {
        let json = r#"{"name":"lin","version":"1","features":["rsi","macd"],
            "model":{"kind":"linear","classes":[{"action":"buy","weights":[1.0],"bias":0.0}]}}"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        assert!(matches!(artifact.validate(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelArtifact::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(LoadError::NotFound)));
    }

    #[test]
    fn garbage_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"\x00\x01 not json").unwrap();
        let result = ModelArtifact::load(&path);
        assert!(matches!(result, Err(LoadError::Invalid(Error::Artifact(_)))));
    }
}
