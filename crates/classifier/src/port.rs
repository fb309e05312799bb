use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use indicators::FeatureVector;

use crate::artifact::{LoadError, ModelArtifact, ModelSpec};
use crate::model::{ForestModel, LinearModel};
use crate::{Classification, Classifier};

/// Artifact locations, read from the `[classifier]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub primary: PathBuf,
    pub fallback: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            primary: PathBuf::from("models/random_forest.json"),
            fallback: Some(PathBuf::from("models/linear.json")),
        }
    }
}

/// Which artifact the port ended up serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PortMode {
    Primary { model: String },
    Fallback { model: String },
    HoldOnly { reason: String },
}

/// The classifier the pipeline talks to. Loaded once at startup; never fails
/// to construct. Without a usable artifact every call returns Hold.
pub struct ClassifierPort {
    inner: Option<Box<dyn Classifier>>,
    mode: PortMode,
    reported: AtomicBool,
}

impl ClassifierPort {
    /// Load the primary artifact, falling back to the secondary one only when
    /// the primary file does not exist. An artifact that exists but fails to
    /// parse or validate puts the port in Hold-only mode.
    pub fn load(cfg: &ClassifierConfig) -> Self {
        match try_artifact(&cfg.primary) {
            Ok(model) => {
                info!(model = %model.name(), path = %cfg.primary.display(), "Loaded primary model");
                let mode = PortMode::Primary {
                    model: model.name().to_string(),
                };
                return Self::serving(model, mode);
            }
            Err(LoadError::Invalid(e)) => {
                return Self::hold_only(format!(
                    "primary model {} unusable: {e}",
                    cfg.primary.display()
                ));
            }
            Err(LoadError::NotFound) => {
                warn!(path = %cfg.primary.display(), "Primary model not found, attempting fallback");
            }
        }

        let Some(fallback) = &cfg.fallback else {
            return Self::hold_only("no model available".to_string());
        };

        match try_artifact(fallback) {
            Ok(model) => {
                info!(model = %model.name(), path = %fallback.display(), "Loaded fallback model");
                let mode = PortMode::Fallback {
                    model: model.name().to_string(),
                };
                Self::serving(model, mode)
            }
            Err(LoadError::Invalid(e)) => Self::hold_only(format!(
                "fallback model {} unusable: {e}",
                fallback.display()
            )),
            Err(LoadError::NotFound) => Self::hold_only("no model available".to_string()),
        }
    }

    /// Wrap an already-built classifier, used by tests and embedders.
    pub fn with_classifier(classifier: Box<dyn Classifier>) -> Self {
        let mode = PortMode::Primary {
            model: classifier.name().to_string(),
        };
        Self::serving(classifier, mode)
    }

    pub fn hold_only(reason: String) -> Self {
        error!(%reason, "Classifier disabled, every decision will be Hold");
        Self {
            inner: None,
            mode: PortMode::HoldOnly { reason },
            reported: AtomicBool::new(false),
        }
    }

    fn serving(inner: Box<dyn Classifier>, mode: PortMode) -> Self {
        Self {
            inner: Some(inner),
            mode,
            reported: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> &PortMode {
        &self.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.is_none()
    }
}

impl Classifier for ClassifierPort {
    fn name(&self) -> &str {
        match &self.inner {
            Some(model) => model.name(),
            None => "hold-only",
        }
    }

    fn classify(&self, features: &FeatureVector) -> Classification {
        match &self.inner {
            Some(model) => model.classify(features),
            None => {
                if let PortMode::HoldOnly { reason } = &self.mode {
                    if !self.reported.swap(true, Ordering::Relaxed) {
                        warn!(%reason, "Model not loaded, skipping prediction");
                    } else {
                        debug!(%reason, "Model not loaded, skipping prediction");
                    }
                }
                Classification::hold()
            }
        }
    }
}

fn try_artifact(path: &Path) -> Result<Box<dyn Classifier>, LoadError> {
    let (artifact, schema) = ModelArtifact::load(path)?;
    let label = format!("{}@{}", artifact.name, artifact.version);
    let model: Box<dyn Classifier> = match artifact.model {
        ModelSpec::Forest { trees } => Box::new(ForestModel::new(label, schema, trees)),
        ModelSpec::Linear { classes } => Box::new(LinearModel::new(label, schema, classes)),
    };
    Ok(model)
}
