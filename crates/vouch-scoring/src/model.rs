//! Learned-model scoring with transparent rule-based fallback.
//!
//! The model is an opaque [`ModelArtifact`]. [`ModelScorer`] guards every
//! call: load failures, inference errors, panics inside the artifact and
//! out-of-range outputs all substitute the rule-based result for that call.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vouch_core::constants::{EXPLANATION_TOP_FACTORS, MAX_SCORE};
use vouch_core::error::ModelError;
use vouch_core::traits::{ModelArtifact, ModelLoader};
use vouch_core::types::WalletFeatures;

use crate::rule::RuleBasedScorer;
use crate::scorer::BasePrediction;

// ---------------------------------------------------------------------------
// LinearModel artifact
// ---------------------------------------------------------------------------

/// Standardization and weight for one model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeight {
    pub weight: f64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

/// Logistic regression over standardized numeric features.
///
/// `p = sigmoid(intercept + Σ weight · (x - mean) / scale)`. A missing feature
/// is imputed with its mean and so contributes nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub version: String,
    pub intercept: f64,
    pub weights: BTreeMap<String, LinearWeight>,
}

impl LinearModel {
    /// Reject artifacts that could produce non-finite outputs.
    pub fn validate(&self) -> Result<(), String> {
        if !self.intercept.is_finite() {
            return Err("intercept is not finite".into());
        }
        for (name, w) in &self.weights {
            if !(w.weight.is_finite() && w.mean.is_finite()) {
                return Err(format!("{name}: weight and mean must be finite"));
            }
            if !(w.scale.is_finite() && w.scale > 0.0) {
                return Err(format!("{name}: scale must be positive"));
            }
        }
        Ok(())
    }

    fn contributions(&self, features: &WalletFeatures) -> Vec<(String, f64)> {
        self.weights
            .iter()
            .map(|(name, w)| {
                let x = features.number(name).unwrap_or(w.mean);
                (name.clone(), w.weight * (x - w.mean) / w.scale)
            })
            .collect()
    }
}

impl ModelArtifact for LinearModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict_single(&self, features: &WalletFeatures) -> Result<f64, ModelError> {
        let z = self.intercept
            + self
                .contributions(features)
                .iter()
                .map(|(_, c)| c)
                .sum::<f64>();
        if !z.is_finite() {
            return Err(ModelError::Inference(format!("logit is not finite: {z}")));
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }

    fn explain(
        &self,
        features: &WalletFeatures,
        top_n: usize,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        let mut ranked = self.contributions(features);
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        Ok(ranked)
    }
}

// ---------------------------------------------------------------------------
// FileModelLoader
// ---------------------------------------------------------------------------

/// Loads `<dir>/<version>.json` as a [`LinearModel`].
pub struct FileModelLoader {
    dir: PathBuf,
}

impl FileModelLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, version: &str) -> Result<PathBuf, ModelError> {
        let valid = !version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !version.contains("..");
        if !valid {
            return Err(ModelError::LoadFailed {
                version: version.to_string(),
                reason: "invalid version name".into(),
            });
        }
        Ok(self.dir.join(format!("{version}.json")))
    }
}

impl ModelLoader for FileModelLoader {
    fn load(&self, version: &str) -> Result<Arc<dyn ModelArtifact>, ModelError> {
        let failed = |reason: String| ModelError::LoadFailed {
            version: version.to_string(),
            reason,
        };
        let path = self.path_for(version)?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| failed(format!("{}: {e}", path.display())))?;
        let model: LinearModel = serde_json::from_str(&raw).map_err(|e| failed(e.to_string()))?;
        if model.version != version {
            return Err(failed(format!("artifact declares version {}", model.version)));
        }
        model.validate().map_err(failed)?;
        Ok(Arc::new(model))
    }
}

// ---------------------------------------------------------------------------
// ModelScorer
// ---------------------------------------------------------------------------

/// Guards a loaded artifact and falls back to [`RuleBasedScorer`] per call.
pub struct ModelScorer {
    loader: Arc<dyn ModelLoader>,
    active: RwLock<Option<Arc<dyn ModelArtifact>>>,
    fallback: RuleBasedScorer,
    top_n: usize,
}

impl ModelScorer {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            active: RwLock::new(None),
            fallback: RuleBasedScorer::new(),
            top_n: EXPLANATION_TOP_FACTORS,
        }
    }

    /// Load `version` and make it active. On failure the previously active
    /// artifact (if any) stays in place.
    pub fn load(&self, version: &str) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.loader.load(version))) {
            Ok(Ok(artifact)) => {
                info!(version, "model: loaded");
                *self.active.write() = Some(artifact);
                true
            }
            Ok(Err(e)) => {
                warn!(version, "model: load failed: {e}");
                false
            }
            Err(_) => {
                warn!(version, "model: loader panicked");
                false
            }
        }
    }

    /// Version of the active artifact, if one is loaded.
    pub fn active_version(&self) -> Option<String> {
        self.active.read().as_ref().map(|m| m.version().to_string())
    }

    /// Score with the active model, or with the rule-based scorer if the
    /// model is absent or fails for this call. Never fails.
    pub fn predict(&self, features: &WalletFeatures) -> BasePrediction {
        let artifact = self.active.read().clone();
        let result = match artifact {
            Some(artifact) => self.infer(artifact.as_ref(), features),
            None => Err(ModelError::NotLoaded),
        };
        match result {
            Ok(prediction) => prediction,
            Err(e) => {
                debug!("model: falling back to rule-based scorer: {e}");
                BasePrediction::from_rule(&self.fallback.score(features), self.top_n)
            }
        }
    }

    fn infer(
        &self,
        artifact: &dyn ModelArtifact,
        features: &WalletFeatures,
    ) -> Result<BasePrediction, ModelError> {
        let p = catch_unwind(AssertUnwindSafe(|| artifact.predict_single(features)))
            .map_err(|_| ModelError::Inference("artifact panicked".into()))??;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ModelError::InvalidOutput(format!("probability {p} outside [0, 1]")));
        }

        // Attribution is best effort; a prediction without it is still valid.
        let factors = match catch_unwind(AssertUnwindSafe(|| artifact.explain(features, self.top_n))) {
            Ok(Ok(factors)) => factors,
            Ok(Err(e)) => {
                debug!("model: explain failed: {e}");
                Vec::new()
            }
            Err(_) => {
                debug!("model: explain panicked");
                Vec::new()
            }
        };

        Ok(BasePrediction {
            score: probability_to_score(p),
            factors,
            model_version: Some(artifact.version().to_string()),
            ml_used: true,
        })
    }
}

/// Map a probability in `[0, 1]` to a score in `0–1000`.
pub fn probability_to_score(p: f64) -> u16 {
    (p.clamp(0.0, 1.0) * f64::from(MAX_SCORE)).round() as u16
}
