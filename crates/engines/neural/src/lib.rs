//! Neural Evaluators
//!
//! Concrete [`BatchEvaluator`]s for the search engine. Inputs are dense
//! feature vectors produced by the host's [`GameRules::encode`]; outputs are
//! scores from the maximizing side's point of view.
//!
//! # Model Loading
//!
//! Models are loaded from the `models/` directory with versioned subdirectories:
//! ```text
//! models/
//!   v001/
//!     linear.json
//!   v002/
//!     model.onnx
//! ```
//!
//! `model.onnx` is used when the `onnx` feature is enabled and the file
//! exists, otherwise `linear.json`.
//!
//! [`GameRules::encode`]: search_core::GameRules::encode

mod linear;
#[cfg(feature = "onnx")]
mod onnx;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use search_core::{BatchEvaluator, EvaluatorError};

pub use linear::{Activation, LinearModel};
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

pub const ONNX_MODEL_FILE: &str = "model.onnx";
pub const LINEAR_MODEL_FILE: &str = "linear.json";

enum Backend {
    Linear(LinearModel),
    #[cfg(feature = "onnx")]
    Onnx(OnnxModel),
}

/// A loaded evaluation model.
pub struct NeuralEvaluator {
    backend: Backend,
    version: String,
    model_path: Option<PathBuf>,
    evaluated: u64,
}

impl NeuralEvaluator {
    /// Wrap an in-memory linear model.
    pub fn from_linear(model: LinearModel) -> Self {
        Self {
            backend: Backend::Linear(model),
            version: "linear-inline".to_string(),
            model_path: None,
            evaluated: 0,
        }
    }

    /// Load model `version` from `models_dir`.
    ///
    /// # Example
    /// ```ignore
    /// let evaluator = NeuralEvaluator::with_model("models/", "v001")?;
    /// ```
    pub fn with_model(
        models_dir: impl AsRef<Path>,
        version: &str,
    ) -> Result<Self, EvaluatorError> {
        let dir = models_dir.as_ref().join(version);

        #[cfg(feature = "onnx")]
        {
            let onnx_path = dir.join(ONNX_MODEL_FILE);
            if onnx_path.exists() {
                let model = OnnxModel::load(&onnx_path)?;
                info!(
                    version,
                    path = %onnx_path.display(),
                    input_size = model.input_size(),
                    batched = model.is_batched(),
                    "Loaded ONNX model"
                );
                return Ok(Self {
                    backend: Backend::Onnx(model),
                    version: version.to_string(),
                    model_path: Some(onnx_path),
                    evaluated: 0,
                });
            }
        }

        let linear_path = dir.join(LINEAR_MODEL_FILE);
        if !linear_path.exists() {
            return Err(EvaluatorError::Model(format!(
                "Model not found: {}",
                dir.display()
            )));
        }
        let model = LinearModel::load(&linear_path)?;
        info!(
            version,
            path = %linear_path.display(),
            input_size = model.input_size(),
            "Loaded linear model"
        );
        Ok(Self {
            backend: Backend::Linear(model),
            version: version.to_string(),
            model_path: Some(linear_path),
            evaluated: 0,
        })
    }

    /// Returns the loaded model version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the file the model was loaded from, if any.
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Feature count the model expects. Shorter inputs are zero-padded.
    pub fn input_size(&self) -> usize {
        match &self.backend {
            Backend::Linear(model) => model.input_size(),
            #[cfg(feature = "onnx")]
            Backend::Onnx(model) => model.input_size(),
        }
    }

    /// Positions scored so far.
    pub fn evaluated(&self) -> u64 {
        self.evaluated
    }
}

impl BatchEvaluator for NeuralEvaluator {
    type Input = Vec<f32>;

    fn score_batch(&mut self, inputs: &[Vec<f32>]) -> Result<Vec<f32>, EvaluatorError> {
        let scores = match &self.backend {
            Backend::Linear(model) => model.score_batch(inputs),
            #[cfg(feature = "onnx")]
            Backend::Onnx(model) => model.score_batch(inputs)?,
        };
        self.evaluated += scores.len() as u64;
        debug!(batch = inputs.len(), total = self.evaluated, "Scored batch");
        Ok(scores)
    }
}
