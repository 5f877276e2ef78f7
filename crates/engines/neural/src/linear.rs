//! Linear evaluation model stored as JSON.
//!
//! ```json
//! { "weights": [0.5, -0.25], "bias": 0.0, "activation": "tanh" }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use search_core::EvaluatorError;

/// Output squashing applied after the weighted sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    /// Scores land in (-1, 1), the range the value head of a network emits.
    #[default]
    Tanh,
}

/// A single dense layer with one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: f32,
    #[serde(default)]
    pub activation: Activation,
}

impl LinearModel {
    pub fn load(path: &Path) -> Result<Self, EvaluatorError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EvaluatorError::Model(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, EvaluatorError> {
        let model: Self = serde_json::from_str(contents)
            .map_err(|e| EvaluatorError::Model(format!("Failed to parse linear model: {}", e)))?;
        if model.weights.is_empty() {
            return Err(EvaluatorError::Model("Linear model has no weights".to_string()));
        }
        Ok(model)
    }

    pub fn input_size(&self) -> usize {
        self.weights.len()
    }

    /// Score one feature vector. Missing features count as zero and extra
    /// features are ignored.
    pub fn score(&self, features: &[f32]) -> f32 {
        let sum: f32 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias;
        match self.activation {
            Activation::Identity => sum,
            Activation::Tanh => sum.tanh(),
        }
    }

    pub fn score_batch(&self, inputs: &[Vec<f32>]) -> Vec<f32> {
        inputs.iter().map(|features| self.score(features)).collect()
    }
}

#[cfg(test)]
#[path = "linear_tests.rs"]
mod linear_tests;
