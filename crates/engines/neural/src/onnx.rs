//! ONNX model inference through tract.
//!
//! Requires the `onnx` feature.

use std::path::Path;

use tract_onnx::prelude::*;

use search_core::EvaluatorError;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn model_error(context: &str, e: impl std::fmt::Display) -> EvaluatorError {
    EvaluatorError::Model(format!("{}: {}", context, e))
}

fn inference_error(e: impl std::fmt::Display) -> EvaluatorError {
    EvaluatorError::Inference(e.to_string())
}

/// An ONNX value network.
///
/// A model whose leading input axis is symbolic scores a whole batch in one
/// run; a model with a fixed batch of one is run once per position.
pub struct OnnxModel {
    plan: Plan,
    input_size: usize,
    batched: bool,
}

impl OnnxModel {
    pub fn load(path: &Path) -> Result<Self, EvaluatorError> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| model_error("Failed to load ONNX model", e))?
            .into_optimized()
            .map_err(|e| model_error("Failed to optimize model", e))?
            .into_runnable()
            .map_err(|e| model_error("Failed to make model runnable", e))?;

        let input_fact = plan
            .model()
            .input_fact(0)
            .map_err(|e| model_error("Failed to get input fact", e))?;

        let batched = input_fact
            .shape
            .iter()
            .next()
            .is_some_and(|d| d.to_i64().is_err());
        // Symbolic dimensions (a free batch axis) are skipped
        let input_size = input_fact
            .shape
            .iter()
            .filter_map(|d| d.to_i64().ok())
            .product::<i64>() as usize;
        if input_size == 0 {
            return Err(EvaluatorError::Model(format!(
                "Model {} has an empty input",
                path.display()
            )));
        }

        Ok(Self {
            plan,
            input_size,
            batched,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Whether a batch runs as one inference.
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Score one feature vector, padded or truncated to the model's input size.
    pub fn score(&self, features: &[f32]) -> Result<f32, EvaluatorError> {
        let mut input = Vec::with_capacity(self.input_size);
        self.push_row(features, &mut input);
        self.run(1, input)?
            .into_iter()
            .next()
            .ok_or_else(|| EvaluatorError::Inference("Model output is empty".to_string()))
    }

    pub fn score_batch(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>, EvaluatorError> {
        if !self.batched || inputs.len() <= 1 {
            return inputs.iter().map(|features| self.score(features)).collect();
        }
        let mut flat = Vec::with_capacity(inputs.len() * self.input_size);
        for features in inputs {
            self.push_row(features, &mut flat);
        }
        self.run(inputs.len(), flat)
    }

    fn push_row(&self, features: &[f32], out: &mut Vec<f32>) {
        let copy_len = features.len().min(self.input_size);
        out.extend_from_slice(&features[..copy_len]);
        out.resize(out.len() + self.input_size - copy_len, 0.0);
    }

    /// Run `rows` stacked feature vectors and return one value per row.
    fn run(&self, rows: usize, flat: Vec<f32>) -> Result<Vec<f32>, EvaluatorError> {
        let tensor: Tensor = tract_ndarray::Array::from_shape_vec((rows, self.input_size), flat)
            .map_err(|e| EvaluatorError::Inference(format!("Bad input shape: {}", e)))?
            .into();

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(inference_error)?;
        let view = outputs
            .first()
            .ok_or_else(|| EvaluatorError::Inference("Model produced no output".to_string()))?
            .to_array_view::<f32>()
            .map_err(inference_error)?;
        let values: Vec<f32> = view.iter().copied().collect();
        first_per_row(&values, rows)
    }
}

/// First value of each of `rows` equal-sized output rows.
fn first_per_row(values: &[f32], rows: usize) -> Result<Vec<f32>, EvaluatorError> {
    if rows == 0 || values.len() < rows || values.len() % rows != 0 {
        return Err(EvaluatorError::LengthMismatch {
            expected: rows,
            actual: values.len(),
        });
    }
    let width = values.len() / rows;
    Ok(values.iter().step_by(width).copied().collect())
}

#[cfg(test)]
#[path = "onnx_tests.rs"]
mod onnx_tests;
