use std::path::Path;

use ndarray::{Array2, Array4, CowArray};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::ValueType;

use crate::error::{DiagnosisError, Result};

/// A pretrained classifier: one row of class scores per input image.
pub trait Backend: Send {
    fn forward(&mut self, batch: Array4<f32>) -> Result<Array2<f32>>;

    /// Declared input dimensions, if the model publishes them.
    fn input_dims(&self) -> Option<Vec<i64>> {
        None
    }
}

pub struct OnnxModel {
    session: Session,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("session", &"ort::Session (not Debug)")
            .finish()
    }
}

impl OnnxModel {
    pub fn load(model_path: impl AsRef<Path>, cuda: bool) -> Result<Self> {
        let model_path = model_path.as_ref();
        let provider: ExecutionProviderDispatch = if cuda {
            CUDAExecutionProvider::default().build().error_on_failure()
        } else {
            CPUExecutionProvider::default().build()
        };
        let session = SessionBuilder::new()?
            .with_execution_providers([provider])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;

        let model = Self { session };
        model.summary(model_path);
        Ok(model)
    }

    fn summary(&self, model_path: &Path) {
        for input in &self.session.inputs {
            tracing::info!(model = %model_path.display(), name = %input.name, shape = ?tensor_dims(&input.input_type), "model input");
        }
        for output in &self.session.outputs {
            tracing::info!(model = %model_path.display(), name = %output.name, shape = ?tensor_dims(&output.output_type), "model output");
        }
    }
}

fn tensor_dims(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { dimensions, .. } => Some(dimensions.clone()),
        _ => None,
    }
}

impl Backend for OnnxModel {
    fn forward(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        let t = std::time::Instant::now();
        let xs = CowArray::from(batch.into_dyn());
        let input_data = ort::inputs![xs.view()]?;
        let ys = self.session.run(input_data)?;

        let (_name, first) = ys
            .iter()
            .next()
            .ok_or_else(|| DiagnosisError::UnexpectedOutput(Vec::new()))?;
        let scores = first.try_extract_tensor::<f32>()?.into_owned();
        tracing::debug!(elapsed = ?t.elapsed(), shape = ?scores.shape(), "model forward");

        squeeze_scores(scores)
    }

    fn input_dims(&self) -> Option<Vec<i64>> {
        self.session.inputs.first().and_then(|input| tensor_dims(&input.input_type))
    }
}

/// Reduces `[N, C]` or `[N, C, 1, ...]` model output to `[N, C]`.
pub fn squeeze_scores(scores: ndarray::ArrayD<f32>) -> Result<Array2<f32>> {
    let shape = scores.shape().to_vec();
    if shape.len() < 2 || shape[2..].iter().any(|d| *d != 1) {
        return Err(DiagnosisError::UnexpectedOutput(shape));
    }
    Ok(scores.into_shape_with_order((shape[0], shape[1]))?)
}
