//! ONNX Runtime classifier loaded from `detector.model_path`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ndarray::Array4;
use ort::{GraphOptimizationLevel, Session};
use tracing::{debug, info};

use super::classifier::Classifier;
use super::preprocess::{Tensor, TensorShape};
use crate::error::DetectError;

struct LoadedModel {
    session: Session,
    output: String,
}

/// Scores frames with an image classifier exported to ONNX.
///
/// The model takes one NCHW f32 tensor. It returns either a single ad
/// probability or a pair of `[content, ad]` logits.
pub struct OnnxClassifier {
    path: PathBuf,
    shape: TensorShape,
    version: String,
    model: Option<Arc<LoadedModel>>,
}

impl OnnxClassifier {
    pub fn new(path: impl Into<PathBuf>, shape: TensorShape) -> Self {
        let path = path.into();
        let version = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".into());
        Self {
            path,
            shape,
            version,
            model: None,
        }
    }
}

fn load(path: &Path) -> Result<LoadedModel, DetectError> {
    let load_err = |e: ort::Error| DetectError::ModelLoad(format!("{}: {}", path.display(), e));
    let session = Session::builder()
        .map_err(load_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_err)?
        .commit_from_file(path)
        .map_err(load_err)?;
    let output = session
        .outputs
        .first()
        .map(|o| o.name.clone())
        .ok_or_else(|| DetectError::ModelLoad(format!("{} has no outputs", path.display())))?;
    Ok(LoadedModel { session, output })
}

fn run(model: &LoadedModel, input: Array4<f32>) -> Result<Vec<f32>, DetectError> {
    let infer = |e: ort::Error| DetectError::Inference(e.to_string());
    let outputs = model
        .session
        .run(ort::inputs![input].map_err(infer)?)
        .map_err(infer)?;
    let output = outputs
        .get(model.output.as_str())
        .ok_or_else(|| DetectError::Inference(format!("missing output {}", model.output)))?;
    let values: ndarray::ArrayViewD<f32> = output.try_extract_tensor().map_err(infer)?;
    Ok(values.iter().copied().collect())
}

/// Ad probability from the raw model output.
fn ad_score(values: &[f32]) -> Result<f32, DetectError> {
    match values {
        [p] => Ok(*p),
        [content, ad] => Ok(1.0 / (1.0 + (content - ad).exp())),
        _ => Err(DetectError::Inference(format!(
            "expected 1 or 2 output values, got {}",
            values.len()
        ))),
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    async fn initialize(&mut self) -> Result<(), DetectError> {
        if !self.path.is_file() {
            return Err(DetectError::ModelLoad(format!(
                "model file not found: {}",
                self.path.display()
            )));
        }
        let path = self.path.clone();
        let model = tokio::task::spawn_blocking(move || load(&path)).await??;
        info!(model = %self.path.display(), output = %model.output, "ONNX model loaded");
        self.model = Some(Arc::new(model));
        Ok(())
    }

    async fn predict(&mut self, input: &Tensor) -> Result<f32, DetectError> {
        let model = self.model.clone().ok_or(DetectError::NotInitialized)?;
        if input.shape != self.shape {
            return Err(DetectError::Inference(format!(
                "input shape {:?} does not match model {:?}",
                input.shape, self.shape
            )));
        }
        let s = input.shape;
        let array = Array4::from_shape_vec((s.batch, s.channels, s.height, s.width), input.data.clone())
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let values = tokio::task::spawn_blocking(move || run(&model, array)).await??;
        let score = ad_score(&values)?;
        debug!(score, "onnx inference");
        Ok(score)
    }

    fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn model_version(&self) -> &str {
        &self.version
    }

    async fn close(&mut self) -> Result<(), DetectError> {
        self.model = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut classifier =
            OnnxClassifier::new(dir.path().join("ads-v2.onnx"), TensorShape::image(8, 8));
        assert_eq!(classifier.model_version(), "ads-v2");
        assert!(matches!(
            classifier.initialize().await,
            Err(DetectError::ModelLoad(_))
        ));
        assert!(!classifier.is_ready());
    }

    #[tokio::test]
    async fn corrupt_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        let mut classifier = OnnxClassifier::new(path, TensorShape::image(8, 8));
        assert!(matches!(
            classifier.initialize().await,
            Err(DetectError::ModelLoad(_))
        ));
    }

    #[tokio::test]
    async fn predict_before_initialize_is_rejected() {
        let mut classifier = OnnxClassifier::new("ads.onnx", TensorShape::image(2, 2));
        let input = Tensor {
            shape: TensorShape::image(2, 2),
            data: vec![0.0; 12],
        };
        assert!(matches!(
            classifier.predict(&input).await,
            Err(DetectError::NotInitialized)
        ));
    }

    #[test]
    fn output_is_read_as_probability_or_logits() {
        assert_eq!(ad_score(&[0.8]).unwrap(), 0.8);
        assert!((ad_score(&[0.0, 0.0]).unwrap() - 0.5).abs() < 1e-6);
        assert!(ad_score(&[-2.0, 3.0]).unwrap() > 0.99);
        assert!(ad_score(&[0.1, 0.2, 0.7]).is_err());
    }
}
