use std::collections::VecDeque;

use async_trait::async_trait;

use super::preprocess::{Tensor, TensorShape};
use crate::error::DetectError;

/// Opaque ad-likelihood model: a preprocessed tensor in, one score out
#[async_trait]
pub trait Classifier: Send {
    /// Load the model. Failure here is fatal for the detector.
    async fn initialize(&mut self) -> Result<(), DetectError>;

    /// Score in [0, 1]; higher means more likely an advertisement.
    async fn predict(&mut self, input: &Tensor) -> Result<f32, DetectError>;

    fn is_ready(&self) -> bool;

    fn input_shape(&self) -> TensorShape;

    fn output_shape(&self) -> &[usize] {
        &[1, 1]
    }

    fn model_version(&self) -> &str;

    async fn close(&mut self) -> Result<(), DetectError> {
        Ok(())
    }
}

/// Replays a fixed list of scores. Stands in for a real model in tests and demos.
pub struct ScriptedClassifier {
    script: Vec<f32>,
    pending: VecDeque<f32>,
    cycle: bool,
    shape: TensorShape,
    version: String,
    fail_load: bool,
    fail_calls: Vec<usize>,
    calls: usize,
    ready: bool,
}

impl ScriptedClassifier {
    pub fn new(scores: impl IntoIterator<Item = f32>) -> Self {
        let script: Vec<f32> = scores.into_iter().collect();
        Self {
            pending: script.iter().copied().collect(),
            script,
            cycle: false,
            shape: TensorShape::image(224, 224),
            version: "scripted-1".into(),
            fail_load: false,
            fail_calls: Vec::new(),
            calls: 0,
            ready: false,
        }
    }

    /// Start over from the first score once the script runs out.
    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn with_input_shape(mut self, shape: TensorShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Pretend the model file is missing.
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Fail the n-th predict call (zero based).
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_calls.push(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn initialize(&mut self) -> Result<(), DetectError> {
        if self.fail_load {
            return Err(DetectError::ModelLoad(format!(
                "model {} could not be loaded",
                self.version
            )));
        }
        self.ready = true;
        Ok(())
    }

    async fn predict(&mut self, input: &Tensor) -> Result<f32, DetectError> {
        if !self.ready {
            return Err(DetectError::NotInitialized);
        }
        if input.shape != self.shape || input.data.len() != self.shape.len() {
            return Err(DetectError::Inference(format!(
                "input shape {:?} does not match model {:?}",
                input.shape, self.shape
            )));
        }

        let call = self.calls;
        self.calls += 1;
        if self.fail_calls.contains(&call) {
            return Err(DetectError::Inference(format!("scripted failure on call {}", call)));
        }

        if self.pending.is_empty() && self.cycle {
            self.pending.extend(self.script.iter().copied());
        }
        self.pending
            .pop_front()
            .ok_or_else(|| DetectError::Inference("score script exhausted".into()))
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn model_version(&self) -> &str {
        &self.version
    }

    async fn close(&mut self) -> Result<(), DetectError> {
        self.ready = false;
        Ok(())
    }
}
