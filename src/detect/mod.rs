pub mod classifier;
pub mod detector;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod result;
pub mod smoothing;

pub use classifier::{Classifier, ScriptedClassifier};
pub use detector::{DetectionStatsHandle, Detector};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use preprocess::{Preprocessor, Tensor, TensorShape};
pub use result::{ConfidenceBucket, DetectionResult, DetectionStats};
pub use smoothing::TemporalSmoother;
