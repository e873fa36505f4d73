/// Classifier boundary and the ONNX Runtime implementation backing it
use super::params::{Backend, Target};
use ndarray::Array5;
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("classifier session lock poisoned")]
    Poisoned,
}

/// Opaque forward pass: `[1, 3, T, H, W]` blob in, one score per class out
pub trait Classifier: Send + Sync {
    fn classify(&self, blob: Array5<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// Index of the highest score, first occurrence winning ties. NaN scores are ignored.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Execution provider chain derived from backend and target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    Cpu,
    Cuda,
    TensorRt { fp16: bool },
}

impl ExecutionPlan {
    pub fn resolve(backend: Backend, target: Target) -> Self {
        match (backend, target) {
            (Backend::TensorRt, target) => Self::TensorRt {
                fp16: target == Target::CudaFp16,
            },
            (Backend::Cuda, _) => Self::Cuda,
            (Backend::Default, Target::Cuda | Target::CudaFp16) => Self::Cuda,
            (Backend::Default, Target::Cpu) | (Backend::Cpu, _) => Self::Cpu,
        }
    }
}

/// 3D-CNN loaded into an ONNX Runtime session
pub struct OnnxClassifier {
    session: Mutex<Session>,
    model_path: PathBuf,
    plan: ExecutionPlan,
}

impl OnnxClassifier {
    /// Load an ONNX model. Blocking; call from a blocking context.
    pub fn load(path: &Path, backend: Backend, target: Target) -> Result<Self, ClassifierError> {
        let load_err = |reason: String| ClassifierError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let plan = ExecutionPlan::resolve(backend, target);

        let session_builder = Session::builder()
            .map_err(|e| load_err(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(e.to_string()))?;

        let mut session_builder = match plan {
            ExecutionPlan::Cuda => {
                tracing::info!("Using CUDA execution provider");
                session_builder.with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
            }
            ExecutionPlan::TensorRt { fp16 } => {
                tracing::info!(fp16, "Using TensorRT execution provider");
                session_builder.with_execution_providers([
                    TensorRTExecutionProvider::default().with_fp16(fp16).build(),
                    CPUExecutionProvider::default().build(),
                ])
            }
            ExecutionPlan::Cpu => {
                tracing::info!("Using CPU execution provider");
                session_builder
                    .with_execution_providers([CPUExecutionProvider::default().build()])
            }
        }
        .map_err(|e| load_err(e.to_string()))?;

        let session = session_builder
            .commit_from_file(path)
            .map_err(|e| load_err(e.to_string()))?;

        tracing::info!(model = %path.display(), plan = ?plan, "Action recognition model loaded");

        Ok(Self {
            session: Mutex::new(session),
            model_path: path.to_path_buf(),
            plan,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn plan(&self) -> ExecutionPlan {
        self.plan
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, blob: Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
        let input = Value::from_array(blob.into_dyn())
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = self.session.lock().map_err(|_| ClassifierError::Poisoned)?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        Ok(scores.to_vec())
    }
}
