use std::path::Path;

use ndarray::{Array4, ArrayD};
use ort::{inputs, ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::{ExecutionProvider, OcrError, Result};

/// One neural stage: a normalized `[1, 3, H, W]` tensor in, the stage's raw
/// output tensor out.
///
/// Detector, classifier and recognizer all go through this, so alternative
/// backends or synthetic stages only need to implement `run`.
pub trait Inference: Send + Sync {
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Custom model metadata, used to find an embedded vocabulary.
    fn metadata(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

impl<F> Inference for F
where
    F: Fn(Array4<f32>) -> Result<ArrayD<f32>> + Send + Sync,
{
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        self(input)
    }
}

/// Which network a session runs. Only affects TensorRT shape profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Detector { max_side_len: u32 },
    Classifier,
    Recognizer,
}

impl ModelKind {
    fn name(self) -> &'static str {
        match self {
            ModelKind::Detector { .. } => "Detector",
            ModelKind::Classifier => "Classifier",
            ModelKind::Recognizer => "Recognizer",
        }
    }
}

/// ONNX Runtime session plus the name of its single input. The session is
/// released when this is dropped.
pub struct OnnxModel {
    session: Session,
    input_name: String,
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(kind: ModelKind, cache_path: std::path::PathBuf) -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    let (min, opt, max) = match kind {
        ModelKind::Detector { max_side_len } => (
            "x:1x3x32x32".to_string(),
            format!("x:1x3x{max_side_len}x{max_side_len}"),
            format!("x:1x3x{max_side_len}x{max_side_len}"),
        ),
        ModelKind::Classifier => (
            "x:1x3x48x192".to_string(),
            "x:1x3x48x192".to_string(),
            "x:1x3x48x192".to_string(),
        ),
        ModelKind::Recognizer => (
            "x:1x3x48x1".to_string(),
            "x:1x3x48x256".to_string(),
            format!("x:1x3x48x{}", u16::MAX),
        ),
    };

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes(min)
        .with_profile_max_shapes(max)
        .with_profile_opt_shapes(opt)
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .with_builder_optimization_level(5)
        .with_detailed_build_log(true)
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

impl OnnxModel {
    #[instrument(level = "debug", skip(execution_providers))]
    pub fn load(
        kind: ModelKind,
        path: &Path,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        if !path.is_file() {
            return Err(OcrError::ModelNotFound {
                stage: kind.name(),
                path: path.to_path_buf(),
            });
        }

        #[cfg(feature = "directml")]
        let parallel = !execution_providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        #[cfg(feature = "tensorrt")]
        let cache_path = cache_path.map(Path::to_path_buf).unwrap_or_else(|| {
            path.parent()
                .map(|parent| parent.join(".cache"))
                .unwrap_or_else(|| ".cache".into())
        });
        #[cfg(not(feature = "tensorrt"))]
        let _ = cache_path;

        let providers = execution_providers
            .iter()
            .filter_map(|provider| -> Option<ExecutionProviderDispatch> {
                match provider {
                    ExecutionProvider::Default => None,
                    #[cfg(feature = "tensorrt")]
                    ExecutionProvider::TensorRT => Some(setup_tensorrt(kind, cache_path.clone())),
                    #[cfg(feature = "cuda")]
                    ExecutionProvider::Cuda => Some(setup_cuda()),
                    #[cfg(feature = "directml")]
                    ExecutionProvider::DirectML => Some(setup_directml()),
                    #[cfg(feature = "coreml")]
                    ExecutionProvider::CoreML => Some(setup_coreml()),
                }
            })
            .collect::<Vec<_>>();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_memory_pattern(parallel)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(providers)?
            .commit_from_file(path)?;

        log::debug!("{} inputs: {:?}", kind.name(), session.inputs);
        log::debug!("{} outputs: {:?}", kind.name(), session.outputs);

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        Ok(Self {
            session,
            input_name,
        })
    }
}

impl Inference for OnnxModel {
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input]?)?;
        let (_, output) = outputs.first_key_value().ok_or(OcrError::EmptyOutput)?;
        Ok(output.try_extract_tensor::<f32>()?.to_owned())
    }

    fn metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self.session.metadata()?.custom(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn closures_are_inference_stages() {
        let stage = |input: Array4<f32>| -> Result<ArrayD<f32>> {
            Ok(ArrayD::from_elem(IxDyn(&[1, input.dim().3]), 0.5))
        };
        let boxed: Box<dyn Inference> = Box::new(stage);
        let output = boxed.run(Array4::zeros((1, 3, 4, 7))).unwrap();
        assert_eq!(output.shape(), &[1, 7]);
        assert_eq!(boxed.metadata("character").unwrap(), None);
    }

    #[test]
    fn missing_model_file_is_reported() {
        let err = OnnxModel::load(
            ModelKind::Classifier,
            Path::new("does/not/exist.onnx"),
            1,
            &[ExecutionProvider::Default],
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            OcrError::ModelNotFound {
                stage: "Classifier",
                ..
            }
        ));
    }
}
