use super::ExecutionProvider;
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// A loaded ONNX Runtime session with a single tensor input.
pub struct OrtModel {
    session: Session,
    path: String,
}

impl OrtModel {
    pub fn load(
        path: &str,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        #[allow(unused_mut)]
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        match provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!(path, "Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            #[cfg(not(feature = "cuda"))]
            ExecutionProvider::Cuda => {
                tracing::warn!(
                    path,
                    "CUDA requested but the `cuda` feature is not enabled; using CPU"
                );
            }
            ExecutionProvider::Cpu => {
                tracing::info!(path, "Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!("Model loaded from {}", path);
        Ok(Self {
            session,
            path: path.to_string(),
        })
    }

    /// Run the session on one input tensor and return the named outputs, in order.
    pub fn run(
        &mut self,
        input_name: &str,
        input: &Array<f32, IxDyn>,
        output_names: &[&str],
    ) -> anyhow::Result<Vec<ArrayD<f32>>> {
        let outputs = self.session.run(ort::inputs![
            input_name => TensorRef::from_array_view(input.view())?
        ])?;

        output_names
            .iter()
            .map(|name| {
                let value = outputs.get(*name).ok_or_else(|| {
                    anyhow::anyhow!("Model {} has no output named '{}'", self.path, name)
                })?;
                Ok(value.try_extract_array::<f32>()?.into_owned())
            })
            .collect()
    }
}
