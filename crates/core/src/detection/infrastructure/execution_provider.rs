use std::path::Path;

use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware backends ONNX Runtime can hand graph partitions to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accelerator {
    TensorRt,
    Cuda,
    CoreMl,
    DirectMl,
}

impl Accelerator {
    pub fn name(self) -> &'static str {
        match self {
            Self::TensorRt => "TensorRT",
            Self::Cuda => "CUDA",
            Self::CoreMl => "CoreML",
            Self::DirectMl => "DirectML",
        }
    }

    /// Whether the provider replaces graph partitions with compiled nodes.
    /// ONNX Runtime cannot serialize an optimized model containing them.
    pub fn compiles_nodes(self) -> bool {
        matches!(self, Self::TensorRt | Self::CoreMl | Self::DirectMl)
    }

    fn dispatch(self, engine_cache: Option<&Path>) -> ExecutionProviderDispatch {
        match self {
            #[cfg(feature = "tensorrt")]
            Self::TensorRt => {
                let provider = ort::execution_providers::TensorRTExecutionProvider::default();
                match engine_cache {
                    Some(dir) => provider
                        .with_engine_cache(true)
                        .with_engine_cache_path(dir.display().to_string())
                        .build(),
                    None => provider.build(),
                }
            }
            #[cfg(feature = "cuda")]
            Self::Cuda => ort::execution_providers::CUDAExecutionProvider::default().build(),
            #[cfg(target_os = "macos")]
            Self::CoreMl => ort::execution_providers::CoreMLExecutionProvider::default().build(),
            #[cfg(target_os = "windows")]
            Self::DirectMl => {
                ort::execution_providers::DirectMLExecutionProvider::default().build()
            }
            #[allow(unreachable_patterns)]
            _ => {
                let _ = engine_cache;
                ort::execution_providers::CPUExecutionProvider::default().build()
            }
        }
    }
}

/// What a session is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPurpose {
    /// Running inference on frames.
    Inference,
    /// Writing the optimized graph to disk.
    BuildArtifact,
}

/// Accelerators compiled into this build, most preferred first.
pub fn enabled_accelerators() -> Vec<Accelerator> {
    let mut accelerators = Vec::new();
    if cfg!(feature = "tensorrt") {
        accelerators.push(Accelerator::TensorRt);
    }
    if cfg!(feature = "cuda") {
        accelerators.push(Accelerator::Cuda);
    }
    if cfg!(target_os = "macos") {
        accelerators.push(Accelerator::CoreMl);
    }
    if cfg!(target_os = "windows") {
        accelerators.push(Accelerator::DirectMl);
    }
    accelerators
}

/// Accelerators to register for `purpose`. Artifact builds skip providers
/// that compile nodes so the optimized graph stays serializable.
pub fn accelerators_for(purpose: SessionPurpose) -> Vec<Accelerator> {
    let mut accelerators = enabled_accelerators();
    if purpose == SessionPurpose::BuildArtifact {
        accelerators.retain(|a| !a.compiles_nodes());
    }
    accelerators
}

/// Execution providers for `purpose`. ONNX Runtime falls back to the CPU
/// provider when none of these can be registered, so an empty list means
/// "CPU only". `engine_cache` is where TensorRT persists built engines.
pub fn execution_providers_for(
    purpose: SessionPurpose,
    engine_cache: Option<&Path>,
) -> Vec<ExecutionProviderDispatch> {
    accelerators_for(purpose)
        .into_iter()
        .map(|a| a.dispatch(engine_cache))
        .collect()
}

/// Provider chain for `purpose`, for log lines (e.g. `CUDA > CPU`).
pub fn describe_execution_providers(purpose: SessionPurpose) -> String {
    let mut names: Vec<&str> = accelerators_for(purpose)
        .into_iter()
        .map(Accelerator::name)
        .collect();
    names.push("CPU");
    names.join(" > ")
}
