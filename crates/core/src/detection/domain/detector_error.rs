use std::path::PathBuf;

use thiserror::Error;

/// A detector could not be constructed from its configuration or model files.
///
/// Raised before the pipeline starts; always fatal.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid detector parameter: {0}")]
    InvalidParameter(String),
    #[error("could not load {}: {message}", path.display())]
    ModelLoad { path: PathBuf, message: String },
    #[error("could not obtain base model {name}: {message}")]
    BaseModel { name: String, message: String },
}

impl ConfigurationError {
    pub fn model_load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// A detector backend failed while processing a frame.
#[derive(Error, Debug)]
#[error("{backend} detector failed: {message}")]
pub struct InferenceError {
    pub backend: &'static str,
    pub message: String,
}

impl InferenceError {
    pub fn new(backend: &'static str, message: impl ToString) -> Self {
        Self {
            backend,
            message: message.to_string(),
        }
    }
}

impl From<ConfigurationError> for InferenceError {
    /// Lazy initialization surfaces configuration problems on first use.
    fn from(e: ConfigurationError) -> Self {
        Self::new("neural", e)
    }
}
