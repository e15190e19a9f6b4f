use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};

use crate::capture::infrastructure::pixel_format::bgr_to_rgb;
use crate::detection::domain::detector::{Detector, ReferenceSpace};
use crate::detection::domain::detector_error::{ConfigurationError, InferenceError};
use crate::shared::constants::{
    default_artifact_path, DEFAULT_MAX_DETECTIONS, DEFAULT_NEURAL_INPUT_SIZE,
    DEFAULT_NEURAL_MODEL, DEFAULT_NEURAL_MODEL_URL, DEFAULT_SCORE_THRESHOLD, MODELS_DIR,
    SSD_BOXES_TENSOR, SSD_CLASSES_TENSOR, SSD_INPUT_TENSOR, SSD_NUM_DETECTIONS_TENSOR,
    SSD_SCORES_TENSOR,
};
use crate::shared::detection::RawDetection;
use crate::shared::frame::{Frame, Size};
use crate::shared::model_resolver;

use super::execution_provider::{
    accelerators_for, describe_execution_providers, execution_providers_for, Accelerator,
    SessionPurpose,
};
use super::optimized_artifact::{load_or_build, ArtifactOrigin};
use super::ssd_output::decode_detections;

const BACKEND: &str = "neural";

/// Tensor names of an SSD graph exported with the TF Object Detection API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsdTensorNames {
    pub input: String,
    pub boxes: String,
    pub scores: String,
    pub classes: String,
    pub num_detections: String,
}

impl Default for SsdTensorNames {
    fn default() -> Self {
        Self {
            input: SSD_INPUT_TENSOR.to_string(),
            boxes: SSD_BOXES_TENSOR.to_string(),
            scores: SSD_SCORES_TENSOR.to_string(),
            classes: SSD_CLASSES_TENSOR.to_string(),
            num_detections: SSD_NUM_DETECTIONS_TENSOR.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NeuralConfig {
    /// Base model name; the base file is `{model_name}.onnx`.
    pub model_name: String,
    /// Where to download the base model when no local copy exists.
    pub model_url: String,
    /// Optimized artifact: loaded if present, otherwise built and written here.
    pub artifact_path: PathBuf,
    /// Directory searched for a bundled base model before downloading.
    pub bundled_dir: Option<PathBuf>,
    /// Download cache override; `None` uses the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub input_size: Size,
    pub score_threshold: f32,
    pub max_detections: usize,
    pub tensors: SsdTensorNames,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_NEURAL_MODEL.to_string(),
            model_url: DEFAULT_NEURAL_MODEL_URL.to_string(),
            artifact_path: default_artifact_path(DEFAULT_NEURAL_MODEL),
            bundled_dir: Some(PathBuf::from(MODELS_DIR)),
            cache_dir: None,
            input_size: Size::new(DEFAULT_NEURAL_INPUT_SIZE, DEFAULT_NEURAL_INPUT_SIZE),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            tensors: SsdTensorNames::default(),
        }
    }
}

impl NeuralConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.input_size.width == 0 || self.input_size.height == 0 {
            return Err(ConfigurationError::InvalidParameter(format!(
                "input resolution must be non-zero, got {}x{}",
                self.input_size.width, self.input_size.height
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "score threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        if self.max_detections == 0 {
            return Err(ConfigurationError::InvalidParameter(
                "max detections must be at least 1".into(),
            ));
        }
        if self.model_name.is_empty() {
            return Err(ConfigurationError::InvalidParameter(
                "model name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Single-shot detector running on ONNX Runtime.
///
/// Frames are resized to the fixed input resolution and fed as uint8 RGB
/// NHWC. Boxes come back normalized per axis, with a score and class id.
/// The inference session is backed by an optimized artifact on disk that is
/// built on first use when missing.
pub struct NeuralDetector {
    config: NeuralConfig,
    session: Option<Session>,
}

impl NeuralDetector {
    /// Validates the configuration and initializes the session immediately.
    pub fn new(config: NeuralConfig) -> Result<Self, ConfigurationError> {
        let mut detector = Self::lazy(config)?;
        ensure_session(&mut detector.session, &detector.config)?;
        Ok(detector)
    }

    /// Validates the configuration but defers loading (or building) the
    /// optimized artifact to the first `detect` call.
    pub fn lazy(config: NeuralConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            session: None,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &NeuralConfig {
        &self.config
    }
}

impl Detector for NeuralDetector {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn reference_space(&self) -> ReferenceSpace {
        ReferenceSpace::Normalized {
            input: self.config.input_size,
        }
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, InferenceError> {
        let input = preprocess(frame, self.config.input_size)
            .map_err(|e| InferenceError::new(BACKEND, e))?;
        let cfg = &self.config;
        let session = ensure_session(&mut self.session, cfg)?;

        let tensor = ort::value::Tensor::from_array(input)
            .map_err(|e| InferenceError::new(BACKEND, e))?;
        let outputs = session
            .run(ort::inputs![cfg.tensors.input.as_str() => tensor])
            .map_err(|e| InferenceError::new(BACKEND, e))?;

        let boxes = extract(&outputs, &cfg.tensors.boxes)?;
        let scores = extract(&outputs, &cfg.tensors.scores)?;
        let classes = extract(&outputs, &cfg.tensors.classes)?;
        let num = extract(&outputs, &cfg.tensors.num_detections)?
            .first()
            .copied()
            .unwrap_or(0.0)
            .max(0.0) as usize;

        Ok(decode_detections(
            &boxes,
            &scores,
            &classes,
            num,
            cfg.score_threshold,
            cfg.max_detections,
        ))
    }
}

fn ensure_session<'a>(
    slot: &'a mut Option<Session>,
    config: &NeuralConfig,
) -> Result<&'a mut Session, ConfigurationError> {
    if slot.is_none() {
        *slot = Some(initialize(config)?);
    }
    slot.as_mut()
        .ok_or_else(|| ConfigurationError::model_load(&config.artifact_path, "session unavailable"))
}

fn initialize(config: &NeuralConfig) -> Result<Session, ConfigurationError> {
    let (session, origin) = load_or_build(&config.artifact_path, load_session, |staging| {
        build_artifact(config, staging)
    })?;
    verify_tensor_names(&session, &config.tensors, &config.artifact_path)?;

    let how = match origin {
        ArtifactOrigin::Loaded => "loaded",
        ArtifactOrigin::Built => "built",
    };
    log::info!(
        "NeuralDetector: {} {} ({}x{} input, providers {})",
        how,
        config.artifact_path.display(),
        config.input_size.width,
        config.input_size.height,
        describe_execution_providers(SessionPurpose::Inference)
    );
    Ok(session)
}

fn load_session(path: &Path) -> Result<Session, ConfigurationError> {
    let err = |e: &dyn std::fmt::Display| ConfigurationError::model_load(path, e);
    let engine_cache = engine_cache_dir(path);
    if accelerators_for(SessionPurpose::Inference).contains(&Accelerator::TensorRt) {
        std::fs::create_dir_all(&engine_cache).map_err(|e| err(&e))?;
    }
    Session::builder()
        .map_err(|e| err(&e))?
        .with_optimization_level(GraphOptimizationLevel::Disable)
        .map_err(|e| err(&e))?
        .with_execution_providers(execution_providers_for(
            SessionPurpose::Inference,
            Some(&engine_cache),
        ))
        .map_err(|e| err(&e))?
        .commit_from_file(path)
        .map_err(|e| err(&e))
}

/// Directory next to the artifact where TensorRT keeps its built engines.
fn engine_cache_dir(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    artifact.with_file_name(format!("{stem}_engines"))
}

/// Resolves the base model and lets ONNX Runtime write the fully optimized
/// graph for this machine's accelerators to `staging`.
fn build_artifact(config: &NeuralConfig, staging: &Path) -> Result<(), ConfigurationError> {
    let base_name = format!("{}.onnx", config.model_name);
    let bundled = config.bundled_dir.as_deref();
    let resolved = match &config.cache_dir {
        Some(dir) => model_resolver::resolve_in(dir, &base_name, &config.model_url, bundled, None),
        None => model_resolver::resolve(&base_name, &config.model_url, bundled, None),
    };
    let base = resolved.map_err(|e| ConfigurationError::BaseModel {
        name: config.model_name.clone(),
        message: e.to_string(),
    })?;

    let staging_str = staging
        .to_str()
        .ok_or_else(|| ConfigurationError::model_load(staging, "path is not valid UTF-8"))?;
    log::info!(
        "Optimizing {} for {}",
        base.display(),
        describe_execution_providers(SessionPurpose::BuildArtifact)
    );

    let err = |e: &dyn std::fmt::Display| ConfigurationError::model_load(&base, e);
    let session = Session::builder()
        .map_err(|e| err(&e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| err(&e))?
        .with_execution_providers(execution_providers_for(SessionPurpose::BuildArtifact, None))
        .map_err(|e| err(&e))?
        .with_optimized_model_path(staging_str)
        .map_err(|e| err(&e))?
        .commit_from_file(&base)
        .map_err(|e| err(&e))?;
    drop(session);
    Ok(())
}

fn verify_tensor_names(
    session: &Session,
    names: &SsdTensorNames,
    artifact: &Path,
) -> Result<(), ConfigurationError> {
    let inputs: Vec<&str> = session.inputs().iter().map(|i| i.name()).collect();
    if !inputs.contains(&names.input.as_str()) {
        return Err(ConfigurationError::model_load(
            artifact,
            format!("model has no input {:?} (inputs: {inputs:?})", names.input),
        ));
    }

    let outputs: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
    for wanted in [&names.boxes, &names.scores, &names.classes, &names.num_detections] {
        if !outputs.contains(&wanted.as_str()) {
            return Err(ConfigurationError::model_load(
                artifact,
                format!("model has no output {wanted:?} (outputs: {outputs:?})"),
            ));
        }
    }
    Ok(())
}

fn extract(outputs: &SessionOutputs, name: &str) -> Result<Vec<f32>, InferenceError> {
    let value = outputs
        .get(name)
        .ok_or_else(|| InferenceError::new(BACKEND, format!("missing output {name}")))?;
    let array = value
        .try_extract_array::<f32>()
        .map_err(|e| InferenceError::new(BACKEND, format!("{name}: {e}")))?;
    Ok(array.iter().copied().collect())
}

/// Resizes a BGR frame to the model input and lays it out as uint8
/// `[1, H, W, 3]` in RGB order.
fn preprocess(frame: &Frame, input: Size) -> Result<Array4<u8>, String> {
    let rgb = RgbImage::from_raw(frame.width(), frame.height(), bgr_to_rgb(frame.data()))
        .ok_or("frame buffer size mismatch")?;
    let resized = if rgb.dimensions() == (input.width, input.height) {
        rgb
    } else {
        imageops::resize(&rgb, input.width, input.height, FilterType::Triangle)
    };
    Array4::from_shape_vec(
        (1, input.height as usize, input.width as usize, 3),
        resized.into_raw(),
    )
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn offline_config(tmp: &TempDir) -> NeuralConfig {
        NeuralConfig {
            model_name: "missing_model".into(),
            model_url: "http://127.0.0.1:9/missing_model.onnx".into(),
            artifact_path: tmp.path().join("missing_model_optimized.onnx"),
            bundled_dir: Some(tmp.path().join("bundled")),
            cache_dir: Some(tmp.path().join("cache")),
            ..NeuralConfig::default()
        }
    }

    #[test]
    fn test_preprocess_resizes_to_input_and_swaps_to_rgb() {
        let mut frame = Frame::black(8, 4, 0);
        for y in 0..4 {
            for x in 0..8 {
                frame.put_pixel(x, y, [255, 0, 0]);
            }
        }
        let tensor = preprocess(&frame, Size::new(3, 3)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 3, 3]);
        assert_eq!(tensor[[0, 1, 1, 0]], 0);
        assert_eq!(tensor[[0, 1, 1, 2]], 255);
    }

    #[test]
    fn test_preprocess_keeps_matching_resolution() {
        let frame = Frame::black(5, 7, 0);
        let tensor = preprocess(&frame, Size::new(5, 7)).unwrap();
        assert_eq!(tensor.shape(), &[1, 7, 5, 3]);
    }

    #[test]
    fn test_reference_space_is_normalized_input() {
        let tmp = TempDir::new().unwrap();
        let detector = NeuralDetector::lazy(offline_config(&tmp)).unwrap();
        assert_eq!(
            detector.reference_space(),
            ReferenceSpace::Normalized {
                input: Size::new(300, 300)
            }
        );
    }

    #[test]
    fn test_engine_cache_sits_next_to_artifact() {
        let dir = engine_cache_dir(Path::new("models/ssd_optimized.onnx"));
        assert_eq!(dir, Path::new("models/ssd_optimized_engines"));
    }

    #[test]
    fn test_lazy_construction_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = offline_config(&tmp);
        let detector = NeuralDetector::lazy(config.clone()).unwrap();
        assert!(!detector.is_initialized());
        assert!(!config.artifact_path.exists());
        assert!(!tmp.path().join("cache").exists());
    }

    #[test]
    fn test_missing_base_model_is_fatal_at_construction() {
        let tmp = TempDir::new().unwrap();
        let err = NeuralDetector::new(offline_config(&tmp)).err().unwrap();
        assert!(matches!(
            err,
            ConfigurationError::BaseModel { ref name, .. } if name == "missing_model"
        ));
        assert!(!tmp.path().join("missing_model_optimized.onnx").exists());
    }

    #[test]
    fn test_lazy_initialization_failure_surfaces_on_first_detect() {
        let tmp = TempDir::new().unwrap();
        let mut detector = NeuralDetector::lazy(offline_config(&tmp)).unwrap();
        let err = detector.detect(&Frame::black(16, 16, 0)).unwrap_err();
        assert_eq!(err.backend, "neural");
        assert!(err.message.contains("missing_model"));
        assert!(!detector.is_initialized());
    }

    #[test]
    fn test_corrupt_artifact_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let config = offline_config(&tmp);
        std::fs::write(&config.artifact_path, b"not an onnx graph").unwrap();
        let err = NeuralDetector::new(config).err().unwrap();
        assert!(matches!(err, ConfigurationError::ModelLoad { .. }));
    }

    #[rstest]
    #[case::threshold_above_one(NeuralConfig { score_threshold: 1.5, ..NeuralConfig::default() })]
    #[case::threshold_nan(NeuralConfig { score_threshold: f32::NAN, ..NeuralConfig::default() })]
    #[case::no_detections(NeuralConfig { max_detections: 0, ..NeuralConfig::default() })]
    #[case::zero_input(NeuralConfig { input_size: Size::new(0, 300), ..NeuralConfig::default() })]
    fn test_invalid_parameters_are_rejected(#[case] config: NeuralConfig) {
        assert!(matches!(
            NeuralDetector::lazy(config),
            Err(ConfigurationError::InvalidParameter(_))
        ));
    }
}
