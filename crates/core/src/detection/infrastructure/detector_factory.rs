use std::fmt;
use std::str::FromStr;

use crate::detection::domain::detector::Detector;
use crate::detection::domain::detector_error::ConfigurationError;

use super::cascade_detector::{CascadeConfig, CascadeDetector};
use super::neural_detector::{NeuralConfig, NeuralDetector};

/// Detector backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorBackend {
    Cascade,
    Neural,
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(Self::Cascade),
            "neural" => Ok(Self::Neural),
            other => Err(format!(
                "unknown detector backend {other:?} (expected cascade or neural)"
            )),
        }
    }
}

impl fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cascade => "cascade",
            Self::Neural => "neural",
        })
    }
}

/// Backend-specific detector parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectorConfig {
    Cascade(CascadeConfig),
    /// `lazy` defers loading or building the optimized artifact to the
    /// first frame.
    Neural { config: NeuralConfig, lazy: bool },
}

impl DetectorConfig {
    pub fn backend(&self) -> DetectorBackend {
        match self {
            Self::Cascade(_) => DetectorBackend::Cascade,
            Self::Neural { .. } => DetectorBackend::Neural,
        }
    }
}

/// Builds the configured detector. Every configuration problem surfaces
/// here, before the pipeline opens its frame source.
pub fn create_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigurationError> {
    match config {
        DetectorConfig::Cascade(cascade) => {
            log::info!(
                "Using cascade detector {} (scale_factor={}, min_neighbors={})",
                cascade.model_path.display(),
                cascade.scale_factor,
                cascade.min_neighbors
            );
            Ok(Box::new(CascadeDetector::new(cascade)?))
        }
        DetectorConfig::Neural { config, lazy } => {
            log::info!(
                "Using neural detector {} (threshold={}, max_detections={}, lazy={})",
                config.model_name,
                config.score_threshold,
                config.max_detections,
                lazy
            );
            let detector = if *lazy {
                NeuralDetector::lazy(config.clone())?
            } else {
                NeuralDetector::new(config.clone())?
            };
            Ok(Box::new(detector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector::ReferenceSpace;
    use crate::detection::infrastructure::cascade_classifier::tests::EDGE_CASCADE;
    use rstest::rstest;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[rstest]
    #[case("cascade", DetectorBackend::Cascade)]
    #[case("Neural", DetectorBackend::Neural)]
    #[case(" neural ", DetectorBackend::Neural)]
    fn test_backend_parses(#[case] raw: &str, #[case] expected: DetectorBackend) {
        assert_eq!(raw.parse::<DetectorBackend>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<DetectorBackend>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!("yolo".parse::<DetectorBackend>().unwrap_err().contains("yolo"));
    }

    #[test]
    fn test_creates_cascade_detector() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("edge.xml");
        std::fs::write(&path, EDGE_CASCADE).unwrap();

        let config = DetectorConfig::Cascade(CascadeConfig {
            model_path: path,
            ..CascadeConfig::default()
        });
        let detector = create_detector(&config).unwrap();
        assert_eq!(detector.name(), "cascade");
        assert_eq!(detector.reference_space(), ReferenceSpace::Frame);
        assert_eq!(config.backend(), DetectorBackend::Cascade);
    }

    #[test]
    fn test_missing_cascade_fails() {
        let config = DetectorConfig::Cascade(CascadeConfig {
            model_path: PathBuf::from("/nonexistent/cascade.xml"),
            ..CascadeConfig::default()
        });
        assert!(create_detector(&config).is_err());
    }

    #[test]
    fn test_lazy_neural_detector_is_created_without_model() {
        let tmp = TempDir::new().unwrap();
        let config = DetectorConfig::Neural {
            config: NeuralConfig {
                artifact_path: tmp.path().join("absent.onnx"),
                ..NeuralConfig::default()
            },
            lazy: true,
        };
        let detector = create_detector(&config).unwrap();
        assert_eq!(detector.name(), "neural");
        assert!(!tmp.path().join("absent.onnx").exists());
    }
}
