/// Camera index used when none is configured (`/dev/video1`).
pub const DEFAULT_CAMERA_ID: u32 = 1;

pub const DEFAULT_CASCADE_PATH: &str = "./models/haarcascade_frontalface_default.xml";
pub const DEFAULT_SCALE_FACTOR: f64 = 1.3;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;

/// Rectangle similarity tolerance used when grouping cascade candidates.
pub const GROUP_EPS: f64 = 0.2;

pub const DEFAULT_NEURAL_MODEL: &str = "ssd_mobilenet_v1_10";
pub const DEFAULT_NEURAL_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/object_detection_segmentation/ssd-mobilenetv1/model/ssd_mobilenet_v1_10.onnx";

/// Directory holding cascade files and optimized inference artifacts.
pub const MODELS_DIR: &str = "./models";

pub const DEFAULT_NEURAL_INPUT_SIZE: u32 = 300;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_DETECTIONS: usize = 100;

pub const SSD_INPUT_TENSOR: &str = "image_tensor:0";
pub const SSD_BOXES_TENSOR: &str = "detection_boxes:0";
pub const SSD_SCORES_TENSOR: &str = "detection_scores:0";
pub const SSD_CLASSES_TENSOR: &str = "detection_classes:0";
pub const SSD_NUM_DETECTIONS_TENSOR: &str = "num_detections:0";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Default optimized-artifact location for a model name.
pub fn default_artifact_path(model_name: &str) -> std::path::PathBuf {
    std::path::Path::new(MODELS_DIR).join(format!("{model_name}_optimized.onnx"))
}
