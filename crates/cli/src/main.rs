use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use camwatch_core::annotation::infrastructure::box_annotator::BoxAnnotator;
use camwatch_core::capture::domain::frame_source::FrameSource;
use camwatch_core::capture::infrastructure::source_factory::{open_source, SourceSpec};
use camwatch_core::detection::domain::coordinate_mapper::CoordinateMapper;
use camwatch_core::detection::domain::detector::Detector;
use camwatch_core::detection::infrastructure::cascade_detector::CascadeConfig;
use camwatch_core::detection::infrastructure::detector_factory::{
    create_detector, DetectorBackend, DetectorConfig,
};
use camwatch_core::detection::infrastructure::execution_provider::{
    describe_execution_providers, SessionPurpose,
};
use camwatch_core::detection::infrastructure::neural_detector::NeuralConfig;
use camwatch_core::pipeline::frame_sink::FrameSink;
use camwatch_core::pipeline::infrastructure::fan_out_sink::FanOutSink;
use camwatch_core::pipeline::infrastructure::image_directory_sink::ImageDirectorySink;
use camwatch_core::pipeline::infrastructure::json_lines_sink::JsonLinesSink;
use camwatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use camwatch_core::pipeline::pipeline_loop::PipelineLoop;
use camwatch_core::shared::constants::{
    default_artifact_path, DEFAULT_CAMERA_ID, DEFAULT_CASCADE_PATH, DEFAULT_MAX_DETECTIONS,
    DEFAULT_MIN_NEIGHBORS, DEFAULT_NEURAL_INPUT_SIZE, DEFAULT_NEURAL_MODEL,
    DEFAULT_NEURAL_MODEL_URL, DEFAULT_SCALE_FACTOR, DEFAULT_SCORE_THRESHOLD, MODELS_DIR,
};
use camwatch_core::shared::frame::Size;

/// Real-time object detection on a camera or video stream.
///
/// Every option can also be set through the environment variable shown in
/// its help text.
#[derive(Parser)]
#[command(name = "camwatch")]
struct Cli {
    /// Camera index (`/dev/video{N}`).
    #[arg(long, env = "CAMERA_ID", default_value_t = DEFAULT_CAMERA_ID)]
    camera_id: u32,

    /// Read from this image directory, video file or stream URL instead of
    /// the camera.
    #[arg(long, env = "FRAME_SOURCE")]
    source: Option<PathBuf>,

    /// Detector backend: cascade or neural.
    #[arg(long, env = "DETECTOR_BACKEND", default_value = "cascade")]
    backend: DetectorBackend,

    /// Cascade classifier XML file.
    #[arg(long, env = "CASCADE_PATH", default_value = DEFAULT_CASCADE_PATH)]
    cascade_path: PathBuf,

    /// Cascade pyramid scale step (> 1.0).
    #[arg(long, env = "CASCADE_SCALE_FACTOR", default_value_t = DEFAULT_SCALE_FACTOR)]
    scale_factor: f64,

    /// Neighbouring windows required to confirm a cascade detection.
    #[arg(long, env = "CASCADE_MIN_NEIGHBORS", default_value_t = DEFAULT_MIN_NEIGHBORS)]
    min_neighbors: u32,

    /// Neural base model name.
    #[arg(long, env = "DETECTOR_MODEL", default_value = DEFAULT_NEURAL_MODEL)]
    model: String,

    /// Download URL for the neural base model.
    #[arg(long, env = "DETECTOR_MODEL_URL", default_value = DEFAULT_NEURAL_MODEL_URL)]
    model_url: String,

    /// Optimized artifact path (default: ./models/{model}_optimized.onnx).
    #[arg(long, env = "OPTIMIZED_ARTIFACT_PATH")]
    artifact_path: Option<PathBuf>,

    /// Neural detection score threshold (0.0-1.0).
    #[arg(long, env = "SCORE_THRESHOLD", default_value_t = DEFAULT_SCORE_THRESHOLD)]
    score_threshold: f32,

    /// Maximum neural detections kept per frame.
    #[arg(long, env = "MAX_DETECTIONS", default_value_t = DEFAULT_MAX_DETECTIONS)]
    max_detections: usize,

    /// Square neural model input resolution.
    #[arg(long, env = "NEURAL_INPUT_SIZE", default_value_t = DEFAULT_NEURAL_INPUT_SIZE)]
    input_size: u32,

    /// Defer loading or building the neural model until the first frame.
    #[arg(long, env = "NEURAL_LAZY")]
    lazy: bool,

    /// Write detection events as JSON lines to this file ("-" for stdout).
    #[arg(long, env = "EVENTS_OUTPUT")]
    events: Option<String>,

    /// Save annotated frames as PNG files in this directory.
    #[arg(long, env = "ANNOTATED_OUTPUT_DIR")]
    annotated_dir: Option<PathBuf>,

    /// Save every Nth annotated frame.
    #[arg(long, env = "ANNOTATE_EVERY", default_value_t = 1)]
    annotate_every: u64,

    /// Stop after this many frames.
    #[arg(long, env = "MAX_FRAMES")]
    max_frames: Option<u64>,

    /// MQTT broker host; enables publishing detection events.
    #[cfg(feature = "mqtt")]
    #[arg(long, env = "MQTT_HOST")]
    mqtt_host: Option<String>,

    #[cfg(feature = "mqtt")]
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[cfg(feature = "mqtt")]
    #[arg(long, env = "MQTT_TOPIC", default_value = "camwatch/detections")]
    mqtt_topic: String,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns whether the pipeline terminated cleanly.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let detector = build_detector(&cli)?;
    let spec = match &cli.source {
        Some(path) => SourceSpec::Path(path.clone()),
        None => SourceSpec::Camera(cli.camera_id),
    };
    let source = open_source(&spec)?;
    log::info!("Opened {}", source.describe());
    let sink = build_sink(&cli)?;

    let terminate = Arc::new(AtomicBool::new(false));
    let flag = terminate.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    let report = PipelineLoop::new(
        source,
        detector,
        CoordinateMapper::new(),
        Box::new(BoxAnnotator::default()),
        sink,
        terminate,
        Box::new(StdoutPipelineLogger::default()),
    )
    .with_max_frames(cli.max_frames)
    .run();

    log::info!(
        "{} frames, {} detections, {} geometry warnings",
        report.frames_processed,
        report.detections_emitted,
        report.geometry_warnings
    );
    if report.reason.is_clean() {
        log::info!("Stopped: {}", report.reason);
        Ok(true)
    } else {
        eprintln!("Error: {}", report.reason);
        Ok(false)
    }
}

fn build_detector(cli: &Cli) -> Result<Box<dyn Detector>, Box<dyn std::error::Error>> {
    let config = match cli.backend {
        DetectorBackend::Cascade => DetectorConfig::Cascade(CascadeConfig {
            model_path: cli.cascade_path.clone(),
            scale_factor: cli.scale_factor,
            min_neighbors: cli.min_neighbors,
            min_size: None,
        }),
        DetectorBackend::Neural => {
            log::info!(
                "Execution providers: {}",
                describe_execution_providers(SessionPurpose::Inference)
            );
            DetectorConfig::Neural {
                config: NeuralConfig {
                    model_name: cli.model.clone(),
                    model_url: cli.model_url.clone(),
                    artifact_path: cli
                        .artifact_path
                        .clone()
                        .unwrap_or_else(|| default_artifact_path(&cli.model)),
                    bundled_dir: Some(PathBuf::from(MODELS_DIR)),
                    input_size: Size::new(cli.input_size, cli.input_size),
                    score_threshold: cli.score_threshold,
                    max_detections: cli.max_detections,
                    ..NeuralConfig::default()
                },
                lazy: cli.lazy,
            }
        }
    };
    Ok(create_detector(&config)?)
}

fn build_sink(cli: &Cli) -> Result<Box<dyn FrameSink>, Box<dyn std::error::Error>> {
    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
    match cli.events.as_deref() {
        Some("-") => sinks.push(Box::new(JsonLinesSink::stdout())),
        Some(path) => sinks.push(Box::new(JsonLinesSink::create(path.as_ref())?)),
        None => {}
    }
    if let Some(dir) = &cli.annotated_dir {
        sinks.push(Box::new(ImageDirectorySink::new(dir, cli.annotate_every)?));
    }
    #[cfg(feature = "mqtt")]
    if let Some(host) = &cli.mqtt_host {
        use camwatch_core::pipeline::infrastructure::mqtt_sink::{MqttConfig, MqttSink};
        sinks.push(Box::new(MqttSink::connect(&MqttConfig {
            host: host.clone(),
            port: cli.mqtt_port,
            topic: cli.mqtt_topic.clone(),
            ..MqttConfig::default()
        })));
    }
    if sinks.is_empty() {
        log::warn!("No output configured; detections are only counted");
    }
    Ok(Box::new(FanOutSink::new(sinks)))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(cli.scale_factor.is_finite() && cli.scale_factor > 1.0) {
        return Err(format!(
            "Scale factor must be greater than 1.0, got {}",
            cli.scale_factor
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.score_threshold) {
        return Err(format!(
            "Score threshold must be between 0.0 and 1.0, got {}",
            cli.score_threshold
        )
        .into());
    }
    if cli.max_detections == 0 {
        return Err("Max detections must be at least 1".into());
    }
    if cli.input_size == 0 {
        return Err("Neural input size must be positive".into());
    }
    if cli.annotate_every == 0 {
        return Err("Annotate-every interval must be at least 1".into());
    }
    if cli.max_frames == Some(0) {
        return Err("Max frames must be at least 1".into());
    }
    if let Some(source) = &cli.source {
        let looks_like_url = source.to_string_lossy().contains("://");
        if !looks_like_url && !source.exists() {
            return Err(format!("Frame source not found: {}", source.display()).into());
        }
    }
    Ok(())
}
