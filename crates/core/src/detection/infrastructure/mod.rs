mod cascade_classifier;
pub mod cascade_detector;
pub mod detector_factory;
pub mod execution_provider;
mod integral_image;
pub mod neural_detector;
pub mod optimized_artifact;
mod rect_grouping;
pub mod ssd_output;
