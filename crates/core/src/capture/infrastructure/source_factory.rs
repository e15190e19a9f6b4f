use std::path::PathBuf;

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::domain::source_error::SourceError;

use super::image_sequence_source::ImageSequenceSource;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Live camera by index.
    Camera(u32),
    /// A directory of images, or a video file / stream URL.
    Path(PathBuf),
}

/// Opens the adapter matching `spec`.
///
/// Adapters compiled out of this build report a [`SourceError::Open`]
/// naming the Cargo feature that enables them.
pub fn open_source(spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError> {
    match spec {
        SourceSpec::Camera(id) => open_camera(*id),
        SourceSpec::Path(path) if path.is_dir() => Ok(Box::new(ImageSequenceSource::open(path)?)),
        SourceSpec::Path(path) => open_video(path.to_string_lossy().as_ref()),
    }
}

#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
fn open_camera(id: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(super::v4l2_camera::V4l2Camera::open(id)?))
}

#[cfg(not(all(feature = "camera-v4l2", target_os = "linux")))]
fn open_camera(id: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::open(
        format!("camera {id}"),
        "camera capture requires the `camera-v4l2` feature on Linux",
    ))
}

#[cfg(feature = "ffmpeg")]
fn open_video(location: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(super::ffmpeg_source::FfmpegSource::open(location)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(location: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::open(
        location,
        "video decoding requires the `ffmpeg` feature",
    ))
}
