#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_source;
pub mod image_sequence_source;
pub mod pixel_format;
pub mod source_factory;
#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
pub mod v4l2_camera;
