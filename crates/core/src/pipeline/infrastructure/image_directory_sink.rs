use std::path::{Path, PathBuf};

use crate::capture::infrastructure::pixel_format::bgr_to_rgb;
use crate::pipeline::frame_sink::{DetectionEvent, FrameSink, SinkError};
use crate::shared::frame::Frame;

/// Saves annotated frames as PNG files named `frame_{index:06}.png`.
///
/// Only frames whose index is a multiple of `every` are written.
pub struct ImageDirectorySink {
    dir: PathBuf,
    every: u64,
}

impl ImageDirectorySink {
    pub fn new(dir: &Path, every: u64) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir).map_err(|e| SinkError::io(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            every: every.max(1),
        })
    }

    pub fn path_for(&self, frame_index: u64) -> PathBuf {
        self.dir.join(format!("frame_{frame_index:06}.png"))
    }
}

impl FrameSink for ImageDirectorySink {
    fn emit(&mut self, annotated: &Frame, _event: &DetectionEvent) -> Result<(), SinkError> {
        if annotated.index() % self.every != 0 {
            return Ok(());
        }
        let path = self.path_for(annotated.index());
        let name = path.display().to_string();
        let img = image::RgbImage::from_raw(
            annotated.width(),
            annotated.height(),
            bgr_to_rgb(annotated.data()),
        )
        .ok_or_else(|| SinkError::other(name.clone(), "frame buffer does not match its size"))?;
        img.save(&path).map_err(|e| SinkError::other(name, e))
    }
}
