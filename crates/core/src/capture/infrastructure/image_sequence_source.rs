use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{FrameRead, FrameSource};
use crate::capture::domain::source_error::SourceError;
use crate::capture::infrastructure::pixel_format::rgb_to_bgr;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays a directory of still images as a frame stream.
///
/// Files are visited in lexicographic order and decoded with the `image`
/// crate; the stream ends after the last file.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let device = dir.display().to_string();
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::open(&device, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SourceError::open(&device, e))?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(SourceError::open(device, "directory contains no images"));
        }
        log::info!("Replaying {} images from {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!(
            "image sequence {} ({} images)",
            self.dir.display(),
            self.files.len()
        )
    }

    fn read_frame(&mut self) -> Result<FrameRead, SourceError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(FrameRead::EndOfStream);
        };
        let index = self.next as u64;
        self.next += 1;

        let img = image::open(path)
            .map_err(|e| SourceError::read(self.describe(), format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(FrameRead::Frame(Frame::new(
            rgb_to_bgr(img.as_raw()),
            width,
            height,
            3,
            index,
        )))
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
