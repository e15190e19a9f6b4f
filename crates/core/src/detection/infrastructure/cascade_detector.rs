use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::capture::infrastructure::pixel_format::bgr_to_gray;
use crate::detection::domain::detector::{Detector, ReferenceSpace};
use crate::detection::domain::detector_error::{ConfigurationError, InferenceError};
use crate::shared::constants::{
    DEFAULT_CASCADE_PATH, DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR, GROUP_EPS,
};
use crate::shared::detection::{RawBox, RawDetection};
use crate::shared::frame::{Frame, Size};

use super::cascade_classifier::HaarCascade;
use super::integral_image::IntegralImage;
use super::rect_grouping::{group_rectangles, Rect};

#[derive(Clone, Debug, PartialEq)]
pub struct CascadeConfig {
    pub model_path: PathBuf,
    /// Pyramid step between scales; must be greater than 1.
    pub scale_factor: f64,
    /// Neighbouring windows required to confirm an object. 0 disables
    /// grouping and returns every accepted window.
    pub min_neighbors: u32,
    /// Smallest object searched for. Defaults to the cascade window.
    pub min_size: Option<Size>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_CASCADE_PATH),
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: None,
        }
    }
}

/// Multi-scale sliding-window Haar cascade running on the native frame.
///
/// Boxes come back in frame pixels and carry no confidence score.
pub struct CascadeDetector {
    cascade: HaarCascade,
    scale_factor: f64,
    min_neighbors: u32,
    min_size: Size,
}

impl CascadeDetector {
    /// Loads the classifier definition. Fails before any frame is read if
    /// the file is missing or not a supported cascade.
    pub fn new(config: &CascadeConfig) -> Result<Self, ConfigurationError> {
        if !config.scale_factor.is_finite() || config.scale_factor <= 1.0 {
            return Err(ConfigurationError::InvalidParameter(format!(
                "scale factor must be greater than 1.0, got {}",
                config.scale_factor
            )));
        }
        if !config.model_path.is_file() {
            return Err(ConfigurationError::model_load(
                &config.model_path,
                "cascade file not found",
            ));
        }

        let cascade = HaarCascade::load(&config.model_path)?;
        let (ww, wh) = cascade.window_size();
        let min_size = config.min_size.unwrap_or(Size::new(ww, wh));

        Ok(Self {
            cascade,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size,
        })
    }

    /// Accepted windows across all pyramid levels, in frame pixels.
    fn candidates(&self, gray: GrayImage) -> Vec<Rect> {
        let (ww, wh) = self.cascade.window_size();
        let (fw, fh) = gray.dimensions();
        let mut found = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let level_w = (fw as f64 / factor).round() as u32;
            let level_h = (fh as f64 / factor).round() as u32;
            if level_w < ww || level_h < wh {
                break;
            }

            let win_w = (ww as f64 * factor).round() as u32;
            let win_h = (wh as f64 * factor).round() as u32;
            if win_w >= self.min_size.width && win_h >= self.min_size.height {
                let level = if level_w == fw && level_h == fh {
                    gray.clone()
                } else {
                    imageops::resize(&gray, level_w, level_h, FilterType::Triangle)
                };
                let ii = IntegralImage::new(level.as_raw(), level_w, level_h);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..=level_h - wh).step_by(step) {
                    for x in (0..=level_w - ww).step_by(step) {
                        if self.cascade.accepts(&ii, x, y) {
                            found.push(Rect::new(
                                (x as f64 * factor).round() as i32,
                                (y as f64 * factor).round() as i32,
                                win_w as i32,
                                win_h as i32,
                            ));
                        }
                    }
                }
            }

            factor *= self.scale_factor;
        }

        found
    }
}

impl Detector for CascadeDetector {
    fn name(&self) -> &'static str {
        "cascade"
    }

    fn reference_space(&self) -> ReferenceSpace {
        ReferenceSpace::Frame
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, InferenceError> {
        let gray = GrayImage::from_raw(frame.width(), frame.height(), bgr_to_gray(frame.data()))
            .ok_or_else(|| InferenceError::new(self.name(), "frame buffer size mismatch"))?;

        let candidates = self.candidates(gray);
        let grouped = group_rectangles(&candidates, self.min_neighbors, GROUP_EPS);
        log::debug!(
            "Cascade: {} windows accepted, {} objects after grouping",
            candidates.len(),
            grouped.len()
        );

        Ok(grouped
            .into_iter()
            .map(|r| RawDetection {
                bbox: RawBox::from_xywh(r.x as f64, r.y as f64, r.width as f64, r.height as f64),
                confidence: None,
                class_id: None,
            })
            .collect())
    }
}
