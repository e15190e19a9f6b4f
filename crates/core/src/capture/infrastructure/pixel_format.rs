//! Conversions from device pixel layouts into the pipeline's BGR8 layout.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr24,
    Rgb24,
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    /// Maps a V4L2 FourCC code to a supported format.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"BGR3" => Some(Self::Bgr24),
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }
}

/// Converts a raw buffer in `format` into tightly packed BGR8.
pub fn normalize_to_bgr(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, String> {
    let expected_rgb = (width as usize) * (height as usize) * 3;
    match format {
        PixelFormat::Bgr24 => {
            check_len(pixels, expected_rgb, "BGR")?;
            Ok(pixels[..expected_rgb].to_vec())
        }
        PixelFormat::Rgb24 => {
            check_len(pixels, expected_rgb, "RGB")?;
            Ok(rgb_to_bgr(&pixels[..expected_rgb]))
        }
        PixelFormat::Yuyv => yuyv_to_bgr(pixels, width, height),
        PixelFormat::Mjpeg => {
            let img = image::load_from_memory_with_format(pixels, image::ImageFormat::Jpeg)
                .map_err(|e| format!("MJPEG decode failed: {e}"))?
                .to_rgb8();
            if img.width() != width || img.height() != height {
                return Err(format!(
                    "MJPEG frame is {}x{}, expected {width}x{height}",
                    img.width(),
                    img.height()
                ));
            }
            Ok(rgb_to_bgr(img.as_raw()))
        }
    }
}

/// Swaps the first and third channel of every pixel.
pub fn rgb_to_bgr(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len());
    for px in rgb.chunks_exact(3) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out
}

/// The same swap in the other direction.
pub fn bgr_to_rgb(bgr: &[u8]) -> Vec<u8> {
    rgb_to_bgr(bgr)
}

/// BT.601 luma from interleaved BGR8.
pub fn bgr_to_gray(bgr: &[u8]) -> Vec<u8> {
    bgr.chunks_exact(3)
        .map(|px| {
            let y = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
            clamp_to_u8(y)
        })
        .collect()
}

fn yuyv_to_bgr(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 {
        return Err(format!("YUYV frame width must be even, got {w}"));
    }
    check_len(pixels, w * h * 2, "YUYV")?;

    let mut bgr = Vec::with_capacity(w * h * 3);
    for quad in pixels[..w * h * 2].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0] as f32, quad[2] as f32] {
            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;
            bgr.extend_from_slice(&[clamp_to_u8(b), clamp_to_u8(g), clamp_to_u8(r)]);
        }
    }
    Ok(bgr)
}

fn check_len(pixels: &[u8], expected: usize, label: &str) -> Result<(), String> {
    if pixels.len() < expected {
        return Err(format!(
            "{label} frame length mismatch: expected {expected}, got {}",
            pixels.len()
        ));
    }
    Ok(())
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
