//! Live camera capture through V4L2 memory-mapped streaming.

use ouroboros::self_referencing;

use crate::capture::domain::frame_source::{FrameRead, FrameSource};
use crate::capture::domain::source_error::SourceError;
use crate::capture::infrastructure::pixel_format::{normalize_to_bgr, PixelFormat};
use crate::shared::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

#[self_referencing]
struct CameraStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

/// A V4L2 camera opened by numeric index (`/dev/video{id}`).
///
/// BGR3 is requested; RGB3, YUYV and MJPG are accepted and converted.
/// A camera has no end of stream: every failed dequeue is a read error.
pub struct V4l2Camera {
    path: String,
    state: CameraStream,
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_count: u64,
}

impl V4l2Camera {
    pub fn open(device_id: u32) -> Result<Self, SourceError> {
        Self::open_path(&format!("/dev/video{device_id}"))
    }

    pub fn open_path(path: &str) -> Result<Self, SourceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(path).map_err(|e| SourceError::open(path, e))?;
        let mut requested = device
            .format()
            .map_err(|e| SourceError::open(path, format!("read format: {e}")))?;
        requested.fourcc = v4l::FourCC::new(b"BGR3");

        let active = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: BGR3 rejected by {path}: {err}");
                device
                    .format()
                    .map_err(|e| SourceError::open(path, format!("read format: {e}")))?
            }
        };

        let format = PixelFormat::from_fourcc(&active.fourcc.repr).ok_or_else(|| {
            SourceError::open(
                path,
                format!("unsupported pixel format {}", active.fourcc),
            )
        })?;

        let state = CameraStreamTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|e| SourceError::open(path, format!("create buffer stream: {e}")))?;

        log::info!(
            "V4l2Camera: opened {path} ({}x{}, {:?})",
            active.width,
            active.height,
            format
        );

        Ok(Self {
            path: path.to_string(),
            state,
            width: active.width,
            height: active.height,
            format,
            frame_count: 0,
        })
    }

    /// Negotiated capture resolution.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for V4l2Camera {
    fn describe(&self) -> String {
        format!("camera {}", self.path)
    }

    fn read_frame(&mut self) -> Result<FrameRead, SourceError> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let pixels = self
            .state
            .with_stream_mut(|stream| {
                let (buf, meta) = stream.next()?;
                Ok::<_, std::io::Error>(buf[..(meta.bytesused as usize).min(buf.len())].to_vec())
            })
            .map_err(|e| SourceError::read(self.describe(), e))?;

        let bgr = normalize_to_bgr(&pixels, width, height, format)
            .map_err(|e| SourceError::read(self.describe(), e))?;

        let frame = Frame::new(bgr, width, height, 3, self.frame_count);
        self.frame_count += 1;
        Ok(FrameRead::Frame(frame))
    }
}

// V4L2 handles are only touched from the pipeline thread.
unsafe impl Send for V4l2Camera {}
