use crate::capture::domain::frame_source::{FrameRead, FrameSource};
use crate::capture::domain::source_error::SourceError;
use crate::shared::frame::Frame;

/// Decodes a video file or network stream via ffmpeg-next.
///
/// Every decoded frame is converted to BGR24. The end of the container is
/// reported as [`FrameRead::EndOfStream`] once the decoder is drained.
pub struct FfmpegSource {
    location: String,
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
    frame_index: u64,
    flushing: bool,
    done: bool,
}

// Safety: FfmpegSource is only used from the pipeline thread.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(location: &str) -> Result<Self, SourceError> {
        let open_err = |e: ffmpeg_next::Error| SourceError::open(location, e);

        ffmpeg_next::init().map_err(open_err)?;
        let ictx = ffmpeg_next::format::input(&location).map_err(open_err)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| SourceError::open(location, "no video stream found"))?;
        let video_stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        log::info!("FfmpegSource: opened {location} ({width}x{height})");

        Ok(Self {
            location: location.to_string(),
            ictx,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut bgr_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut bgr_frame)
            .map_err(|e| SourceError::read(self.describe(), e))?;

        let pixels = extract_packed_pixels(&bgr_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FfmpegSource {
    fn describe(&self) -> String {
        format!("video {}", self.location)
    }

    fn read_frame(&mut self) -> Result<FrameRead, SourceError> {
        if self.done {
            return Ok(FrameRead::EndOfStream);
        }
        if let Some(frame) = self.try_receive()? {
            return Ok(FrameRead::Frame(frame));
        }
        if self.flushing {
            self.done = true;
            return Ok(FrameRead::EndOfStream);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(FrameRead::Frame(frame));
                }
                self.done = true;
                return Ok(FrameRead::EndOfStream);
            };

            if stream.index() != self.video_stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("FfmpegSource: skipping undecodable packet: {e}");
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(FrameRead::Frame(frame));
            }
        }
    }
}

/// Copies a possibly padded (stride > width * 3) ffmpeg plane into a
/// tightly packed buffer.
fn extract_packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
