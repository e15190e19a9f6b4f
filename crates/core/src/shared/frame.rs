use serde::Serialize;

/// Width and height of a frame or model input, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single captured frame: contiguous BGR8 bytes in row-major order.
///
/// Sources convert whatever the device delivers into BGR at the capture
/// boundary; everything downstream assumes three interleaved channels in
/// blue, green, red order. `index` is the capture sequence number.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// An all-black BGR frame.
    pub fn black(width: u32, height: u32, index: u64) -> Self {
        Self::new(
            vec![0; (width as usize) * (height as usize) * 3],
            width,
            height,
            3,
            index,
        )
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the channel values at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        Some(&self.data[offset..offset + c])
    }

    /// Overwrites the pixel at `(x, y)`; writes outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, value: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        let n = c.min(3);
        self.data[offset..offset + n].copy_from_slice(&value[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.size(), Size::new(2, 2));
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    fn test_clone_is_independent() {
        let frame = Frame::new(vec![100u8; 12], 2, 2, 3, 0);
        let mut cloned = frame.clone();
        cloned.put_pixel(0, 0, [0, 0, 0]);
        assert_eq!(frame.data()[0], 100);
        assert_eq!(cloned.data()[0], 0);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_pixel_access_is_bgr_row_major() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, B
        let frame = Frame::new(data, 2, 2, 3, 0);
        assert_eq!(frame.pixel(0, 1), Some(&[255, 0, 0][..]));
        assert_eq!(frame.pixel(2, 0), None);
    }

    #[test]
    fn test_put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::black(3, 3, 0);
        frame.put_pixel(-1, 0, [1, 2, 3]);
        frame.put_pixel(3, 3, [1, 2, 3]);
        assert!(frame.data().iter().all(|&v| v == 0));

        frame.put_pixel(2, 1, [1, 2, 3]);
        assert_eq!(frame.pixel(2, 1), Some(&[1, 2, 3][..]));
    }
}
