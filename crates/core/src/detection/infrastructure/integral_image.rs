/// Summed-area tables over an 8-bit grayscale image.
///
/// Both tables are `(width + 1) x (height + 1)` with a zero first row and
/// column, so any rectangle sum is four lookups.
pub struct IntegralImage {
    width: u32,
    height: u32,
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    pub fn new(gray: &[u8], width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        debug_assert_eq!(gray.len(), w * h);

        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq_sum = vec![0.0; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0.0;
            let mut sq_row = 0.0;
            for x in 0..w {
                let v = gray[y * w + x] as f64;
                row += v;
                sq_row += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + sq_row;
            }
        }

        Self {
            width,
            height,
            stride,
            sum,
            sq_sum,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sum of pixels in `[x, x + w) x [y, y + h)`.
    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::lookup(&self.sum, self.stride, x, y, w, h)
    }

    /// Sum of squared pixels in `[x, x + w) x [y, y + h)`.
    pub fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::lookup(&self.sq_sum, self.stride, x, y, w, h)
    }

    fn lookup(table: &[f64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
            + table[y0 * stride + x0]
    }
}
