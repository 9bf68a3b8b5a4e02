//! Gaussian smoothing kernels and masked (normalized) separable convolution
//!
//! Only known pixels contribute to a smoothed value; the result is divided by
//! the kernel mass that actually landed on known pixels.

/// Kernel radius in units of the scale parameter
const KERNEL_EXTENT: f64 = 2.0;

/// Largest kernel radius, in pixels
pub const MAX_KERNEL_RADIUS: usize = 32;

/// Minimum kernel mass on known pixels for a smoothed value to exist
pub const MIN_KERNEL_MASS: f64 = 1e-9;

/// Generate a normalized 1D Gaussian kernel for the given scale
///
/// Radius is `ceil(2 * scale)` capped at [`MAX_KERNEL_RADIUS`]. A scale of zero
/// gives the identity kernel `[1.0]`.
pub fn gaussian_kernel_1d(scale: f64) -> Vec<f64> {
    if !scale.is_finite() || scale <= 1e-9 {
        return vec![1.0];
    }

    let radius = ((KERNEL_EXTENT * scale).ceil() as usize).clamp(1, MAX_KERNEL_RADIUS);
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let mut sum = 0.0;

    for i in 0..=2 * radius {
        let x = i as f64 - radius as f64;
        // Underflows to 0 for tiny scales, never NaN
        let value = (-x * x / (2.0 * scale * scale)).exp();
        kernel.push(value);
        sum += value;
    }

    for k in &mut kernel {
        *k /= sum;
    }

    kernel
}

/// The two kernels of one invocation: `pre` (sigma) and `post` (rho)
#[derive(Debug, Clone)]
pub struct SmoothingKernels {
    pub pre: Vec<f64>,
    pub post: Vec<f64>,
}

impl SmoothingKernels {
    pub fn new(sigma: f64, rho: f64) -> Self {
        Self {
            pre: gaussian_kernel_1d(sigma),
            post: gaussian_kernel_1d(rho),
        }
    }

    pub fn pre_radius(&self) -> usize {
        self.pre.len() / 2
    }

    pub fn post_radius(&self) -> usize {
        self.post.len() / 2
    }
}

/// Rectangular window `[row0, row1) x [col0, col1)` inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row0: usize,
    pub row1: usize,
    pub col0: usize,
    pub col1: usize,
}

impl Window {
    /// Window of the given radius around a pixel, clipped to the image
    pub fn around(row: usize, col: usize, radius: usize, rows: usize, cols: usize) -> Self {
        Self {
            row0: row.saturating_sub(radius),
            row1: (row + radius + 1).min(rows),
            col0: col.saturating_sub(radius),
            col1: (col + radius + 1).min(cols),
        }
    }

    pub fn height(&self) -> usize {
        self.row1 - self.row0
    }

    pub fn width(&self) -> usize {
        self.col1 - self.col0
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row0 && row < self.row1 && col >= self.col0 && col < self.col1
    }
}

/// Scratch buffers for masked smoothing of one window
///
/// Reused across pixels so a run allocates them only once.
#[derive(Debug, Clone, Default)]
pub struct MaskedSmoother {
    num_h: Vec<f64>,
    den_h: Vec<f64>,
    smoothed: Vec<f64>,
    window: Option<Window>,
}

impl MaskedSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooth `value` over `window` using only pixels where `known` holds
    ///
    /// Pixels up to `kernel.len() / 2` outside the window feed the result.
    /// Afterwards [`get`](Self::get) returns the smoothed value, or `None`
    /// where too little known mass was under the kernel.
    pub fn smooth<V, K>(
        &mut self,
        kernel: &[f64],
        window: Window,
        rows: usize,
        cols: usize,
        value: V,
        known: K,
    ) where
        V: Fn(usize, usize) -> f64,
        K: Fn(usize, usize) -> bool,
    {
        let radius = kernel.len() / 2;
        let src = Window {
            row0: window.row0.saturating_sub(radius),
            row1: (window.row1 + radius).min(rows),
            col0: window.col0,
            col1: window.col1,
        };

        // Horizontal pass over the rows the vertical pass will read
        let (sh, w) = (src.height(), window.width());
        self.num_h.clear();
        self.num_h.resize(sh * w, 0.0);
        self.den_h.clear();
        self.den_h.resize(sh * w, 0.0);

        for (i, y) in (src.row0..src.row1).enumerate() {
            for (j, x) in (window.col0..window.col1).enumerate() {
                let mut num = 0.0;
                let mut den = 0.0;
                for (k, &kv) in kernel.iter().enumerate() {
                    let sx = x as isize + k as isize - radius as isize;
                    if sx < 0 || sx as usize >= cols {
                        continue;
                    }
                    let sx = sx as usize;
                    if !known(y, sx) {
                        continue;
                    }
                    let v = value(y, sx);
                    if !v.is_finite() {
                        continue;
                    }
                    num += kv * v;
                    den += kv;
                }
                self.num_h[i * w + j] = num;
                self.den_h[i * w + j] = den;
            }
        }

        // Vertical pass
        let h = window.height();
        self.smoothed.clear();
        self.smoothed.resize(h * w, f64::NAN);
        for (i, y) in (window.row0..window.row1).enumerate() {
            for j in 0..w {
                let mut num = 0.0;
                let mut den = 0.0;
                for (k, &kv) in kernel.iter().enumerate() {
                    let sy = y as isize + k as isize - radius as isize;
                    if sy < src.row0 as isize || sy >= src.row1 as isize {
                        continue;
                    }
                    let si = sy as usize - src.row0;
                    num += kv * self.num_h[si * w + j];
                    den += kv * self.den_h[si * w + j];
                }
                if den > MIN_KERNEL_MASS {
                    self.smoothed[i * w + j] = num / den;
                }
            }
        }

        self.window = Some(window);
    }

    /// Smoothed value at an image position inside the last window
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let window = self.window?;
        if !window.contains(row, col) {
            return None;
        }
        let v = self.smoothed[(row - window.row0) * window.width() + (col - window.col0)];
        v.is_finite().then_some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_gaussian_kernel() {
        let kernel = gaussian_kernel_1d(1.0);
        assert_eq!(kernel.len(), 5);

        // Check normalization
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        // Check symmetry
        assert!((kernel[0] - kernel[4]).abs() < 1e-15);
        assert!((kernel[1] - kernel[3]).abs() < 1e-15);

        // Center should be largest
        assert!(kernel[2] > kernel[1]);
        assert!(kernel[1] > kernel[0]);
    }

    #[test]
    fn test_zero_scale_is_identity() {
        assert_eq!(gaussian_kernel_1d(0.0), vec![1.0]);
        assert_eq!(gaussian_kernel_1d(f64::NAN), vec![1.0]);
    }

    #[test]
    fn test_tiny_scale_has_no_nan() {
        let kernel = gaussian_kernel_1d(0.001);
        assert_eq!(kernel.len(), 3);
        assert!(kernel.iter().all(|v| v.is_finite()));
        assert_eq!(kernel[1], 1.0);
    }

    #[test]
    fn test_radius_is_capped() {
        let kernel = gaussian_kernel_1d(100.0);
        assert_eq!(kernel.len(), 2 * MAX_KERNEL_RADIUS + 1);
    }

    #[test]
    fn test_smoothing_kernels_radii() {
        let kernels = SmoothingKernels::new(std::f64::consts::SQRT_2, 5.0);
        assert_eq!(kernels.pre_radius(), 3);
        assert_eq!(kernels.post_radius(), 10);
    }

    #[test]
    fn test_masked_smoothing_ignores_unknown() {
        // Unknown pixels hold garbage that must not leak into the result
        let rows = 5;
        let cols = 5;
        let value = |_r: usize, c: usize| if c == 2 { 1.0e6 } else { 7.0 };
        let known = |_r: usize, c: usize| c != 2;

        let mut smoother = MaskedSmoother::new();
        let window = Window::around(2, 2, 1, rows, cols);
        smoother.smooth(&gaussian_kernel_1d(1.0), window, rows, cols, value, known);

        for r in 1..4 {
            for c in 1..4 {
                let v = smoother.get(r, c).unwrap();
                assert!((v - 7.0).abs() < 1e-9, "({r},{c}) = {v}");
            }
        }
        assert!(smoother.get(0, 0).is_none());
    }

    #[test]
    fn test_masked_smoothing_undefined_without_known() {
        let mut smoother = MaskedSmoother::new();
        let window = Window::around(1, 1, 1, 3, 3);
        smoother.smooth(&[1.0], window, 3, 3, |_, _| 1.0, |r, c| r == 0 && c == 0);
        assert_eq!(smoother.get(0, 0), Some(1.0));
        assert!(smoother.get(1, 1).is_none());
    }
}
