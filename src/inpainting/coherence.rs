//! Coherence direction estimation from a smoothed structure tensor

use super::kernels::{MaskedSmoother, SmoothingKernels, Window};
use crate::types::Label;
use ndarray::{Array2, ArrayView2};

/// Structure tensors with a smaller trace are treated as flat
const MIN_TENSOR_TRACE: f64 = 1e-12;

/// Local isophote estimate at one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionEstimate {
    /// Unit isophote direction `[d_row, d_col]`
    pub direction: [f64; 2],
    /// Anisotropy in `[0, 1]`: 0 is isotropic, 1 a perfectly straight edge
    pub coherence: f64,
}

impl DirectionEstimate {
    /// Unit normal to the isophote (the dominant gradient direction)
    pub fn normal(&self) -> [f64; 2] {
        let [dr, dc] = self.direction;
        [-dc, dr]
    }
}

/// Symmetric 2x2 tensor `[[rr, rc], [rc, cc]]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StructureTensor {
    pub rr: f64,
    pub rc: f64,
    pub cc: f64,
}

impl StructureTensor {
    /// Eigen-analysis into an isophote direction, `None` for flat or non-finite tensors
    pub fn coherence_direction(&self) -> Option<DirectionEstimate> {
        let Self { rr, rc, cc } = *self;
        if !(rr.is_finite() && rc.is_finite() && cc.is_finite()) {
            return None;
        }
        let trace = rr + cc;
        if trace < MIN_TENSOR_TRACE {
            return None;
        }

        let half_diff = 0.5 * (rr - cc);
        let root = half_diff.hypot(rc);
        let lambda1 = 0.5 * trace + root;
        let lambda2 = 0.5 * trace - root;

        // Dominant eigenvector (cos θ, sin θ) is the gradient; rotate for the isophote
        let theta = 0.5 * (2.0 * rc).atan2(rr - cc);
        let (sin, cos) = theta.sin_cos();
        let ratio = ((lambda1 - lambda2) / (lambda1 + lambda2)).clamp(0.0, 1.0);

        Some(DirectionEstimate {
            direction: [-sin, cos],
            coherence: ratio * ratio,
        })
    }
}

/// Estimates isophote directions over already-known pixels
///
/// Holds the kernels and scratch space of one invocation.
#[derive(Debug, Clone)]
pub struct DirectionEstimator {
    kernels: SmoothingKernels,
    smoother: MaskedSmoother,
}

impl DirectionEstimator {
    pub fn new(sigma: f64, rho: f64) -> Self {
        Self {
            kernels: SmoothingKernels::new(sigma, rho),
            smoother: MaskedSmoother::new(),
        }
    }

    /// Structure tensor at `(row, col)` from the known pixels of `guide`
    ///
    /// The guide plane is pre-smoothed with the sigma kernel, differentiated
    /// by central differences at known pixels, and the gradient outer
    /// products are post-smoothed with the rho kernel. `None` when no
    /// gradient sample is available.
    pub fn structure_tensor(
        &mut self,
        guide: ArrayView2<'_, f64>,
        labels: &Array2<Label>,
        row: usize,
        col: usize,
    ) -> Option<StructureTensor> {
        let (rows, cols) = guide.dim();
        let post_radius = self.kernels.post_radius();
        let patch = Window::around(row, col, post_radius + 1, rows, cols);

        let known = |r: usize, c: usize| labels[(r, c)] == Label::Known;
        self.smoother.smooth(
            &self.kernels.pre,
            patch,
            rows,
            cols,
            |r, c| guide[(r, c)],
            known,
        );

        let window = Window::around(row, col, post_radius, rows, cols);
        let post = &self.kernels.post;
        let mut tensor = StructureTensor::default();
        let mut mass = 0.0;

        for y in window.row0..window.row1 {
            let wy = post[y + post_radius - row];
            for x in window.col0..window.col1 {
                if !known(y, x) || y == 0 || x == 0 {
                    continue;
                }
                let samples = (
                    self.smoother.get(y - 1, x),
                    self.smoother.get(y + 1, x),
                    self.smoother.get(y, x - 1),
                    self.smoother.get(y, x + 1),
                );
                let (Some(up), Some(down), Some(left), Some(right)) = samples else {
                    continue;
                };
                let gr = 0.5 * (down - up);
                let gc = 0.5 * (right - left);
                let w = wy * post[x + post_radius - col];

                tensor.rr += w * gr * gr;
                tensor.rc += w * gr * gc;
                tensor.cc += w * gc * gc;
                mass += w;
            }
        }

        if mass <= 0.0 {
            return None;
        }
        tensor.rr /= mass;
        tensor.rc /= mass;
        tensor.cc /= mass;
        Some(tensor)
    }

    /// Isophote direction at `(row, col)`, `None` in flat or unknown surroundings
    pub fn estimate(
        &mut self,
        guide: ArrayView2<'_, f64>,
        labels: &Array2<Label>,
        row: usize,
        col: usize,
    ) -> Option<DirectionEstimate> {
        self.structure_tensor(guide, labels, row, col)?
            .coherence_direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_known(rows: usize, cols: usize) -> Array2<Label> {
        Array2::from_elem((rows, cols), Label::Known)
    }

    #[test]
    fn test_vertical_edge_gives_vertical_isophote() {
        // Intensity changes along columns only
        let guide = Array2::from_shape_fn((21, 21), |(_, c)| if c < 10 { 0.0 } else { 100.0 });
        let labels = all_known(21, 21);

        let mut estimator = DirectionEstimator::new(std::f64::consts::SQRT_2, 3.0);
        let estimate = estimator.estimate(guide.view(), &labels, 10, 10).unwrap();

        assert!(estimate.direction[0].abs() > 0.999, "{:?}", estimate);
        assert!(estimate.direction[1].abs() < 0.05);
        assert!(estimate.coherence > 0.99);
    }

    #[test]
    fn test_vertical_edge_with_missing_center() {
        let guide = Array2::from_shape_fn((21, 21), |(_, c)| if c < 10 { 0.0 } else { 100.0 });
        let mut labels = all_known(21, 21);
        labels[(10, 10)] = Label::ToInpaint;

        let mut estimator = DirectionEstimator::new(std::f64::consts::SQRT_2, 3.0);
        let estimate = estimator.estimate(guide.view(), &labels, 10, 10).unwrap();

        // The hole perturbs rows symmetrically, so the direction stays vertical
        assert!(estimate.direction[0].abs() > 0.99, "{:?}", estimate);
        assert!(estimate.coherence > 0.3);
    }

    #[test]
    fn test_diagonal_edge() {
        let guide = Array2::from_shape_fn((25, 25), |(r, c)| if r + c < 24 { 10.0 } else { 90.0 });
        let labels = all_known(25, 25);

        let mut estimator = DirectionEstimator::new(1.0, 3.0);
        let estimate = estimator.estimate(guide.view(), &labels, 12, 12).unwrap();
        let [dr, dc] = estimate.direction;

        // Isophote runs along r + c = const, i.e. parallel to (1, -1)
        assert!((dr + dc).abs() < 1e-6, "{:?}", estimate);
        assert!(estimate.coherence > 0.99);
    }

    #[test]
    fn test_flat_region_has_no_direction() {
        let guide = Array2::from_elem((9, 9), 42.0);
        let labels = all_known(9, 9);
        let mut estimator = DirectionEstimator::new(1.0, 2.0);
        assert!(estimator.estimate(guide.view(), &labels, 4, 4).is_none());
    }

    #[test]
    fn test_unknown_pixels_do_not_contribute() {
        // Garbage inside the unknown area must not create structure
        let mut guide = Array2::from_elem((15, 15), 5.0);
        let mut labels = all_known(15, 15);
        for r in 5..10 {
            for c in 5..10 {
                guide[(r, c)] = if (r + c) % 2 == 0 { 1e6 } else { -1e6 };
                labels[(r, c)] = Label::Inside;
            }
        }
        labels[(7, 7)] = Label::ToInpaint;

        let mut estimator = DirectionEstimator::new(1.0, 3.0);
        assert!(estimator.estimate(guide.view(), &labels, 7, 7).is_none());
    }

    #[test]
    fn test_isotropic_tensor_has_zero_coherence() {
        let tensor = StructureTensor {
            rr: 2.0,
            rc: 0.0,
            cc: 2.0,
        };
        let estimate = tensor.coherence_direction().unwrap();
        assert!(estimate.coherence.abs() < 1e-12);
        let [dr, dc] = estimate.direction;
        assert!((dr.hypot(dc) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_tensor_rejected() {
        let tensor = StructureTensor {
            rr: f64::INFINITY,
            rc: 0.0,
            cc: 1.0,
        };
        assert!(tensor.coherence_direction().is_none());
    }

    #[test]
    fn test_normal_is_perpendicular() {
        let estimate = DirectionEstimate {
            direction: [0.6, 0.8],
            coherence: 1.0,
        };
        let [nr, nc] = estimate.normal();
        assert!((nr * 0.6 + nc * 0.8).abs() < 1e-12);
    }
}
