//! Coherence-transport reconstruction of a single pixel
//!
//! The new value is a convex combination of known neighbors inside the
//! epsilon ball. Neighbors close to the line through the pixel along the
//! isophote direction dominate; distance to that line is penalised by a
//! Gaussian whose sharpness grows with kappa and the local coherence.

use super::coherence::DirectionEstimate;
use crate::types::Label;
use ndarray::{Array2, Array3};

/// How the weights of a stencil were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilKind {
    /// Weighted along an isophote direction
    Directional,
    /// Inverse-distance weights over the epsilon ball (no direction available)
    Isotropic,
    /// Nothing usable in the epsilon ball; nearest known ring averaged
    Fallback,
    /// No known pixel anywhere in the image
    Undefined,
}

/// One contributing neighbor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub row: usize,
    pub col: usize,
    pub weight: f64,
}

/// Normalized neighbor weights for one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    pub kind: StencilKind,
    pub taps: Vec<Tap>,
}

impl Stencil {
    /// Sum of the tap weights (1 for any non-undefined stencil)
    pub fn weight_sum(&self) -> f64 {
        self.taps.iter().map(|t| t.weight).sum()
    }

    /// Combine one channel of `image` with this stencil
    ///
    /// Non-finite neighbor samples are skipped and the remaining weights
    /// renormalized. Returns `None` when nothing finite contributed.
    pub fn combine(&self, image: &Array3<f64>, channel: usize) -> Option<f64> {
        let mut num = 0.0;
        let mut den = 0.0;
        for tap in &self.taps {
            let v = image[(tap.row, tap.col, channel)];
            if v.is_finite() {
                num += tap.weight * v;
                den += tap.weight;
            }
        }
        let value = num / den;
        (den > 0.0 && value.is_finite()).then_some(value)
    }
}

/// Transport weight of a neighbor at offset `d` from the pixel
///
/// `exp(-mu² <n, d>² / (2 eps²)) / |d|` for the unit isophote normal `n`.
pub fn directional_weight(offset: [f64; 2], normal: [f64; 2], mu: f64, epsilon: f64) -> f64 {
    let dist = offset[0].hypot(offset[1]);
    if dist <= 0.0 {
        return 0.0;
    }
    let across = normal[0] * offset[0] + normal[1] * offset[1];
    let exponent = -(mu * mu) * across * across / (2.0 * epsilon * epsilon);
    let w = exponent.exp() / dist;
    if w.is_finite() {
        w
    } else {
        0.0
    }
}

/// Builds stencils and writes reconstructed values
#[derive(Debug, Clone)]
pub struct Reconstructor {
    epsilon: f64,
    kappa: f64,
    quantum: Option<f64>,
    // Offsets in the epsilon ball, nearest first, excluding the center
    ball: Vec<(isize, isize, f64)>,
}

impl Reconstructor {
    pub fn new(epsilon: f64, kappa: f64, quantum: Option<f64>) -> Self {
        let radius = epsilon.floor() as isize;
        let eps2 = epsilon * epsilon;
        let mut ball = Vec::new();
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                let d2 = (dr * dr + dc * dc) as f64;
                if d2 > 0.0 && d2 <= eps2 {
                    ball.push((dr, dc, d2.sqrt()));
                }
            }
        }
        ball.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

        Self {
            epsilon,
            kappa,
            quantum,
            ball,
        }
    }

    /// Number of offsets in the epsilon ball
    pub fn ball_len(&self) -> usize {
        self.ball.len()
    }

    /// Normalized weights over the known neighbors of `(row, col)`
    pub fn stencil(
        &self,
        labels: &Array2<Label>,
        row: usize,
        col: usize,
        direction: Option<&DirectionEstimate>,
    ) -> Stencil {
        let (rows, cols) = labels.dim();
        let mut taps = Vec::new();

        let kind = match direction {
            Some(estimate) => {
                let normal = estimate.normal();
                let mu = self.kappa * estimate.coherence;
                for &(dr, dc, _) in &self.ball {
                    if let Some((r, c)) = offset_pixel(row, col, dr, dc, rows, cols) {
                        if labels[(r, c)] == Label::Known {
                            let weight =
                                directional_weight([dr as f64, dc as f64], normal, mu, self.epsilon);
                            taps.push(Tap { row: r, col: c, weight });
                        }
                    }
                }
                StencilKind::Directional
            }
            None => {
                for &(dr, dc, dist) in &self.ball {
                    if let Some((r, c)) = offset_pixel(row, col, dr, dc, rows, cols) {
                        if labels[(r, c)] == Label::Known {
                            taps.push(Tap { row: r, col: c, weight: 1.0 / dist });
                        }
                    }
                }
                StencilKind::Isotropic
            }
        };

        taps.retain(|t| t.weight > 0.0);
        if normalize(&mut taps) {
            return Stencil { kind, taps };
        }
        nearest_ring(labels, row, col)
    }

    /// Reconstruct every channel of one pixel with a shared stencil
    ///
    /// Returns the stencil kind that was used.
    pub fn reconstruct(
        &self,
        image: &mut Array3<f64>,
        labels: &Array2<Label>,
        row: usize,
        col: usize,
        direction: Option<&DirectionEstimate>,
        fill_undefined: bool,
    ) -> StencilKind {
        let stencil = self.stencil(labels, row, col, direction);
        let channels = image.dim().2;
        for channel in 0..channels {
            self.write_channel(image, labels, &stencil, row, col, channel, fill_undefined);
        }
        stencil.kind
    }

    /// Reconstruct a single channel of one pixel from a given stencil
    #[allow(clippy::too_many_arguments)]
    pub fn write_channel(
        &self,
        image: &mut Array3<f64>,
        labels: &Array2<Label>,
        stencil: &Stencil,
        row: usize,
        col: usize,
        channel: usize,
        fill_undefined: bool,
    ) {
        debug_assert_eq!(labels[(row, col)], Label::ToInpaint);
        let value = match stencil.combine(image, channel) {
            Some(v) => self.quantize(v),
            None if stencil.kind == StencilKind::Undefined && !fill_undefined => return,
            None => 0.0,
        };
        image[(row, col, channel)] = value;
    }

    /// Snap a value to the quantization grid
    pub fn quantize(&self, value: f64) -> f64 {
        let snapped = match self.quantum {
            Some(q) => (value / q).round() * q,
            None => value,
        };
        if snapped.is_finite() {
            snapped
        } else {
            0.0
        }
    }
}

fn offset_pixel(
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let r = row.checked_add_signed(dr)?;
    let c = col.checked_add_signed(dc)?;
    (r < rows && c < cols).then_some((r, c))
}

/// Scale weights to sum to one; false if the sum vanished
fn normalize(taps: &mut [Tap]) -> bool {
    let sum: f64 = taps.iter().map(|t| t.weight).sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return false;
    }
    for tap in taps.iter_mut() {
        tap.weight /= sum;
    }
    true
}

/// Inverse-distance average over the nearest Chebyshev ring holding known pixels
fn nearest_ring(labels: &Array2<Label>, row: usize, col: usize) -> Stencil {
    let (rows, cols) = labels.dim();
    let max_radius = rows.max(cols) as isize;

    for radius in 1..=max_radius {
        let mut taps = Vec::new();
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                if dr.abs() != radius && dc.abs() != radius {
                    continue;
                }
                if let Some((r, c)) = offset_pixel(row, col, dr, dc, rows, cols) {
                    if labels[(r, c)] == Label::Known {
                        let dist = ((dr * dr + dc * dc) as f64).sqrt();
                        taps.push(Tap { row: r, col: c, weight: 1.0 / dist });
                    }
                }
            }
        }
        if normalize(&mut taps) {
            return Stencil {
                kind: StencilKind::Fallback,
                taps,
            };
        }
    }

    Stencil {
        kind: StencilKind::Undefined,
        taps: Vec::new(),
    }
}
