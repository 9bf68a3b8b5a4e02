//! Orchestrator: build the region, order it, reconstruct pixel by pixel

use crate::inpainting::{DirectionEstimate, DirectionEstimator, Reconstructor, StencilKind, TimeField};
use crate::mask;
use crate::types::{
    Algorithm, ChannelMode, Error, FillReport, GuidanceField, InpaintParams, InpaintResult, Label,
    Result,
};
use ndarray::{s, Array2, Array3, ArrayView3, Axis};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// Everything one invocation needs besides the image
#[derive(Debug, Clone)]
pub struct InpaintContext<'a> {
    /// Algorithm parameters
    pub params: InpaintParams,
    /// Pixels to resolve first, in this order
    pub order: Option<&'a [(usize, usize)]>,
    /// External isophote directions, preferred over local estimates
    pub guidance: Option<&'a GuidanceField>,
    /// Steer stencils along isophotes; `false` forces isotropic stencils
    pub guided: bool,
    /// Fill pixels that have no known data anywhere with 0 (otherwise keep input)
    pub inpaint_undefined: bool,
    /// Checked before every pixel; set it to stop the run
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> InpaintContext<'a> {
    pub fn new(params: InpaintParams) -> Self {
        Self {
            params,
            order: None,
            guidance: None,
            guided: true,
            inpaint_undefined: false,
            cancel: None,
        }
    }

    pub fn with_order(mut self, order: &'a [(usize, usize)]) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_guidance(mut self, guidance: &'a GuidanceField) -> Self {
        self.guidance = Some(guidance);
        self
    }

    pub fn with_guided(mut self, guided: bool) -> Self {
        self.guided = guided;
        self
    }

    pub fn with_inpaint_undefined(mut self, inpaint_undefined: bool) -> Self {
        self.inpaint_undefined = inpaint_undefined;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Inpaint the region selected by the mask parameters
///
/// # Arguments
/// * `image` - Samples shaped (rows, cols, channels)
/// * `ctx` - Parameters and optional inputs
///
/// # Returns
/// The output buffer (same shape as the input) and a report
#[instrument(skip_all, fields(rows = image.dim().0, cols = image.dim().1, channels = image.dim().2))]
pub fn inpaint(image: ArrayView3<'_, f32>, ctx: &InpaintContext<'_>) -> Result<InpaintResult> {
    ctx.params.validate()?;
    check_dimensions(image)?;
    let (rows, cols, _) = image.dim();

    if ctx.params.algorithm == Algorithm::Passthrough {
        debug!("no inpainting algorithm selected, passing input through");
        return Ok(InpaintResult {
            image: image.to_owned(),
            report: FillReport::empty(rows, cols),
        });
    }

    let p = &ctx.params;
    let inside = mask::build_region(image, p.mask_source, p.mask_threshold, p.mask_dilation)?;
    fill_region(image, inside, ctx)
}

/// Inpaint an externally supplied region
///
/// The mask is dilated by `mask_dilation`; the mask source and threshold are
/// not consulted.
#[instrument(skip_all, fields(rows = image.dim().0, cols = image.dim().1, channels = image.dim().2))]
pub fn inpaint_with_mask(
    image: ArrayView3<'_, f32>,
    inside: &Array2<bool>,
    ctx: &InpaintContext<'_>,
) -> Result<InpaintResult> {
    ctx.params.validate()?;
    check_dimensions(image)?;
    let (rows, cols, _) = image.dim();

    if inside.dim() != (rows, cols) {
        return Err(Error::InvalidInput(format!(
            "mask is {:?}, image is {}x{}",
            inside.dim(),
            rows,
            cols
        )));
    }

    if ctx.params.algorithm == Algorithm::Passthrough {
        debug!("no inpainting algorithm selected, passing input through");
        return Ok(InpaintResult {
            image: image.to_owned(),
            report: FillReport::empty(rows, cols),
        });
    }

    let inside = mask::dilate(inside, ctx.params.mask_dilation);
    fill_region(image, inside, ctx)
}

fn check_dimensions(image: ArrayView3<'_, f32>) -> Result<()> {
    let (rows, cols, channels) = image.dim();
    if rows == 0 || cols == 0 || channels == 0 {
        return Err(Error::InvalidInput(format!(
            "zero-sized region of interest: {rows}x{cols}x{channels}"
        )));
    }
    Ok(())
}

fn fill_region(
    image: ArrayView3<'_, f32>,
    inside: Array2<bool>,
    ctx: &InpaintContext<'_>,
) -> Result<InpaintResult> {
    let (rows, cols, _) = image.dim();

    if let Some(guidance) = ctx.guidance {
        if guidance.dim() != (rows, cols) {
            return Err(Error::InvalidInput(format!(
                "guidance field is {:?}, image is {}x{}",
                guidance.dim(),
                rows,
                cols
            )));
        }
    }
    if let Some(&(row, col)) = ctx
        .order
        .and_then(|order| order.iter().find(|&&(r, c)| r >= rows || c >= cols))
    {
        return Err(Error::InvalidInput(format!(
            "ordered point ({row}, {col}) lies outside {rows}x{cols}"
        )));
    }

    let inside_count = inside.iter().filter(|&&m| m).count();
    debug!(inside = inside_count, "region built");

    let mut labels = mask::domain_labels(&inside);
    let mut filler = Filler::new(image, inside, ctx, inside_count);
    if inside_count > 0 {
        let given = ctx.order.unwrap_or(&[]);
        for (k, &(row, col)) in given.iter().enumerate() {
            if labels[(row, col)] != Label::Inside {
                continue;
            }
            filler.check_cancel()?;
            labels[(row, col)] = Label::ToInpaint;
            filler.resolve(&labels, row, col, (k + 1) as f64);
            labels[(row, col)] = Label::Known;
        }
        if !given.is_empty() {
            debug!(given = filler.report.order.len(), "ordered points resolved");
        }

        let mut field = TimeField::from_domain(labels, given.len() as f64);
        while let Some(step) = field.pop_next() {
            filler.check_cancel()?;
            filler.resolve(field.labels(), step.row, step.col, step.time);
            field.mark_known(step.row, step.col);
        }
    }

    Ok(filler.finish(image))
}

/// Mutable state of one invocation
struct Filler<'c> {
    ctx: &'c InpaintContext<'c>,
    work: Array3<f64>,
    // Channel mean used for joint direction estimation
    guide: Option<Array2<f64>>,
    estimator: DirectionEstimator,
    reconstructor: Reconstructor,
    report: FillReport,
}

impl<'c> Filler<'c> {
    fn new(
        image: ArrayView3<'_, f32>,
        inside: Array2<bool>,
        ctx: &'c InpaintContext<'c>,
        capacity: usize,
    ) -> Self {
        let p = &ctx.params;
        let work = image.mapv(|v| v as f64);
        let guide = match p.channel_mode {
            ChannelMode::Joint => Some(work.map_axis(Axis(2), |px| finite_mean(px.iter().copied()))),
            ChannelMode::Independent => None,
        };

        let report = FillReport {
            inside,
            order: Vec::with_capacity(capacity),
            times: Vec::with_capacity(capacity),
            fallback_pixels: 0,
            undefined_pixels: 0,
        };

        Self {
            ctx,
            work,
            guide,
            estimator: DirectionEstimator::new(p.sigma, p.rho),
            reconstructor: Reconstructor::new(p.epsilon, p.kappa, p.quantum()),
            report,
        }
    }

    fn check_cancel(&self) -> Result<()> {
        match self.ctx.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled {
                resolved: self.report.order.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Reconstruct one `ToInpaint` pixel and record it
    fn resolve(&mut self, labels: &Array2<Label>, row: usize, col: usize, time: f64) {
        let fill_undefined = self.ctx.inpaint_undefined;
        let guided = self.ctx.guided;
        let external = self
            .ctx
            .guidance
            .filter(|_| guided)
            .and_then(|g| g.direction(row, col));

        let kind = match self.guide.as_ref() {
            Some(guide) => {
                let local = if guided {
                    self.estimator.estimate(guide.view(), labels, row, col)
                } else {
                    None
                };
                let estimate = steer(local, external);
                self.reconstructor.reconstruct(
                    &mut self.work,
                    labels,
                    row,
                    col,
                    estimate.as_ref(),
                    fill_undefined,
                )
            }
            None => {
                let mut kind = StencilKind::Directional;
                for channel in 0..self.work.dim().2 {
                    let local = if guided {
                        self.estimator.estimate(
                            self.work.index_axis(Axis(2), channel),
                            labels,
                            row,
                            col,
                        )
                    } else {
                        None
                    };
                    let estimate = steer(local, external);
                    let stencil = self.reconstructor.stencil(labels, row, col, estimate.as_ref());
                    self.reconstructor.write_channel(
                        &mut self.work,
                        labels,
                        &stencil,
                        row,
                        col,
                        channel,
                        fill_undefined,
                    );
                    kind = worst(kind, stencil.kind);
                }
                kind
            }
        };

        if let Some(guide) = self.guide.as_mut() {
            let px = self.work.slice(s![row, col, ..]);
            guide[(row, col)] = finite_mean(px.iter().copied());
        }

        match kind {
            StencilKind::Fallback => self.report.fallback_pixels += 1,
            StencilKind::Undefined => self.report.undefined_pixels += 1,
            StencilKind::Directional | StencilKind::Isotropic => {}
        }
        self.report.order.push((row, col));
        self.report.times.push(time);
    }

    fn finish(self, image: ArrayView3<'_, f32>) -> InpaintResult {
        let mut output = image.to_owned();
        for &(row, col) in &self.report.order {
            for channel in 0..output.dim().2 {
                output[(row, col, channel)] = self.work[(row, col, channel)] as f32;
            }
        }

        let report = self.report;

        if report.undefined_pixels > 0 {
            warn!(
                undefined = report.undefined_pixels,
                "no known pixels available for part of the region"
            );
        }
        if report.fallback_pixels > 0 {
            warn!(fallback = report.fallback_pixels, "isotropic fallback used");
        }
        info!(filled = report.order.len(), "inpainting complete");

        InpaintResult {
            image: output,
            report,
        }
    }
}

/// Apply an external direction to a local estimate
///
/// The external direction replaces the local one and the local coherence is
/// kept; without a local estimate the external direction counts as fully coherent.
fn steer(local: Option<DirectionEstimate>, external: Option<[f64; 2]>) -> Option<DirectionEstimate> {
    match external {
        Some(direction) => Some(DirectionEstimate {
            direction,
            coherence: local.map_or(1.0, |estimate| estimate.coherence),
        }),
        None => local,
    }
}

fn worst(a: StencilKind, b: StencilKind) -> StencilKind {
    let rank = |k: StencilKind| match k {
        StencilKind::Directional => 0,
        StencilKind::Isotropic => 1,
        StencilKind::Fallback => 2,
        StencilKind::Undefined => 3,
    };
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
