//! Parallel helpers for inpainting many independent buffers

use crate::pipeline::{inpaint, inpaint_with_mask, InpaintContext};
use crate::types::{InpaintParams, InpaintResult, Result};
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use tracing::debug;

/// Inpaint independent tiles in parallel, one result per tile in input order
///
/// Invocations share nothing, so a failing tile does not affect the others.
pub fn inpaint_batch(tiles: &[Array3<f32>], params: &InpaintParams) -> Vec<Result<InpaintResult>> {
    debug!(tiles = tiles.len(), "inpainting batch");
    tiles
        .par_iter()
        .map(|tile| inpaint(tile.view(), &InpaintContext::new(params.clone())))
        .collect()
}

/// Same as [`inpaint_batch`] with an explicit region per tile
pub fn inpaint_batch_with_masks(
    tiles: &[(Array3<f32>, Array2<bool>)],
    params: &InpaintParams,
) -> Vec<Result<InpaintResult>> {
    debug!(tiles = tiles.len(), "inpainting masked batch");
    tiles
        .par_iter()
        .map(|(tile, inside)| {
            inpaint_with_mask(tile.view(), inside, &InpaintContext::new(params.clone()))
        })
        .collect()
}
