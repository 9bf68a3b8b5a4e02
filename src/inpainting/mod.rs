//! Inpainting modules: time-field ordering and coherence transport

pub mod coherence;
pub mod fast_march;
pub mod heap;
pub mod kernels;
pub mod reconstruct;

pub use coherence::{DirectionEstimate, DirectionEstimator};
pub use fast_march::{Resolved, TimeField};
pub use reconstruct::{Reconstructor, Stencil, StencilKind};
