//! Core types and structures for InpaintForge

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nominal white level of image samples (the mask threshold lives on this scale)
pub const SAMPLE_WHITE: f64 = 255.0;

/// Valid range of the mask threshold
pub const THRESHOLD_RANGE: (f64, f64) = (0.0, 255.0);
/// Valid range of the mask dilation radius (pixels)
pub const DILATION_RANGE: (u32, u32) = (0, 32);
/// Valid range of the reconstruction neighborhood radius epsilon (pixels)
pub const EPSILON_RANGE: (f64, f64) = (1.0, 100.0);
/// Valid range of the sharpness kappa
pub const KAPPA_RANGE: (f64, f64) = (0.0, 100.0);
/// Valid range of the pre-smoothing scale sigma
pub const SIGMA_RANGE: (f64, f64) = (0.0, 100.0);
/// Valid range of the post-smoothing scale rho
pub const RHO_RANGE: (f64, f64) = (0.001, 100.0);
/// Valid range of the quantization step (units of 1e-4)
pub const QUANTIZATION_RANGE: (f64, f64) = (0.0, 10_000.0);

/// Inpainting algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Fast-marching ordered coherence transport
    #[default]
    CoherenceTransport,
    /// Copy input to output untouched
    Passthrough,
}

impl Algorithm {
    /// Map a host algorithm id; unknown ids select pass-through
    pub fn from_id(id: i64) -> Self {
        match id {
            0 => Algorithm::CoherenceTransport,
            _ => Algorithm::Passthrough,
        }
    }
}

/// Which image quantity the mask threshold is compared against
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum MaskSource {
    /// Channel 0
    #[default]
    Red,
    /// Channel 1
    Green,
    /// Channel 2
    Blue,
    /// Darkness: `SAMPLE_WHITE - max(channels)`
    Black,
    /// Brightness in every channel: `min(channels)`
    White,
}

impl MaskSource {
    /// Number of channels the source needs to exist
    pub fn required_channels(&self) -> usize {
        match self {
            MaskSource::Red | MaskSource::Black | MaskSource::White => 1,
            MaskSource::Green => 2,
            MaskSource::Blue => 3,
        }
    }
}

/// How directions are estimated for multi-channel images
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelMode {
    /// One direction from the channel mean, shared by all channels
    #[default]
    Joint,
    /// Each channel estimates its own direction
    Independent,
}

/// Per-pixel domain label
///
/// Transitions only move forward: `Inside -> Band -> ToInpaint -> Known`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Needs filling, not reached by the wavefront yet
    Inside,
    /// Valid data, never overwritten
    Known,
    /// On the wavefront, queued with a tentative time
    Band,
    /// Time frozen, waiting for reconstruction
    ToInpaint,
}

impl Label {
    /// Whether the arrival time of this pixel is final
    pub fn is_frozen(self) -> bool {
        matches!(self, Label::Known | Label::ToInpaint)
    }
}

/// Algorithm parameters consumed at commit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintParams {
    /// Algorithm selector
    pub algorithm: Algorithm,
    /// Mask source selector
    pub mask_source: MaskSource,
    /// Pixels with a mask-source value above this are filled
    pub mask_threshold: f64,
    /// Disc dilation radius applied to the mask (pixels)
    pub mask_dilation: u32,
    /// Reconstruction neighborhood radius (pixels)
    pub epsilon: f64,
    /// Sharpness of the directional weights
    pub kappa: f64,
    /// Pre-smoothing scale for gradient estimation
    pub sigma: f64,
    /// Post-smoothing scale of the structure tensor
    pub rho: f64,
    /// Value quantization step in units of 1e-4 (0 disables)
    pub quantization: f64,
    /// Direction estimation for multi-channel images
    pub channel_mode: ChannelMode,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::CoherenceTransport,
            mask_source: MaskSource::Red,
            mask_threshold: 0.0,
            mask_dilation: 0,
            epsilon: 5.0,
            kappa: 25.0,
            sigma: std::f64::consts::SQRT_2,
            rho: 5.0,
            quantization: 1.0,
            channel_mode: ChannelMode::Joint,
        }
    }
}

impl InpaintParams {
    /// Reject any parameter outside its declared bounds
    pub fn validate(&self) -> Result<()> {
        check_range("mask_threshold", self.mask_threshold, THRESHOLD_RANGE)?;
        check_range(
            "mask_dilation",
            self.mask_dilation as f64,
            (DILATION_RANGE.0 as f64, DILATION_RANGE.1 as f64),
        )?;
        check_range("epsilon", self.epsilon, EPSILON_RANGE)?;
        check_range("kappa", self.kappa, KAPPA_RANGE)?;
        check_range("sigma", self.sigma, SIGMA_RANGE)?;
        check_range("rho", self.rho, RHO_RANGE)?;
        check_range("quantization", self.quantization, QUANTIZATION_RANGE)?;
        Ok(())
    }

    /// Absolute quantization step, `None` when disabled
    pub fn quantum(&self) -> Option<f64> {
        (self.quantization > 0.0).then(|| self.quantization * 1e-4)
    }
}

fn check_range(parameter: &'static str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    // NaN fails both comparisons, so test for containment explicitly
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(Error::ConfigurationOutOfRange {
            parameter,
            value,
            min,
            max,
        })
    }
}

/// Externally supplied isophote directions, one `[d_row, d_col]` per pixel
///
/// Entries that are non-finite or zero carry no guidance.
#[derive(Debug, Clone)]
pub struct GuidanceField {
    directions: Array2<[f64; 2]>,
}

impl GuidanceField {
    /// Wrap a direction grid
    pub fn new(directions: Array2<[f64; 2]>) -> Self {
        Self { directions }
    }

    /// Grid with no guidance anywhere
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self::new(Array2::from_elem((rows, cols), [f64::NAN, f64::NAN]))
    }

    /// Set the direction at one pixel
    pub fn set(&mut self, row: usize, col: usize, direction: [f64; 2]) {
        self.directions[(row, col)] = direction;
    }

    /// Shape as (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.directions.dim()
    }

    /// Unit guidance direction at a pixel, if one is present and finite
    pub fn direction(&self, row: usize, col: usize) -> Option<[f64; 2]> {
        let [dr, dc] = *self.directions.get((row, col))?;
        let norm = dr.hypot(dc);
        if norm.is_finite() && norm > 0.0 {
            Some([dr / norm, dc / norm])
        } else {
            None
        }
    }
}

/// What happened during one invocation
#[derive(Debug, Clone)]
pub struct FillReport {
    /// Region that was filled
    pub inside: Array2<bool>,
    /// Pixels in the order they were resolved
    pub order: Vec<(usize, usize)>,
    /// Frozen arrival time of each entry of `order`
    pub times: Vec<f64>,
    /// Pixels reconstructed through the isotropic fallback
    pub fallback_pixels: usize,
    /// Pixels with no known data anywhere in the image
    pub undefined_pixels: usize,
}

impl FillReport {
    /// Report for an invocation that filled nothing
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            inside: Array2::from_elem((rows, cols), false),
            order: Vec::new(),
            times: Vec::new(),
            fallback_pixels: 0,
            undefined_pixels: 0,
        }
    }
}

/// Output buffer plus the report that produced it
#[derive(Debug, Clone)]
pub struct InpaintResult {
    /// Image with the inside region reconstructed
    pub image: Array3<f32>,
    /// Processing report
    pub report: FillReport,
}

/// InpaintForge error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Parameter file error: {0}")]
    Params(#[from] serde_json::Error),

    #[error("Parameter `{parameter}` = {value} is outside [{min}, {max}]")]
    ConfigurationOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inpainting cancelled after {resolved} pixels")]
    Cancelled { resolved: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;
