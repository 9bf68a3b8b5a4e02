//! InpaintForge CLI

use anyhow::{Context, Result};
use clap::Parser;
use inpaint_forge::{
    image_io, process_image,
    types::{Algorithm, ChannelMode, InpaintParams, MaskSource},
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// InpaintForge: fill masked image regions by coherence transport
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input image file (PNG, TIFF, JPEG)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (default: INPUT_inpainted.EXT)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Mask image; pixels brighter than mid-gray are filled
    #[arg(short, long, value_name = "FILE")]
    mask: Option<PathBuf>,

    /// JSON parameter file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Image quantity compared against the threshold
    #[arg(long, value_enum)]
    mask_source: Option<MaskSource>,

    /// Pixels whose mask-source value exceeds this are filled (0-255)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Disc dilation radius of the mask (0-32 pixels)
    #[arg(short, long)]
    dilation: Option<u32>,

    /// Reconstruction neighborhood radius (1-100 pixels)
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Sharpness of the directional weights (0-100)
    #[arg(short, long)]
    kappa: Option<f64>,

    /// Pre-smoothing scale for gradients (0-100)
    #[arg(long)]
    sigma: Option<f64>,

    /// Post-smoothing scale of the structure tensor (0.001-100)
    #[arg(long)]
    rho: Option<f64>,

    /// Value quantization step in units of 1e-4 (0 disables)
    #[arg(long)]
    quantization: Option<f64>,

    /// Direction estimation for color images
    #[arg(long, value_enum)]
    channel_mode: Option<ChannelMode>,

    /// Algorithm id: 0 is coherence transport, anything else copies the input
    #[arg(long, value_name = "ID")]
    algorithm: Option<i64>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Parameter file values (or defaults) with flag overrides applied
    fn resolve_params(&self) -> Result<InpaintParams> {
        let mut params = match &self.params {
            Some(path) => read_params(path)?,
            None => InpaintParams::default(),
        };

        if let Some(id) = self.algorithm {
            params.algorithm = Algorithm::from_id(id);
        }
        if let Some(source) = self.mask_source {
            params.mask_source = source;
        }
        if let Some(v) = self.threshold {
            params.mask_threshold = v;
        }
        if let Some(v) = self.dilation {
            params.mask_dilation = v;
        }
        if let Some(v) = self.epsilon {
            params.epsilon = v;
        }
        if let Some(v) = self.kappa {
            params.kappa = v;
        }
        if let Some(v) = self.sigma {
            params.sigma = v;
        }
        if let Some(v) = self.rho {
            params.rho = v;
        }
        if let Some(v) = self.quantization {
            params.quantization = v;
        }
        if let Some(mode) = self.channel_mode {
            params.channel_mode = mode;
        }

        params.validate().context("Invalid parameters")?;
        Ok(params)
    }
}

fn read_params(path: &Path) -> Result<InpaintParams> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse parameter file {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.input.exists() {
        anyhow::bail!("Input file does not exist: {}", cli.input.display());
    }

    let params = cli.resolve_params()?;
    let output_path = match &cli.output {
        Some(out) => out.clone(),
        None => image_io::generate_output_path(&cli.input)
            .context("Failed to generate output path")?,
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        input = %cli.input.display(),
        output = %output_path.display(),
        "starting"
    );

    let report = process_image(&cli.input, &output_path, cli.mask.as_deref(), &params)
        .with_context(|| format!("Failed to inpaint {}", cli.input.display()))?;

    tracing::info!(
        filled = report.order.len(),
        fallback = report.fallback_pixels,
        undefined = report.undefined_pixels,
        "done"
    );

    Ok(())
}
