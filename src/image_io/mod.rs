//! Image and mask file I/O on the 0-255 sample scale

use crate::types::{Error, Result, SAMPLE_WHITE};
use image::{DynamicImage, ImageBuffer, ImageReader, Luma, Rgb};
use ndarray::{Array2, Array3};
use std::path::{Path, PathBuf};

/// 16-bit samples are divided by this to land on the 8-bit scale
const SCALE_16_TO_8: f32 = 257.0;

/// Mask image pixels with a luma above this are inside the region
const MASK_LUMA_THRESHOLD: u8 = 127;

/// Load an image as `(rows, cols, channels)` samples on the 0-255 scale
///
/// Gray images give one channel, color images three (alpha is dropped).
pub fn load_image(path: &Path) -> Result<Array3<f32>> {
    let img = decode(path)?;
    let (width, height) = (img.width() as usize, img.height() as usize);

    let (channels, raw): (usize, Vec<f32>) = match &img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            (1, img.to_luma8().into_raw().into_iter().map(f32::from).collect())
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => (
            1,
            img.to_luma16()
                .into_raw()
                .into_iter()
                .map(|v| f32::from(v) / SCALE_16_TO_8)
                .collect(),
        ),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => (
            3,
            img.to_rgb16()
                .into_raw()
                .into_iter()
                .map(|v| f32::from(v) / SCALE_16_TO_8)
                .collect(),
        ),
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            (3, img.to_rgb8().into_raw().into_iter().map(f32::from).collect())
        }
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => (
            3,
            img.to_rgb32f()
                .into_raw()
                .into_iter()
                .map(|v| v * SAMPLE_WHITE as f32)
                .collect(),
        ),
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "Unsupported image format: {:?}",
                img.color()
            )))
        }
    };

    Array3::from_shape_vec((height, width, channels), raw)
        .map_err(|e| Error::InvalidInput(format!("Array shape error: {}", e)))
}

/// Load a mask image: pixels brighter than mid-gray are inside
pub fn load_mask(path: &Path) -> Result<Array2<bool>> {
    let gray = decode(path)?.to_luma8();
    let (width, height) = gray.dimensions();
    let inside = gray
        .into_raw()
        .into_iter()
        .map(|v| v > MASK_LUMA_THRESHOLD)
        .collect();
    Array2::from_shape_vec((height as usize, width as usize), inside)
        .map_err(|e| Error::InvalidInput(format!("Array shape error: {}", e)))
}

fn decode(path: &Path) -> Result<DynamicImage> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    Ok(reader.decode()?)
}

/// Save 1- or 3-channel samples as an 8-bit image, format from the extension
///
/// Samples are clamped to 0-255 and rounded; non-finite samples become 0.
pub fn save_image(path: &Path, data: &Array3<f32>) -> Result<()> {
    let (height, width, channels) = data.dim();
    let raw: Vec<u8> = data.iter().map(|&v| to_u8(v)).collect();
    let (width, height) = (width as u32, height as u32);

    let dynamic = match channels {
        1 => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, raw)
                .ok_or_else(|| Error::InvalidInput("Failed to create image buffer".to_string()))?,
        ),
        3 => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, raw)
                .ok_or_else(|| Error::InvalidInput("Failed to create image buffer".to_string()))?,
        ),
        n => {
            return Err(Error::UnsupportedFormat(format!(
                "Cannot save {} channel images",
                n
            )))
        }
    };

    dynamic.save(path)?;
    Ok(())
}

fn to_u8(v: f32) -> u8 {
    if v.is_finite() {
        v.round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Generate the default output filename: `INPUT_inpainted.EXT`
pub fn generate_output_path(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Invalid input filename",
            ))
        })?;

    let parent = input.parent().unwrap_or_else(|| Path::new("."));

    let extension = input.extension().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "No file extension",
        ))
    })?;

    Ok(parent.join(format!("{}_inpainted.{}", stem, extension)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_path() {
        let input = Path::new("/tmp/test_image.png");
        let output = generate_output_path(input).unwrap();
        assert_eq!(output, Path::new("/tmp/test_image_inpainted.png"));
    }

    #[test]
    fn test_generate_output_path_needs_extension() {
        assert!(generate_output_path(Path::new("/tmp/noext")).is_err());
    }

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(to_u8(-3.0), 0);
        assert_eq!(to_u8(254.6), 255);
        assert_eq!(to_u8(300.0), 255);
        assert_eq!(to_u8(f32::NAN), 0);
    }

    #[test]
    fn test_gray_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let data = Array3::from_shape_fn((4, 6, 1), |(r, c, _)| (r * 40 + c) as f32);

        save_image(&path, &data).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_rgb_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        let data = Array3::from_shape_fn((3, 5, 3), |(r, c, ch)| (r * 50 + c * 10 + ch) as f32);

        save_image(&path, &data).unwrap();
        assert_eq!(load_image(&path).unwrap(), data);
    }

    #[test]
    fn test_two_channels_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::<f32>::zeros((2, 2, 2));
        assert!(matches!(
            save_image(&dir.path().join("x.png"), &data),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_mask_thresholds_luma() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mut data = Array3::<f32>::zeros((3, 3, 1));
        data[(1, 1, 0)] = 255.0;
        data[(0, 2, 0)] = 127.0;
        save_image(&path, &data).unwrap();

        let mask = load_mask(&path).unwrap();
        assert_eq!(mask.dim(), (3, 3));
        assert!(mask[(1, 1)]);
        assert!(!mask[(0, 2)]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 1);
    }
}
