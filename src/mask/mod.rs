//! Region builder: threshold a mask source and dilate the result

use crate::types::{Error, Label, MaskSource, Result, SAMPLE_WHITE};
use ndarray::{Array2, ArrayView3, Axis};

/// Build the to-inpaint region of an image
///
/// # Arguments
/// * `image` - Samples shaped (rows, cols, channels)
/// * `source` - Quantity compared against the threshold
/// * `threshold` - Pixels strictly above this are inside
/// * `dilation` - Disc radius the region is grown by
pub fn build_region(
    image: ArrayView3<'_, f32>,
    source: MaskSource,
    threshold: f64,
    dilation: u32,
) -> Result<Array2<bool>> {
    let values = mask_values(image, source)?;
    let mask = values.mapv(|v| v > threshold);
    Ok(dilate(&mask, dilation))
}

/// Per-pixel mask-source value
pub fn mask_values(image: ArrayView3<'_, f32>, source: MaskSource) -> Result<Array2<f64>> {
    let channels = image.len_of(Axis(2));
    if channels < source.required_channels() {
        return Err(Error::Config(format!(
            "mask source {:?} needs {} channels, image has {}",
            source,
            source.required_channels(),
            channels
        )));
    }

    let values = image.map_axis(Axis(2), |px| {
        // f64::max/min skip NaN, so a NaN sample must poison the derived sources explicitly
        if px.iter().any(|v| v.is_nan()) && matches!(source, MaskSource::Black | MaskSource::White) {
            return f64::NAN;
        }
        match source {
            MaskSource::Red => px[0] as f64,
            MaskSource::Green => px[1] as f64,
            MaskSource::Blue => px[2] as f64,
            MaskSource::Black => {
                SAMPLE_WHITE - px.iter().fold(f64::NEG_INFINITY, |m, &v| m.max(v as f64))
            }
            MaskSource::White => px.iter().fold(f64::INFINITY, |m, &v| m.min(v as f64)),
        }
    });

    Ok(values)
}

/// Offsets of the disc structuring element `dr² + dc² <= r²`
pub fn disc_offsets(radius: u32) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dr in -r..=r {
        for dc in -r..=r {
            if dr * dr + dc * dc <= r * r {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

/// Grow a mask by a disc of the given radius
pub fn dilate(mask: &Array2<bool>, radius: u32) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }

    let (height, width) = mask.dim();
    let offsets = disc_offsets(radius);
    let mut dilated = mask.clone();

    for ((y, x), &inside) in mask.indexed_iter() {
        if !inside {
            continue;
        }
        for &(dr, dc) in &offsets {
            let ny = y as isize + dr;
            let nx = x as isize + dc;
            if ny >= 0 && nx >= 0 && (ny as usize) < height && (nx as usize) < width {
                dilated[(ny as usize, nx as usize)] = true;
            }
        }
    }

    dilated
}

/// Initial domain labeling: inside pixels need filling, the rest are known
pub fn domain_labels(inside: &Array2<bool>) -> Array2<Label> {
    inside.mapv(|m| if m { Label::Inside } else { Label::Known })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_threshold_red() {
        let mut image = Array3::<f32>::zeros((4, 4, 1));
        image[(1, 2, 0)] = 1.0;
        image[(3, 3, 0)] = 0.5;

        let region = build_region(image.view(), MaskSource::Red, 0.5, 0).unwrap();
        assert!(region[(1, 2)]);
        // Strictly greater than the threshold
        assert!(!region[(3, 3)]);
        assert_eq!(region.iter().filter(|&&m| m).count(), 1);
    }

    #[test]
    fn test_black_and_white_sources() {
        let mut image = Array3::<f32>::from_elem((2, 2, 3), 128.0);
        image[(0, 0, 0)] = 0.0;
        image[(0, 0, 1)] = 0.0;
        image[(0, 0, 2)] = 0.0;
        for c in 0..3 {
            image[(1, 1, c)] = 255.0;
        }

        let black = build_region(image.view(), MaskSource::Black, 250.0, 0).unwrap();
        assert!(black[(0, 0)]);
        assert_eq!(black.iter().filter(|&&m| m).count(), 1);

        let white = build_region(image.view(), MaskSource::White, 250.0, 0).unwrap();
        assert!(white[(1, 1)]);
        assert_eq!(white.iter().filter(|&&m| m).count(), 1);
    }

    #[test]
    fn test_missing_channel_rejected() {
        let image = Array3::<f32>::zeros((3, 3, 1));
        assert!(build_region(image.view(), MaskSource::Blue, 0.0, 0).is_err());
    }

    #[test]
    fn test_nan_never_inside() {
        let image = Array3::<f32>::from_elem((2, 2, 1), f32::NAN);
        for source in [MaskSource::Red, MaskSource::Black, MaskSource::White] {
            let region = build_region(image.view(), source, 0.0, 3).unwrap();
            assert!(region.iter().all(|&m| !m), "{source:?}");
        }
    }

    #[test]
    fn test_disc_offsets() {
        assert_eq!(disc_offsets(0), vec![(0, 0)]);
        // Radius 1 disc is the plus shape
        assert_eq!(disc_offsets(1).len(), 5);
        // Radius 2: 13 lattice points
        assert_eq!(disc_offsets(2).len(), 13);
    }

    #[test]
    fn test_dilate_disc_shape() {
        let mut mask = Array2::from_elem((7, 7), false);
        mask[(3, 3)] = true;

        let dilated = dilate(&mask, 2);
        assert!(dilated[(1, 3)]);
        assert!(dilated[(3, 5)]);
        assert!(dilated[(2, 2)]);
        // Corner of the bounding box is outside the disc
        assert!(!dilated[(1, 1)]);
        assert_eq!(dilated.iter().filter(|&&m| m).count(), 13);
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let mut mask = Array2::from_elem((3, 3), false);
        mask[(0, 0)] = true;
        let dilated = dilate(&mask, 1);
        assert!(dilated[(0, 1)]);
        assert!(dilated[(1, 0)]);
        assert!(!dilated[(1, 1)]);
    }

    #[test]
    fn test_dilation_is_monotone() {
        let mut mask = Array2::from_elem((12, 12), false);
        mask[(2, 3)] = true;
        mask[(8, 9)] = true;

        let mut previous = mask.clone();
        for radius in 0..6 {
            let dilated = dilate(&mask, radius);
            for (a, b) in previous.iter().zip(dilated.iter()) {
                assert!(!*a || *b, "radius {radius} shrank the region");
            }
            previous = dilated;
        }
    }
}
