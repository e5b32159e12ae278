// ============================================================================
// ADJUSTMENT OPERATIONS — autocontrast and two-threshold contrast stretch
// ============================================================================
//
// Both adjustments are 256-entry lookup tables applied per pixel.
// Inputs are never modified; every call returns a new raster.
// Table application is parallelized by row via rayon.
// ============================================================================

use image::GrayImage;
use rayon::prelude::*;

use crate::params::StretchParams;

// ============================================================================
// HELPER: lookup-table application
// ============================================================================

/// Remap every pixel of `image` through `lut`.
pub fn apply_lut(image: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let src_raw = image.as_raw();
    let stride = w as usize;
    let dst_raw: &mut [u8] = &mut out;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for (dst, &v) in row_out.iter_mut().zip(row_in) {
            *dst = lut[v as usize];
        }
    });

    out
}

/// Smallest and largest pixel value, or `None` for an empty raster.
pub fn intensity_range(image: &GrayImage) -> Option<(u8, u8)> {
    let raw = image.as_raw();
    if raw.is_empty() {
        return None;
    }
    let (min, max) = raw
        .par_iter()
        .fold(|| (u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
        .reduce(|| (u8::MAX, u8::MIN), |(a, b), (c, d)| (a.min(c), b.max(d)));
    Some((min, max))
}

// ============================================================================
// AUTOCONTRAST
// ============================================================================

/// Stretch the observed intensity range of `image` to fill [0, 255].
/// A flat (or empty) raster is returned unchanged.
pub fn autocontrast(image: &GrayImage) -> GrayImage {
    match intensity_range(image) {
        Some((min, max)) if max > min => apply_lut(image, &build_autocontrast_lut(min, max)),
        _ => image.clone(),
    }
}

/// Table mapping `min` → 0 and `max` → 255 linearly, rounded.
/// Identity when there is no range to stretch.
pub fn build_autocontrast_lut(min: u8, max: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if max <= min {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }
    let range = (max - min) as f32;
    for (i, v) in lut.iter_mut().enumerate() {
        let stretched = (i as f32 - min as f32) * 255.0 / range;
        *v = stretched.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// ============================================================================
// CONTRAST STRETCH
// ============================================================================

/// Two-threshold piecewise-linear stretch.
///
/// Between `lower` and `upper` values are spread linearly over [0, 255].
/// Below `lower` pixels clip to black (white when `invert_lower`); above
/// `upper` they clip to white (black when `invert_upper`).
pub fn stretch(
    image: &GrayImage,
    lower: u8,
    upper: u8,
    invert_lower: bool,
    invert_upper: bool,
) -> GrayImage {
    let lut = build_stretch_lut(lower, upper, invert_lower, invert_upper);
    apply_lut(image, &lut)
}

/// [`stretch`] driven by a [`StretchParams`].
pub fn stretch_with(image: &GrayImage, params: &StretchParams) -> GrayImage {
    stretch(image, params.lower, params.upper, params.invert_lower, params.invert_upper)
}

/// Build the remap table used by [`stretch`].
///
/// With `lower == upper` the table is a plain binary split at `lower`
/// (values below → 0, the rest → 255) and both inversion flags are ignored.
/// Reversed thresholds are swapped before the table is built.
pub fn build_stretch_lut(lower: u8, upper: u8, invert_lower: bool, invert_upper: bool) -> [u8; 256] {
    let mut lut = [0u8; 256];

    if lower == upper {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = if i < lower as usize { 0 } else { 255 };
        }
        return lut;
    }

    let (lower, upper) = if upper < lower { (upper, lower) } else { (lower, upper) };
    let below = if invert_lower { 255 } else { 0 };
    let above = if invert_upper { 0 } else { 255 };
    let range = (upper - lower) as f32;

    for (i, v) in lut.iter_mut().enumerate() {
        *v = if i < lower as usize {
            below
        } else if i > upper as usize {
            above
        } else {
            let stretched = (i as f32 - lower as f32) * 255.0 / range;
            stretched.round().clamp(0.0, 255.0) as u8
        };
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp(w: u32, h: u32, lo: u8, hi: u8) -> GrayImage {
        let n = (w * h).max(2) - 1;
        GrayImage::from_fn(w, h, |x, y| {
            let i = y * w + x;
            Luma([lo + ((hi - lo) as u32 * i / n) as u8])
        })
    }

    #[test]
    fn autocontrast_fills_full_range() {
        let img = ramp(8, 8, 40, 180);
        let out = autocontrast(&img);
        assert_eq!(intensity_range(&out), Some((0, 255)));
    }

    #[test]
    fn autocontrast_is_idempotent() {
        for (lo, hi) in [(40, 180), (0, 1), (3, 250), (100, 101)] {
            let once = autocontrast(&ramp(9, 5, lo, hi));
            let twice = autocontrast(&once);
            assert_eq!(once, twice, "range {}..{}", lo, hi);
        }
    }

    #[test]
    fn autocontrast_keeps_flat_image() {
        for v in [0u8, 76, 255] {
            let img = GrayImage::from_pixel(4, 4, Luma([v]));
            assert_eq!(autocontrast(&img), img);
        }
    }

    #[test]
    fn autocontrast_rounds() {
        // (v - 10) * 255 / 3: 10 → 0, 11 → 85, 12 → 170, 13 → 255
        let lut = build_autocontrast_lut(10, 13);
        assert_eq!(&lut[10..14], &[0, 85, 170, 255]);
        // (v - 0) * 255 / 200 at v = 1 is 1.275 → 1, at v = 3 is 3.825 → 4
        let lut = build_autocontrast_lut(0, 200);
        assert_eq!(lut[1], 1);
        assert_eq!(lut[3], 4);
    }

    #[test]
    fn stretch_lut_is_monotonic_without_inverts() {
        for (lower, upper) in [(0, 255), (50, 100), (128, 255), (10, 11), (200, 30)] {
            let lut = build_stretch_lut(lower, upper, false, false);
            assert!(lut.windows(2).all(|w| w[0] <= w[1]), "{}..{}", lower, upper);
        }
    }

    #[test]
    fn stretch_lut_boundaries_are_exact() {
        for (lower, upper) in [(0, 255), (50, 100), (128, 255), (0, 1), (17, 203)] {
            let lut = build_stretch_lut(lower, upper, false, false);
            assert_eq!(lut[lower as usize], 0);
            assert_eq!(lut[upper as usize], 255);
        }
    }

    #[test]
    fn stretch_lut_inverted_clips() {
        let lut = build_stretch_lut(50, 100, true, true);
        assert_eq!(lut[0], 255);
        assert_eq!(lut[49], 255);
        assert_eq!(lut[50], 0);
        assert_eq!(lut[100], 255);
        assert_eq!(lut[101], 0);
        assert_eq!(lut[255], 0);

        let lut = build_stretch_lut(50, 100, false, true);
        assert_eq!(lut[49], 0);
        assert_eq!(lut[101], 0);
    }

    #[test]
    fn stretch_swaps_reversed_thresholds() {
        assert_eq!(
            build_stretch_lut(100, 50, false, false),
            build_stretch_lut(50, 100, false, false)
        );
    }

    #[test]
    fn degenerate_thresholds_split_at_value() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([(y * 16 + x) as u8]));
        let out = stretch(&img, 77, 77, false, false);
        for (src, dst) in img.pixels().zip(out.pixels()) {
            let expected = if src.0[0] < 77 { 0 } else { 255 };
            assert_eq!(dst.0[0], expected);
        }
        // Inversion flags play no part in the degenerate split.
        assert_eq!(stretch(&img, 77, 77, true, true), out);
    }

    #[test]
    fn stretch_example_value() {
        let img = GrayImage::from_pixel(4, 4, Luma([76]));
        let out = stretch(&img, 50, 100, false, false);
        assert!(out.pixels().all(|p| p.0[0] == 133));
    }

    #[test]
    fn stretch_with_matches_stretch() {
        let img = ramp(10, 10, 0, 255);
        let params = StretchParams { lower: 30, upper: 90, invert_lower: true, invert_upper: false };
        assert_eq!(stretch_with(&img, &params), stretch(&img, 30, 90, true, false));
    }

    #[test]
    fn empty_raster_passes_through() {
        let img = GrayImage::new(0, 0);
        assert_eq!(intensity_range(&img), None);
        assert_eq!(autocontrast(&img).dimensions(), (0, 0));
        assert_eq!(stretch(&img, 1, 2, false, false).dimensions(), (0, 0));
    }
}
