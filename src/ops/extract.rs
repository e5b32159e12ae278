// ============================================================================
// CHANNEL EXTRACTION — RGB source → five single-channel 8-bit rasters
// ============================================================================
//
// Every function here is pure: it borrows the source and returns a new
// raster of the same dimensions. Work is split by row via rayon.
// ============================================================================

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::channels::{Channel, ChannelSet};
use crate::params::Weights;

/// Derive all five channels from `source`.
pub fn extract_channels(source: &RgbImage, weights: Weights) -> ChannelSet {
    ChannelSet::from_array(Channel::ALL.map(|channel| extract_channel(source, channel, weights)))
}

/// Derive a single channel. `weights` is only read for [`Channel::GrayNoGreen`].
pub fn extract_channel(source: &RgbImage, channel: Channel, weights: Weights) -> GrayImage {
    match channel {
        Channel::Grayscale => map_pixels(source, luma),
        Channel::Red => map_pixels(source, |r, _, _| r),
        Channel::Green => map_pixels(source, |_, g, _| g),
        Channel::Blue => map_pixels(source, |_, _, b| b),
        Channel::GrayNoGreen => {
            let (rw, bw) = (weights.red, weights.blue);
            map_pixels(source, move |r, g, b| weighted_gray(r, g, b, rw, 0.0, bw))
        }
    }
}

/// ITU-R 601 luma (0.299 R + 0.587 G + 0.114 B), truncated toward zero.
/// Integer thousandths keep pure white at 255.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let sum = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    (sum / 1000) as u8
}

/// Weighted sum of the three components, rounded and clamped to a byte.
#[inline]
pub fn weighted_gray(r: u8, g: u8, b: u8, rw: f32, gw: f32, bw: f32) -> u8 {
    let v = rw * r as f32 + gw * g as f32 + bw * b as f32;
    v.round().clamp(0.0, 255.0) as u8
}

/// Full tonal inversion of an RGB raster (255 - v on every component).
pub fn invert_rgb(source: &RgbImage) -> RgbImage {
    let mut out = source.clone();
    let raw: &mut [u8] = &mut out;
    raw.par_iter_mut().for_each(|v| *v = 255 - *v);
    out
}

fn map_pixels<F>(source: &RgbImage, f: F) -> GrayImage
where
    F: Fn(u8, u8, u8) -> u8 + Sync,
{
    let (w, h) = source.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let src_raw = source.as_raw();
    let stride = w as usize;
    let dst_raw: &mut [u8] = &mut out;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride * 3..(y + 1) * stride * 3];
        for (dst, px) in row_out.iter_mut().zip(row_in.chunks_exact(3)) {
            *dst = f(px[0], px[1], px[2]);
        }
    });

    out
}
