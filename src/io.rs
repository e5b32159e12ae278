use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{GrayImage, ImageError, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Extensions accepted when loading a source photo (lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Default JPEG quality for exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Check if a path has one of the supported raster extensions.
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// FORMATS
// ============================================================================

/// Output formats a derived raster can be exported as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

/// Compression options for TIFF format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    Deflate,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name or file extension.
    pub fn from_name(name: &str) -> Option<SaveFormat> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<SaveFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SaveFormat::from_name)
    }
}

impl TiffCompression {
    pub fn from_name(name: &str) -> TiffCompression {
        match name.to_lowercase().as_str() {
            "lzw" => TiffCompression::Lzw,
            "deflate" => TiffCompression::Deflate,
            _ => TiffCompression::None,
        }
    }
}

/// Encoder settings for an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    /// `None` infers the format from the target extension.
    pub format: Option<SaveFormat>,
    pub quality: u8,
    pub tiff_compression: TiffCompression,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: None,
            quality: DEFAULT_JPEG_QUALITY,
            tiff_compression: TiffCompression::None,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for loading and exporting rasters
#[derive(Debug)]
pub enum ImageIoError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    UnsupportedFormat(String),
}

impl std::fmt::Display for ImageIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIoError::Io(e) => write!(f, "I/O error: {}", e),
            ImageIoError::Decode(e) => write!(f, "Decode error: {}", e),
            ImageIoError::Encode(e) => write!(f, "Encode error: {}", e),
            ImageIoError::UnsupportedFormat(e) => write!(f, "Unsupported format: {}", e),
        }
    }
}

impl std::error::Error for ImageIoError {}

impl From<std::io::Error> for ImageIoError {
    fn from(e: std::io::Error) -> Self {
        ImageIoError::Io(e)
    }
}

impl From<ImageError> for ImageIoError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => ImageIoError::Io(io),
            ImageError::Unsupported(u) => ImageIoError::UnsupportedFormat(u.to_string()),
            other => ImageIoError::Encode(other.to_string()),
        }
    }
}

impl From<tiff::TiffError> for ImageIoError {
    fn from(e: tiff::TiffError) -> Self {
        ImageIoError::Encode(format!("TIFF encode error: {}", e))
    }
}

// ============================================================================
// LOAD
// ============================================================================

/// Decode a photo into an RGB raster. Any alpha channel is dropped.
///
/// The file handle lives only for the duration of the decode.
pub fn load_source_image(path: &Path) -> Result<RgbImage, ImageIoError> {
    let img = image::open(path).map_err(|e| match e {
        ImageError::IoError(io) => ImageIoError::Io(io),
        other => ImageIoError::Decode(other.to_string()),
    })?;
    Ok(img.to_rgb8())
}

// ============================================================================
// EXPORT
// ============================================================================

/// Encode and write a single-channel raster to `path`.
///
/// The image is encoded into a hidden sibling file which is renamed over
/// `path` only once encoding succeeded, so a failed save never leaves a
/// truncated file behind.
pub fn export_gray_image(
    image: &GrayImage,
    path: &Path,
    options: &ExportOptions,
) -> Result<(), ImageIoError> {
    let format = match options.format {
        Some(f) => f,
        None => SaveFormat::from_path(path).ok_or_else(|| {
            ImageIoError::UnsupportedFormat(format!("cannot infer format from '{}'", path.display()))
        })?,
    };

    let tmp = temp_path_for(path);
    let result = write_encoded(image, &tmp, format, options).and_then(|()| {
        fs::rename(&tmp, path)?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_encoded(
    image: &GrayImage,
    path: &Path,
    format: SaveFormat,
    options: &ExportOptions,
) -> Result<(), ImageIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_into(image, &mut writer, format, options)?;
    writer.flush()?;
    Ok(())
}

fn encode_into(
    image: &GrayImage,
    writer: &mut BufWriter<File>,
    format: SaveFormat,
    options: &ExportOptions,
) -> Result<(), ImageIoError> {
    let (w, h) = image.dimensions();
    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(writer);
            #[allow(deprecated)]
            encoder.encode(image.as_raw(), w, h, image::ColorType::L8)?;
        }
        SaveFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(writer, options.quality.clamp(1, 100));
            encoder.encode(image.as_raw(), w, h, image::ColorType::L8)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(writer);
            encoder.encode(image.as_raw(), w, h, image::ColorType::L8)?;
        }
        SaveFormat::Tiff => {
            use tiff::encoder::{TiffEncoder, colortype::Gray8, compression};
            let mut tiff_enc = TiffEncoder::new(writer)?;
            match options.tiff_compression {
                TiffCompression::None => {
                    tiff_enc.write_image::<Gray8>(w, h, image.as_raw())?;
                }
                TiffCompression::Lzw => {
                    tiff_enc.write_image_with_compression::<Gray8, _>(
                        w,
                        h,
                        compression::Lzw,
                        image.as_raw(),
                    )?;
                }
                TiffCompression::Deflate => {
                    tiff_enc.write_image_with_compression::<Gray8, _>(
                        w,
                        h,
                        compression::Deflate::default(),
                        image.as_raw(),
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// `dir/name.png` → `dir/.name.png.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
