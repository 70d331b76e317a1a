//! Image attachment preparation: validate, downscale, re-encode as JPEG and
//! wrap as a base64 data URL.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::api::ImageSource;

pub const DEFAULT_MAX_UPLOAD_MB: u64 = 5;
pub const MAX_IMAGE_WIDTH: u32 = 1200;
pub const JPEG_QUALITY: u8 = 80;
const OUTPUT_MIME: &str = "image/jpeg";
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_file_size_mb: u64,
    pub max_width: u32,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_file_size_mb: DEFAULT_MAX_UPLOAD_MB,
            max_width: MAX_IMAGE_WIDTH,
        }
    }
}

impl AttachmentLimits {
    pub fn with_max_file_size_mb(max_file_size_mb: u64) -> Self {
        Self {
            max_file_size_mb,
            ..Self::default()
        }
    }

    fn max_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }
}

/// Why an attachment was refused. `Display` is the message shown to the user.
#[derive(Debug)]
pub enum AttachmentError {
    NotAnImage,
    TooLarge { limit_mb: u64 },
    Read(io::Error),
    Decode(image::ImageError),
    Encode(image::ImageError),
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::NotAnImage => write!(f, "Please upload an image file (PNG, JPG, GIF)"),
            AttachmentError::TooLarge { limit_mb } => {
                write!(f, "File size exceeds {limit_mb}MB limit")
            }
            AttachmentError::Read(_) | AttachmentError::Decode(_) | AttachmentError::Encode(_) => {
                write!(f, "Error processing image")
            }
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AttachmentError::Read(err) => Some(err),
            AttachmentError::Decode(err) | AttachmentError::Encode(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl PreparedImage {
    pub fn to_image_source(&self) -> Option<ImageSource> {
        image_source_from_data_url(&self.data_url)
    }
}

/// Raster formats the decoder can read. Anything else, including SVG, is
/// sniffed from its first bytes and refused when that finds no image.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn sniff_mime(path: &Path) -> Result<Option<&'static str>, AttachmentError> {
    let mut header = [0_u8; 32];
    let mut file = fs::File::open(path).map_err(AttachmentError::Read)?;
    let read = file.read(&mut header).map_err(AttachmentError::Read)?;
    Ok(image::guess_format(&header[..read])
        .ok()
        .map(|format| format.to_mime_type()))
}

/// Accept only `image/*` types no larger than the configured ceiling.
pub fn validate(mime: &str, size_bytes: u64, limits: &AttachmentLimits) -> Result<(), AttachmentError> {
    if !mime.starts_with("image/") {
        return Err(AttachmentError::NotAnImage);
    }
    if size_bytes > limits.max_bytes() {
        return Err(AttachmentError::TooLarge {
            limit_mb: limits.max_file_size_mb,
        });
    }
    Ok(())
}

/// Proportional downscale so the width fits `max_width`; narrower images
/// keep their size.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round() as u32;
    (max_width, scaled.max(1))
}

/// Composite onto black, the way a canvas JPEG export drops transparency.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 { ((u16::from(channel) * alpha) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

pub fn prepare_image_bytes(bytes: &[u8], limits: &AttachmentLimits) -> Result<PreparedImage, AttachmentError> {
    let decoded = image::load_from_memory(bytes).map_err(AttachmentError::Decode)?;
    let (original_width, original_height) = (decoded.width(), decoded.height());
    let (width, height) = target_dimensions(original_width, original_height, limits.max_width);

    let mut rgb = flatten_alpha(&decoded);
    if (width, height) != (original_width, original_height) {
        rgb = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(AttachmentError::Encode)?;

    debug!(
        original_width,
        original_height,
        width,
        height,
        bytes = jpeg.len(),
        "prepared image attachment"
    );

    Ok(PreparedImage {
        data_url: format!("data:{OUTPUT_MIME};base64,{}", BASE64.encode(&jpeg)),
        width,
        height,
        original_width,
        original_height,
    })
}

/// Validate and transform an image file. Type and size are checked from the
/// path and file metadata before anything is decoded.
pub fn prepare_image(path: &Path, limits: &AttachmentLimits) -> Result<PreparedImage, AttachmentError> {
    let metadata = fs::metadata(path).map_err(AttachmentError::Read)?;
    let mime = match mime_from_extension(path) {
        Some(mime) => Some(mime),
        None => sniff_mime(path)?,
    }
    .ok_or(AttachmentError::NotAnImage)?;

    validate(mime, metadata.len(), limits)?;

    let bytes = fs::read(path).map_err(AttachmentError::Read)?;
    prepare_image_bytes(&bytes, limits)
}

/// Split a `data:<mime>;base64,<payload>` URL into an image source. The mime
/// falls back to `image/jpeg` when the prefix does not match.
pub fn image_source_from_data_url(data_url: &str) -> Option<ImageSource> {
    let (prefix, payload) = data_url.split_once(',')?;
    let mime = prefix
        .strip_prefix("data:")
        .and_then(|rest| rest.strip_suffix(";base64"))
        .filter(|mime| !mime.is_empty() && !mime.contains(';'))
        .unwrap_or(OUTPUT_MIME);
    Some(ImageSource::base64(mime, payload))
}
