//! Decoding and color-mode normalization of uploaded images.
//!
//! Uploads are decoded from memory, their container format detected from the
//! bytes themselves, and the resulting buffer brought into one of the color
//! modes in [`ColorMode`]. Anything carrying an alpha channel (or a sample
//! type outside the safe set) is flattened to 8-bit RGB. Palette sources are
//! expanded by the decoders and then follow the same rule.

use std::io::Cursor;

use base64::Engine;
use image::{ColorType, DynamicImage, ImageFormat};

use crate::error::DecodeError;

/// An image as received from the user, before any decoding.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// MIME type declared by the uploader. Informational only.
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Color modes an image may have once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Luma8,
    Luma16,
    Rgb8,
    Rgb16,
}

impl ColorMode {
    /// Maps a decoded color type onto the safe set, if it already belongs to it.
    pub fn from_color_type(color: ColorType) -> Option<Self> {
        match color {
            ColorType::L8 => Some(ColorMode::Luma8),
            ColorType::L16 => Some(ColorMode::Luma16),
            ColorType::Rgb8 => Some(ColorMode::Rgb8),
            ColorType::Rgb16 => Some(ColorMode::Rgb16),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Luma8 => "L8",
            ColorMode::Luma16 => "L16",
            ColorMode::Rgb8 => "RGB8",
            ColorMode::Rgb16 => "RGB16",
        }
    }
}

/// A decoded image whose color mode is guaranteed to be in [`ColorMode`].
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    image: DynamicImage,
    mode: ColorMode,
    source_format: ImageFormat,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color_mode(&self) -> ColorMode {
        self.mode
    }

    /// Container format the image was decoded from.
    pub fn source_format(&self) -> ImageFormat {
        self.source_format
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_inner(self) -> DynamicImage {
        self.image
    }

    /// Encodes the pixel buffer as PNG, which is lossless for every mode in
    /// the safe set.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// Detects the container format of `bytes`, accepting only JPEG, PNG and WEBP.
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)) => Ok(format),
        Ok(other) => Err(DecodeError::UnsupportedFormat(format!("{other:?}"))),
        Err(_) => Err(DecodeError::UnsupportedFormat("unrecognized data".into())),
    }
}

/// Decodes an upload and converts it into a safe color mode.
pub fn normalize(upload: &UploadedImage) -> Result<NormalizedImage, DecodeError> {
    let format = detect_format(&upload.bytes)?;
    let decoded = image::load_from_memory_with_format(&upload.bytes, format)?;

    log::debug!(
        "Decoded {:?} image {}x{} ({:?}, declared as {})",
        format,
        decoded.width(),
        decoded.height(),
        decoded.color(),
        upload.mime_type
    );

    Ok(normalize_decoded(decoded, format))
}

fn normalize_decoded(image: DynamicImage, source_format: ImageFormat) -> NormalizedImage {
    match ColorMode::from_color_type(image.color()) {
        Some(mode) => NormalizedImage {
            image,
            mode,
            source_format,
        },
        None => {
            log::debug!("Converting {:?} to RGB8", image.color());
            NormalizedImage {
                image: DynamicImage::ImageRgb8(image.to_rgb8()),
                mode: ColorMode::Rgb8,
                source_format,
            }
        }
    }
}

/// Builds a `data:` URI of the uploaded bytes for the preview column.
///
/// The MIME type comes from the detected format so the browser never gets a
/// mismatched declaration.
pub fn preview_data_uri(upload: &UploadedImage) -> Result<String, DecodeError> {
    let format = detect_format(&upload.bytes)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&upload.bytes);
    Ok(format!("data:{};base64,{}", format.to_mime_type(), encoded))
}
