//! Size-targeting compression loop.
//!
//! An image is encoded, measured, and re-encoded with a lower quality (JPEG and
//! WebP) or a smaller palette (PNG) until the output fits the byte budget or the
//! attempt budget is spent. From the third miss on, the image is also shrunk.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use imagequant::RGBA;
use std::borrow::Cow;

use crate::OutputFormat;

pub const MIN_QUALITY: u8 = 20;
pub const MAX_QUALITY: u8 = 95;
pub const QUALITY_STEP: u8 = 10;
pub const SCALE_STEP: f32 = 0.9;
pub const MIN_LOOP_SCALE: f32 = 0.7;
/// Zero-based attempt index from which a miss also shrinks the image.
pub const SCALE_AFTER_ATTEMPT: u32 = 2;
pub const DEFAULT_TARGET_SIZE: u64 = 20 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_QUALITY: u8 = 75;

// WebP maximum dimensions are 16383x16383
const MAX_WEBP_DIMENSION: u32 = 16383;

#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("invalid compression settings: {0}")]
    InvalidSettings(String),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("palette quantization failed: {0}")]
    Quantize(#[from] imagequant::Error),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("WebP encoding failed: {0}")]
    WebP(String),
}

/// Knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    /// Starting quality, clamped to [`MIN_QUALITY`]..=[`MAX_QUALITY`].
    pub quality: u8,
    /// Byte budget for the encoded output.
    pub target_size: u64,
    pub max_attempts: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            target_size: DEFAULT_TARGET_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CompressionSettings {
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.max_attempts == 0 {
            return Err(CompressError::InvalidSettings(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a compression run.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Quality of the returned encoding; `None` for PNG.
    pub quality: Option<u8>,
    /// Palette size of the returned encoding; PNG only.
    pub colors: Option<u32>,
    /// Number of encodes performed.
    pub attempts: u32,
    pub target_met: bool,
}

pub struct SizeTargetCompressor {
    settings: CompressionSettings,
}

impl SizeTargetCompressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Encode `image` as `format`, trading quality and scale for size.
    pub fn compress(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
    ) -> Result<EncodedImage, CompressError> {
        self.settings.validate()?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidDimensions { width, height });
        }

        let source = match format {
            OutputFormat::WebP => fit_webp_limits(image),
            OutputFormat::Jpeg | OutputFormat::Png => Cow::Borrowed(image),
        };
        let (source_width, source_height) = source.dimensions();
        let mut working: Cow<'_, DynamicImage> = Cow::Borrowed(&*source);

        let last_attempt = self.settings.max_attempts - 1;
        let uses_quality = format != OutputFormat::Png;
        let mut quality = clamp_quality(self.settings.quality);
        let mut scale = 1.0_f32;

        for attempt in 0..self.settings.max_attempts {
            let (data, colors) = match format {
                OutputFormat::Jpeg => (encode_jpeg(&working, quality)?, None),
                OutputFormat::WebP => (encode_webp(&working, quality)?, None),
                OutputFormat::Png => {
                    let colors = palette_colors(attempt);
                    (encode_png(&working, colors)?, Some(colors))
                }
            };

            let size = data.len() as u64;
            let target_met = size <= self.settings.target_size;
            let at_quality_floor = uses_quality && quality <= MIN_QUALITY;

            log::debug!(
                "{} attempt {}/{}: {} bytes at {}x{} (quality {}, colors {:?}, target {})",
                format,
                attempt + 1,
                self.settings.max_attempts,
                size,
                working.width(),
                working.height(),
                quality,
                colors,
                self.settings.target_size
            );

            if target_met || attempt == last_attempt || at_quality_floor {
                return Ok(EncodedImage {
                    data,
                    format,
                    width: working.width(),
                    height: working.height(),
                    quality: uses_quality.then_some(quality),
                    colors,
                    attempts: attempt + 1,
                    target_met,
                });
            }

            if uses_quality {
                quality = next_quality(quality);
            }

            if attempt >= SCALE_AFTER_ATTEMPT {
                scale = next_scale(scale);
                let (new_width, new_height) = scaled_dimensions(source_width, source_height, scale);
                if (new_width, new_height) != working.dimensions() {
                    working = Cow::Owned(source.resize_exact(
                        new_width,
                        new_height,
                        FilterType::Lanczos3,
                    ));
                }
            }
        }

        Err(CompressError::InvalidSettings(
            "max_attempts must be at least 1".to_string(),
        ))
    }
}

pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

pub fn next_quality(quality: u8) -> u8 {
    quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY)
}

pub fn next_scale(scale: f32) -> f32 {
    (scale * SCALE_STEP).max(MIN_LOOP_SCALE)
}

/// Palette size for a PNG attempt: full palette first, then 64 fewer colors per miss.
pub fn palette_colors(attempt: u32) -> u32 {
    if attempt == 0 {
        256
    } else {
        256_u32.saturating_sub(attempt.saturating_mul(64)).max(64)
    }
}

/// Truncating scale of a dimension pair, never below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    (new_width, new_height)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode_image(&rgb)?;
    }
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError> {
    // The libwebp wrapper only accepts 8-bit RGB/RGBA buffers; an alpha plane
    // is only kept when some pixel is actually translucent
    let prepared = match image.color().has_alpha().then(|| image.to_rgba8()) {
        Some(rgba) if rgba.pixels().any(|p| p[3] < u8::MAX) => DynamicImage::ImageRgba8(rgba),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };

    let encoder = webp::Encoder::from_image(&prepared)
        .map_err(|e| CompressError::WebP(e.to_string()))?;
    let memory = encoder.encode(f32::from(quality));
    Ok(memory.to_vec())
}

fn encode_png(image: &DynamicImage, colors: u32) -> Result<Vec<u8>, CompressError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels: Vec<RGBA> = rgba
        .pixels()
        .map(|p| RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let mut attributes = imagequant::Attributes::new();
    attributes.set_max_colors(colors)?;
    attributes.set_speed(4)?;

    let mut liq_image =
        imagequant::Image::new(&attributes, pixels, width as usize, height as usize, 0.0)?;
    let mut quantized = attributes.quantize(&mut liq_image)?;
    quantized.set_dithering_level(1.0)?;
    let (palette, indices) = quantized.remapped(&mut liq_image)?;

    let rgb_palette: Vec<u8> = palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect();

    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(rgb_palette);
        if palette.iter().any(|c| c.a < u8::MAX) {
            let alphas: Vec<u8> = palette.iter().map(|c| c.a).collect();
            encoder.set_trns(alphas);
        }
        encoder.set_compression(png::Compression::Best);
        encoder.set_filter(png::FilterType::NoFilter);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indices)?;
        writer.finish()?;
    }
    Ok(buffer)
}

/// Downscale images that exceed the WebP canvas limit.
fn fit_webp_limits(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    let (width, height) = image.dimensions();
    if width <= MAX_WEBP_DIMENSION && height <= MAX_WEBP_DIMENSION {
        return Cow::Borrowed(image);
    }

    // The long side lands exactly on the limit; the short side is truncated
    let long_side = u64::from(width.max(height));
    let shrink = |side: u32| {
        ((u64::from(side) * u64::from(MAX_WEBP_DIMENSION) / long_side) as u32).max(1)
    };
    let (new_width, new_height) = (shrink(width), shrink(height));

    log::warn!(
        "Resizing image from {}x{} to {}x{} to fit WebP limits",
        width,
        height,
        new_width,
        new_height
    );

    Cow::Owned(image.resize_exact(new_width, new_height, FilterType::Lanczos3))
}
