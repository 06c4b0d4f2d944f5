use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

/// Extensions picked up by folder scans.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "webp", "ico", "tga",
];

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Get file extension (lowercase)
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if extension is supported
pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}

/// Error types for image validation
#[derive(Debug, thiserror::Error)]
pub enum ImageValidationError {
    #[error("Invalid file extension")]
    InvalidExtension,
    #[error("File not found")]
    FileNotFound,
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid image header")]
    InvalidHeader,
    #[error("File too small to be a valid image")]
    FileTooSmall,
}

/// Validate if file is a valid image format with header checking
pub fn is_valid_image_file(path: &Path) -> bool {
    validate_image_file(path).is_ok()
}

/// Validate image file with detailed error information
pub fn validate_image_file(path: &Path) -> Result<(), ImageValidationError> {
    if !path.is_file() {
        return Err(ImageValidationError::FileNotFound);
    }

    let extension = get_file_extension(path).ok_or(ImageValidationError::InvalidExtension)?;

    if !is_supported_extension(&extension) {
        return Err(ImageValidationError::InvalidExtension);
    }

    validate_image_header(path, &extension)
}

/// Reject files whose magic number contradicts their extension
fn validate_image_header(path: &Path, extension: &str) -> Result<(), ImageValidationError> {
    let header_size = match extension {
        "webp" => 12,
        "png" => 8,
        "gif" => 6,
        "tiff" | "tif" => 4,
        "jpg" | "jpeg" | "bmp" => 2,
        // ICO and TGA carry no reliable signature
        _ => return Ok(()),
    };

    let mut header = Vec::with_capacity(header_size);
    File::open(path)?
        .take(header_size as u64)
        .read_to_end(&mut header)?;

    if header.len() < header_size {
        return Err(ImageValidationError::FileTooSmall);
    }

    let is_valid = match extension {
        "jpg" | "jpeg" => header[0] == 0xFF && header[1] == 0xD8,
        "png" => header == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        "gif" => header[0..6] == *b"GIF87a" || header[0..6] == *b"GIF89a",
        "bmp" => header[0..2] == *b"BM",
        "tiff" | "tif" => {
            header[0..4] == [0x49, 0x49, 0x2A, 0x00] || // little-endian
            header[0..4] == [0x4D, 0x4D, 0x00, 0x2A] // big-endian
        }
        "webp" => header[0..4] == *b"RIFF" && header[8..12] == *b"WEBP",
        _ => return Err(ImageValidationError::InvalidExtension),
    };

    if is_valid {
        Ok(())
    } else {
        Err(ImageValidationError::InvalidHeader)
    }
}
