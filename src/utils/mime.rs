//! MIME type detection for embedded images.
//!
//! The contest export format records a `mimeType` next to every inlined image.

use std::path::Path;

/// Common MIME type constants.
pub mod types {
    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const SVG: &str = "image/svg+xml";
    pub const BMP: &str = "image/bmp";
    pub const PDF: &str = "application/pdf";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Guess MIME type from an image display name (`diagram.png`).
pub fn from_name(name: &str) -> &'static str {
    from_extension(Path::new(name).extension().and_then(|e| e.to_str()))
}

/// Guess MIME type from file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    match ext.map(str::to_ascii_lowercase).as_deref() {
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("svg") => types::SVG,
        Some("bmp") => types::BMP,
        Some("pdf") => types::PDF,
        _ => types::OCTET_STREAM,
    }
}

/// Sniff MIME type from leading magic bytes, falling back to `fallback`.
pub fn sniff(bytes: &[u8], fallback: &'static str) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => types::PNG,
        [0xFF, 0xD8, 0xFF, ..] => types::JPEG,
        [b'G', b'I', b'F', b'8', ..] => types::GIF,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => types::WEBP,
        [b'B', b'M', ..] => types::BMP,
        [b'%', b'P', b'D', b'F', ..] => types::PDF,
        _ => fallback,
    }
}

/// Detect the MIME type of an image, preferring its content over its name.
pub fn detect(name: &str, bytes: &[u8]) -> &'static str {
    sniff(bytes, from_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(from_name("graph.png"), types::PNG);
        assert_eq!(from_name("photo.JPEG"), types::JPEG);
        assert_eq!(from_name("tree.svg"), types::SVG);
        assert_eq!(from_name("noext"), types::OCTET_STREAM);
    }

    #[test]
    fn test_sniff_wins_over_name() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A];
        assert_eq!(detect("wrong.jpg", &png), types::PNG);
        assert_eq!(detect("tree.svg", b"<svg/>"), types::SVG);
    }
}
