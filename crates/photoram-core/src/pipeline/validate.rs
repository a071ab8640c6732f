//! Magic-byte sniffing run before any decoder sees the file.

/// Number of leading bytes needed to recognise every supported signature.
pub const SNIFF_LEN: usize = 12;

/// Identify a raster container from its leading bytes.
///
/// Returns a short format name, or `None` when the header matches no
/// supported signature. Extensions are never trusted.
pub fn sniff_format(header: &[u8]) -> Option<&'static str> {
    if header.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpeg");
    }

    // PNG: 89 50 4E 47
    if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("png");
    }

    // GIF: GIF8
    if header.starts_with(b"GIF8") {
        return Some("gif");
    }

    // WebP: RIFF....WEBP
    if header.starts_with(b"RIFF") {
        return (header.len() >= SNIFF_LEN && &header[8..12] == b"WEBP").then_some("webp");
    }

    // BMP: BM
    if header.starts_with(b"BM") {
        return Some("bmp");
    }

    // TIFF: II*\0 (little-endian) or MM\0* (big-endian)
    if header.starts_with(&[b'I', b'I', 0x2A, 0x00]) || header.starts_with(&[b'M', b'M', 0x00, 0x2A])
    {
        return Some("tiff");
    }

    // HEIC/HEIF/AVIF: ISO-BMFF ftyp box at offset 4
    if header.len() >= SNIFF_LEN && &header[4..8] == b"ftyp" {
        return Some("isobmff");
    }

    None
}
