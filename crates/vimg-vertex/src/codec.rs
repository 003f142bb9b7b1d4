// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion between raw image bytes and the base64 text used on the wire.
//!
//! Decoding is lenient about representation and strict about content: data-URL
//! prefixes, line wrapping, the URL-safe alphabet and missing padding are all
//! repaired, while a payload that is still invalid afterwards yields a
//! [`CodecError`] the caller can classify as a decode failure.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use regex::Regex;
use thiserror::Error;

/// A payload that is not valid base64 after repairs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The stripped payload has a length that no padding can fix.
    #[error("invalid base64 length {len} (remainder 1 mod 4)")]
    InvalidLength { len: usize },

    #[error("invalid base64 payload: {0}")]
    InvalidSymbol(String),
}

/// Encodes bytes with the standard padded alphabet.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a base64 payload, with or without a `data:` prefix.
///
/// Decoding the same text twice yields identical bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let payload = match parse_data_url(text) {
        Some(url) => url.payload,
        None => text,
    };

    let normalized: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let unpadded = normalized.trim_end_matches('=');

    if unpadded.len() % 4 == 1 {
        return Err(CodecError::InvalidLength { len: unpadded.len() });
    }

    STANDARD_NO_PAD
        .decode(unpadded)
        .map_err(|e| CodecError::InvalidSymbol(e.to_string()))
}

/// The parts of a `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime_type: &'a str,
    pub payload: &'a str,
}

/// Parses a whole string as a data URL. Returns `None` if it is not one.
pub fn parse_data_url(text: &str) -> Option<DataUrl<'_>> {
    let rest = text.trim_start().strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64").unwrap_or(meta);
    Some(DataUrl {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream"
        } else {
            mime_type
        },
        payload,
    })
}

static IMAGE_DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:(image/[a-zA-Z0-9.+-]+);base64,([A-Za-z0-9+/=_-]+)")
        .expect("valid data URL regex")
});

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid link regex"));

/// Finds the first `data:image/...;base64,` URL embedded in free text.
///
/// The payload runs until the first character outside the base64 alphabets,
/// so wrapped payloads inside prose are cut at the first line break.
pub fn find_image_data_url(text: &str) -> Option<DataUrl<'_>> {
    let captures = IMAGE_DATA_URL.captures(text)?;
    Some(DataUrl {
        mime_type: captures.get(1)?.as_str(),
        payload: captures.get(2)?.as_str(),
    })
}

/// Finds the first `http://` or `https://` URL embedded in free text.
pub fn find_http_url(text: &str) -> Option<&str> {
    HTTP_URL.find(text).map(|m| m.as_str())
}

/// Identifies an image format from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Picks the mime type to record for decoded bytes.
///
/// A declared `image/*` type wins; otherwise the magic bytes decide, falling
/// back to PNG.
pub fn resolve_mime(declared: Option<&str>, bytes: &[u8]) -> String {
    match declared.map(str::trim) {
        Some(m) if m.to_ascii_lowercase().starts_with("image/") => m.to_string(),
        _ => sniff_mime(bytes).unwrap_or("image/png").to_string(),
    }
}
