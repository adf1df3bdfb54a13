//! Text decoding, escaping and media sniffing helpers.

use std::borrow::Cow;

use encoding_rs::{EUC_KR, Encoding, UTF_8};
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Encoding Detection
// ============================================================================

/// Work out which encoding a text file was saved in.
///
/// Checks, in order:
/// 1. A byte order mark
/// 2. Strict UTF-8
/// 3. Strict EUC-KR (decoded as CP949, the superset Windows actually writes)
///
/// Anything else is reported as [`Error::DecodingAmbiguity`].
pub fn detect_encoding(bytes: &[u8]) -> Result<&'static Encoding> {
    if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
        return Ok(encoding);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Ok(UTF_8);
    }

    let (_, malformed) = EUC_KR.decode_without_bom_handling(bytes);
    if !malformed {
        return Ok(EUC_KR);
    }

    Err(Error::DecodingAmbiguity(format!(
        "{} bytes are neither UTF-8 nor EUC-KR",
        bytes.len()
    )))
}

/// Decode a manuscript to a string. Never fails.
///
/// Uses [`detect_encoding`]; when that is inconclusive the bytes are decoded
/// as EUC-KR with undecodable sequences replaced by U+FFFD.
///
/// # Examples
///
/// ```
/// use novelpub::util::decode_text;
///
/// assert_eq!(decode_text("제1화".as_bytes()), "제1화");
/// // "안녕" in EUC-KR
/// assert_eq!(decode_text(&[0xBE, 0xC8, 0xB3, 0xE7]), "안녕");
/// ```
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match detect_encoding(bytes) {
        Ok(encoding) => {
            debug!(encoding = encoding.name(), "Detected text encoding");
            let (text, _, _) = encoding.decode(bytes);
            text
        }
        Err(err) => {
            warn!("{err}; decoding as EUC-KR with replacement characters");
            let (text, _, _) = EUC_KR.decode(bytes);
            text
        }
    }
}

/// Split decoded text into trimmed, non-empty lines.
///
/// Accepts `\n`, `\r\n` and bare `\r` line endings.
pub fn non_empty_lines(text: &str) -> Vec<&str> {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Whether `c` may appear in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Drop characters XML 1.0 forbids, such as the `\x1A` EOF marker old
/// DOS text files end with.
pub fn strip_invalid_xml_chars(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

// ============================================================================
// HTML Escaping
// ============================================================================

/// Escape text for use in XHTML element content or attribute values.
///
/// Characters XML cannot carry are dropped.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c if !is_xml_char(c) => {}
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_html`].
///
/// Also resolves the other numeric and named forms XML parsers commonly hand
/// back (`&apos;`, `&#39;`).
pub fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(semi) => match resolve_entity(&tail[1..semi]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve an entity name (without `&` and `;`) to its character.
pub(crate) fn resolve_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        _ => {}
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

// ============================================================================
// Resource Format Detection
// ============================================================================

/// Detected resource format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
    /// WebP image
    WebP,
    /// OpenType font
    Otf,
    /// Unknown/binary format
    Binary,
}

impl MediaFormat {
    /// MIME type as written into an EPUB 2 manifest.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Otf => "application/vnd.ms-opentype",
            MediaFormat::Binary => "application/octet-stream",
        }
    }

    /// File extension used for archive entries of this format.
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::WebP => "webp",
            MediaFormat::Otf => "otf",
            MediaFormat::Binary => "bin",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            MediaFormat::Jpeg | MediaFormat::Png | MediaFormat::Gif | MediaFormat::WebP
        )
    }
}

/// Detect an image format from its leading bytes.
pub fn sniff_media_format(data: &[u8]) -> MediaFormat {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return MediaFormat::Jpeg;
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        return MediaFormat::Png;
    }
    if data.starts_with(b"GIF8") {
        return MediaFormat::Gif;
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return MediaFormat::WebP;
    }
    if data.starts_with(b"OTTO") {
        return MediaFormat::Otf;
    }
    MediaFormat::Binary
}

// ============================================================================
// Tests
// ============================================================================
