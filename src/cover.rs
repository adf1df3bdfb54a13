//! Cover image preparation, validation and lookup.

use std::io::Cursor;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::book::CoverImage;
use crate::error::{Error, Result};
use crate::util::{MediaFormat, sniff_media_format};

/// Extensions accepted by [`is_valid_image_url`].
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// How cover images are normalised and fetched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoverPolicy {
    /// Decode, downscale and re-encode covers as JPEG.
    pub normalize: bool,
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
    pub fetch_timeout_secs: u64,
}

impl Default for CoverPolicy {
    fn default() -> Self {
        Self {
            normalize: true,
            max_width: 1200,
            max_height: 1800,
            quality: 85,
            fetch_timeout_secs: 10,
        }
    }
}

impl CoverPolicy {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Turn raw image bytes into a packageable cover.
///
/// With `normalize` set the image is decoded, shrunk to fit within
/// `max_width` x `max_height` (never enlarged) and re-encoded as JPEG.
/// Otherwise the bytes are kept and only their format is sniffed.
pub fn prepare_cover(data: Vec<u8>, policy: &CoverPolicy) -> Result<CoverImage> {
    let format = sniff_media_format(&data);

    if !policy.normalize {
        if !format.is_image() {
            return Err(Error::AssetUnavailable(
                "cover is not a JPEG, PNG, GIF or WebP image".into(),
            ));
        }
        return Ok(CoverImage::new(data, format));
    }

    let img = image::load_from_memory(&data)
        .map_err(|e| Error::AssetUnavailable(format!("cannot decode cover image: {e}")))?;

    let (width, height) = img.dimensions();
    let img = if width > policy.max_width || height > policy.max_height {
        debug!(
            width,
            height,
            max_width = policy.max_width,
            max_height = policy.max_height,
            "Downscaling cover"
        );
        img.resize(policy.max_width, policy.max_height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, policy.quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::AssetUnavailable(format!("cannot encode cover image: {e}")))?;

    Ok(CoverImage::new(buf.into_inner(), MediaFormat::Jpeg))
}

/// Does `url` look like a directly downloadable image?
///
/// Requires an `http`/`https` scheme and an image extension on the path;
/// query strings and fragments are ignored.
pub fn is_valid_image_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    let Some(rest) = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
    else {
        return false;
    };

    let path = rest.split(['?', '#']).next().unwrap_or_default();
    // host alone is not an image
    path.contains('/') && IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Download a cover image.
#[cfg(feature = "remote")]
pub fn fetch_cover(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    if !is_valid_image_url(url) {
        return Err(Error::InvalidCoverUrl(url.to_string()));
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0")
        .build()
        .map_err(|e| Error::RemoteFetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::RemoteFetch(format!("{url}: {e}")))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::RemoteFetch(format!(
            "{url}: HTTP {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .map_err(|e| Error::RemoteFetch(format!("{url}: {e}")))?;
    debug!(url, bytes = bytes.len(), "Fetched cover");
    Ok(bytes.to_vec())
}

/// A reverse image search provider.
///
/// No provider ships with the crate; callers plug in their own.
pub trait ImageSearch {
    /// Candidate image URLs for `query`, best first.
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
}

/// Default search query for a book title.
pub fn cover_query(title: &str) -> String {
    format!("{title} 소설 표지")
}

/// Search for a cover and return the first candidate that can be fetched
/// and prepared.
///
/// Invalid URLs are skipped. Fetch or decode failures move on to the next
/// candidate. Returns `Ok(None)` when nothing usable was found.
pub fn search_cover<S, F>(
    provider: &S,
    query: &str,
    max_results: usize,
    policy: &CoverPolicy,
    mut fetch: F,
) -> Result<Option<CoverImage>>
where
    S: ImageSearch + ?Sized,
    F: FnMut(&str) -> Result<Vec<u8>>,
{
    let candidates = provider.search(query, max_results)?;
    debug!(query, candidates = candidates.len(), "Cover search results");

    for url in candidates.iter().filter(|url| is_valid_image_url(url)) {
        match fetch(url).and_then(|data| prepare_cover(data, policy)) {
            Ok(cover) => return Ok(Some(cover)),
            Err(err) => warn!(url = url.as_str(), "Skipping cover candidate: {err}"),
        }
    }

    Ok(None)
}
