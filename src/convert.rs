//! Text to EPUB conversion pipeline.
//!
//! A [`ConversionRequest`] carries everything one conversion needs; [`convert`]
//! decodes, segments, resolves the cover and packages, returning a
//! [`ConversionOutput`]. No state survives between calls.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::book::{Book, Chapter, ChapterStats, CoverImage};
use crate::config::Config;
use crate::cover::{CoverPolicy, prepare_cover};
use crate::epub::{EpubPackager, FontChoice};
use crate::error::Result;
use crate::segment::{Segmenter, merge_excluded};
use crate::util::{decode_text, non_empty_lines};

/// Inputs above this size get a warning; they still convert.
pub const LARGE_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Title used when none can be derived.
pub const UNTITLED: &str = "제목 없음";

/// File stem used when a title sanitises to nothing.
pub const FALLBACK_FILE_STEM: &str = "converted_ebook";

const MAX_FILE_STEM_CHARS: usize = 50;
const ILLEGAL_FILE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Where the cover comes from.
#[derive(Debug, Clone, Default)]
pub enum CoverSource {
    #[default]
    None,
    /// Raw image file contents.
    Bytes(Vec<u8>),
    /// Image URL, fetched when the `remote` feature is enabled.
    Url(String),
}

/// One conversion job.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Manuscript bytes in any supported encoding.
    pub text: Vec<u8>,
    pub title: String,
    /// Overrides the configured font when set.
    pub font: Option<FontChoice>,
    /// Detect chapters; when off everything is one chapter.
    pub split_chapters: bool,
    /// Indices of chapters to keep; the rest are folded into neighbours.
    pub keep: Option<BTreeSet<usize>>,
    pub cover: CoverSource,
}

impl ConversionRequest {
    pub fn new(text: impl Into<Vec<u8>>, title: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: title.into(),
            font: None,
            split_chapters: true,
            keep: None,
            cover: CoverSource::None,
        }
    }

    pub fn with_font(mut self, font: FontChoice) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_split_chapters(mut self, split: bool) -> Self {
        self.split_chapters = split;
        self
    }

    pub fn with_keep(mut self, keep: BTreeSet<usize>) -> Self {
        self.keep = Some(keep);
        self
    }

    pub fn with_cover(mut self, cover: CoverSource) -> Self {
        self.cover = cover;
        self
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The complete EPUB archive.
    pub epub: Vec<u8>,
    /// Suggested file name, `.epub` included.
    pub file_name: String,
    pub stats: ChapterStats,
    pub has_cover: bool,
}

/// Run one conversion.
///
/// Only packaging failures are errors. A cover that cannot be loaded is
/// dropped with a warning.
///
/// # Example
///
/// ```
/// use novelpub::config::Config;
/// use novelpub::convert::{ConversionRequest, convert};
///
/// let request = ConversionRequest::new("제1화\n안녕하세요.\n제2화\n또 만나요.", "인사");
/// let output = convert(request, &Config::default())?;
/// assert_eq!(output.stats.chapters, 2);
/// assert_eq!(output.file_name, "인사.epub");
/// # Ok::<(), novelpub::Error>(())
/// ```
pub fn convert(request: ConversionRequest, config: &Config) -> Result<ConversionOutput> {
    let ConversionRequest {
        text,
        title,
        font,
        split_chapters,
        keep,
        cover,
    } = request;

    let mut chapters = split_text(&text, config, split_chapters);
    if let Some(keep) = &keep {
        chapters = merge_excluded(chapters, keep);
    }

    let title = match title.trim() {
        "" => UNTITLED.to_string(),
        trimmed => trimmed.to_string(),
    };

    let mut book = Book::new(title, chapters);
    book.cover = resolve_cover(cover, &config.cover);
    let stats = book.stats();

    let mut package_config = config.package.clone();
    if let Some(font) = font {
        package_config.font = font;
    }
    let epub = EpubPackager::new()
        .with_config(package_config)
        .package_to_vec(&book)?;

    info!(
        title = %book.title,
        chapters = stats.chapters,
        lines = stats.lines,
        bytes = epub.len(),
        "Converted manuscript"
    );

    Ok(ConversionOutput {
        epub,
        file_name: format!("{}.epub", sanitize_file_name(&book.title)),
        stats,
        has_cover: book.cover.is_some(),
    })
}

/// Decode and segment manuscript bytes without packaging.
pub fn split_text(text: &[u8], config: &Config, split_chapters: bool) -> Vec<Chapter> {
    if text.len() > LARGE_INPUT_BYTES {
        warn!(
            bytes = text.len(),
            "Input is over 10 MiB; conversion may be slow"
        );
    }

    let decoded = decode_text(text);
    let lines = non_empty_lines(&decoded);
    if split_chapters {
        Segmenter::new()
            .with_config(config.segment.clone())
            .segment(lines)
    } else {
        Segmenter::single_chapter(lines)
    }
}

fn resolve_cover(source: CoverSource, policy: &CoverPolicy) -> Option<CoverImage> {
    let data = match source {
        CoverSource::None => return None,
        CoverSource::Bytes(data) => data,
        CoverSource::Url(url) => match fetch(&url, policy) {
            Ok(data) => data,
            Err(err) => {
                warn!("{err}; continuing without a cover");
                return None;
            }
        },
    };

    match prepare_cover(data, policy) {
        Ok(cover) => Some(cover),
        Err(err) => {
            warn!("{err}; continuing without a cover");
            None
        }
    }
}

#[cfg(feature = "remote")]
fn fetch(url: &str, policy: &CoverPolicy) -> Result<Vec<u8>> {
    crate::cover::fetch_cover(url, policy.fetch_timeout())
}

#[cfg(not(feature = "remote"))]
fn fetch(url: &str, _policy: &CoverPolicy) -> Result<Vec<u8>> {
    Err(crate::error::Error::RemoteFetch(format!(
        "{url}: built without remote fetching"
    )))
}

/// Derive a book title from an uploaded file name.
///
/// `+` and `_` become spaces, characters illegal in file names are removed,
/// and runs of whitespace collapse to one space.
pub fn title_from_file_name(path: impl AsRef<Path>) -> String {
    let stem = path
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = stem
        .chars()
        .map(|c| if c == '+' || c == '_' { ' ' } else { c })
        .filter(|c| !ILLEGAL_FILE_CHARS.contains(c))
        .collect();
    let title = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Make a title safe to use as a file stem.
pub fn sanitize_file_name(title: &str) -> String {
    let stem: String = title
        .chars()
        .filter(|c| !ILLEGAL_FILE_CHARS.contains(c) && !c.is_control())
        .take(MAX_FILE_STEM_CHARS)
        .collect();
    let stem = stem.trim();

    if stem.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BODY_TITLE;
    use crate::epub::inspect_epub_bytes;

    const MANUSCRIPT: &str = "머리말\n제1화 시작\n안녕하세요.\n\n제2화 다음날\n오늘은 맑다.\n";

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("달빛_조각사+1권.txt"), "달빛 조각사 1권");
        assert_eq!(title_from_file_name("/uploads/a  b__c.txt"), "a b c");
        assert_eq!(title_from_file_name("what?.txt"), "what");
        assert_eq!(title_from_file_name("___.txt"), UNTITLED);
        assert_eq!(title_from_file_name(""), UNTITLED);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("나의 소설"), "나의 소설");
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_file_name("???"), FALLBACK_FILE_STEM);
        assert_eq!(sanitize_file_name("  "), FALLBACK_FILE_STEM);

        let long = "가".repeat(80);
        assert_eq!(sanitize_file_name(&long).chars().count(), 50);
    }

    #[test]
    fn test_convert_splits_chapters() {
        let output = convert(ConversionRequest::new(MANUSCRIPT, "소설"), &Config::default()).unwrap();

        assert_eq!(output.file_name, "소설.epub");
        assert_eq!(output.stats, ChapterStats { chapters: 3, lines: 3 });
        assert!(!output.has_cover);

        let summary = inspect_epub_bytes(&output.epub).unwrap();
        assert_eq!(summary.title, "소설");
        let labels: Vec<&str> = summary.toc.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["시작", "제1화 시작", "제2화 다음날"]);
    }

    #[test]
    fn test_convert_without_split() {
        let request = ConversionRequest::new(MANUSCRIPT, "소설").with_split_chapters(false);
        let output = convert(request, &Config::default()).unwrap();
        assert_eq!(output.stats, ChapterStats { chapters: 1, lines: 5 });

        let summary = inspect_epub_bytes(&output.epub).unwrap();
        assert_eq!(summary.toc.len(), 1);
        assert_eq!(summary.toc[0].label, BODY_TITLE);
    }

    #[test]
    fn test_convert_with_keep_filter() {
        let request = ConversionRequest::new(MANUSCRIPT, "소설").with_keep(BTreeSet::from([1]));
        let output = convert(request, &Config::default()).unwrap();
        // 시작 folds into a new 본문, 제2화 into 제1화
        assert_eq!(output.stats.chapters, 2);
        assert_eq!(output.stats.lines, 5);
    }

    #[test]
    fn test_convert_blank_title_and_bad_cover() {
        let request = ConversionRequest::new("본문만 있다", "   ")
            .with_cover(CoverSource::Bytes(b"definitely not an image".to_vec()));
        let output = convert(request, &Config::default()).unwrap();

        assert_eq!(output.file_name, format!("{UNTITLED}.epub"));
        assert!(!output.has_cover);
        assert!(inspect_epub_bytes(&output.epub).unwrap().cover.is_none());
    }

    #[test]
    fn test_convert_invalid_cover_url_degrades() {
        let request = ConversionRequest::new("본문", "책")
            .with_cover(CoverSource::Url("not-a-url".into()));
        let output = convert(request, &Config::default()).unwrap();
        assert!(!output.has_cover);
    }

    #[test]
    fn test_split_text_decodes_euc_kr() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("제1화\n안녕");
        let chapters = split_text(&bytes, &Config::default(), true);
        assert_eq!(chapters, vec![Chapter::with_body("제1화", vec!["안녕".into()])]);
    }
}
