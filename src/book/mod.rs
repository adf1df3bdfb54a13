//! In-memory model shared by the segmenter and the packager.

use crate::util::{MediaFormat, unescape_html};

/// Title given to text that precedes the first detected chapter.
pub const START_TITLE: &str = "시작";

/// Title of the single chapter produced when no chapter titles are found.
pub const BODY_TITLE: &str = "본문";

/// Suffix appended to the titles of continuation sections.
pub const CONTINUED_SUFFIX: &str = " (계속)";

/// A titled run of consecutive body lines.
///
/// `title` is raw text. `body` lines are already HTML-escaped and are
/// written into documents verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub body: Vec<String>,
}

impl Chapter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: Vec::new(),
        }
    }

    pub fn with_body(title: impl Into<String>, body: Vec<String>) -> Self {
        Self {
            title: title.into(),
            body,
        }
    }

    /// Body lines with the HTML escaping undone.
    pub fn raw_body(&self) -> impl Iterator<Item = String> + '_ {
        self.body.iter().map(|line| unescape_html(line))
    }
}

/// One pagination fragment of a [`Chapter`].
///
/// Continuations keep their place in reading order but get no heading and
/// no table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: Vec<String>,
    pub continuation: bool,
}

impl Section {
    pub fn is_navigable(&self) -> bool {
        !self.continuation
    }
}

/// Cover image ready to be written into the package.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub format: MediaFormat,
}

impl CoverImage {
    pub fn new(data: Vec<u8>, format: MediaFormat) -> Self {
        Self { data, format }
    }

    /// Archive path relative to the package document.
    pub fn href(&self) -> String {
        format!("cover.{}", self.format.extension())
    }
}

/// Everything the packager needs to know about one book.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub cover: Option<CoverImage>,
}

impl Book {
    pub fn new(title: impl Into<String>, chapters: Vec<Chapter>) -> Self {
        Self {
            title: title.into(),
            chapters,
            cover: None,
        }
    }

    pub fn with_cover(mut self, cover: CoverImage) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn stats(&self) -> ChapterStats {
        ChapterStats::of(&self.chapters)
    }
}

/// Chapter and line counts reported after segmentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct ChapterStats {
    pub chapters: usize,
    pub lines: usize,
}

impl ChapterStats {
    pub fn of(chapters: &[Chapter]) -> Self {
        Self {
            chapters: chapters.len(),
            lines: chapters.iter().map(|c| c.body.len()).sum(),
        }
    }
}
