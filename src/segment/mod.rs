//! Chapter segmentation for plain-text manuscripts.
//!
//! The [`Segmenter`] walks trimmed, non-empty lines, asks the
//! [`rules`] which ones are chapter titles, and groups everything else under
//! the most recent title.
//!
//! # Example
//!
//! ```
//! use novelpub::segment::segment;
//!
//! let chapters = segment(["제1화 시작", "안녕하세요.", "제2화 다음날", "오늘은 맑다."]);
//! assert_eq!(chapters.len(), 2);
//! assert_eq!(chapters[0].title, "제1화 시작");
//! assert_eq!(chapters[1].body, vec!["오늘은 맑다."]);
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{debug, info};

use crate::book::{BODY_TITLE, CONTINUED_SUFFIX, Chapter, START_TITLE, Section};
use crate::util::{escape_html, strip_invalid_xml_chars};

pub mod rules;

pub use rules::{TitleLimits, TitleRule, classify};

/// Configuration for chapter detection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    #[serde(flatten)]
    pub limits: TitleLimits,
    /// Rules to try, in order.
    pub rules: Vec<TitleRule>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            limits: TitleLimits::default(),
            rules: TitleRule::ALL.to_vec(),
        }
    }
}

/// Splits manuscript lines into chapters.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentConfig,
}

impl Segmenter {
    /// Create a segmenter with the default rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the segmenter with custom settings.
    pub fn with_config(mut self, config: SegmentConfig) -> Self {
        self.config = config;
        self
    }

    /// The title rule that accepts `line`, if any.
    pub fn classify(&self, line: &str) -> Option<TitleRule> {
        classify(line, &self.config.rules, &self.config.limits)
    }

    /// Group lines into chapters.
    ///
    /// Characters XML cannot carry are removed, then lines are trimmed and
    /// blank ones dropped. Text before the first title becomes a chapter
    /// titled `시작` when there is any. A title followed directly by another
    /// title still yields a (bodyless) chapter. Without any recognised title
    /// the result is a single `본문` chapter.
    pub fn segment<I>(&self, lines: I) -> Vec<Chapter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut chapters = Vec::new();
        let mut current = Chapter::new(START_TITLE);
        let mut saw_title = false;

        for line in lines {
            let cleaned = strip_invalid_xml_chars(line.as_ref());
            let line = cleaned.trim();
            if line.is_empty() {
                continue;
            }

            match self.classify(line) {
                Some(rule) => {
                    debug!(title = line, rule = rule.name(), "Detected chapter title");
                    let finished = std::mem::replace(&mut current, Chapter::new(line));
                    if saw_title || !finished.body.is_empty() {
                        chapters.push(finished);
                    }
                    saw_title = true;
                }
                None => current.body.push(escape_html(line)),
            }
        }

        if !saw_title {
            debug!("No chapter titles detected; using a single chapter");
            return vec![Chapter::with_body(BODY_TITLE, current.body)];
        }
        chapters.push(current);

        info!(chapters = chapters.len(), "Segmented manuscript");
        chapters
    }

    /// Put every non-empty line into one `본문` chapter, detecting nothing.
    pub fn single_chapter<I>(lines: I) -> Vec<Chapter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let body = lines
            .into_iter()
            .filter_map(|line| {
                let cleaned = strip_invalid_xml_chars(line.as_ref());
                let line = cleaned.trim();
                (!line.is_empty()).then(|| escape_html(line))
            })
            .collect();
        vec![Chapter::with_body(BODY_TITLE, body)]
    }
}

/// Segment with the default configuration.
pub fn segment<I>(lines: I) -> Vec<Chapter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Segmenter::new().segment(lines)
}

/// Fold chapters whose index is not in `keep` into their neighbours.
///
/// An excluded chapter contributes a `[title]` line followed by its body to
/// the previous kept chapter. Exclusions before the first kept chapter start
/// a `본문` chapter instead. Nothing is dropped.
pub fn merge_excluded(chapters: Vec<Chapter>, keep: &BTreeSet<usize>) -> Vec<Chapter> {
    let mut merged: Vec<Chapter> = Vec::with_capacity(keep.len() + 1);

    for (idx, chapter) in chapters.into_iter().enumerate() {
        if keep.contains(&idx) {
            merged.push(chapter);
            continue;
        }

        debug!(index = idx, title = %chapter.title, "Folding excluded chapter");
        let marker = escape_html(&format!("[{}]", chapter.title));
        match merged.last_mut() {
            Some(previous) => {
                previous.body.push(marker);
                previous.body.extend(chapter.body);
            }
            None => {
                let mut body = Vec::with_capacity(chapter.body.len() + 1);
                body.push(marker);
                body.extend(chapter.body);
                merged.push(Chapter::with_body(BODY_TITLE, body));
            }
        }
    }

    merged
}

/// Split chapters longer than `chunk_size` lines into sections.
///
/// The first section keeps the chapter title; later ones are continuations
/// titled `"{title} (계속)"`. A `chunk_size` of zero disables splitting.
pub fn paginate(chapters: &[Chapter], chunk_size: usize) -> Vec<Section> {
    let mut sections = Vec::with_capacity(chapters.len());

    for chapter in chapters {
        if chunk_size == 0 || chapter.body.is_empty() {
            sections.push(Section {
                title: chapter.title.clone(),
                body: chapter.body.clone(),
                continuation: false,
            });
            continue;
        }

        for (i, chunk) in chapter.body.chunks(chunk_size).enumerate() {
            let continuation = i > 0;
            let title = if continuation {
                format!("{}{}", chapter.title, CONTINUED_SUFFIX)
            } else {
                chapter.title.clone()
            };
            sections.push(Section {
                title,
                body: chunk.to_vec(),
                continuation,
            });
        }
    }

    sections
}
