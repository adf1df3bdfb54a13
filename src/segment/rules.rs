//! Chapter title heuristics.
//!
//! Each heuristic is a [`TitleRule`]. A line is a title if any rule in the
//! configured list accepts it; rules are tried in list order and the first
//! match is reported.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static NUMBERED_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^제\s*[0-9]+\s*[화장회절편부권]").expect("valid regex"));
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[.\-\s]\s*\S").expect("valid regex"));
static SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\s?대\s?[0-9]+").expect("valid regex"));
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4}[-./][0-9]{1,2}[-./][0-9]{1,2}").expect("valid regex"));
static DIGITS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static PROLOGUE_EPILOGUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(프롤로그|에필로그|prologue|epilogue)").expect("valid regex")
});
static ENGLISH_CHAPTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^chapter\s*[0-9]+").expect("valid regex"));
static EPISODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ep\s*\.?\s*[0-9]+").expect("valid regex"));

/// Characters that mark a bracketed line as dialogue or an aside.
const PROSE_MARKS: [char; 4] = ['.', '!', '?', '…'];

/// Length limits applied before and during rule matching.
///
/// Lengths are counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TitleLimits {
    /// Lines longer than this are never titles.
    pub max_title_len: usize,
    /// `LeadingNumber` titles must be shorter than this.
    pub short_title_len: usize,
    /// `Bracketed` titles must be shorter than this.
    pub bracket_title_len: usize,
}

impl Default for TitleLimits {
    fn default() -> Self {
        Self {
            max_title_len: 50,
            short_title_len: 20,
            bracket_title_len: 15,
        }
    }
}

/// A named chapter-title heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitleRule {
    /// `제1화`, `제 3 장`, `제12권` ...
    NumberedVolume,
    /// `1. 출발`, `2 귀환`. Short lines only; scores and dates excluded.
    LeadingNumber,
    /// `[외전]`, `<1부>`. Short lines without sentence punctuation.
    Bracketed,
    /// A bare number such as `17`.
    DigitsOnly,
    /// `프롤로그`, `에필로그`, `Prologue`, `Epilogue`.
    PrologueEpilogue,
    /// `Chapter 3`, `CHAPTER 12`.
    EnglishChapter,
    /// `EP.1`, `Ep 3`, `ep12`.
    EpisodeTag,
}

impl TitleRule {
    /// Every rule, in default evaluation order.
    pub const ALL: [TitleRule; 7] = [
        TitleRule::NumberedVolume,
        TitleRule::LeadingNumber,
        TitleRule::Bracketed,
        TitleRule::DigitsOnly,
        TitleRule::PrologueEpilogue,
        TitleRule::EnglishChapter,
        TitleRule::EpisodeTag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TitleRule::NumberedVolume => "numbered-volume",
            TitleRule::LeadingNumber => "leading-number",
            TitleRule::Bracketed => "bracketed",
            TitleRule::DigitsOnly => "digits-only",
            TitleRule::PrologueEpilogue => "prologue-epilogue",
            TitleRule::EnglishChapter => "english-chapter",
            TitleRule::EpisodeTag => "episode-tag",
        }
    }

    /// Test a trimmed line against this rule alone.
    ///
    /// Does not apply `max_title_len`; see [`classify`].
    pub fn matches(self, line: &str, limits: &TitleLimits) -> bool {
        match self {
            TitleRule::NumberedVolume => NUMBERED_VOLUME.is_match(line),
            TitleRule::LeadingNumber => {
                line.chars().count() < limits.short_title_len
                    && LEADING_NUMBER.is_match(line)
                    && !SCORE.is_match(line)
                    && !DATE.is_match(line)
            }
            TitleRule::Bracketed => is_short_bracketed(line, limits.bracket_title_len),
            TitleRule::DigitsOnly => DIGITS_ONLY.is_match(line),
            TitleRule::PrologueEpilogue => PROLOGUE_EPILOGUE.is_match(line),
            TitleRule::EnglishChapter => ENGLISH_CHAPTER.is_match(line),
            TitleRule::EpisodeTag => EPISODE_TAG.is_match(line),
        }
    }
}

/// Return the first rule in `rules` that accepts `line`.
///
/// Empty lines and lines over `limits.max_title_len` are rejected up front.
pub fn classify(line: &str, rules: &[TitleRule], limits: &TitleLimits) -> Option<TitleRule> {
    let line = line.trim();
    let len = line.chars().count();
    if len == 0 || len > limits.max_title_len {
        return None;
    }
    rules.iter().copied().find(|rule| rule.matches(line, limits))
}

fn is_short_bracketed(line: &str, max_len: usize) -> bool {
    if line.chars().count() >= max_len {
        return false;
    }

    let mut chars = line.chars();
    let (Some(open), Some(close)) = (chars.next(), chars.next_back()) else {
        return false;
    };
    let close_expected = match open {
        '[' => ']',
        '<' => '>',
        _ => return false,
    };
    if close != close_expected {
        return false;
    }

    let inner = chars.as_str();
    !inner.trim().is_empty()
        && !inner.contains(PROSE_MARKS)
        && !inner.contains([']', '>'])
}
