//! # novelpub
//!
//! Turn plain-text Korean web novels into EPUB 2 e-books.
//!
//! ## Features
//!
//! - Chapter detection from title heuristics (`제1화`, `1. 출발`, `[외전]`, `프롤로그` ...)
//! - Folding unwanted chapters into their neighbours and splitting long ones
//! - EPUB 2 packaging with stylesheet, navigation map and optional font and cover
//! - UTF-8 / EUC-KR input detection
//!
//! ## Quick Start
//!
//! ```no_run
//! use novelpub::config::Config;
//! use novelpub::convert::{ConversionRequest, convert, title_from_file_name};
//!
//! let text = std::fs::read("novel.txt")?;
//! let request = ConversionRequest::new(text, title_from_file_name("novel.txt"));
//! let output = convert(request, &Config::default())?;
//! std::fs::write(&output.file_name, &output.epub)?;
//! # Ok::<(), novelpub::Error>(())
//! ```
//!
//! ## Lower-level API
//!
//! Segmentation and packaging can be used on their own:
//!
//! ```
//! use novelpub::epub::{FontChoice, package};
//! use novelpub::segment::segment;
//!
//! let chapters = segment(["제1화", "안녕하세요.", "제2화", "또 만나요."]);
//! let epub = package(chapters, "인사", FontChoice::Serif, None)?;
//! assert!(epub.starts_with(b"PK"));
//! # Ok::<(), novelpub::Error>(())
//! ```

pub mod book;
pub mod config;
pub mod convert;
pub mod cover;
pub mod epub;
pub mod error;
pub mod segment;
pub mod util;

pub use book::{Book, Chapter, ChapterStats, CoverImage, Section};
pub use config::Config;
pub use convert::{ConversionOutput, ConversionRequest, CoverSource, convert};
pub use epub::{EpubPackager, FontChoice, PackageSummary, inspect_epub, package};
pub use error::{Error, Result};
pub use segment::{Segmenter, merge_excluded, paginate, segment};
