//! novelpub - plain-text novel to EPUB converter

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use novelpub::config::{Config, DEFAULT_CONFIG_FILE};
use novelpub::convert::{
    ConversionRequest, CoverSource, convert, split_text, title_from_file_name,
};
use novelpub::{Error, FontChoice, Result, inspect_epub};

#[derive(Parser)]
#[command(name = "novelpub")]
#[command(version, about = "Convert plain-text novels to EPUB", long_about = None)]
#[command(after_help = "EXAMPLES:
    novelpub novel.txt                     Convert to <title>.epub
    novelpub novel.txt out.epub -f embedded
    novelpub novel.txt --list              Show detected chapters
    novelpub novel.txt --exclude 0,3       Fold chapters 0 and 3 into neighbours
    novelpub -i out.epub --json            Inspect a produced EPUB

EXIT STATUS:
    0 on success, 2 on an I/O or ZIP archive error, 1 otherwise")]
struct Cli {
    /// Input text file (or EPUB with --info)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output EPUB file [default: <title>.epub]
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Book title [default: derived from the input file name]
    #[arg(short, long)]
    title: Option<String>,

    /// Font: embedded, serif or sans-serif
    #[arg(short, long, value_name = "FONT")]
    font: Option<FontChoice>,

    /// Keep the whole text as a single chapter
    #[arg(long)]
    no_split: bool,

    /// Chapter indices to fold into the preceding chapter
    #[arg(long, value_name = "N,...", value_delimiter = ',')]
    exclude: Vec<usize>,

    /// Maximum paragraphs per XHTML document (0 = never split)
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Cover image file
    #[arg(long, value_name = "PATH", conflicts_with = "cover_url")]
    cover: Option<PathBuf>,

    /// Cover image URL
    #[arg(long, value_name = "URL")]
    cover_url: Option<String>,

    /// Config file [default: ./novelpub.toml if present]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// List detected chapters without converting
    #[arg(long, conflicts_with = "info")]
    list: bool,

    /// Show the structure of an existing EPUB
    #[arg(short, long)]
    info: bool,

    /// Print --list / --info output as JSON
    #[arg(long)]
    json: bool,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = if cli.info {
        show_info(&cli.input, cli.json)
    } else if cli.list {
        list_chapters(&cli)
    } else {
        run(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over `-q`/`-v`.
fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(DEFAULT_CONFIG_FILE)?,
    };
    if let Some(chunk_size) = cli.chunk_size {
        config.package.chunk_size = chunk_size;
    }
    if let Some(font) = cli.font {
        config.package.font = font;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let text = fs::read(&cli.input)?;
    let title = cli
        .title
        .clone()
        .unwrap_or_else(|| title_from_file_name(&cli.input));

    let mut request = ConversionRequest::new(text, title).with_split_chapters(!cli.no_split);

    if !cli.exclude.is_empty() {
        let count = split_text(&request.text, &config, request.split_chapters).len();
        request = request.with_keep(keep_set(count, &cli.exclude));
    }

    if let Some(path) = &cli.cover {
        match fs::read(path) {
            Ok(data) => request = request.with_cover(CoverSource::Bytes(data)),
            Err(err) => warn!(path = %path.display(), "Cannot read cover: {err}"),
        }
    } else if let Some(url) = &cli.cover_url {
        request = request.with_cover(CoverSource::Url(url.clone()));
    }

    let output = convert(request, &config)?;
    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&output.file_name));
    fs::write(&path, &output.epub)?;

    if !cli.quiet {
        println!(
            "{}: {} chapters, {} paragraphs{}",
            path.display(),
            output.stats.chapters,
            output.stats.lines,
            if output.has_cover { ", with cover" } else { "" }
        );
    }
    Ok(())
}

/// Indices to keep given a chapter count and the excluded indices.
fn keep_set(count: usize, exclude: &[usize]) -> BTreeSet<usize> {
    for &index in exclude.iter().filter(|&&index| index >= count) {
        warn!(index, count, "Excluded chapter index out of range");
    }
    (0..count).filter(|i| !exclude.contains(i)).collect()
}

#[derive(Serialize)]
struct ChapterListing<'a> {
    index: usize,
    title: &'a str,
    lines: usize,
}

fn list_chapters(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let text = fs::read(&cli.input)?;
    let chapters = split_text(&text, &config, !cli.no_split);

    let listing: Vec<ChapterListing<'_>> = chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| ChapterListing {
            index,
            title: &chapter.title,
            lines: chapter.body.len(),
        })
        .collect();

    if cli.json {
        println!("{}", to_json(&listing)?);
        return Ok(());
    }

    for entry in &listing {
        println!("{:>4}  {}  ({} lines)", entry.index, entry.title, entry.lines);
    }
    Ok(())
}

fn show_info(path: &Path, json: bool) -> Result<()> {
    let summary = inspect_epub(path)?;

    if json {
        println!("{}", to_json(&summary)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("Title: {}", summary.title);
    if !summary.language.is_empty() {
        println!("Language: {}", summary.language);
    }
    println!("Identifier: {}", summary.identifier);
    println!("Documents: {}", summary.spine.len());
    println!("TOC entries: {}", summary.toc.len());
    for entry in &summary.toc {
        println!("  {}  {}", entry.href, entry.label);
    }
    println!("Cover: {}", summary.cover.as_deref().unwrap_or("none"));

    Ok(())
}

fn exit_status(err: &Error) -> u8 {
    if err.is_packaging_failure() { 2 } else { 1 }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_set() {
        assert_eq!(keep_set(4, &[1, 3]), BTreeSet::from([0, 2]));
        assert_eq!(keep_set(2, &[5]), BTreeSet::from([0, 1]));
        assert_eq!(keep_set(0, &[0]), BTreeSet::new());
    }

    #[test]
    fn test_exit_status() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "novel.txt"));
        assert_eq!(exit_status(&io_err), 2);
        assert_eq!(exit_status(&Error::InvalidCoverUrl("ftp://x".into())), 1);

        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        assert_eq!(exit_status(&Error::from(json_err)), 1);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "novelpub",
            "novel.txt",
            "-f",
            "embedded",
            "--exclude",
            "0,2",
            "--chunk-size",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.font, Some(FontChoice::Embedded));
        assert_eq!(cli.exclude, vec![0, 2]);
        assert_eq!(cli.chunk_size, Some(50));
        assert!(cli.output.is_none());

        assert!(Cli::try_parse_from(["novelpub", "a.txt", "-f", "comic"]).is_err());
        assert!(
            Cli::try_parse_from(["novelpub", "a.txt", "--cover", "c.jpg", "--cover-url", "u"])
                .is_err()
        );
    }
}
