//! EPUB 2 packager.
//!
//! Writes a [`Book`] as a self-contained EPUB 2 archive: `mimetype`,
//! `META-INF/container.xml`, a stylesheet, one XHTML document per section,
//! `toc.ncx` and `content.opf`, plus the optional font and cover.

use std::fmt;
use std::io::{Cursor, Seek, Write};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::book::{BODY_TITLE, Book, Chapter, CoverImage, Section};
use crate::error::{Error, Result};
use crate::segment::paginate;
use crate::util::{MediaFormat, escape_html};

/// File name of the embeddable font, looked up on the host at packaging time.
pub const FONT_FILE_NAME: &str = "RIDIBatang.otf";

/// Font family declared by the embedded font.
const EMBEDDED_FAMILY: &str = "RIDIBatang";

const SERIF_STACK: &str = r#""Batang", "Noto Serif KR", serif"#;
const SANS_SERIF_STACK: &str = r#""Nanum Gothic", "Noto Sans KR", sans-serif"#;

/// Which typeface the stylesheet asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontChoice {
    /// Embed `RIDIBatang.otf` when it exists, otherwise fall back to serif.
    Embedded,
    /// System serif (Batang / Noto Serif KR).
    #[default]
    Serif,
    /// System sans-serif (Nanum Gothic / Noto Sans KR).
    SansSerif,
}

impl FontChoice {
    fn family_stack(self, embedded: bool) -> String {
        match self {
            FontChoice::Embedded if embedded => format!(r#""{EMBEDDED_FAMILY}", serif"#),
            FontChoice::Embedded | FontChoice::Serif => SERIF_STACK.to_string(),
            FontChoice::SansSerif => SANS_SERIF_STACK.to_string(),
        }
    }
}

impl FromStr for FontChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "ridibatang" | "리디바탕" => Ok(FontChoice::Embedded),
            "serif" | "myeongjo" | "기본 명조체" => Ok(FontChoice::Serif),
            "sans-serif" | "sans" | "gothic" | "고딕체" => Ok(FontChoice::SansSerif),
            other => Err(format!(
                "unknown font '{other}' (expected embedded, serif or sans-serif)"
            )),
        }
    }
}

impl fmt::Display for FontChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FontChoice::Embedded => "embedded",
            FontChoice::Serif => "serif",
            FontChoice::SansSerif => "sans-serif",
        })
    }
}

/// Configuration for EPUB packaging.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// `dc:language` of the package.
    pub language: String,
    pub font: FontChoice,
    /// Where to look for the embeddable font.
    pub font_path: PathBuf,
    /// Maximum paragraphs per document; longer chapters are split. 0 disables.
    pub chunk_size: usize,
    /// Compression level for deflate (0-9, default 6).
    pub compression_level: Option<u32>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            language: "ko".to_string(),
            font: FontChoice::default(),
            font_path: PathBuf::from(FONT_FILE_NAME),
            chunk_size: 100,
            compression_level: None,
        }
    }
}

/// EPUB 2 packager.
///
/// # Example
///
/// ```
/// use novelpub::book::{Book, Chapter};
/// use novelpub::epub::EpubPackager;
///
/// let book = Book::new("제목", vec![Chapter::with_body("제1화", vec!["안녕".into()])]);
/// let bytes = EpubPackager::new().package_to_vec(&book)?;
/// assert!(bytes.starts_with(b"PK"));
/// # Ok::<(), novelpub::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EpubPackager {
    config: PackageConfig,
}

impl EpubPackager {
    /// Create a new packager with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the packager with custom settings.
    pub fn with_config(mut self, config: PackageConfig) -> Self {
        self.config = config;
        self
    }

    /// Package into a fresh in-memory buffer.
    ///
    /// The buffer is only returned once the archive is complete.
    pub fn package_to_vec(&self, book: &Book) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.package(book, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Package into any [`Write`] + [`Seek`] destination.
    ///
    /// On error the destination holds an incomplete archive and must be
    /// discarded.
    pub fn package<W: Write + Seek>(&self, book: &Book, writer: &mut W) -> Result<()> {
        let font = self.load_font()?;
        let book_id = format!("urn:uuid:{}", Uuid::new_v4());
        let mut sections = paginate(&book.chapters, self.config.chunk_size);
        if sections.is_empty() {
            // spine and navMap must not be empty
            debug!("No chapters; packaging a single empty body document");
            sections.push(Section {
                title: BODY_TITLE.to_string(),
                body: Vec::new(),
                continuation: false,
            });
        }

        let mut zip = ZipWriter::new(writer);

        let compression_level = self.config.compression_level.unwrap_or(6);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level as i64));

        // 1. Write mimetype (must be first, uncompressed)
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE)?;

        // 2. Write container.xml
        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML)?;

        let mut manifest: Vec<ManifestItem> = Vec::new();

        // 3. Font and stylesheet
        if let Some(data) = &font {
            let href = format!("fonts/{FONT_FILE_NAME}");
            zip.start_file(format!("OEBPS/{href}").as_str(), deflated)?;
            zip.write_all(data)?;
            manifest.push(ManifestItem::new("font", href, MediaFormat::Otf.mime_type()));
        }

        let css = generate_css(&self.config.font.family_stack(font.is_some()), font.is_some());
        zip.start_file("OEBPS/style.css", deflated)?;
        zip.write_all(css.as_bytes())?;
        manifest.push(ManifestItem::new("style", "style.css", "text/css"));

        // 4. Content documents
        let mut spine_refs: Vec<String> = Vec::with_capacity(sections.len());
        let mut nav_points: Vec<NavPoint> = Vec::new();

        for (i, section) in sections.iter().enumerate() {
            let id = format!("c{i}");
            let href = format!("ch_{i}.xhtml");
            let book_title = (i == 0).then_some(book.title.as_str());
            let document = generate_xhtml(section, book_title, &self.config.language);

            zip.start_file(format!("OEBPS/{href}").as_str(), deflated)?;
            zip.write_all(document.as_bytes())?;

            if section.is_navigable() {
                nav_points.push(NavPoint {
                    label: section.title.clone(),
                    src: href.clone(),
                });
            }
            manifest.push(ManifestItem::new(&id, href, "application/xhtml+xml"));
            spine_refs.push(id);
        }

        // 5. Navigation map
        let ncx = generate_ncx(&book.title, &book_id, &nav_points);
        zip.start_file("OEBPS/toc.ncx", deflated)?;
        zip.write_all(ncx.as_bytes())?;

        // 6. Cover
        if let Some(cover) = &book.cover {
            let href = cover.href();
            zip.start_file(format!("OEBPS/{href}").as_str(), deflated)?;
            zip.write_all(&cover.data)?;
            manifest.push(ManifestItem::new(COVER_ID, href, cover.format.mime_type()));
        }

        // 7. Package document
        let opf = generate_opf(
            &book.title,
            &book_id,
            &self.config.language,
            book.cover.as_ref(),
            &manifest,
            &spine_refs,
        );
        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(opf.as_bytes())?;

        zip.finish()?;

        info!(
            documents = sections.len(),
            toc_entries = nav_points.len(),
            font = font.is_some(),
            cover = book.cover.is_some(),
            "Packaged EPUB"
        );
        Ok(())
    }

    /// Read the embeddable font if it was selected and exists.
    ///
    /// A missing file only disables embedding; a file that exists but
    /// cannot be read fails the packaging.
    fn load_font(&self) -> Result<Option<Vec<u8>>> {
        if self.config.font != FontChoice::Embedded {
            return Ok(None);
        }

        let path = &self.config.font_path;
        if !path.exists() {
            let err = Error::AssetUnavailable(format!("font {} not found", path.display()));
            warn!("{err}; using the serif fallback");
            return Ok(None);
        }

        let data = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = data.len(), "Embedding font");
        Ok(Some(data))
    }
}

/// Package chapters with the default configuration and the given font.
pub fn package(
    chapters: Vec<Chapter>,
    title: &str,
    font: FontChoice,
    cover: Option<CoverImage>,
) -> Result<Vec<u8>> {
    let mut book = Book::new(title, chapters);
    book.cover = cover;
    let config = PackageConfig {
        font,
        ..PackageConfig::default()
    };
    EpubPackager::new().with_config(config).package_to_vec(&book)
}

const MIMETYPE: &[u8] = b"application/epub+zip";

const COVER_ID: &str = "cover";

/// Container.xml template.
const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
}

impl ManifestItem {
    fn new(id: impl Into<String>, href: impl Into<String>, media_type: &str) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.to_string(),
        }
    }
}

struct NavPoint {
    label: String,
    src: String,
}

/// Generate the shared stylesheet.
fn generate_css(family: &str, embed_font: bool) -> String {
    let mut css = String::new();

    if embed_font {
        css.push_str(&format!(
            "@font-face {{ font-family: \"{EMBEDDED_FAMILY}\"; src: url(\"fonts/{FONT_FILE_NAME}\"); }}\n"
        ));
    }

    css.push_str(&format!(
        r#"body {{
  font-family: {family};
  line-height: 1.8;
  margin: 5% 8%;
  text-align: justify;
  word-break: keep-all;
  hyphens: auto;
}}
p {{
  margin-top: 0;
  margin-bottom: 1.5em;
  text-indent: 1em;
}}
h1 {{
  text-align: center;
  margin-top: 4em;
}}
h2 {{
  text-align: center;
  margin-top: 3em;
  margin-bottom: 2em;
  font-size: 1.4em;
  border-bottom: 1px solid #ccc;
  padding-bottom: 0.5em;
}}
@media (prefers-color-scheme: dark) {{
  body {{ background: #1a1a1a; color: #e0e0e0; }}
  h2 {{ border-bottom-color: #444; }}
}}
"#
    ));
    css
}

/// Generate one XHTML 1.1 content document.
///
/// Body lines are already escaped and are written as-is.
fn generate_xhtml(section: &Section, book_title: Option<&str>, language: &str) -> String {
    let mut doc = String::with_capacity(
        512 + section.body.iter().map(|line| line.len() + 8).sum::<usize>(),
    );

    doc.push_str(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
"#,
    );
    doc.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"{}\">\n",
        escape_html(language)
    ));
    doc.push_str(&format!(
        "<head>\n  <title>{}</title>\n  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\"/>\n</head>\n<body>\n",
        escape_html(&section.title)
    ));

    if let Some(title) = book_title {
        doc.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));
    }
    if section.is_navigable() {
        doc.push_str(&format!("<h2>{}</h2>\n", escape_html(&section.title)));
    }
    for line in &section.body {
        doc.push_str("<p>");
        doc.push_str(line);
        doc.push_str("</p>\n");
    }

    doc.push_str("</body>\n</html>\n");
    doc
}

/// Generate content.opf from metadata and manifest.
fn generate_opf(
    title: &str,
    book_id: &str,
    language: &str,
    cover: Option<&CoverImage>,
    manifest: &[ManifestItem],
    spine_refs: &[String],
) -> String {
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
    );

    opf.push_str(&format!("    <dc:title>{}</dc:title>\n", escape_html(title)));
    opf.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        escape_html(language)
    ));
    opf.push_str(&format!(
        "    <dc:identifier id=\"uid\" opf:scheme=\"UUID\">{}</dc:identifier>\n",
        escape_html(book_id)
    ));
    if cover.is_some() {
        opf.push_str(&format!("    <meta name=\"cover\" content=\"{COVER_ID}\"/>\n"));
    }
    opf.push_str("  </metadata>\n");

    // Manifest
    opf.push_str("  <manifest>\n");
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    for item in manifest {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            escape_html(&item.id),
            escape_html(&item.href),
            escape_html(&item.media_type)
        ));
    }
    opf.push_str("  </manifest>\n");

    // Spine
    opf.push_str("  <spine toc=\"ncx\">\n");
    for id in spine_refs {
        opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", escape_html(id)));
    }
    opf.push_str("  </spine>\n");

    opf.push_str("</package>\n");
    opf
}

/// Generate toc.ncx; play order counts navigable sections from 1.
fn generate_ncx(title: &str, book_id: &str, nav_points: &[NavPoint]) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_html(book_id));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_html(title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    for (i, point) in nav_points.iter().enumerate() {
        let play_order = i + 1;
        ncx.push_str(&format!(
            "    <navPoint id=\"navPoint-{play_order}\" playOrder=\"{play_order}\">\n"
        ));
        ncx.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            escape_html(&point.label)
        ));
        ncx.push_str(&format!(
            "      <content src=\"{}\"/>\n",
            escape_html(&point.src)
        ));
        ncx.push_str("    </navPoint>\n");
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str, body: &[&str], continuation: bool) -> Section {
        Section {
            title: title.to_string(),
            body: body.iter().map(|s| s.to_string()).collect(),
            continuation,
        }
    }

    #[test]
    fn test_font_choice_parse() {
        assert_eq!("embedded".parse::<FontChoice>(), Ok(FontChoice::Embedded));
        assert_eq!("리디바탕".parse::<FontChoice>(), Ok(FontChoice::Embedded));
        assert_eq!("Sans-Serif".parse::<FontChoice>(), Ok(FontChoice::SansSerif));
        assert_eq!("고딕체".parse::<FontChoice>(), Ok(FontChoice::SansSerif));
        assert!("comic".parse::<FontChoice>().is_err());
        assert_eq!(FontChoice::SansSerif.to_string(), "sans-serif");
    }

    #[test]
    fn test_family_stack() {
        assert_eq!(FontChoice::Embedded.family_stack(true), r#""RIDIBatang", serif"#);
        assert_eq!(FontChoice::Embedded.family_stack(false), SERIF_STACK);
        assert_eq!(FontChoice::Serif.family_stack(true), SERIF_STACK);
        assert_eq!(FontChoice::SansSerif.family_stack(false), SANS_SERIF_STACK);
    }

    #[test]
    fn test_css_font_face_only_when_embedding() {
        let css = generate_css(SERIF_STACK, false);
        assert!(!css.contains("@font-face"));
        assert!(css.contains("text-align: justify"));
        assert!(css.contains("text-indent: 1em"));

        let css = generate_css(r#""RIDIBatang", serif"#, true);
        assert!(css.starts_with("@font-face"));
        assert!(css.contains("fonts/RIDIBatang.otf"));
    }

    #[test]
    fn test_xhtml_headings() {
        let first = generate_xhtml(&section("제1화 <시작>", &["a &amp; b"], false), Some("책 & 제목"), "ko");
        assert!(first.contains("<h1>책 &amp; 제목</h1>"));
        assert!(first.contains("<h2>제1화 &lt;시작&gt;</h2>"));
        // pre-escaped body is not escaped again
        assert!(first.contains("<p>a &amp; b</p>"));
        assert!(!first.contains("&amp;amp;"));

        let continued = generate_xhtml(&section("제1화 (계속)", &["c"], true), None, "ko");
        assert!(!continued.contains("<h1>"));
        assert!(!continued.contains("<h2>"));
        assert!(continued.contains("<p>c</p>"));
    }

    #[test]
    fn test_ncx_play_order_is_contiguous() {
        let points = vec![
            NavPoint {
                label: "제1화".into(),
                src: "ch_0.xhtml".into(),
            },
            NavPoint {
                label: "제2화".into(),
                src: "ch_2.xhtml".into(),
            },
        ];
        let ncx = generate_ncx("책", "urn:uuid:x", &points);
        assert!(ncx.contains(r#"<meta name="dtb:uid" content="urn:uuid:x"/>"#));
        assert!(ncx.contains(r#"playOrder="1""#));
        assert!(ncx.contains(r#"playOrder="2""#));
        assert!(!ncx.contains(r#"playOrder="3""#));
        assert!(ncx.contains(r#"<content src="ch_2.xhtml"/>"#));
    }

    #[test]
    fn test_opf_cover_metadata() {
        let manifest = vec![ManifestItem::new("c0", "ch_0.xhtml", "application/xhtml+xml")];
        let spine = vec!["c0".to_string()];
        let opf = generate_opf("책", "urn:uuid:x", "ko", None, &manifest, &spine);
        assert!(!opf.contains("name=\"cover\""));
        assert!(opf.contains("<dc:language>ko</dc:language>"));
        assert!(opf.contains("<itemref idref=\"c0\"/>"));

        let cover = CoverImage::new(vec![1, 2, 3], MediaFormat::Jpeg);
        let opf = generate_opf("책", "urn:uuid:x", "ko", Some(&cover), &manifest, &spine);
        assert!(opf.contains(r#"<meta name="cover" content="cover"/>"#));
    }

    #[test]
    fn test_missing_font_disables_embedding() {
        let packager = EpubPackager::new().with_config(PackageConfig {
            font: FontChoice::Embedded,
            font_path: PathBuf::from("/nonexistent/RIDIBatang.otf"),
            ..PackageConfig::default()
        });
        assert!(packager.load_font().unwrap().is_none());
    }
}
