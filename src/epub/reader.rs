use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

use super::parser::{ManifestEntry, TocEntry, parse_container_xml, parse_ncx, parse_opf};
use crate::error::{Error, Result};

/// What a packaged EPUB contains, as read back from the archive.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct PackageSummary {
    pub title: String,
    pub language: String,
    pub identifier: String,
    /// Path of the package document inside the archive.
    pub opf_path: String,
    /// Archive entry names in stored order.
    pub entries: Vec<String>,
    pub manifest: Vec<ManifestEntry>,
    /// Spine documents (hrefs relative to the package document), in reading order.
    pub spine: Vec<String>,
    pub toc: Vec<TocEntry>,
    /// Href of the cover image named by `<meta name="cover">`.
    pub cover: Option<String>,
    /// `dtb:uid` of the NCX, if the package has one.
    pub ncx_uid: Option<String>,
}

impl PackageSummary {
    pub fn has_entry(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry == name)
    }
}

/// Inspect an EPUB file on disk.
///
/// # Example
///
/// ```no_run
/// use novelpub::epub::inspect_epub;
///
/// let summary = inspect_epub("novel.epub")?;
/// println!("{}: {} documents", summary.title, summary.spine.len());
/// # Ok::<(), novelpub::Error>(())
/// ```
pub fn inspect_epub<P: AsRef<Path>>(path: P) -> Result<PackageSummary> {
    let file = std::fs::File::open(path)?;
    inspect_epub_from_reader(file)
}

/// Inspect an in-memory EPUB.
pub fn inspect_epub_bytes(bytes: &[u8]) -> Result<PackageSummary> {
    inspect_epub_from_reader(Cursor::new(bytes))
}

/// Inspect an EPUB from any [`Read`] + [`Seek`] source.
///
/// Fails with [`Error::InvalidEpub`] unless the archive is structurally
/// sound: `mimetype` first and stored, a rootfile in `container.xml`,
/// every manifest item present in the archive and every spine reference
/// declared in the manifest.
pub fn inspect_epub_from_reader<R: Read + Seek>(reader: R) -> Result<PackageSummary> {
    let mut archive = ZipArchive::new(reader)?;

    check_mimetype(&mut archive)?;

    let entries: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).map(|file| file.name().to_string()))
        .collect::<std::result::Result<_, _>>()?;

    // 1. Find the OPF file path from container.xml
    let container = read_archive_file_bytes(&mut archive, "META-INF/container.xml")?;
    let opf_path = parse_container_xml(&container)?;
    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    // 2. Parse the OPF file
    let opf = parse_opf(&read_archive_file(&mut archive, &opf_path)?)?;

    for item in &opf.manifest {
        let full_path = resolve_path(&opf_dir, &item.href);
        if !entries.contains(&full_path) {
            return Err(Error::InvalidEpub(format!(
                "manifest item '{}' points at missing entry {full_path}",
                item.id
            )));
        }
    }

    // 3. Resolve spine
    let spine = opf
        .spine_ids
        .iter()
        .map(|id| {
            opf.item(id).map(|item| item.href.clone()).ok_or_else(|| {
                Error::InvalidEpub(format!("spine references undeclared item '{id}'"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // 4. Parse NCX (if present)
    let (toc, ncx_uid) = match opf.toc_id.as_deref().and_then(|id| opf.item(id)) {
        Some(ncx_item) => {
            let ncx_path = resolve_path(&opf_dir, &ncx_item.href);
            let ncx = parse_ncx(&read_archive_file(&mut archive, &ncx_path)?)?;
            (ncx.nav_points, ncx.uid)
        }
        None => (Vec::new(), None),
    };

    let cover = opf
        .cover_id
        .as_deref()
        .and_then(|id| opf.item(id))
        .map(|item| item.href.clone());

    debug!(
        entries = entries.len(),
        spine = spine.len(),
        toc = toc.len(),
        "Inspected EPUB"
    );

    Ok(PackageSummary {
        title: opf.title,
        language: opf.language,
        identifier: opf.identifier,
        opf_path,
        entries,
        manifest: opf.manifest,
        spine,
        toc,
        cover,
        ncx_uid,
    })
}

/// Read one archive entry as bytes.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    read_archive_file_bytes(archive, path)
}

fn check_mimetype<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<()> {
    if archive.is_empty() {
        return Err(Error::InvalidEpub("archive is empty".into()));
    }

    let mut first = archive.by_index(0)?;
    if first.name() != "mimetype" {
        return Err(Error::InvalidEpub(format!(
            "first entry is '{}', expected 'mimetype'",
            first.name()
        )));
    }
    if first.compression() != CompressionMethod::Stored {
        return Err(Error::InvalidEpub("mimetype entry is compressed".into()));
    }

    let mut content = String::new();
    first.read_to_string(&mut content)?;
    if content != "application/epub+zip" {
        return Err(Error::InvalidEpub(format!(
            "unexpected mimetype '{content}'"
        )));
    }
    Ok(())
}

fn read_archive_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_archive_file_bytes(archive, path)?;
    Ok(String::from_utf8(super::parser::strip_bom(&bytes).to_vec())?)
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|_| Error::InvalidEpub(format!("missing archive entry {path}")))?;
    let mut contents = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn resolve_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{base}/{href}")
    }
}
