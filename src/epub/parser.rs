//! EPUB parsing utilities (OPF, NCX, container.xml)

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::resolve_entity;

/// One `<item>` of the OPF manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct ManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

/// One `<navPoint>` of the NCX navigation map.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct TocEntry {
    pub label: String,
    pub href: String,
    pub play_order: Option<usize>,
}

/// Parsed OPF package data.
#[derive(Debug, Default)]
pub struct OpfData {
    pub title: String,
    pub language: String,
    pub identifier: String,
    /// Value of the `unique-identifier` attribute on `<package>`.
    pub unique_identifier: Option<String>,
    pub manifest: Vec<ManifestEntry>,
    pub spine_ids: Vec<String>,
    pub toc_id: Option<String>,
    /// Manifest id named by `<meta name="cover">`.
    pub cover_id: Option<String>,
}

impl OpfData {
    pub fn item(&self, id: &str) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|item| item.id == id)
    }
}

/// Parsed NCX document.
#[derive(Debug, Default)]
pub struct NcxData {
    /// `dtb:uid` from the NCX head.
    pub uid: Option<String>,
    pub title: Option<String>,
    /// Nav points in document order, nested points flattened.
    pub nav_points: Vec<TocEntry>,
}

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

/// Parse OPF package document.
///
/// The identifier is the `dc:identifier` named by the package's
/// `unique-identifier`, or the first one when none matches. Text is trimmed
/// after entity references are resolved, so `a &amp; b` keeps its inner
/// spaces.
pub fn parse_opf(content: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);

    let mut opf = OpfData::default();

    let mut in_metadata = false;
    let mut current_element: Option<&'static str> = None;
    let mut identifier_id: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"package" => opf.unique_identifier = attribute(&e, b"unique-identifier")?,
                    b"metadata" => in_metadata = true,
                    b"title" if in_metadata => current_element = Some("title"),
                    b"language" if in_metadata => current_element = Some("language"),
                    b"identifier" if in_metadata => {
                        current_element = Some("identifier");
                        identifier_id = attribute(&e, b"id")?;
                    }
                    b"spine" => opf.toc_id = attribute(&e, b"toc")?,
                    _ => {}
                }
                if current_element.is_some() {
                    buf_text.clear();
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => {
                        let id = attribute(&e, b"id")?.unwrap_or_default();
                        if !id.is_empty() {
                            opf.manifest.push(ManifestEntry {
                                id,
                                href: attribute(&e, b"href")?.unwrap_or_default(),
                                media_type: attribute(&e, b"media-type")?.unwrap_or_default(),
                            });
                        }
                    }
                    b"itemref" => {
                        if let Some(idref) = attribute(&e, b"idref")? {
                            opf.spine_ids.push(idref);
                        }
                    }
                    b"meta" => {
                        if attribute(&e, b"name")?.as_deref() == Some("cover") {
                            opf.cover_id = attribute(&e, b"content")?.filter(|id| !id.is_empty());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_element.is_some()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf_text.push(c);
                }
            }
            Event::End(e) => {
                if local_name(e.name().as_ref()) == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    let text = buf_text.trim().to_string();
                    buf_text.clear();
                    match elem {
                        "title" => opf.title = text,
                        "language" => opf.language = text,
                        "identifier" => {
                            let is_package_id = identifier_id.is_some()
                                && identifier_id == opf.unique_identifier;
                            if opf.identifier.is_empty() || is_package_id {
                                opf.identifier = text;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(opf)
}

/// Parse NCX table of contents.
pub fn parse_ncx(content: &str) -> Result<NcxData> {
    let mut reader = Reader::from_str(content);

    let mut ncx = NcxData::default();
    // indices into ncx.nav_points of the open navPoints
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;
    let mut in_doc_title = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navPoint" => {
                        let play_order = attribute(&e, b"playOrder")?.and_then(|s| s.parse().ok());
                        open.push(ncx.nav_points.len());
                        ncx.nav_points.push(TocEntry {
                            label: String::new(),
                            href: String::new(),
                            play_order,
                        });
                    }
                    b"docTitle" => in_doc_title = true,
                    b"text" => in_text = true,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"content" => {
                        if let Some(&index) = open.last()
                            && let Some(src) = attribute(&e, b"src")?
                        {
                            ncx.nav_points[index].href = src;
                        }
                    }
                    b"meta" => {
                        if attribute(&e, b"name")?.as_deref() == Some("dtb:uid") {
                            ncx.uid = attribute(&e, b"content")?;
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) if in_text => {
                let raw = String::from_utf8_lossy(e.as_ref());
                push_text(&mut ncx, &open, in_doc_title, &raw);
            }
            Event::GeneralRef(e) if in_text => {
                if let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    push_text(&mut ncx, &open, in_doc_title, c.encode_utf8(&mut [0; 4]));
                }
            }
            Event::End(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"docTitle" => in_doc_title = false,
                    b"navPoint" => {
                        open.pop();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    for point in &mut ncx.nav_points {
        point.label = point.label.trim().to_string();
    }
    ncx.title = ncx.title.map(|title| title.trim().to_string());
    Ok(ncx)
}

fn push_text(ncx: &mut NcxData, open: &[usize], in_doc_title: bool, text: &str) {
    if let Some(&index) = open.last() {
        ncx.nav_points[index].label.push_str(text);
    } else if in_doc_title {
        ncx.title.get_or_insert_with(String::new).push_str(text);
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Read one attribute value, resolving entity escapes.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            let raw = String::from_utf8(attr.value.to_vec())?;
            return Ok(Some(crate::util::unescape_html(&raw)));
        }
    }
    Ok(None)
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        let with_bom = &[0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(strip_bom(with_bom), b"hi");
        assert_eq!(strip_bom(b"hello"), b"hello");
        assert_eq!(strip_bom(&[]), &[] as &[u8]);

        // Partial BOM (not stripped)
        let partial = &[0xEF, 0xBB, b'x'];
        assert_eq!(strip_bom(partial), partial);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"opf:meta"), b"meta");
        assert_eq!(local_name(b""), b"");
    }

    #[test]
    fn test_parse_container_xml_with_bom() {
        let mut container = vec![0xEF, 0xBB, 0xBF];
        container.extend_from_slice(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        );

        assert_eq!(parse_container_xml(&container).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn test_parse_container_xml_without_rootfile() {
        let container = br#"<container><rootfiles/></container>"#;
        assert!(matches!(
            parse_container_xml(container),
            Err(Error::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_parse_opf() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>나의 &amp; 소설</dc:title>
    <dc:language>ko</dc:language>
    <dc:identifier id="uid" opf:scheme="UUID">urn:uuid:1234</dc:identifier>
    <meta name="cover" content="cover"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c0" href="ch_0.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c0"/>
  </spine>
</package>"#;

        let result = parse_opf(opf).unwrap();

        assert_eq!(result.title, "나의 & 소설");
        assert_eq!(result.language, "ko");
        assert_eq!(result.identifier, "urn:uuid:1234");
        assert_eq!(result.unique_identifier.as_deref(), Some("uid"));
        assert_eq!(result.spine_ids, vec!["c0"]);
        assert_eq!(result.toc_id.as_deref(), Some("ncx"));
        assert_eq!(result.cover_id.as_deref(), Some("cover"));
        assert_eq!(result.item("cover").unwrap().href, "cover.jpg");
        assert_eq!(result.manifest.len(), 3);
    }

    #[test]
    fn test_parse_opf_prefers_unique_identifier() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="isbn">978-89-0000-000-0</dc:identifier>
    <dc:identifier id="BookId">urn:uuid:abcd</dc:identifier>
    <dc:identifier>other</dc:identifier>
  </metadata>
</package>"#;

        let result = parse_opf(opf).unwrap();
        assert_eq!(result.identifier, "urn:uuid:abcd");
    }

    #[test]
    fn test_parse_ncx() {
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:1234"/></head>
  <docTitle><text>책</text></docTitle>
  <navMap>
    <navPoint id="navPoint-1" playOrder="1">
      <navLabel><text>제1화 &lt;시작&gt;</text></navLabel>
      <content src="ch_0.xhtml"/>
      <navPoint id="navPoint-2" playOrder="2">
        <navLabel><text>안쪽</text></navLabel>
        <content src="ch_1.xhtml"/>
      </navPoint>
    </navPoint>
    <navPoint id="navPoint-3" playOrder="3">
      <navLabel><text>제2화</text></navLabel>
      <content src="ch_2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

        let result = parse_ncx(ncx).unwrap();

        assert_eq!(result.uid.as_deref(), Some("urn:uuid:1234"));
        assert_eq!(result.title.as_deref(), Some("책"));
        let labels: Vec<&str> = result.nav_points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["제1화 <시작>", "안쪽", "제2화"]);
        assert_eq!(result.nav_points[2].href, "ch_2.xhtml");
        assert_eq!(result.nav_points[2].play_order, Some(3));
    }
}
