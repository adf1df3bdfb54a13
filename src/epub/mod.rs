mod parser;
mod reader;
mod writer;

pub use parser::{ManifestEntry, TocEntry};
pub use reader::{
    PackageSummary, inspect_epub, inspect_epub_bytes, inspect_epub_from_reader, read_entry,
};
pub use writer::{EpubPackager, FONT_FILE_NAME, FontChoice, PackageConfig, package};
