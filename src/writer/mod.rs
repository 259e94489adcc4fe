//! Document serialization.
//!
//! Writers are selected by a `"Family | version"` string plus an encoding,
//! the same way an export dialog offers a version menu. An empty family or
//! version selects the newest writer for the encoding.

mod glb;
mod json;

pub use glb::{encode_glb, GlbWriter};
pub use json::JsonWriter;

use crate::document::SceneDocument;
use crate::error::{ExportError, Result};
use crate::export::FileEncoding;
use std::path::Path;

/// Identification of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterFormat {
    pub family: &'static str,
    pub version: &'static str,
    pub encoding: FileEncoding,
    pub extension: &'static str,
}

impl WriterFormat {
    /// `"Family | version"`.
    pub fn label(&self) -> String {
        format!("{} | {}", self.family, self.version)
    }
}

/// Serializes a finished document to disk.
pub trait DocumentWriter {
    fn format(&self) -> WriterFormat;

    /// Write `document` to `path`, embedding referenced media if requested.
    fn write(&self, document: &SceneDocument, path: &Path, embed_media: bool) -> Result<()>;
}

/// Registered formats, newest first within a family.
const FORMATS: [WriterFormat; 2] = [
    json::FORMAT,
    glb::FORMAT,
];

/// Labels of every available writer.
pub fn available_versions() -> Vec<String> {
    FORMATS.iter().map(WriterFormat::label).collect()
}

/// Split `"Family | version"` into its trimmed parts. A string without a
/// separator is a bare family name.
pub fn parse_version(version: &str) -> (&str, &str) {
    match version.split_once('|') {
        Some((family, version)) => (family.trim(), version.trim()),
        None => (version.trim(), ""),
    }
}

/// Find the writer for `version` in `encoding`.
pub fn resolve_writer(version: &str, encoding: FileEncoding) -> Result<Box<dyn DocumentWriter>> {
    let (family, number) = parse_version(version);
    let format = FORMATS
        .iter()
        .filter(|f| f.encoding == encoding)
        .filter(|f| family.is_empty() || f.family.eq_ignore_ascii_case(family))
        .find(|f| number.is_empty() || f.version == number)
        .copied()
        .ok_or_else(|| {
            ExportError::ResourceCreation(format!(
                "No {:?} writer for version '{}' (available: {})",
                encoding,
                version,
                available_versions().join(", ")
            ))
        })?;

    Ok(match format.encoding {
        FileEncoding::Ascii => Box::new(JsonWriter),
        FileEncoding::Binary => Box::new(GlbWriter),
    })
}
