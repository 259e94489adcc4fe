//! Text encoding: the document as pretty-printed JSON.

use super::{DocumentWriter, WriterFormat};
use crate::document::SceneDocument;
use crate::error::Result;
use crate::export::FileEncoding;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub(super) const FORMAT: WriterFormat = WriterFormat {
    family: "Scene",
    version: "1.0",
    encoding: FileEncoding::Ascii,
    extension: "json",
};

#[derive(Serialize)]
struct Envelope<'a> {
    format: &'static str,
    version: &'static str,
    #[serde(flatten)]
    document: &'a SceneDocument,
}

/// Writes the whole document model as JSON. Media are referenced by path.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter;

impl DocumentWriter for JsonWriter {
    fn format(&self) -> WriterFormat {
        FORMAT
    }

    fn write(&self, document: &SceneDocument, path: &Path, embed_media: bool) -> Result<()> {
        if embed_media {
            tracing::warn!("Text output references media by path; embedding ignored");
        }
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(
            &mut out,
            &Envelope {
                format: FORMAT.family,
                version: FORMAT.version,
                document,
            },
        )?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_json_document() {
        let mut doc = SceneDocument::new();
        let a = doc.create_node("a", doc.root());
        doc.create_node("b", a);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        JsonWriter.write(&doc, &path, false).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["format"], "Scene");
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["nodes"][2]["name"], "b");
    }
}
