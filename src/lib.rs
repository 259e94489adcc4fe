//! # Scene Exporter
//!
//! A Rust library for exporting hierarchical, animated 3D scene graphs to
//! interchange documents.
//!
//! ## Overview
//!
//! A host scene is read through the [`SourceGraph`] trait, rebuilt as a
//! [`SceneDocument`] in two passes (hierarchy and geometry first, then
//! per-frame animation), normalized to a target axis system and unit, and
//! written as binary glTF or as a JSON scene document.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scene_exporter::{export_scene, ExportOptions, MemoryScene, NeverCancel, TimeRange};
//!
//! let scene = MemoryScene::load("scene.json")?;
//! let options = ExportOptions::default().with_start_node("/obj/root");
//! let report = export_scene(&scene, "out.glb", TimeRange::new(0.0, 2.0), options, &NeverCancel)?;
//! println!("{} nodes written", report.node_count);
//! ```
//!
//! ## Host Integration
//!
//! Implement [`SourceGraph`] for your host's scene and drive an
//! [`Exporter`] directly when you need access to the document between
//! stages:
//!
//! ```ignore
//! let mut exporter = Exporter::new(&host_scene);
//! exporter.initialize(&path, range, options)?;
//! let run = exporter.run(&cancel_token);
//! let report = exporter.finish()?;
//! run?;
//! ```

pub mod document;
pub mod error;
pub mod export;
pub mod source;
pub mod types;
pub mod writer;

// Re-export main types for convenience
pub use document::{SceneDocument, SystemUnit, TargetNodeId};
pub use error::{ExportError, Result};
pub use export::{
    AnimationClip, AxisTarget, CancelSignal, CancelToken, ErrorAccumulator, ExportOptions,
    ExportReport, ExportState, ExportStatus, Exporter, FileEncoding, NeverCancel,
    NodeMappingTable, UnitTarget,
};
pub use source::{MemoryScene, NodeKind, SourceGraph, SourceNodeId};
pub use types::{AxisSystem, TimeRange, TimeSpan};
pub use writer::{available_versions, encode_glb};

use std::path::Path;

/// Run a complete export of `graph` to `output_path`.
///
/// The exporter is always finished, so a fatal error still yields a torn-down
/// run. Cancellation is reported through [`ExportReport::status`].
pub fn export_scene<G: SourceGraph + ?Sized>(
    graph: &G,
    output_path: impl AsRef<Path>,
    range: TimeRange,
    options: ExportOptions,
    cancel: &dyn CancelSignal,
) -> Result<ExportReport> {
    let mut exporter = Exporter::new(graph);
    if let Err(e) = exporter.initialize(output_path, range, options) {
        exporter.finish()?;
        return Err(e);
    }
    let run = exporter.run(cancel);
    let report = exporter.finish()?;
    run?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCENE: &str = r#"{
        "fps": 24,
        "nodes": [
            { "path": "/obj", "kind": "network" },
            { "path": "/obj/root", "kind": "object",
              "transform": { "translate": [[[1, 0], [48, 10]], 0, 0] } },
            { "path": "/obj/root/geo1", "kind": "geometry",
              "mesh": { "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0,1,2] } }
        ]
    }"#;

    #[test]
    fn test_export_scene_from_json() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("scene.glb");
        let scene = MemoryScene::from_json(SCENE).unwrap();

        let report = export_scene(
            &scene,
            &out,
            TimeRange::new(0.0, 47.0 / 24.0),
            ExportOptions::default().with_clip(AnimationClip::new("walk", 1, 48)),
            &NeverCancel,
        )
        .unwrap();

        assert_eq!(report.status, ExportStatus::Written);
        // "/obj" is top level, so its children are exported without a world root.
        assert_eq!(report.node_count, 2);
        assert_eq!(report.stack_count, 1);
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[0..4], b"glTF");
    }

    #[test]
    fn test_export_scene_cancelled() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("scene.glb");
        let scene = MemoryScene::from_json(SCENE).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let report = export_scene(
            &scene,
            &out,
            TimeRange::instant(0.0),
            ExportOptions::default(),
            &token,
        )
        .unwrap();
        assert_eq!(report.status, ExportStatus::Cancelled);
        assert_eq!(report.node_count, 0);
        assert!(!out.exists());
    }

    #[test]
    fn test_export_scene_propagates_fatal_error() {
        let scene = MemoryScene::from_json(SCENE).unwrap();
        let err = export_scene(
            &scene,
            "",
            TimeRange::instant(0.0),
            ExportOptions::default(),
            &NeverCancel,
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
    }
}
