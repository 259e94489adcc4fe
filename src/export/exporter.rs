//! Export orchestration.

use super::actions::DeferredActionQueue;
use super::animation::AnimationVisitor;
use super::bundles::resolve_bundle_root;
use super::cancel::CancelSignal;
use super::diagnostics::{ErrorAccumulator, ExportTimings};
use super::geometry::GeometryVisitor;
use super::node_map::NodeMappingTable;
use super::options::{AxisTarget, ExportOptions};
use crate::document::{SceneDocument, SystemUnit, TargetNodeId};
use crate::error::{ExportError, Result};
use crate::source::SourceGraph;
use crate::types::{AxisSystem, TimeMode, TimeRange, TimeSpan};
use crate::writer::{resolve_writer, DocumentWriter};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the single animation layer shared by every stack.
const BASE_LAYER: &str = "Base Layer";

/// Lifecycle of an [`Exporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Uninitialized,
    Initialized,
    GeometryBuilt,
    AnimationBuilt,
    PostActionsApplied,
    SpaceNormalized,
    Serialized,
    Cancelled,
    Failed,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportState::Uninitialized => "uninitialized",
            ExportState::Initialized => "initialized",
            ExportState::GeometryBuilt => "geometry-built",
            ExportState::AnimationBuilt => "animation-built",
            ExportState::PostActionsApplied => "post-actions-applied",
            ExportState::SpaceNormalized => "space-normalized",
            ExportState::Serialized => "serialized",
            ExportState::Cancelled => "cancelled",
            ExportState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final outcome of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// The document was written to the output path.
    Written,
    /// Stopped by the cancellation signal; nothing was written.
    Cancelled,
    /// A fatal error was recorded; nothing was written.
    Failed,
}

impl ExportStatus {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportStatus::Written => 0,
            ExportStatus::Failed => 1,
            ExportStatus::Cancelled => 2,
        }
    }
}

/// Summary returned by [`Exporter::finish`].
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub status: ExportStatus,
    pub output_path: PathBuf,
    pub node_count: usize,
    pub mesh_count: usize,
    pub material_count: usize,
    pub layer_count: usize,
    pub stack_count: usize,
    pub curve_count: usize,
    pub vertex_cache_count: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub timings: Option<ExportTimings>,
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        self.status == ExportStatus::Written
    }
}

/// Everything owned by one `initialize -> finish` cycle.
struct ExportRun {
    output_path: PathBuf,
    range: TimeRange,
    options: ExportOptions,
    document: SceneDocument,
    node_map: NodeMappingTable,
    actions: DeferredActionQueue,
    writer: Box<dyn DocumentWriter>,
    world_root: Option<TargetNodeId>,
}

/// Drives the export of a source graph to one output file.
///
/// ```ignore
/// let mut exporter = Exporter::new(&scene);
/// exporter.initialize("out.glb", TimeRange::new(0.0, 2.0), options)?;
/// let run = exporter.run(&NeverCancel);
/// let report = exporter.finish()?;
/// run?;
/// ```
pub struct Exporter<'g, G: SourceGraph + ?Sized> {
    graph: &'g G,
    errors: ErrorAccumulator,
    run: Option<ExportRun>,
    state: ExportState,
    timings: Option<ExportTimings>,
}

impl<'g, G: SourceGraph + ?Sized> Exporter<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self {
            graph,
            errors: ErrorAccumulator::new(),
            run: None,
            state: ExportState::Uninitialized,
            timings: None,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn did_cancel(&self) -> bool {
        self.state == ExportState::Cancelled
    }

    /// Diagnostics of the current (or last) run.
    pub fn errors(&self) -> &ErrorAccumulator {
        &self.errors
    }

    /// The document under construction, between `initialize` and `finish`.
    pub fn document(&self) -> Option<&SceneDocument> {
        self.run.as_ref().map(|r| &r.document)
    }

    pub fn node_map(&self) -> Option<&NodeMappingTable> {
        self.run.as_ref().map(|r| &r.node_map)
    }

    /// Synthetic node anchoring a nested export root, if one was created.
    pub fn world_root(&self) -> Option<TargetNodeId> {
        self.run.as_ref().and_then(|r| r.world_root)
    }

    fn record_phase(&mut self, phase: &'static str, start: Instant) {
        if let Some(timings) = &mut self.timings {
            timings.record(phase, start.elapsed());
        }
    }

    fn fail(&mut self, error: ExportError) -> Result<()> {
        self.errors.add_fatal(&error);
        self.state = ExportState::Failed;
        Err(error)
    }

    /// Prepare an export to `output_path` over `range` (host seconds).
    ///
    /// Discards any previous run. Fails on an empty output path, a reversed
    /// time range, or a format version no writer supports.
    pub fn initialize(
        &mut self,
        output_path: impl AsRef<Path>,
        range: TimeRange,
        options: ExportOptions,
    ) -> Result<()> {
        let start = Instant::now();
        self.run = None;
        self.errors.reset();
        self.timings = options.collect_timings.then(ExportTimings::new);

        let output_path = output_path.as_ref();
        if output_path.as_os_str().is_empty() {
            return self.fail(ExportError::Configuration("Output path is empty".to_string()));
        }
        if range.end < range.start {
            return self.fail(ExportError::Configuration(format!(
                "End time {} is before start time {}",
                range.end, range.start
            )));
        }
        if let Some(clip) = options.clips.iter().find(|c| c.end_frame < c.start_frame) {
            return self.fail(ExportError::Configuration(format!(
                "Clip '{}' ends at frame {} before it starts at frame {}",
                clip.name, clip.end_frame, clip.start_frame
            )));
        }
        let writer = match resolve_writer(&options.version, options.encoding) {
            Ok(writer) => writer,
            Err(e) => return self.fail(e),
        };

        tracing::debug!(
            "Initialized export to {} with {}",
            output_path.display(),
            writer.format().label()
        );
        self.run = Some(ExportRun {
            output_path: output_path.to_path_buf(),
            range,
            options,
            document: SceneDocument::new(),
            node_map: NodeMappingTable::new(),
            actions: DeferredActionQueue::new(),
            writer,
            world_root: None,
        });
        self.state = ExportState::Initialized;
        self.record_phase("initialize", start);
        Ok(())
    }

    /// Build the document. Returns `Ok` when cancelled; check
    /// [`state`](Self::state) or the report from [`finish`](Self::finish).
    pub fn run(&mut self, cancel: &dyn CancelSignal) -> Result<()> {
        if self.state != ExportState::Initialized {
            return Err(ExportError::InvalidState {
                operation: "run",
                state: self.state.to_string(),
            });
        }
        let Some(mut run) = self.run.take() else {
            return Err(ExportError::InvalidState {
                operation: "run",
                state: self.state.to_string(),
            });
        };
        let span = tracing::info_span!("export", output = %run.output_path.display());
        let _guard = span.enter();
        let result = self.run_stages(&mut run, cancel);
        self.run = Some(run);
        result
    }

    fn run_stages(&mut self, run: &mut ExportRun, cancel: &dyn CancelSignal) -> Result<()> {
        let graph = self.graph;

        if run.options.is_exporting_bundles() {
            let start = Instant::now();
            let patterns = run.options.bundles.clone().unwrap_or_default();
            let root = resolve_bundle_root(
                graph,
                &patterns,
                &run.options.object_root_path,
                &mut run.node_map,
                &mut self.errors,
            );
            match root {
                Some(root) => run.options.start_node_path = graph.full_path(root),
                None => {
                    return self.fail(ExportError::Configuration(format!(
                        "Could not find the object root [ {} ]",
                        run.options.object_root_path
                    )))
                }
            }
            self.record_phase("bundles", start);
        }

        self.stamp_metadata(run);

        let single_frame = run.range.is_single_instant();
        if single_frame {
            run.options.export_deforms_as_vertex_cache = false;
        } else {
            let fps = graph.samples_per_second();
            let time_mode = TimeMode::from_rate(fps);
            if time_mode.is_custom() {
                tracing::info!("Frame rate {} has no standard time mode; using custom", fps);
            }
            let settings = &mut run.document.settings;
            settings.time_mode = time_mode;
            settings.custom_frame_rate = fps;
            settings.timeline_span = Some(TimeSpan::new(
                graph.frame_from_time(run.range.start),
                graph.frame_from_time(run.range.end),
            ));
        }

        let Some(root) = graph.find_node(&run.options.start_node_path) else {
            return self.fail(ExportError::Configuration(format!(
                "Could not find the start node specified [ {} ]",
                run.options.start_node_path
            )));
        };

        let start = Instant::now();
        let pass = GeometryVisitor::new(
            graph,
            &mut run.document,
            &mut run.node_map,
            &mut run.actions,
            &mut self.errors,
            &run.options,
            run.range.start,
        )
        .visit_scene(root, cancel);
        run.world_root = pass.world_root;
        self.state = ExportState::GeometryBuilt;
        self.record_phase("geometry", start);

        if pass.cancelled {
            self.state = ExportState::Cancelled;
            return Ok(());
        }
        if let Some(action) = pass.create_instances {
            let linked = action.apply(&mut run.document, &run.node_map);
            tracing::debug!("Linked {} instance(s)", linked);
        }
        run.document.settings.ambient_color = pass.ambient_color;

        if !single_frame {
            let start = Instant::now();
            let layer = run.document.create_layer(BASE_LAYER);
            let timeline = run
                .document
                .settings
                .timeline_span
                .unwrap_or_else(|| TimeSpan::new(1, 1));

            let mut frames = timeline;
            if run.options.clips.is_empty() {
                let stack = run.document.create_stack(graph.time_context_name(), timeline);
                run.document.stack_mut(stack).add_layer(layer);
            } else {
                for clip in &run.options.clips {
                    let span = TimeSpan::new(clip.start_frame, clip.end_frame);
                    let stack = run.document.create_stack(clip.name.clone(), span);
                    run.document.stack_mut(stack).add_layer(layer);
                    frames = frames.union(&span);
                }
            }

            let mut visitor =
                AnimationVisitor::new(graph, &mut run.document, &run.node_map, layer, frames);
            if let Some(world_root) = run.world_root {
                visitor.export_trs_animation(root, world_root, None);
            }
            let pass = visitor.visit_scene(root, cancel);
            self.record_phase("animation", start);
            if pass.cancelled {
                self.state = ExportState::Cancelled;
                return Ok(());
            }
            self.state = ExportState::AnimationBuilt;
        }

        let start = Instant::now();
        let applied = run.actions.drain_all(&mut run.document, &run.node_map);
        tracing::debug!("Applied {} deferred reference(s)", applied);
        self.state = ExportState::PostActionsApplied;
        self.record_phase("post_actions", start);

        let start = Instant::now();
        self.normalize(run);
        self.state = ExportState::SpaceNormalized;
        self.record_phase("normalize", start);
        Ok(())
    }

    fn stamp_metadata(&self, run: &mut ExportRun) {
        let graph = self.graph;
        let host = graph.host_info();
        let now = Utc::now();
        let file_name = native_separators(&run.output_path.to_string_lossy());

        let info = &mut run.document.info;
        info.original_application_vendor = host.vendor.clone();
        info.original_application_name = host.name.clone();
        info.original_application_version = host.version.clone();
        info.original_file_name = file_name;
        info.application_active_project = graph.project_dir().map(|p| native_separators(&p));
        info.application_native_file = graph.scene_file().map(|p| native_separators(&p));
        info.last_saved_application_vendor = host.vendor;
        info.last_saved_application_name = host.name;
        info.last_saved_application_version = host.version;
        info.original_date_time = Some(now);
        info.last_saved_date_time = Some(now);
    }

    /// Record or convert to the requested axis system and unit.
    fn normalize(&self, run: &mut ExportRun) {
        let options = &run.options;
        let document = &mut run.document;
        let native = AxisSystem::native(self.graph.up_axis());
        document.settings.axis_system = native;

        if options.convert_axis_system && options.axis_system != AxisTarget::Current {
            let target = options.axis_system.resolve(native);
            if target != native {
                document.convert_axis_system(target);
            }
        } else {
            document.settings.axis_system = options.axis_system.resolve(native);
        }

        let host_unit = SystemUnit::from_meters(self.graph.unit_length());
        document.settings.system_unit = host_unit;
        if options.convert_units {
            document.settings.original_system_unit = Some(host_unit);
            document.convert_units(options.unit.system_unit());
        }
    }

    /// Write the document unless the run was cancelled or failed, then
    /// release every per-run resource.
    pub fn finish(&mut self) -> Result<ExportReport> {
        if self.state == ExportState::Uninitialized {
            return Err(ExportError::InvalidState {
                operation: "finish",
                state: self.state.to_string(),
            });
        }
        let start = Instant::now();
        let run = self.run.take();

        let status = match (self.state, &run) {
            (ExportState::SpaceNormalized, Some(run)) => {
                match run
                    .writer
                    .write(&run.document, &run.output_path, run.options.embed_media)
                {
                    Ok(()) => {
                        tracing::info!(
                            "Wrote {} node(s) to {}",
                            run.document.node_count(),
                            run.output_path.display()
                        );
                        self.state = ExportState::Serialized;
                        ExportStatus::Written
                    }
                    Err(e) => {
                        self.errors.add_fatal(format!(
                            "Failed to write {}: {}",
                            run.output_path.display(),
                            e
                        ));
                        self.state = ExportState::Failed;
                        ExportStatus::Failed
                    }
                }
            }
            (ExportState::Cancelled, _) => ExportStatus::Cancelled,
            (ExportState::Failed, _) => ExportStatus::Failed,
            (state, _) => {
                self.errors
                    .add_fatal(format!("Export finished while {}; nothing written", state));
                self.state = ExportState::Failed;
                ExportStatus::Failed
            }
        };
        self.record_phase("write", start);

        let mut report = ExportReport {
            status,
            output_path: PathBuf::new(),
            node_count: 0,
            mesh_count: 0,
            material_count: 0,
            layer_count: 0,
            stack_count: 0,
            curve_count: 0,
            vertex_cache_count: 0,
            warnings: self.errors.warnings().map(|r| r.message.clone()).collect(),
            errors: self
                .errors
                .records()
                .iter()
                .filter(|r| r.is_fatal)
                .map(|r| r.message.clone())
                .collect(),
            timings: self.timings.take(),
        };
        if let Some(run) = run {
            let doc = &run.document;
            report.output_path = run.output_path.clone();
            report.node_count = doc.node_count();
            report.mesh_count = doc.meshes().len();
            report.material_count = doc.materials().len();
            report.layer_count = doc.layers().len();
            report.stack_count = doc.stacks().len();
            report.curve_count = doc.curves().len();
            report.vertex_cache_count = doc.vertex_caches().len();
        }

        self.state = ExportState::Uninitialized;
        Ok(report)
    }
}

fn native_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CurveChannel;
    use crate::export::cancel::NeverCancel;
    use crate::export::options::{AnimationClip, FileEncoding, UnitTarget};
    use crate::source::{Channel, MeshData, MemoryNode, MemoryScene, NodeKind};
    use crate::types::{Axis, UpAxis};
    use std::cell::Cell;
    use tempfile::tempdir;

    struct CancelAfter {
        polls: Cell<usize>,
        allowed: usize,
    }

    impl CancelSignal for CancelAfter {
        fn is_cancelled(&self) -> bool {
            let n = self.polls.get();
            self.polls.set(n + 1);
            n >= self.allowed
        }
    }

    fn scene() -> MemoryScene {
        let mut scene = MemoryScene::new(24.0);
        scene.add_node("/obj", NodeKind::Network).unwrap();
        let mut root = MemoryNode::new("/obj/root", NodeKind::Object);
        root.transform.translate[0] = Channel::keys(&[(1.0, 0.0), (48.0, 10.0)]);
        scene.insert(root).unwrap();
        let mut geo = MemoryNode::new("/obj/root/geo1", NodeKind::Geometry);
        geo.mesh = Some(MeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: vec![0, 1, 2],
        });
        scene.insert(geo).unwrap();
        scene
    }

    fn root_options() -> ExportOptions {
        ExportOptions::default().with_start_node("/obj/root")
    }

    /// Seconds spanning frames 1..=48 at 24 fps.
    fn frames_1_to_48() -> TimeRange {
        TimeRange::new(0.0, 47.0 / 24.0)
    }

    #[test]
    fn test_static_export_of_two_nodes() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("static.glb");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);

        exporter.initialize(&out, TimeRange::instant(1.0), root_options()).unwrap();
        exporter.run(&NeverCancel).unwrap();
        assert_eq!(exporter.state(), ExportState::SpaceNormalized);
        let report = exporter.finish().unwrap();

        assert!(report.is_success());
        assert_eq!(report.node_count, 2);
        assert_eq!(report.stack_count, 0);
        assert_eq!(report.layer_count, 0);
        assert_eq!(report.curve_count, 0);
        assert!(out.exists());
        assert_eq!(exporter.state(), ExportState::Uninitialized);
        assert!(exporter.document().is_none());
    }

    #[test]
    fn test_walk_clip_export() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("walk.glb");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options().with_clip(AnimationClip::new("walk", 1, 48));

        exporter.initialize(&out, frames_1_to_48(), options).unwrap();
        exporter.run(&NeverCancel).unwrap();
        {
            let doc = exporter.document().unwrap();
            assert_eq!(doc.layers().len(), 1);
            assert_eq!(doc.stacks().len(), 1);
            let stack = &doc.stacks()[0];
            assert_eq!(stack.name, "walk");
            assert_eq!(stack.local_span, TimeSpan::new(1, 48));
            assert_eq!(doc.settings.timeline_span, Some(TimeSpan::new(1, 48)));

            let layer = stack.layers[0];
            for name in ["root", "geo1"] {
                let node = doc.find_node(name).unwrap();
                let curve = doc
                    .curve(node, layer, CurveChannel::Translation(Axis::X))
                    .unwrap();
                assert_eq!(curve.keys.len(), 48);
            }
            let root = doc.find_node("root").unwrap();
            let tx = doc
                .curve(root, layer, CurveChannel::Translation(Axis::X))
                .unwrap();
            assert!((tx.value_at(48).unwrap() - 10.0).abs() < 1e-4);
        }
        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Written);
        assert_eq!(report.node_count, 2);
        assert!(out.exists());
    }

    #[test]
    fn test_clips_share_one_layer() {
        let dir = tempdir().unwrap();
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options()
            .with_clip(AnimationClip::new("walk", 1, 24))
            .with_clip(AnimationClip::new("run", 25, 48))
            .with_clip(AnimationClip::new("idle", 1, 12));

        exporter
            .initialize(dir.path().join("clips.glb"), frames_1_to_48(), options)
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let doc = exporter.document().unwrap();
        assert_eq!(doc.layers().len(), 1);
        assert_eq!(doc.stacks().len(), 3);
        assert!(doc.stacks().iter().all(|s| s.layers == doc.stacks()[0].layers));
    }

    #[test]
    fn test_without_clips_uses_time_context() {
        let dir = tempdir().unwrap();
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(dir.path().join("take.glb"), frames_1_to_48(), root_options())
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let doc = exporter.document().unwrap();
        assert_eq!(doc.stacks().len(), 1);
        assert_eq!(doc.stacks()[0].name, scene.time_context_name());
    }

    #[test]
    fn test_reexport_is_idempotent() {
        let dir = tempdir().unwrap();
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let mut counts = Vec::new();
        for i in 0..2 {
            let out = dir.path().join(format!("run{}.glb", i));
            exporter.initialize(&out, frames_1_to_48(), root_options()).unwrap();
            exporter.run(&NeverCancel).unwrap();
            let report = exporter.finish().unwrap();
            counts.push((report.node_count, report.curve_count));
        }
        assert_eq!(counts[0], counts[1]);
        assert_eq!(counts[0].0, 2);
    }

    #[test]
    fn test_cancel_during_geometry_writes_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("cancelled.glb");
        let mut scene = scene();
        scene.add_node("/obj/root/geo2", NodeKind::Object).unwrap();
        let mut exporter = Exporter::new(&scene);
        let cancel = CancelAfter {
            polls: Cell::new(0),
            allowed: 2,
        };

        exporter.initialize(&out, frames_1_to_48(), root_options()).unwrap();
        exporter.run(&cancel).unwrap();
        assert!(exporter.did_cancel());
        assert_eq!(exporter.node_map().unwrap().len(), 2);
        assert!(exporter.document().unwrap().stacks().is_empty());

        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Cancelled);
        assert_eq!(report.status.exit_code(), 2);
        assert!(report.errors.is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn test_cancel_during_animation_writes_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("cancelled.glb");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        // Two geometry visits pass, the animation pass stops at its first node.
        let cancel = CancelAfter {
            polls: Cell::new(0),
            allowed: 2,
        };

        exporter.initialize(&out, frames_1_to_48(), root_options()).unwrap();
        exporter.run(&cancel).unwrap();
        assert_eq!(exporter.state(), ExportState::Cancelled);
        assert_eq!(exporter.node_map().unwrap().len(), 2);
        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Cancelled);
        assert!(!out.exists());
    }

    #[test]
    fn test_look_at_outside_subtree_is_skipped() {
        let dir = tempdir().unwrap();
        let mut scene = scene();
        scene.add_node("/obj/cam", NodeKind::Camera).unwrap();
        let geo = scene.find_node("/obj/root/geo1").unwrap();
        scene.node_mut(geo).unwrap().look_at = Some("/obj/cam".to_string());
        let cam = scene.find_node("/obj/cam").unwrap();

        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(dir.path().join("look.glb"), TimeRange::instant(0.0), root_options())
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        assert_eq!(exporter.state(), ExportState::SpaceNormalized);
        let node_map = exporter.node_map().unwrap();
        assert!(!node_map.contains(cam));
        assert_eq!(node_map.len(), 2);
        let doc = exporter.document().unwrap();
        let target = doc.find_node("geo1").unwrap();
        assert_eq!(doc.node(target).look_at, None);
        assert!(exporter.finish().unwrap().is_success());
    }

    #[test]
    fn test_normalization_is_noop_for_native_target() {
        let dir = tempdir().unwrap();
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options()
            .with_axis_conversion(AxisTarget::YUpRightHanded)
            .with_unit_conversion(UnitTarget::M);

        exporter
            .initialize(dir.path().join("noop.glb"), TimeRange::instant(47.0 / 24.0), options)
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let doc = exporter.document().unwrap();
        assert_eq!(doc.settings.axis_system, AxisSystem::native(UpAxis::Y));
        assert_eq!(doc.settings.original_axis_system, None);
        assert!(doc.settings.system_unit.approx_eq(&SystemUnit::METER));
        let root = doc.find_node("root").unwrap();
        assert!((doc.node(root).transform.translation.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalization_converts_to_target() {
        let dir = tempdir().unwrap();
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options()
            .with_axis_conversion(AxisTarget::ZUpRightHanded)
            .with_unit_conversion(UnitTarget::Cm);

        exporter
            .initialize(dir.path().join("conv.glb"), TimeRange::instant(47.0 / 24.0), options)
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let doc = exporter.document().unwrap();
        assert_eq!(doc.settings.axis_system, AxisSystem::Z_UP_RIGHT_HANDED);
        assert_eq!(doc.settings.original_axis_system, Some(AxisSystem::Y_UP_RIGHT_HANDED));
        assert!(doc.settings.system_unit.approx_eq(&SystemUnit::CENTIMETER));
        assert!(doc
            .settings
            .original_system_unit
            .unwrap()
            .approx_eq(&SystemUnit::METER));
        let root = doc.find_node("root").unwrap();
        assert!((doc.node(root).transform.translation.x - 1000.0).abs() < 1e-2);
    }

    #[test]
    fn test_reversed_clip_fails_at_initialize() {
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options().with_clip(AnimationClip::new("back", 48, 1));
        let err = exporter
            .initialize("out.glb", frames_1_to_48(), options)
            .unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
        assert!(err.to_string().contains("back"));
        assert_eq!(exporter.state(), ExportState::Failed);
    }

    #[test]
    fn test_nonstandard_rate_uses_custom_time_mode() {
        let dir = tempdir().unwrap();
        let mut scene = scene();
        scene.fps = 23.0;
        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(dir.path().join("custom.glb"), TimeRange::new(0.0, 1.0), root_options())
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let settings = &exporter.document().unwrap().settings;
        assert_eq!(settings.time_mode, TimeMode::Custom(23.0));
        assert_eq!(settings.custom_frame_rate, 23.0);
        assert_eq!(settings.timeline_span, Some(TimeSpan::new(1, 24)));
    }

    #[test]
    fn test_nested_network_world_root_is_animated() {
        let dir = tempdir().unwrap();
        let mut scene = scene();
        let mut rig = MemoryNode::new("/obj/rig", NodeKind::Network);
        rig.transform.translate[1] = Channel::keys(&[(1.0, 0.0), (48.0, 4.0)]);
        scene.insert(rig).unwrap();
        scene.add_node("/obj/rig/bone", NodeKind::Object).unwrap();

        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(
                dir.path().join("rig.glb"),
                frames_1_to_48(),
                ExportOptions::default().with_start_node("/obj/rig"),
            )
            .unwrap();
        exporter.run(&NeverCancel).unwrap();

        let world_root = exporter.world_root().unwrap();
        let node_map = exporter.node_map().unwrap();
        assert_eq!(node_map.len(), 1);
        assert!(node_map.entries().iter().all(|e| e.target != world_root));

        let doc = exporter.document().unwrap();
        assert_eq!(doc.node(world_root).name, "world_root");
        let layer = doc.stacks()[0].layers[0];
        let ty = doc
            .curve(world_root, layer, CurveChannel::Translation(Axis::Y))
            .unwrap();
        assert_eq!(ty.keys.len(), 48);
        assert!(ty.value_at(1).unwrap().abs() < 1e-4);
        assert!((ty.value_at(48).unwrap() - 4.0).abs() < 1e-3);

        let bone = doc.find_node("bone").unwrap();
        assert_eq!(doc.node(bone).parent, Some(world_root));
        let bone_ty = doc
            .curve(bone, layer, CurveChannel::Translation(Axis::Y))
            .unwrap();
        assert!(bone_ty.value_at(48).unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_unmatched_bundle_exports_nothing() {
        let dir = tempdir().unwrap();
        let mut scene = scene();
        scene.add_node("/obj/other", NodeKind::Object).unwrap();
        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(
                dir.path().join("none.glb"),
                TimeRange::instant(0.0),
                ExportOptions::default().with_bundles("@nosuch"),
            )
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        assert!(exporter.node_map().unwrap().is_empty());

        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Written);
        assert_eq!(report.node_count, 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_empty_output_path_fails() {
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let err = exporter
            .initialize("", TimeRange::instant(0.0), root_options())
            .unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
        assert_eq!(exporter.state(), ExportState::Failed);
        assert!(exporter.errors().has_fatal_error());

        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Failed);
        assert_eq!(report.status.exit_code(), 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_missing_start_node_fails_before_traversal() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("missing.glb");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        exporter
            .initialize(&out, TimeRange::instant(0.0), ExportOptions::default().with_start_node("/obj/nope"))
            .unwrap();
        let err = exporter.run(&NeverCancel).unwrap_err();
        assert!(err.to_string().contains("/obj/nope"));
        assert_eq!(exporter.state(), ExportState::Failed);
        assert_eq!(exporter.node_map().unwrap().len(), 0);

        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Failed);
        assert!(!out.exists());
    }

    #[test]
    fn test_unknown_version_fails_at_initialize() {
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let err = exporter
            .initialize("out.glb", TimeRange::instant(0.0), root_options().with_version("FBX | 2020"))
            .unwrap_err();
        assert!(matches!(err, ExportError::ResourceCreation(_)));
        assert_eq!(exporter.state(), ExportState::Failed);
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        assert!(matches!(
            exporter.run(&NeverCancel),
            Err(ExportError::InvalidState { operation: "run", .. })
        ));
        assert!(matches!(
            exporter.finish(),
            Err(ExportError::InvalidState { operation: "finish", .. })
        ));
    }

    #[test]
    fn test_finish_before_run_fails_without_writing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("early.glb");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        exporter.initialize(&out, TimeRange::instant(0.0), root_options()).unwrap();
        let report = exporter.finish().unwrap();
        assert_eq!(report.status, ExportStatus::Failed);
        assert!(!out.exists());
    }

    #[test]
    fn test_bundle_export_limits_nodes() {
        let dir = tempdir().unwrap();
        let mut scene = scene();
        scene.add_node("/obj/root/geo2", NodeKind::Object).unwrap();
        scene.add_node("/obj/other", NodeKind::Object).unwrap();
        scene.set_bundle("hero", &["/obj/root/geo1", "/obj/root/geo2"]);

        let mut exporter = Exporter::new(&scene);
        let options = ExportOptions::default().with_bundles("@hero");
        exporter
            .initialize(dir.path().join("bundle.glb"), TimeRange::instant(0.0), options)
            .unwrap();
        exporter.run(&NeverCancel).unwrap();
        let doc = exporter.document().unwrap();
        assert!(doc.find_node("geo1").is_some());
        assert!(doc.find_node("geo2").is_some());
        assert!(doc.find_node("other").is_none());
        assert_eq!(exporter.node_map().unwrap().len(), 2);
    }

    #[test]
    fn test_ascii_export_stamps_metadata() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("scene.json");
        let scene = scene();
        let mut exporter = Exporter::new(&scene);
        let options = root_options()
            .with_encoding(FileEncoding::Ascii)
            .with_version("Scene | 1.0")
            .with_timings(true);

        exporter.initialize(&out, frames_1_to_48(), options).unwrap();
        exporter.run(&NeverCancel).unwrap();
        {
            let info = &exporter.document().unwrap().info;
            assert_eq!(info.original_file_name, out.to_string_lossy());
            assert!(info.original_date_time.is_some());
            assert_eq!(info.original_application_name, scene.host_info().name);
        }
        let report = exporter.finish().unwrap();
        assert!(report.is_success());
        let timings = report.timings.unwrap();
        assert!(timings.get("geometry").is_some());
        assert!(timings.get("animation").is_some());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
    }
}
