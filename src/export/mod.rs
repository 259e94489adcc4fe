//! The export pipeline.
//!
//! [`Exporter`] drives one `initialize -> run -> finish` cycle: a hierarchy
//! pass ([`GeometryVisitor`]) builds the target nodes and fills the
//! [`NodeMappingTable`], an optional [`AnimationVisitor`] pass samples the
//! mapped nodes into curves, queued [`DeferredAction`]s are applied, the
//! document is normalized to the requested axis system and unit, and a
//! writer serializes it.

pub mod actions;
pub mod animation;
pub mod bundles;
pub mod cancel;
pub mod diagnostics;
pub mod exporter;
pub mod geometry;
pub mod node_map;
pub mod options;

pub use actions::{DeferredAction, DeferredActionQueue};
pub use animation::{AnimationPass, AnimationVisitor};
pub use cancel::{CancelSignal, CancelToken, NeverCancel};
pub use diagnostics::{ErrorAccumulator, ErrorRecord, ExportTimings};
pub use exporter::{ExportReport, ExportState, ExportStatus, Exporter};
pub use geometry::{GeometryPass, GeometryVisitor};
pub use node_map::{NodeMappingEntry, NodeMappingTable, VisitInfo};
pub use options::{AnimationClip, AxisTarget, ExportOptions, FileEncoding, UnitTarget};
