//! Export configuration.

use crate::document::SystemUnit;
use crate::types::AxisSystem;
use serde::{Deserialize, Serialize};

/// Text or binary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    Ascii,
    #[default]
    Binary,
}

/// Target axis system of the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisTarget {
    /// Keep the host's axis system.
    #[default]
    Current,
    YUpRightHanded,
    YUpLeftHanded,
    ZUpRightHanded,
}

impl AxisTarget {
    /// Resolve against the host's native axis system.
    pub fn resolve(&self, native: AxisSystem) -> AxisSystem {
        match self {
            AxisTarget::Current => native,
            AxisTarget::YUpRightHanded => AxisSystem::Y_UP_RIGHT_HANDED,
            AxisTarget::YUpLeftHanded => AxisSystem::Y_UP_LEFT_HANDED,
            AxisTarget::ZUpRightHanded => AxisSystem::Z_UP_RIGHT_HANDED,
        }
    }
}

/// Target length unit of the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitTarget {
    Mm,
    #[default]
    Cm,
    Dm,
    M,
    Km,
    In,
    Yd,
    Mi,
}

impl UnitTarget {
    pub fn system_unit(&self) -> SystemUnit {
        match self {
            UnitTarget::Mm => SystemUnit::MILLIMETER,
            UnitTarget::Cm => SystemUnit::CENTIMETER,
            UnitTarget::Dm => SystemUnit::DECIMETER,
            UnitTarget::M => SystemUnit::METER,
            UnitTarget::Km => SystemUnit::KILOMETER,
            UnitTarget::In => SystemUnit::INCH,
            UnitTarget::Yd => SystemUnit::YARD,
            UnitTarget::Mi => SystemUnit::MILE,
        }
    }
}

/// A named frame range exported as one animation stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    pub start_frame: i64,
    pub end_frame: i64,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, start_frame: i64, end_frame: i64) -> Self {
        Self {
            name: name.into(),
            start_frame,
            end_frame,
        }
    }

    /// Parse `name:start:end`. The span must not be reversed.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ':');
        let end: i64 = parts.next()?.trim().parse().ok()?;
        let start: i64 = parts.next()?.trim().parse().ok()?;
        let name = parts.next()?.trim();
        if name.is_empty() || end < start {
            return None;
        }
        Some(Self::new(name, start, end))
    }
}

/// Options snapshot for one export. Loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Path of the node (or network) to export.
    pub start_node_path: String,
    /// Bundle patterns; when set, the export root is derived from the
    /// bundle members instead of `start_node_path`.
    pub bundles: Option<String>,
    /// Bundle-derived roots never climb above this network.
    pub object_root_path: String,
    pub encoding: FileEncoding,
    /// `"Family | version"`; empty selects the newest version.
    pub version: String,
    pub embed_media: bool,
    pub convert_axis_system: bool,
    pub axis_system: AxisTarget,
    pub convert_units: bool,
    pub unit: UnitTarget,
    pub clips: Vec<AnimationClip>,
    pub export_deforms_as_vertex_cache: bool,
    pub collect_timings: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            start_node_path: "/obj".to_string(),
            bundles: None,
            object_root_path: "/obj".to_string(),
            encoding: FileEncoding::Binary,
            version: String::new(),
            embed_media: false,
            convert_axis_system: false,
            axis_system: AxisTarget::Current,
            convert_units: false,
            unit: UnitTarget::Cm,
            clips: Vec::new(),
            export_deforms_as_vertex_cache: false,
            collect_timings: false,
        }
    }
}

impl ExportOptions {
    pub fn with_start_node(mut self, path: impl Into<String>) -> Self {
        self.start_node_path = path.into();
        self
    }

    pub fn with_bundles(mut self, patterns: impl Into<String>) -> Self {
        self.bundles = Some(patterns.into());
        self
    }

    pub fn with_encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_clip(mut self, clip: AnimationClip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Convert to `target` axes (no-op when it matches the host).
    pub fn with_axis_conversion(mut self, target: AxisTarget) -> Self {
        self.convert_axis_system = true;
        self.axis_system = target;
        self
    }

    pub fn with_unit_conversion(mut self, unit: UnitTarget) -> Self {
        self.convert_units = true;
        self.unit = unit;
        self
    }

    pub fn with_vertex_caches(mut self, enabled: bool) -> Self {
        self.export_deforms_as_vertex_cache = enabled;
        self
    }

    pub fn with_embedded_media(mut self, enabled: bool) -> Self {
        self.embed_media = enabled;
        self
    }

    pub fn with_timings(mut self, enabled: bool) -> Self {
        self.collect_timings = enabled;
        self
    }

    /// Whether a bundle pattern was given.
    pub fn is_exporting_bundles(&self) -> bool {
        self.bundles
            .as_deref()
            .map(|b| !b.trim().is_empty())
            .unwrap_or(false)
    }

    /// Load options from a JSON file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
