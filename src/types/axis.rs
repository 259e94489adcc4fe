//! Axis and coordinate-system types.

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// A coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three axes in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index of this axis in a vector.
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Which world axis points up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpAxis {
    Y,
    Z,
}

/// Handedness of a coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Handedness {
    RightHanded,
    LeftHanded,
}

/// A world coordinate system, described by its up axis and handedness.
///
/// The right axis is always +X. The remaining axis is chosen so that the
/// system has the requested handedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisSystem {
    pub up: UpAxis,
    pub handedness: Handedness,
}

impl AxisSystem {
    /// Y-up, right-handed (Maya Y-up, MotionBuilder, OpenGL).
    pub const Y_UP_RIGHT_HANDED: AxisSystem = AxisSystem {
        up: UpAxis::Y,
        handedness: Handedness::RightHanded,
    };

    /// Y-up, left-handed (DirectX, Lightwave).
    pub const Y_UP_LEFT_HANDED: AxisSystem = AxisSystem {
        up: UpAxis::Y,
        handedness: Handedness::LeftHanded,
    };

    /// Z-up, right-handed (3ds Max, Maya Z-up).
    pub const Z_UP_RIGHT_HANDED: AxisSystem = AxisSystem {
        up: UpAxis::Z,
        handedness: Handedness::RightHanded,
    };

    /// The host's native system for a given up axis. Hosts are right-handed.
    pub fn native(up: UpAxis) -> Self {
        match up {
            UpAxis::Y => Self::Y_UP_RIGHT_HANDED,
            UpAxis::Z => Self::Z_UP_RIGHT_HANDED,
        }
    }

    /// Matrix whose columns are the canonical right, up and back directions
    /// expressed in this system's coordinates.
    pub fn basis(&self) -> Mat3 {
        let right = Vec3::X;
        let (up, back) = match (self.up, self.handedness) {
            (UpAxis::Y, Handedness::RightHanded) => (Vec3::Y, Vec3::Z),
            (UpAxis::Y, Handedness::LeftHanded) => (Vec3::Y, Vec3::NEG_Z),
            (UpAxis::Z, Handedness::RightHanded) => (Vec3::Z, Vec3::NEG_Y),
            (UpAxis::Z, Handedness::LeftHanded) => (Vec3::Z, Vec3::Y),
        };
        Mat3::from_cols(right, up, back)
    }

    /// Change-of-basis matrix mapping coordinates in `self` to coordinates in `target`.
    pub fn conversion_to(&self, target: &AxisSystem) -> Mat3 {
        // Bases are orthonormal, so the inverse is the transpose.
        target.basis() * self.basis().transpose()
    }

    /// Short display label, e.g. "Y-up right-handed".
    pub fn label(&self) -> &'static str {
        match (self.up, self.handedness) {
            (UpAxis::Y, Handedness::RightHanded) => "Y-up right-handed",
            (UpAxis::Y, Handedness::LeftHanded) => "Y-up left-handed",
            (UpAxis::Z, Handedness::RightHanded) => "Z-up right-handed",
            (UpAxis::Z, Handedness::LeftHanded) => "Z-up left-handed",
        }
    }
}

impl Default for AxisSystem {
    fn default() -> Self {
        Self::Y_UP_RIGHT_HANDED
    }
}
