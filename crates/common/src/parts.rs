//! # Live Parts
//!
//! Runtime state of the physical arrangement: one `PartInstance` per
//! physical part and a single `StemInstance` for the main stem.
//!
//! Gameplay mutates conditions and stem measurements; only the detachment
//! authority flips `is_attached`.

use bevy::math::Vec3;
use bevy::reflect::Reflect;
use serde::{Deserialize, Serialize};

use crate::rules::{PartCondition, PartKind};

// ============================================================================
// Detach Reason
// ============================================================================

/// Why a part was last detached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum DetachReason {
    #[default]
    None,
    DeliberateCut,
    AccidentalTear,
    ComponentSwap,
    PhysicalBreak,
    Debug,
}

// ============================================================================
// Part Instance
// ============================================================================

/// Live state of one physical part.
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct PartInstance {
    /// Must match a `PartRule` to be scored
    pub part_id: String,
    pub kind: PartKind,
    pub condition: PartCondition,
    /// Physical marker equivalent to `PartKind::CriticalCrown`
    pub structural_anchor: bool,
    is_attached: bool,
    permanently_detached: bool,
    last_detach_reason: DetachReason,
}

impl PartInstance {
    pub fn new(part_id: impl Into<String>, kind: PartKind) -> Self {
        Self {
            part_id: part_id.into(),
            kind,
            condition: PartCondition::Normal,
            structural_anchor: false,
            is_attached: true,
            permanently_detached: false,
            last_detach_reason: DetachReason::None,
        }
    }

    pub fn with_condition(mut self, condition: PartCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_structural_anchor(mut self, anchor: bool) -> Self {
        self.structural_anchor = anchor;
        self
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached
    }

    pub fn is_permanently_detached(&self) -> bool {
        self.permanently_detached
    }

    pub fn last_detach_reason(&self) -> DetachReason {
        self.last_detach_reason
    }

    /// Whether losing this part is the immediate fatal condition.
    pub fn is_critical(&self) -> bool {
        self.kind.is_critical() || self.structural_anchor
    }

    /// Whether an external re-attachment mechanism may rebind this part.
    pub fn can_reattach(&self) -> bool {
        !self.permanently_detached
    }

    /// One-way transition out of the attached state.
    ///
    /// Returns `false` if the part was already detached. Gameplay goes
    /// through the runtime's detachment authority instead of calling this.
    #[doc(hidden)]
    pub fn mark_detached(&mut self, reason: DetachReason, permanent: bool) -> bool {
        if !self.is_attached {
            return false;
        }
        self.is_attached = false;
        self.last_detach_reason = reason;
        if permanent {
            self.permanently_detached = true;
        }
        true
    }
}

// ============================================================================
// Stem Instance
// ============================================================================

/// Live measurements of the main stem.
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct StemInstance {
    pub anchor_position: Vec3,
    /// Relocated by cut operations
    pub tip_position: Vec3,
    /// Authored axis cut angles are measured against
    pub reference_axis: Vec3,
    /// Added to the raw angle before scoring or display (degrees)
    pub calibration_offset: f32,
    /// Last measured cut angle, before calibration (degrees)
    raw_angle: f32,
}

impl Default for StemInstance {
    fn default() -> Self {
        Self {
            anchor_position: Vec3::ZERO,
            tip_position: Vec3::Y,
            reference_axis: Vec3::Y,
            calibration_offset: 0.0,
            raw_angle: 0.0,
        }
    }
}

impl StemInstance {
    pub fn new(anchor_position: Vec3, tip_position: Vec3) -> Self {
        Self {
            anchor_position,
            tip_position,
            ..Default::default()
        }
    }

    pub fn with_reference_axis(mut self, axis: Vec3) -> Self {
        self.reference_axis = axis;
        self
    }

    pub fn with_calibration_offset(mut self, offset_degrees: f32) -> Self {
        self.calibration_offset = offset_degrees;
        self
    }

    /// Distance from anchor to tip.
    pub fn current_length(&self) -> f32 {
        self.anchor_position.distance(self.tip_position)
    }

    /// `current_length - ideal`; negative means cut too short.
    pub fn signed_length_delta(&self, ideal: f32) -> f32 {
        self.current_length() - ideal
    }

    pub fn raw_angle(&self) -> f32 {
        self.raw_angle
    }

    /// Raw angle plus calibration, wrapped to `[0, 360)`.
    ///
    /// Scoring and any on-screen readout both read this value.
    pub fn calibrated_angle(&self) -> f32 {
        wrap_degrees(self.raw_angle + self.calibration_offset)
    }

    pub fn relocate_tip(&mut self, tip_position: Vec3) {
        self.tip_position = tip_position;
    }

    pub fn record_raw_angle(&mut self, degrees: f32) {
        self.raw_angle = degrees;
    }

    /// Record the angle between a cut-plane normal and the reference axis.
    ///
    /// Degenerate normals leave the previous angle untouched.
    pub fn record_cut_normal(&mut self, normal: Vec3) -> Option<f32> {
        let normal = normal.try_normalize()?;
        let axis = self.reference_axis.try_normalize()?;
        let degrees = normal.angle_between(axis).to_degrees();
        self.raw_angle = degrees;
        Some(degrees)
    }

    /// A cut relocates the tip and records the new angle in one step.
    pub fn apply_cut(&mut self, tip_position: Vec3, raw_angle: f32) {
        self.relocate_tip(tip_position);
        self.record_raw_angle(raw_angle);
    }
}

// ============================================================================
// Angle Helpers
// ============================================================================

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negatives
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Smallest absolute difference between two angles, in `[0, 180]`.
pub fn shortest_angle_delta(a: f32, b: f32) -> f32 {
    let diff = wrap_degrees(a - b);
    if diff > 180.0 { 360.0 - diff } else { diff }
}
