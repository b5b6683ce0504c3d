use glam::{Quat, Vec3};

use crate::config::{Delivery, SyncConfig};
use crate::motion::Pose;
use crate::wire::{PoseSnapshot, SyncFields};

/// Squared distance under which positions and scales count as unchanged in
/// default (non-precise) mode.
pub const POSITION_TOLERANCE_SQUARED: f32 = 0.0001;

/// Degrees under which rotations count as unchanged in default mode.
pub const ROTATION_TOLERANCE_DEGREES: f32 = 1.0;

/// What an eligible tick decided to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendDecision {
    pub fields: SyncFields,
    pub delivery: Delivery,
}

/// Which configured fields of `current` differ from the last snapshot this
/// side sent. Everything configured counts as changed when nothing was sent
/// yet.
pub fn changed_fields(
    last_sent: Option<&PoseSnapshot>,
    current: &Pose,
    config: &SyncConfig,
) -> SyncFields {
    let Some(last) = last_sent else {
        return config.configured_fields();
    };

    let mut fields = SyncFields::empty();
    if config.sync_position && !position_matches(current.position, last.position, config.precise) {
        fields |= SyncFields::POSITION;
    }
    if config.sync_rotation && !rotation_matches(current.rotation, last.rotation, config.precise) {
        fields |= SyncFields::ROTATION;
    }
    if config.sync_scale && !position_matches(current.scale, last.scale, config.precise) {
        fields |= SyncFields::SCALE;
    }
    fields
}

/// Decides whether an eligible tick actually transmits.
///
/// Nothing changed: with a reliable default and no extrapolation the last
/// packet already holds authoritative data, so skip. Otherwise send one
/// reliable settle marker and go quiet until something changes again.
pub fn plan_send(
    changed: SyncFields,
    config: &SyncConfig,
    settle_sent: &mut bool,
) -> Option<SendDecision> {
    if changed.is_empty() {
        if config.delivery == Delivery::Reliable && config.extrapolation_span == 0.0 {
            return None;
        }
        if *settle_sent {
            return None;
        }
        *settle_sent = true;
        Some(SendDecision {
            fields: SyncFields::SETTLED,
            delivery: Delivery::Reliable,
        })
    } else {
        *settle_sent = false;
        Some(SendDecision {
            fields: changed,
            delivery: config.delivery,
        })
    }
}

/// Adds the fields a send must carry regardless of the diff. Unreliable
/// delivery cannot lean on prior state, so every packet carries the full
/// configured set plus a sequence number. A settle packet also carries the
/// full set so the remote rests on exact values rather than an interpolated
/// approximation.
pub fn require_fields(fields: SyncFields, config: &SyncConfig) -> SyncFields {
    let mut fields = fields;
    if config.delivery == Delivery::Unreliable {
        fields |= config.configured_fields() | SyncFields::SEQUENCED;
    } else if fields.contains(SyncFields::SETTLED) {
        fields |= config.configured_fields();
    }
    fields
}

/// Copies every absent field from the fallback pose so downstream logic
/// always works on a complete snapshot.
pub fn fill_missing(snapshot: &mut PoseSnapshot, fallback: &Pose) {
    if !snapshot.fields.contains(SyncFields::POSITION) {
        snapshot.position = fallback.position;
    }
    if !snapshot.fields.contains(SyncFields::ROTATION) {
        snapshot.rotation = fallback.rotation;
    }
    if !snapshot.fields.contains(SyncFields::SCALE) {
        snapshot.scale = fallback.scale;
    }
}

pub fn position_matches(a: Vec3, b: Vec3, precise: bool) -> bool {
    if precise {
        a == b
    } else {
        a.distance_squared(b) < POSITION_TOLERANCE_SQUARED
    }
}

pub fn rotation_matches(a: Quat, b: Quat, precise: bool) -> bool {
    if precise {
        a == b
    } else {
        a.angle_between(b).to_degrees() < ROTATION_TOLERANCE_DEGREES
    }
}
