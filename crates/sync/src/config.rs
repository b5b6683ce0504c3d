use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::wire::SyncFields;

bitflags! {
    /// Axes that snap straight to a received value instead of moving toward
    /// it over time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Axes: u8 {
        const X = 1;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

/// When the outbound half of the controller is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntervalMode {
    /// Every `interval_secs` of wall-clock time, evaluated on frame ticks.
    #[default]
    Timed,
    /// Once per fixed simulation step.
    FixedTick,
}

/// Default delivery class for outbound snapshots. Settle packets always go
/// reliable regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delivery {
    #[default]
    Reliable,
    Unreliable,
}

/// Who originates authoritative motion for the tracked object. Consulted in
/// one place per controller rather than re-derived at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityRole {
    /// The source endpoint moves the object. `owner_feedback` controls
    /// whether results are echoed back onto the owning endpoint, for setups
    /// that send inputs and rely on the source's response to move.
    SourceAuthoritative { owner_feedback: bool },
    /// The owning endpoint moves the object and the source relays it.
    OwnerAuthoritative,
}

impl Default for AuthorityRole {
    fn default() -> Self {
        Self::OwnerAuthoritative
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_mode: IntervalMode,
    /// Seconds between sends in `Timed` mode.
    pub interval_secs: f32,
    pub delivery: Delivery,
    /// Exact comparison when diffing instead of the small default tolerance.
    pub precise: bool,
    /// Extra seconds added to the approach time so arrival lands slightly
    /// after the next packet is due, absorbing network jitter.
    pub interpolation_fallbehind: f32,
    /// How long to project motion forward when an expected packet is late.
    /// Zero disables extrapolation.
    pub extrapolation_span: f32,
    /// Snap instead of smoothing when a received position is at least this
    /// far away. Zero disables.
    pub teleport_threshold: f32,
    pub authority: AuthorityRole,
    pub sync_position: bool,
    pub sync_rotation: bool,
    pub sync_scale: bool,
    pub snap_position: Axes,
    pub snap_rotation: Axes,
    pub snap_scale: Axes,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_mode: IntervalMode::Timed,
            interval_secs: 0.1,
            delivery: Delivery::Reliable,
            precise: false,
            interpolation_fallbehind: 0.06,
            extrapolation_span: 0.0,
            teleport_threshold: 0.0,
            authority: AuthorityRole::default(),
            sync_position: true,
            sync_rotation: true,
            sync_scale: true,
            snap_position: Axes::empty(),
            snap_rotation: Axes::empty(),
            snap_scale: Axes::empty(),
        }
    }
}

impl SyncConfig {
    pub const MIN_INTERVAL: f32 = 0.01;

    /// Corrects invalid values in place. Applied once when a controller is
    /// built, so bad configuration never surfaces as a runtime error.
    pub fn sanitize(&mut self) {
        if !self.interval_secs.is_finite() || self.interval_secs < Self::MIN_INTERVAL {
            self.interval_secs = Self::MIN_INTERVAL;
        }
        self.interpolation_fallbehind = self.interpolation_fallbehind.max(0.0);
        self.extrapolation_span = self.extrapolation_span.max(0.0);
        self.teleport_threshold = self.teleport_threshold.max(0.0);
    }

    /// The field set this side is configured to synchronize.
    pub fn configured_fields(&self) -> SyncFields {
        let mut fields = SyncFields::empty();
        if self.sync_position {
            fields |= SyncFields::POSITION;
        }
        if self.sync_rotation {
            fields |= SyncFields::ROTATION;
        }
        if self.sync_scale {
            fields |= SyncFields::SCALE;
        }
        fields
    }

    pub fn teleport_threshold_squared(&self) -> f32 {
        self.teleport_threshold * self.teleport_threshold
    }

    /// Expected seconds between snapshots, used to size approach rates.
    pub fn sync_interval(&self, fixed_dt: f32) -> f32 {
        match self.interval_mode {
            IntervalMode::Timed => self.interval_secs,
            IntervalMode::FixedTick => fixed_dt,
        }
    }
}
