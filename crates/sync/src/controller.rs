use std::io;

use glam::{EulerRot, Quat, Vec3};
use log::{debug, warn};

use crate::config::{AuthorityRole, Axes, Delivery, IntervalMode, SyncConfig};
use crate::diff;
use crate::motion::{self, Goal, MoveRate, Pose};
use crate::wire::{PoseSnapshot, SyncFields};

/// Which way a snapshot travels. Each direction has fully independent send
/// and receive state because authority can flow both ways at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Source endpoint to owning endpoint.
    FromSource,
    /// Owning endpoint to source endpoint.
    FromOwner,
}

impl Direction {
    fn index(self) -> usize {
        match self {
            Self::FromSource => 0,
            Self::FromOwner => 1,
        }
    }
}

/// Which end of the channel this controller runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The hub the object is replicated through (server-like).
    Source,
    /// The endpoint that may own the object (client-like).
    Owner,
}

/// Read/write access to the tracked object's transform. Implementors choose
/// the reference space (local or world); the engine never needs to know.
pub trait PoseAccessor {
    fn pose(&self) -> Pose;
    fn set_pose(&mut self, pose: Pose);
}

/// Outbound half of the message channel. Retransmission of reliable
/// messages belongs to the transport; failures returned here are logged and
/// never retried by the engine.
pub trait Transmit {
    fn send(&mut self, direction: Direction, delivery: Delivery, bytes: &[u8]) -> io::Result<()>;
}

/// Where in the host's scheduling loop this tick sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// A render/update frame. Timed sends and all motion run here.
    Frame,
    /// A fixed simulation step. Fixed-tick sends run here, at most once per
    /// step index.
    FixedStep { tick: u64 },
}

/// The scheduling clock handed to `on_tick`: wall-clock seconds, the delta
/// since the previous tick of the same phase, and the phase itself.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub now: f32,
    pub delta: f32,
    pub phase: TickPhase,
}

impl TickContext {
    pub fn frame(now: f32, delta: f32) -> Self {
        Self {
            now,
            delta,
            phase: TickPhase::Frame,
        }
    }

    pub fn fixed_step(now: f32, delta: f32, tick: u64) -> Self {
        Self {
            now,
            delta,
            phase: TickPhase::FixedStep { tick },
        }
    }
}

/// Returned by a snapshot hook to discard an inbound update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vetoed;

/// Hook fired for every accepted inbound snapshot after missing fields are
/// filled in. The hook may rewrite the snapshot or veto it outright.
pub type SnapshotHook = Box<dyn FnMut(PoseSnapshot) -> Result<PoseSnapshot, Vetoed> + Send>;

#[derive(Debug, Default)]
struct LaneState {
    last_sent: Option<PoseSnapshot>,
    next_sequence: u32,
    last_accepted_sequence: u32,
    next_send_time: f32,
    last_fixed_tick: Option<u64>,
    settle_sent: bool,
}

/// Fallback fixed step length until a fixed tick reports the real one.
const DEFAULT_FIXED_DT: f32 = 0.02;

/// Per-object synchronization state machine. Owns all per-direction state;
/// every mutation happens on the tick timeline, so no locking is needed.
///
/// Outbound sends are gated structurally: the owner lane only transmits
/// when the role is owner-authoritative and this endpoint holds authority,
/// so a side without authority cannot originate an authoritative send.
pub struct SyncController<P: PoseAccessor> {
    endpoint: Endpoint,
    config: SyncConfig,
    accessor: P,
    authority: bool,
    goal: Option<Goal>,
    lanes: [LaneState; 2],
    hook: Option<SnapshotHook>,
    fixed_dt: f32,
}

impl<P: PoseAccessor> SyncController<P> {
    /// Attaches the engine to an object. The configuration is sanitized
    /// here; invalid values are corrected rather than surfaced.
    ///
    /// A side that must not move the object on its own starts pinned to the
    /// current pose so it cannot drift before the first snapshot arrives.
    pub fn new(endpoint: Endpoint, mut config: SyncConfig, accessor: P) -> Self {
        config.sanitize();
        let mut controller = Self {
            endpoint,
            config,
            accessor,
            authority: false,
            goal: None,
            lanes: [LaneState::default(), LaneState::default()],
            hook: None,
            fixed_dt: DEFAULT_FIXED_DT,
        };
        if controller.is_passive() {
            controller.seed_goal();
        }
        controller
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn accessor(&self) -> &P {
        &self.accessor
    }

    pub fn accessor_mut(&mut self) -> &mut P {
        &mut self.accessor
    }

    pub fn has_goal(&self) -> bool {
        self.goal.is_some()
    }

    pub fn set_snapshot_hook(&mut self, hook: SnapshotHook) {
        self.hook = Some(hook);
    }

    /// Updates this endpoint's authority over the object. On the owner
    /// endpoint: whether this side owns it. On the source endpoint: whether
    /// a remote owner currently holds it. Revoking authority discards any
    /// goal built from the departed owner's data; losing ownership pins the
    /// object to its current pose.
    pub fn set_authority(&mut self, authority: bool) {
        if self.authority == authority {
            return;
        }
        self.authority = authority;

        match self.endpoint {
            Endpoint::Source => {
                if !authority && self.config.authority == AuthorityRole::OwnerAuthoritative {
                    self.goal = None;
                }
            }
            Endpoint::Owner => {
                if authority && self.config.authority == AuthorityRole::OwnerAuthoritative {
                    self.goal = None;
                } else if self.goal.is_none() {
                    self.seed_goal();
                }
            }
        }
    }

    /// Runs one scheduling tick: evaluates the outbound lane, then (on
    /// frame ticks) drives the pose toward the current goal.
    pub fn on_tick<T: Transmit>(&mut self, ctx: TickContext, transmit: &mut T) {
        if let TickPhase::FixedStep { .. } = ctx.phase {
            self.fixed_dt = ctx.delta;
        }

        self.check_send(ctx, transmit);

        if ctx.phase == TickPhase::Frame {
            self.drive_motion(ctx.delta);
        }
    }

    /// Feeds one received payload into the tick timeline. Malformed bytes
    /// drop this update only; the controller keeps ticking.
    pub fn on_packet_received(&mut self, direction: Direction, bytes: &[u8]) {
        match PoseSnapshot::decode(bytes) {
            Ok(snapshot) => self.apply_snapshot(direction, snapshot),
            Err(err) => {
                debug!("dropping malformed snapshot on {direction:?}: {err}");
            }
        }
    }

    fn outbound_direction(&self) -> Direction {
        match self.endpoint {
            Endpoint::Source => Direction::FromSource,
            Endpoint::Owner => Direction::FromOwner,
        }
    }

    fn check_send<T: Transmit>(&mut self, ctx: TickContext, transmit: &mut T) {
        let direction = self.outbound_direction();
        let lane_index = direction.index();

        match self.config.interval_mode {
            IntervalMode::Timed => {
                if ctx.phase != TickPhase::Frame {
                    return;
                }
                if ctx.now < self.lanes[lane_index].next_send_time {
                    return;
                }
            }
            IntervalMode::FixedTick => {
                let TickPhase::FixedStep { tick } = ctx.phase else {
                    return;
                };
                if self.lanes[lane_index].last_fixed_tick == Some(tick) {
                    return;
                }
                self.lanes[lane_index].last_fixed_tick = Some(tick);
            }
        }

        if direction == Direction::FromOwner {
            // Structural authority gate: without ownership there is nothing
            // this lane may legitimately originate.
            if self.config.authority != AuthorityRole::OwnerAuthoritative || !self.authority {
                return;
            }
        }

        // The source relays the goal while one exists, so owner-driven
        // motion reaches other endpoints at full update rate even when the
        // source itself is still smoothing toward it.
        let current = match (direction, self.goal.as_ref()) {
            (Direction::FromSource, Some(goal)) => goal.pose(),
            _ => self.accessor.pose(),
        };

        let config = self.config;
        let lane = &mut self.lanes[lane_index];

        let changed = diff::changed_fields(lane.last_sent.as_ref(), &current, &config);
        let Some(decision) = diff::plan_send(changed, &config, &mut lane.settle_sent) else {
            return;
        };
        let fields = diff::require_fields(decision.fields, &config);

        // Only meaningful in timed mode, but cheap enough to always track.
        lane.next_send_time = ctx.now + config.interval_secs;

        let snapshot = PoseSnapshot::new(
            fields,
            lane.next_sequence,
            current.position,
            current.rotation,
            current.scale,
        );
        lane.next_sequence = lane.next_sequence.wrapping_add(1);
        lane.last_sent = Some(snapshot);

        let bytes = snapshot.encode();
        if let Err(err) = transmit.send(direction, decision.delivery, &bytes) {
            warn!("snapshot send failed on {direction:?}: {err}");
        }
    }

    fn apply_snapshot(&mut self, direction: Direction, mut snapshot: PoseSnapshot) {
        match direction {
            Direction::FromOwner => {
                if self.endpoint != Endpoint::Source {
                    return;
                }
                // Owner data is only meaningful while an owner holds
                // authority under the owner-authoritative role.
                if self.config.authority != AuthorityRole::OwnerAuthoritative || !self.authority {
                    return;
                }
            }
            Direction::FromSource => {
                if self.endpoint != Endpoint::Owner {
                    return;
                }
                if self.authority {
                    match self.config.authority {
                        // Own state echoed back; already in sync.
                        AuthorityRole::OwnerAuthoritative => return,
                        AuthorityRole::SourceAuthoritative { owner_feedback } => {
                            if !owner_feedback {
                                return;
                            }
                        }
                    }
                }
            }
        }

        let lane = &mut self.lanes[direction.index()];
        if snapshot.fields.contains(SyncFields::SEQUENCED) {
            if snapshot.sequence < lane.last_accepted_sequence {
                debug!(
                    "dropping stale snapshot {} on {direction:?} (last {})",
                    snapshot.sequence, lane.last_accepted_sequence
                );
                return;
            }
            lane.last_accepted_sequence = snapshot.sequence;
        }

        let fallback = match self.goal.as_ref() {
            Some(goal) => goal.pose(),
            None => self.accessor.pose(),
        };
        diff::fill_missing(&mut snapshot, &fallback);

        if let Some(hook) = self.hook.as_mut() {
            match hook(snapshot) {
                Ok(rewritten) => snapshot = rewritten,
                Err(Vetoed) => return,
            }
        }

        self.apply_snapping(&snapshot);

        let live = self.accessor.pose();
        let interval = self.config.sync_interval(self.fixed_dt);
        let (rates, extrapolation) = if motion::should_teleport(
            live.position,
            snapshot.position,
            self.config.teleport_threshold_squared(),
        ) {
            (MoveRate::INSTANT, None)
        } else {
            (
                motion::move_rates(
                    &live,
                    &snapshot,
                    interval,
                    self.config.interpolation_fallbehind,
                ),
                motion::extrapolation(
                    &snapshot,
                    self.goal.as_ref(),
                    live.position,
                    self.config.extrapolation_span,
                    interval,
                ),
            )
        };

        self.goal = Some(Goal {
            snapshot,
            rates,
            extrapolation,
        });
    }

    /// Applies the configured per-axis snap masks for fields present in the
    /// snapshot; the remaining axes keep smoothing through the goal.
    fn apply_snapping(&mut self, snapshot: &PoseSnapshot) {
        let config = self.config;
        if config.snap_position.is_empty()
            && config.snap_rotation.is_empty()
            && config.snap_scale.is_empty()
        {
            return;
        }

        let mut pose = self.accessor.pose();
        let mut changed = false;

        if snapshot.fields.contains(SyncFields::POSITION) && !config.snap_position.is_empty() {
            pose.position = snap_axes(pose.position, snapshot.position, config.snap_position);
            changed = true;
        }
        if snapshot.fields.contains(SyncFields::ROTATION) && !config.snap_rotation.is_empty() {
            pose.rotation = snap_rotation_axes(pose.rotation, snapshot.rotation, config.snap_rotation);
            changed = true;
        }
        if snapshot.fields.contains(SyncFields::SCALE) && !config.snap_scale.is_empty() {
            pose.scale = snap_axes(pose.scale, snapshot.scale, config.snap_scale);
            changed = true;
        }

        if changed {
            self.accessor.set_pose(pose);
        }
    }

    fn drive_motion(&mut self, dt: f32) {
        // Owner went away while we were still chasing its data; release the
        // object so it can be moved freely on this side again.
        if self.endpoint == Endpoint::Source
            && self.config.authority == AuthorityRole::OwnerAuthoritative
            && !self.authority
        {
            self.goal = None;
            return;
        }

        // The authority never reconciles toward its own echoes.
        if self.endpoint == Endpoint::Owner && self.authority {
            match self.config.authority {
                AuthorityRole::OwnerAuthoritative => return,
                AuthorityRole::SourceAuthoritative { owner_feedback } => {
                    if !owner_feedback {
                        return;
                    }
                }
            }
        }

        let Some(goal) = self.goal.as_mut() else {
            return;
        };
        let live = self.accessor.pose();
        if let Some(next) = goal.advance(&live, dt) {
            self.accessor.set_pose(next);
        }
    }

    fn is_passive(&self) -> bool {
        match self.endpoint {
            Endpoint::Source => false,
            Endpoint::Owner => {
                !self.authority || self.config.authority != AuthorityRole::OwnerAuthoritative
            }
        }
    }

    /// Pins the object to wherever it currently is: an instant-rate goal
    /// built from the live pose.
    fn seed_goal(&mut self) {
        let pose = self.accessor.pose();
        let snapshot = PoseSnapshot::new(
            SyncFields::empty(),
            0,
            pose.position,
            pose.rotation,
            pose.scale,
        );
        self.goal = Some(Goal {
            snapshot,
            rates: MoveRate::INSTANT,
            extrapolation: None,
        });
    }
}

fn snap_axes(mut current: Vec3, target: Vec3, axes: Axes) -> Vec3 {
    if axes.contains(Axes::X) {
        current.x = target.x;
    }
    if axes.contains(Axes::Y) {
        current.y = target.y;
    }
    if axes.contains(Axes::Z) {
        current.z = target.z;
    }
    current
}

fn snap_rotation_axes(current: Quat, target: Quat, axes: Axes) -> Quat {
    if axes == Axes::all() {
        return target;
    }
    // Partial masks go through euler angles, matching how the axes are
    // presented to the configuring side.
    let (cy, cx, cz) = current.to_euler(EulerRot::YXZ);
    let (ty, tx, tz) = target.to_euler(EulerRot::YXZ);
    Quat::from_euler(
        EulerRot::YXZ,
        if axes.contains(Axes::Y) { ty } else { cy },
        if axes.contains(Axes::X) { tx } else { cx },
        if axes.contains(Axes::Z) { tz } else { cz },
    )
}
