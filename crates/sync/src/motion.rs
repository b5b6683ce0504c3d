use glam::{Quat, Vec3};

use crate::wire::PoseSnapshot;

/// Move rate below zero means snap to the goal on the next tick.
pub const INSTANT_RATE: f32 = -1.0;

/// Directions must agree this closely for extrapolation to engage.
const DIRECTION_EPSILON: f32 = 1e-6;

/// The live transform state of the tracked object, in whatever reference
/// space the host's accessor exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Approach speed per field: linear units/sec for position and scale,
/// degrees/sec for rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRate {
    pub position: f32,
    pub rotation: f32,
    pub scale: f32,
}

impl MoveRate {
    pub const INSTANT: Self = Self {
        position: INSTANT_RATE,
        rotation: INSTANT_RATE,
        scale: INSTANT_RATE,
    };
}

/// A projected position used as the moving target while a late packet is
/// outstanding, with the time budget left for using it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrapolation {
    pub position: Vec3,
    pub remaining: f32,
}

/// The receiver's current reconciliation target: a complete snapshot plus
/// how fast to approach it. Replaced wholesale by each accepted update.
#[derive(Debug, Clone, Copy)]
pub struct Goal {
    pub snapshot: PoseSnapshot,
    pub rates: MoveRate,
    pub extrapolation: Option<Extrapolation>,
}

impl Goal {
    pub fn pose(&self) -> Pose {
        Pose::new(
            self.snapshot.position,
            self.snapshot.rotation,
            self.snapshot.scale,
        )
    }

    /// Advances `live` one tick toward this goal. Returns `None` when the
    /// pose already matches and no extrapolation budget remains, so callers
    /// can skip the pose write entirely.
    pub fn advance(&mut self, live: &Pose, dt: f32) -> Option<Pose> {
        let extrapolating = self
            .extrapolation
            .as_ref()
            .is_some_and(|e| e.remaining > 0.0);

        if !extrapolating && self.reached(live) {
            return None;
        }

        let mut next = *live;

        if self.rates.position < 0.0 {
            next.position = self.snapshot.position;
        } else {
            let target = match self.extrapolation {
                Some(extra) if extrapolating => extra.position,
                _ => self.snapshot.position,
            };
            next.position = move_toward(live.position, target, self.rates.position * dt);
        }

        if self.rates.rotation < 0.0 {
            next.rotation = self.snapshot.rotation;
        } else {
            next.rotation =
                rotate_toward(live.rotation, self.snapshot.rotation, self.rates.rotation * dt);
        }

        if self.rates.scale < 0.0 {
            next.scale = self.snapshot.scale;
        } else {
            next.scale = move_toward(live.scale, self.snapshot.scale, self.rates.scale * dt);
        }

        if extrapolating {
            if let Some(extra) = self.extrapolation.as_mut() {
                extra.remaining -= dt;
            }
        }

        Some(next)
    }

    fn reached(&self, live: &Pose) -> bool {
        live.position == self.snapshot.position
            && live.rotation == self.snapshot.rotation
            && live.scale == self.snapshot.scale
    }
}

/// True when teleporting is enabled and the target is at least the
/// threshold away from the current position.
pub fn should_teleport(current: Vec3, target: Vec3, threshold_squared: f32) -> bool {
    threshold_squared > 0.0 && current.distance_squared(target) >= threshold_squared
}

/// Constant-speed rates sized so the approach nominally lands as the next
/// packet becomes due, biased later by the fallbehind.
pub fn move_rates(live: &Pose, target: &PoseSnapshot, interval: f32, fallbehind: f32) -> MoveRate {
    let past = interval + fallbehind;
    MoveRate {
        position: live.position.distance(target.position) / past,
        rotation: live.rotation.angle_between(target.rotation).to_degrees() / past,
        scale: live.scale.distance(target.scale) / past,
    }
}

/// Projects the new goal forward along the previous goal's travel
/// direction. Returns `None` when extrapolation is disabled, there is no
/// travel history, the packet is a settle marker, or the live position has
/// already passed the new goal (continuing would overshoot further and
/// further).
pub fn extrapolation(
    new: &PoseSnapshot,
    previous: Option<&Goal>,
    live_position: Vec3,
    span: f32,
    interval: f32,
) -> Option<Extrapolation> {
    if span <= 0.0 {
        return None;
    }
    let previous = previous?;
    if new.is_settled() {
        return None;
    }

    let travel = new.position - previous.snapshot.position;
    let travel_direction = travel.normalize_or_zero();
    let goal_direction = (new.position - live_position).normalize_or_zero();
    if goal_direction.distance_squared(travel_direction) > DIRECTION_EPSILON {
        return None;
    }

    let multiplier = span / interval;
    Some(Extrapolation {
        position: new.position + travel * multiplier,
        remaining: interval + span,
    })
}

/// Steps `current` toward `target` by at most `max_step`, landing exactly
/// on the target instead of overshooting.
pub fn move_toward(current: Vec3, target: Vec3, max_step: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_step || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_step
    }
}

/// Rotates `from` toward `to` by at most `max_degrees`, landing exactly on
/// the target orientation once within range.
pub fn rotate_toward(from: Quat, to: Quat, max_degrees: f32) -> Quat {
    let angle = from.angle_between(to).to_degrees();
    if angle <= max_degrees || angle <= f32::EPSILON {
        to
    } else {
        from.slerp(to, max_degrees / angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SyncFields;

    fn snapshot_at(position: Vec3) -> PoseSnapshot {
        PoseSnapshot::new(
            SyncFields::POSITION,
            0,
            position,
            Quat::IDENTITY,
            Vec3::ONE,
        )
    }

    fn goal_at(position: Vec3) -> Goal {
        Goal {
            snapshot: snapshot_at(position),
            rates: MoveRate {
                position: 1.0,
                rotation: 90.0,
                scale: 1.0,
            },
            extrapolation: None,
        }
    }

    #[test]
    fn move_toward_clamps_to_target() {
        let from = Vec3::ZERO;
        let to = Vec3::new(1.0, 0.0, 0.0);

        let partial = move_toward(from, to, 0.25);
        assert!((partial.x - 0.25).abs() < 1e-6);

        assert_eq!(move_toward(from, to, 5.0), to);
        assert_eq!(move_toward(to, to, 0.1), to);
    }

    #[test]
    fn rotate_toward_clamps_to_target() {
        let from = Quat::IDENTITY;
        let to = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);

        let halfway = rotate_toward(from, to, 45.0);
        assert!((halfway.angle_between(from).to_degrees() - 45.0).abs() < 0.1);

        assert_eq!(rotate_toward(from, to, 180.0), to);
    }

    #[test]
    fn teleport_threshold_boundary() {
        let threshold_squared = 25.0;
        let current = Vec3::ZERO;

        assert!(should_teleport(
            current,
            Vec3::new(5.1, 0.0, 0.0),
            threshold_squared
        ));
        assert!(!should_teleport(
            current,
            Vec3::new(4.9, 0.0, 0.0),
            threshold_squared
        ));
        // Zero threshold disables teleporting entirely.
        assert!(!should_teleport(current, Vec3::new(100.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn move_rates_scale_with_distance_and_interval() {
        let live = Pose::IDENTITY;
        let target = snapshot_at(Vec3::new(2.0, 0.0, 0.0));

        let rates = move_rates(&live, &target, 0.1, 0.1);
        assert!((rates.position - 10.0).abs() < 1e-4);
        assert_eq!(rates.rotation, 0.0);
    }

    #[test]
    fn extrapolation_projects_along_travel() {
        let previous = goal_at(Vec3::ZERO);
        let new = snapshot_at(Vec3::new(1.0, 0.0, 0.0));
        let live = Vec3::new(0.5, 0.0, 0.0);

        let extra = extrapolation(&new, Some(&previous), live, 0.2, 0.1).unwrap();
        assert!((extra.position.x - 3.0).abs() < 1e-4);
        assert!((extra.remaining - 0.3).abs() < 1e-6);
    }

    #[test]
    fn extrapolation_overshoot_guard() {
        let previous = goal_at(Vec3::ZERO);
        let new = snapshot_at(Vec3::new(1.0, 0.0, 0.0));
        // Live position already past the new goal along the travel
        // direction; projecting further would run away.
        let live = Vec3::new(1.5, 0.0, 0.0);

        assert!(extrapolation(&new, Some(&previous), live, 0.2, 0.1).is_none());
    }

    #[test]
    fn extrapolation_disabled_cases() {
        let previous = goal_at(Vec3::ZERO);
        let new = snapshot_at(Vec3::new(1.0, 0.0, 0.0));
        let live = Vec3::ZERO;

        assert!(extrapolation(&new, Some(&previous), live, 0.0, 0.1).is_none());
        assert!(extrapolation(&new, None, live, 0.2, 0.1).is_none());

        let mut settled = new;
        settled.fields |= SyncFields::SETTLED;
        assert!(extrapolation(&settled, Some(&previous), live, 0.2, 0.1).is_none());
    }

    #[test]
    fn instant_rates_snap_in_one_tick() {
        let mut goal = goal_at(Vec3::new(10.0, 0.0, 0.0));
        goal.rates = MoveRate::INSTANT;

        let live = Pose::IDENTITY;
        let next = goal.advance(&live, 0.016).unwrap();
        assert_eq!(next.position, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn advance_is_noop_once_goal_reached() {
        let mut goal = goal_at(Vec3::new(1.0, 0.0, 0.0));
        let live = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE);

        assert!(goal.advance(&live, 0.016).is_none());
    }

    #[test]
    fn advance_chases_extrapolated_point_until_budget_spent() {
        let mut goal = goal_at(Vec3::new(1.0, 0.0, 0.0));
        goal.rates.position = 100.0;
        goal.extrapolation = Some(Extrapolation {
            position: Vec3::new(3.0, 0.0, 0.0),
            remaining: 0.01,
        });

        let live = Pose::IDENTITY;
        let next = goal.advance(&live, 0.016).unwrap();
        // Heading past the raw goal toward the projected point.
        assert!((next.position.x - 1.6).abs() < 1e-4);
        assert!(goal.extrapolation.unwrap().remaining < 0.0);

        // Budget exhausted: back to the raw goal.
        let next = goal
            .advance(&Pose::new(next.position, next.rotation, next.scale), 0.016)
            .unwrap();
        assert_eq!(next.position, Vec3::new(1.0, 0.0, 0.0));
    }
}
