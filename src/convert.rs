//! Exact conversion of physical distances into microstep counts.
//!
//! Rotations are in degrees of output rotation, lifts in mils along a lead
//! screw. For an axle geared `big:small`:
//!
//! ```text
//! ROTATE: usteps = d * big * usteps_per_rotation / (360 * small)
//! LIFT:   usteps = d * 254 * big              / (100 * small)
//! ```
//!
//! The integer part is queued and the remainder is added to a per-axle
//! deficit. A lifter is sometimes rotated by degrees (to cancel the lift a
//! coupled rotator would cause), so both remainders are expressed over the
//! common basis `1800 * small`: rotate remainders are scaled by 5 and lift
//! remainders by 18. When the deficit reaches the basis one extra microstep
//! is emitted. Division floors toward negative infinity, so the deficit stays
//! in `[0, 1800 * small)` and the cumulative error is always under one
//! microstep.

use tracing::debug;

use crate::axle::{AxleId, AxleRegistry, MoveKind, Movement, Window};
use crate::config::MotionConfig;
use crate::error::MotionError;
use crate::traits::Rotation;

/// Least common multiple of the rotation (360) and lift (100) bases.
pub const COMMON_BASIS: i64 = 1800;

/// Turns distances into queued microstep movements.
#[derive(Clone, Copy, Debug)]
pub struct MicrostepConverter<'a> {
    motion: &'a MotionConfig,
}

/// Result of converting one distance for one axle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conversion {
    /// Signed microsteps to emit.
    pub steps: i64,
    /// Deficit after this conversion.
    pub deficit: i64,
    /// Denominator of the deficit.
    pub basis: i64,
    /// Whether the deficit overflowed into an extra microstep.
    pub carried: bool,
}

impl<'a> MicrostepConverter<'a> {
    /// Create a converter using the given motion constants.
    pub fn new(motion: &'a MotionConfig) -> Self {
        Self { motion }
    }

    /// Compute the microsteps for `distance` on `axle` without queuing anything.
    pub fn convert(
        &self,
        registry: &AxleRegistry,
        id: AxleId,
        kind: MoveKind,
        distance: i32,
    ) -> Conversion {
        let axle = &registry[id];
        let big = axle.spec().gearing.big as i64;
        let small = axle.spec().gearing.small as i64;
        let d = distance as i64;

        let (numer, denom, scale) = match kind {
            MoveKind::Rotate => (
                d * big * self.motion.microsteps_per_rotation() as i64,
                360 * small,
                COMMON_BASIS / 360,
            ),
            MoveKind::Lift => (
                d * self.motion.lift_usteps_per_100_mils as i64 * big,
                100 * small,
                COMMON_BASIS / 100,
            ),
        };
        let basis = denom * scale;
        let mut steps = numer.div_euclid(denom);

        if axle.spec().full_steps {
            let per_step = self.motion.microsteps_per_step.max(1) as i64;
            steps = steps.div_euclid(per_step) * per_step;
            return Conversion {
                steps,
                deficit: axle.deficit,
                basis,
                carried: false,
            };
        }

        let mut deficit = axle.deficit + numer.rem_euclid(denom) * scale;
        let carried = deficit >= basis;
        if carried {
            steps += 1;
            deficit -= basis;
        }
        Conversion {
            steps,
            deficit,
            basis,
            carried,
        }
    }

    /// Queue a movement of `distance` on `id` within `window`.
    ///
    /// A rotation of an axle with a compensating lifter also queues an equal
    /// and opposite rotation of the lifter in the same window.
    ///
    /// # Errors
    ///
    /// [`MotionError::AlreadyQueued`] if the axle or its compensator already
    /// has a movement, [`MotionError::Unassigned`] if either has no driver.
    /// Nothing is changed when an error is returned.
    pub fn queue(
        &self,
        registry: &mut AxleRegistry,
        id: AxleId,
        kind: MoveKind,
        distance: i32,
        window: Window,
    ) -> Result<(), MotionError> {
        let compensator = match kind {
            MoveKind::Rotate => registry[id].compensator(),
            MoveKind::Lift => None,
        };
        Self::check_free(registry, id)?;
        if let Some(lifter) = compensator {
            Self::check_free(registry, lifter)?;
        }

        self.commit(registry, id, kind, distance, window);
        if let Some(lifter) = compensator {
            self.commit(registry, lifter, MoveKind::Rotate, -distance, window);
        }
        Ok(())
    }

    fn check_free(registry: &AxleRegistry, id: AxleId) -> Result<(), MotionError> {
        let axle = &registry[id];
        if axle.is_queued() {
            return Err(MotionError::AlreadyQueued { axle: axle.name() });
        }
        if axle.slot().is_none() {
            return Err(MotionError::Unassigned { axle: axle.name() });
        }
        Ok(())
    }

    fn commit(
        &self,
        registry: &mut AxleRegistry,
        id: AxleId,
        kind: MoveKind,
        distance: i32,
        window: Window,
    ) {
        let conversion = self.convert(registry, id, kind, distance);
        let axle = &mut registry[id];
        axle.deficit = conversion.deficit;
        let movement = Movement {
            direction: Rotation::from_signed(conversion.steps),
            steps_needed: conversion.steps.unsigned_abs().min(u32::MAX as u64) as u32,
            window,
        };
        axle.movement = Some(movement);

        if self.motion.verbosity >= 3 {
            if conversion.carried {
                debug!(axle = axle.name(), "used an accumulated microstep");
            }
            debug!(
                axle = axle.name(),
                kind = kind.unit(),
                distance,
                direction = movement.direction.as_str(),
                steps = movement.steps_needed,
                start = window.start,
                end = window.end,
                deficit = conversion.deficit,
                basis = conversion.basis,
                "queued movement"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axle::{AxleSpec, Gearing};

    fn registry() -> AxleRegistry {
        AxleRegistry::new(&[
            AxleSpec::rotator("geared", "57:11 rotator")
                .geared(Gearing::GEARMOTOR)
                .at(1, 1),
            AxleSpec::lifter("lift", "direct lifter").at(1, 2),
            AxleSpec::rotator("comp", "compensated rotator")
                .geared(Gearing::MILL_DIGIT)
                .compensated_by("lift")
                .at(1, 3),
            AxleSpec::lifter("full", "full-step lifter").full_steps().at(1, 4),
            AxleSpec::lifter("loose", "no driver"),
        ])
        .unwrap()
    }

    #[test]
    fn rotate_uses_gearing() {
        let motion = MotionConfig::default();
        let reg = registry();
        let conv = MicrostepConverter::new(&motion);
        // 360 degrees through 57:11 is 800 * 57 / 11 = 4145.45 usteps
        let c = conv.convert(&reg, reg.find("geared").unwrap(), MoveKind::Rotate, 360);
        assert_eq!(c.steps, 4145);
        assert_eq!(c.basis, 1800 * 11);
        assert_eq!(c.deficit, (800 * 57 * 360 % (360 * 11)) as i64 * 5);
    }

    #[test]
    fn lift_uses_lead_screw_constant() {
        let motion = MotionConfig::default();
        let reg = registry();
        let conv = MicrostepConverter::new(&motion);
        let c = conv.convert(&reg, reg.find("lift").unwrap(), MoveKind::Lift, 100);
        assert_eq!(c.steps, 254);
        assert_eq!(c.deficit, 0);
    }

    #[test]
    fn negative_distance_floors() {
        let motion = MotionConfig::default();
        let reg = registry();
        let conv = MicrostepConverter::new(&motion);
        // -1 mil = -2.54 usteps floors to -3 with 0.46 carried forward
        let c = conv.convert(&reg, reg.find("lift").unwrap(), MoveKind::Lift, -1);
        assert_eq!(c.steps, -3);
        assert_eq!(c.deficit, 46 * 18);
        assert!(c.deficit >= 0 && c.deficit < c.basis);
    }

    #[test]
    fn queue_sets_direction_and_window() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("lift").unwrap();
        let window = Window::new(10, 150).unwrap();
        MicrostepConverter::new(&motion)
            .queue(&mut reg, id, MoveKind::Lift, -100, window)
            .unwrap();
        let m = reg[id].movement.unwrap();
        assert_eq!(m.direction, Rotation::CounterClockwise);
        assert_eq!(m.steps_needed, 254);
        assert_eq!(m.window, window);
    }

    #[test]
    fn deficit_carries_extra_step() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("lift").unwrap();
        let conv = MicrostepConverter::new(&motion);
        let mut total = 0i64;
        for _ in 0..50 {
            conv.queue(&mut reg, id, MoveKind::Lift, 1, Window::FULL).unwrap();
            total += reg[id].movement.unwrap().steps_needed as i64;
            reg[id].movement = None;
        }
        // 50 mils = 127 usteps exactly
        assert_eq!(total, 127);
        assert_eq!(reg[id].deficit, 0);
    }

    #[test]
    fn rotate_and_lift_share_one_deficit() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("lift").unwrap();
        let conv = MicrostepConverter::new(&motion);
        // in 1/1800 usteps: 1 degree is 4000, 1 mil is 4572
        let moves = [
            (MoveKind::Rotate, 1, 4000, false),
            (MoveKind::Lift, 1, 4572, false),
            (MoveKind::Rotate, 1, 4000, false),
            (MoveKind::Lift, 1, 4572, true),
            (MoveKind::Rotate, -1, -4000, true),
        ];

        let mut exact = 0i64;
        let mut total = 0i64;
        for (kind, distance, scaled, carries) in moves {
            let c = conv.convert(&reg, id, kind, distance);
            assert_eq!(c.carried, carries, "{kind:?} {distance}");
            assert_eq!(c.basis, COMMON_BASIS);
            conv.queue(&mut reg, id, kind, distance, Window::FULL).unwrap();
            reg[id].movement = None;

            exact += scaled;
            total += c.steps;
            assert_eq!(total, exact.div_euclid(COMMON_BASIS));
            assert_eq!(reg[id].deficit, exact.rem_euclid(COMMON_BASIS));
        }
        assert_eq!(total, 7);
    }

    #[test]
    fn full_steps_round_down() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("full").unwrap();
        // 10 mils = 25.4 usteps -> 24
        MicrostepConverter::new(&motion)
            .queue(&mut reg, id, MoveKind::Lift, 10, Window::FULL)
            .unwrap();
        assert_eq!(reg[id].movement.unwrap().steps_needed, 24);
        assert_eq!(reg[id].deficit, 0);
    }

    // =========================================================================
    // Compensation / Invariant Tests
    // =========================================================================

    #[test]
    fn rotation_queues_compensator() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let rot = reg.find("comp").unwrap();
        let lift = reg.find("lift").unwrap();
        let window = Window::DELAYED;
        MicrostepConverter::new(&motion)
            .queue(&mut reg, rot, MoveKind::Rotate, 18, window)
            .unwrap();

        let r = reg[rot].movement.unwrap();
        let l = reg[lift].movement.unwrap();
        assert_eq!(r.direction, Rotation::Clockwise);
        assert_eq!(l.direction, Rotation::CounterClockwise);
        assert_eq!(l.window, window);
        // 18 degrees of a direct lifter is 40 usteps
        assert_eq!(l.steps_needed, 40);
    }

    #[test]
    fn lift_of_compensated_rotator_does_not_compensate() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let rot = reg.find("comp").unwrap();
        MicrostepConverter::new(&motion)
            .queue(&mut reg, rot, MoveKind::Lift, 10, Window::FULL)
            .unwrap();
        assert_eq!(reg.queued_count(), 1);
    }

    #[test]
    fn double_queue_fails_without_mutation() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("geared").unwrap();
        let conv = MicrostepConverter::new(&motion);
        conv.queue(&mut reg, id, MoveKind::Rotate, 7, Window::FULL).unwrap();
        let before = (reg[id].movement, reg[id].deficit);

        let err = conv
            .queue(&mut reg, id, MoveKind::Rotate, 90, Window::DELAYED)
            .unwrap_err();
        assert_eq!(err, MotionError::AlreadyQueued { axle: "geared" });
        assert_eq!((reg[id].movement, reg[id].deficit), before);
    }

    #[test]
    fn busy_compensator_blocks_primary() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let rot = reg.find("comp").unwrap();
        let lift = reg.find("lift").unwrap();
        let conv = MicrostepConverter::new(&motion);
        conv.queue(&mut reg, lift, MoveKind::Lift, 100, Window::FULL).unwrap();

        let err = conv
            .queue(&mut reg, rot, MoveKind::Rotate, 18, Window::FULL)
            .unwrap_err();
        assert_eq!(err, MotionError::AlreadyQueued { axle: "lift" });
        assert!(reg[rot].movement.is_none());
        assert_eq!(reg[rot].deficit, 0);
    }

    #[test]
    fn unassigned_axle_rejected() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let id = reg.find("loose").unwrap();
        let err = MicrostepConverter::new(&motion)
            .queue(&mut reg, id, MoveKind::Lift, 10, Window::FULL)
            .unwrap_err();
        assert_eq!(err, MotionError::Unassigned { axle: "loose" });
    }
}
