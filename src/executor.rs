//! The time-unit executor: emits step pulses for every queued axle.
//!
//! One call drives all queued movements through one duration, normally one
//! time unit. Each axle gets a quota for this call proportional to the part
//! of its window that falls inside the unit, and its steps are spread evenly
//! over that part of the window. A single polling loop interleaves the
//! pulses of all axles and never steps one axle faster than the minimum
//! inter-step interval.
//!
//! Movements whose window ends past 99 stay queued with the remaining steps
//! and a window shifted down by 100, so the next call continues them.
//!
//! The fault line and the operator console are polled at every tick. Either
//! one clears every queued movement and fails the call.
//!
//! # Example
//!
//! ```rust
//! use rs_engine::axle::{AxleRegistry, MoveKind, Window};
//! use rs_engine::config::MotionConfig;
//! use rs_engine::convert::MicrostepConverter;
//! use rs_engine::executor::Executor;
//! use rs_engine::hal::Bench;
//!
//! let motion = MotionConfig::default();
//! let mut registry = AxleRegistry::prototype().unwrap();
//! let mut bench = Bench::mock();
//!
//! let a2k = registry.find("a2k").unwrap();
//! MicrostepConverter::new(&motion)
//!     .queue(&mut registry, a2k, MoveKind::Lift, 100, Window::FULL)
//!     .unwrap();
//!
//! let report = Executor::new(&motion)
//!     .run(&mut registry, &mut bench, motion.timeunit_us())
//!     .unwrap();
//!
//! assert_eq!(report.steps, 254);
//! assert_eq!(registry.queued_count(), 0);
//! ```

use alloc::format;
use alloc::vec::Vec;
use tracing::{debug, info, trace, warn};

use crate::axle::{AxleId, AxleRegistry};
use crate::config::MotionConfig;
use crate::error::MotionError;
use crate::traits::{BoardSlot, Interrupt, PowerState, Rotation, StepperDriver, Testbed};

/// Outcome of one executor call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Pulses emitted.
    pub steps: u32,
    /// Wall time from the first tick to the last, in microseconds.
    pub elapsed_us: u64,
    /// Axles that had a movement queued.
    pub axles: usize,
}

/// Step plan for one axle within one call.
#[derive(Clone, Copy, Debug)]
struct Schedule {
    id: AxleId,
    slot: BoardSlot,
    direction: Rotation,
    quota: u32,
    done: u32,
    start_us: u64,
    delta_us: u64,
    last_us: u64,
    moving: bool,
}

/// Drives queued movements through one or more time units.
#[derive(Clone, Copy, Debug)]
pub struct Executor<'a> {
    motion: &'a MotionConfig,
}

impl<'a> Executor<'a> {
    /// Create an executor using the given motion constants.
    pub fn new(motion: &'a MotionConfig) -> Self {
        Self { motion }
    }

    /// Execute every queued movement within `duration_us`.
    ///
    /// The duration may be a multiple of the time unit to run a long movement
    /// atomically. With nothing queued this returns immediately.
    ///
    /// # Errors
    ///
    /// [`MotionError::Fault`] or [`MotionError::Aborted`] when the fault line
    /// or an operator interrupt is seen, [`MotionError::Hardware`] if the
    /// driver fails. Every queued movement is cleared in all three cases.
    pub fn run<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        duration_us: u32,
    ) -> Result<ExecutionReport, MotionError> {
        let queued = registry.queued();
        if queued.is_empty() {
            return Ok(ExecutionReport::default());
        }
        if self.motion.verbosity >= 2 {
            let names: Vec<&str> = queued.iter().map(|id| registry[*id].name()).collect();
            info!(axles = queued.len(), "doing movements for {}", names.join(" "));
        }

        if let Err(e) = self.check_abort(hw) {
            registry.clear_movements();
            return Err(e);
        }
        let result = self.execute(registry, hw, &queued, duration_us);
        if result.is_err() {
            registry.clear_movements();
        }
        result
    }

    fn execute<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        queued: &[AxleId],
        duration_us: u32,
    ) -> Result<ExecutionReport, MotionError> {
        power_all(registry, hw, PowerState::On, false, self.motion.verbosity)?;

        let duration = duration_us as u64;
        let mut schedules = Vec::with_capacity(queued.len());
        for &id in queued {
            let (slot, movement) = match (registry[id].slot(), registry[id].movement) {
                (Some(slot), Some(movement)) => (slot, movement),
                _ => return Err(MotionError::Unassigned { axle: registry[id].name() }),
            };
            power_axle(registry, hw, id, PowerState::On, false, self.motion.verbosity)?;

            let window = movement.window;
            let end_now = window.end.min(99);
            let span_now = (end_now - window.start + 1) as u64;
            let span = (window.end - window.start + 1) as u64;
            let quota = (movement.steps_needed as u64 * span_now / span) as u32;
            let delta_us = if quota == 0 {
                0
            } else {
                (span_now * duration / 100) / quota as u64
            };
            let start_us = duration * window.start as u64 / 100;

            if self.motion.verbosity >= 4 {
                debug!(
                    axle = registry[id].name(),
                    start_us,
                    delta_us,
                    quota,
                    needed = movement.steps_needed,
                    "scheduled"
                );
            }
            schedules.push(Schedule {
                id,
                slot,
                direction: movement.direction,
                quota,
                done: 0,
                start_us,
                delta_us,
                last_us: 0,
                moving: quota > 0,
            });
        }

        let min_interval = self.motion.min_step_interval_us as u64;
        let origin = hw.now_us();
        let mut now = 0u64;
        let mut total_steps = 0u32;

        while schedules.iter().any(|s| s.moving) {
            for sched in schedules.iter_mut().filter(|s| s.moving) {
                if now <= sched.start_us {
                    continue;
                }
                let since_last = now - sched.last_us;
                if since_last <= min_interval || since_last < sched.delta_us {
                    continue;
                }
                if hw.fault_asserted() {
                    return Err(self.fault());
                }
                self.pulse(registry, hw, sched.id, sched.slot, sched.direction)?;
                total_steps += 1;
                sched.last_us = now;
                sched.done += 1;
                if self.motion.verbosity >= 5 {
                    trace!(
                        at = now,
                        axle = registry[sched.id].name(),
                        step = sched.done,
                        of = sched.quota,
                        direction = sched.direction.as_str(),
                        "step"
                    );
                }
                if sched.done >= sched.quota {
                    sched.moving = false;
                    if !registry[sched.id].spec().always_on {
                        power_axle(registry, hw, sched.id, PowerState::Off, false, self.motion.verbosity)?;
                    }
                }
            }
            self.check_abort(hw)?;
            hw.sleep_us(self.motion.tick_us);
            now = hw.now_us().saturating_sub(origin);
        }

        for sched in &schedules {
            let axle = &mut registry[sched.id];
            let Some(mut movement) = axle.movement else {
                continue;
            };
            if movement.window.spans_units() {
                movement.steps_needed = movement.steps_needed.saturating_sub(sched.quota);
                movement.window.end -= 100;
                movement.window.start = 0;
                axle.movement = Some(movement);
                if self.motion.verbosity >= 3 {
                    debug!(
                        axle = axle.name(),
                        steps = movement.steps_needed,
                        end = movement.window.end,
                        "requeued for the next time unit"
                    );
                }
            } else {
                axle.movement = None;
            }
        }

        if self.motion.verbosity >= 3 {
            debug!(
                steps = total_steps,
                "did {} steps in {}.{:03} msec",
                total_steps,
                now / 1000,
                now % 1000
            );
        }
        Ok(ExecutionReport {
            steps: total_steps,
            elapsed_us: now,
            axles: queued.len(),
        })
    }

    fn pulse<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        id: AxleId,
        slot: BoardSlot,
        direction: Rotation,
    ) -> Result<(), MotionError> {
        hw.step(slot, direction)
            .map_err(|e| MotionError::Hardware(format!("step {}: {:?}", registry[id].name(), e)))?;
        let per_step = self.motion.microsteps_per_step.max(1);
        let axle = &mut registry[id];
        axle.microstep_offset = match direction {
            Rotation::Clockwise => (axle.microstep_offset + 1) % per_step,
            Rotation::CounterClockwise => (axle.microstep_offset + per_step - 1) % per_step,
        };
        axle.net_steps += direction.sign();
        Ok(())
    }

    /// Poll the operator console and the fault line once.
    pub fn check_abort<H: Testbed>(&self, hw: &mut H) -> Result<(), MotionError> {
        match hw.poll_interrupt() {
            Some(Interrupt::StopAndHome) => {
                hw.write_line("...stop and reset to neutral");
                return Err(MotionError::Aborted { return_home: true });
            }
            Some(Interrupt::Stop) => {
                hw.write_line("...immediate abort");
                return Err(MotionError::Aborted { return_home: false });
            }
            None => {}
        }
        if hw.fault_asserted() {
            return Err(self.fault());
        }
        Ok(())
    }

    fn fault(&self) -> MotionError {
        warn!("motor fault asserted, movements cancelled");
        MotionError::Fault
    }
}

// ============================================================================
// Power Control
// ============================================================================

/// Enable or disable one axle's driver.
///
/// Powering off is denied, unless `force` is set, while the axle is always-on,
/// temporarily held on, or between full-step positions. Powering on resets
/// the microstep offset, since the driver restarts at a full step.
pub fn power_axle<D: StepperDriver>(
    registry: &mut AxleRegistry,
    driver: &mut D,
    id: AxleId,
    state: PowerState,
    force: bool,
    verbosity: u8,
) -> Result<(), MotionError> {
    let axle = &mut registry[id];
    let slot = axle
        .slot()
        .ok_or(MotionError::Unassigned { axle: axle.name() })?;
    if axle.power == state {
        return Ok(());
    }
    match state {
        PowerState::Off if !force && axle.must_stay_on() => {
            if verbosity >= 4 && axle.microstep_offset != 0 {
                debug!(axle = axle.name(), "not at a full step so left on");
            }
            return Ok(());
        }
        PowerState::Off => {}
        PowerState::On => axle.microstep_offset = 0,
    }
    driver
        .set_power(slot, state)
        .map_err(|e| MotionError::Hardware(format!("power {}: {:?}", axle.name(), e)))?;
    axle.power = state;
    if verbosity >= 4 {
        debug!(
            axle = axle.name(),
            board = slot.board,
            position = slot.position,
            "turned {}",
            state.as_str()
        );
    }
    Ok(())
}

/// Power every assigned axle.
///
/// `On` without `all` enables the always-on axles and releases the rest;
/// `On` with `all` enables everything. `Off` releases what the power-off
/// rules allow, or everything when `all` is set.
pub fn power_all<D: StepperDriver>(
    registry: &mut AxleRegistry,
    driver: &mut D,
    state: PowerState,
    all: bool,
    verbosity: u8,
) -> Result<(), MotionError> {
    if verbosity >= 5 {
        debug!(all, "powering motors {}", state.as_str());
    }
    driver
        .set_fans(state == PowerState::On)
        .map_err(|e| MotionError::Hardware(format!("fans: {:?}", e)))?;
    let ids: Vec<AxleId> = registry
        .iter()
        .filter(|(_, a)| a.slot().is_some())
        .map(|(id, _)| id)
        .collect();
    for id in ids {
        match state {
            PowerState::Off => power_axle(registry, driver, id, PowerState::Off, all, verbosity)?,
            PowerState::On if all || registry[id].spec().always_on => {
                power_axle(registry, driver, id, PowerState::On, false, verbosity)?
            }
            PowerState::On => power_axle(registry, driver, id, PowerState::Off, false, verbosity)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axle::{AxleSpec, Gearing, MoveKind, Window};
    use crate::convert::MicrostepConverter;
    use crate::hal::Bench;

    fn registry() -> AxleRegistry {
        AxleRegistry::new(&[
            AxleSpec::lifter("l1", "lifter one").at(1, 1),
            AxleSpec::lifter("l2", "lifter two").at(1, 2),
            AxleSpec::rotator("hold", "always on")
                .geared(Gearing::GEARMOTOR)
                .always_on()
                .at(1, 3),
        ])
        .unwrap()
    }

    fn queue(reg: &mut AxleRegistry, motion: &MotionConfig, name: &str, mils: i32, window: Window) {
        let id = reg.find(name).unwrap();
        MicrostepConverter::new(motion)
            .queue(reg, id, MoveKind::Lift, mils, window)
            .unwrap();
    }

    #[test]
    fn empty_queue_is_noop() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let mut bench = Bench::mock();
        let report = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap();
        assert_eq!(report, ExecutionReport::default());
        assert!(bench.board.pulses.is_empty());
    }

    #[test]
    fn steps_all_queued_axles() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let mut bench = Bench::mock();
        queue(&mut reg, &motion, "l1", 100, Window::FULL);
        queue(&mut reg, &motion, "l2", -50, Window::FULL);

        let report = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap();

        assert_eq!(report.steps, 254 + 127);
        assert_eq!(report.axles, 2);
        assert_eq!(bench.board.position(BoardSlot::new(1, 1)), 254);
        assert_eq!(bench.board.position(BoardSlot::new(1, 2)), -127);
        assert_eq!(reg.queued_count(), 0);
        assert_eq!(reg[reg.find("l2").unwrap()].net_steps, -127);
    }

    #[test]
    fn no_steps_before_window_start() {
        let motion = MotionConfig::default().with_timeunit_ms(100);
        let mut reg = registry();
        let mut bench = Bench::mock();
        // about 45ms of ticks, short of the 50ms start
        bench.console.interrupt_after_polls = Some((900, Interrupt::Stop));
        queue(&mut reg, &motion, "l1", 10, Window::DELAYED);

        let err = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap_err();
        assert_eq!(err, MotionError::Aborted { return_home: false });
        assert!(bench.board.pulses.is_empty());
    }

    #[test]
    fn steps_are_spaced_by_min_interval() {
        let motion = MotionConfig::default().with_timeunit_ms(10);
        let mut reg = registry();
        let mut bench = Bench::mock();
        // 254 steps cannot fit 10ms at 175us, so the unit stretches
        queue(&mut reg, &motion, "l1", 100, Window::FULL);

        let report = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap();
        assert_eq!(report.steps, 254);
        assert!(report.elapsed_us > 254 * 175);
    }

    // =========================================================================
    // Multi-Unit Tests
    // =========================================================================

    #[test]
    fn window_past_99_is_split() {
        let motion = MotionConfig::default().with_timeunit_ms(100);
        let mut reg = registry();
        let mut bench = Bench::mock();
        let id = reg.find("l1").unwrap();
        queue(&mut reg, &motion, "l1", 100, Window::new(0, 149).unwrap());
        let needed = reg[id].movement.unwrap().steps_needed;
        assert_eq!(needed, 254);

        let exec = Executor::new(&motion);
        let first = exec.run(&mut reg, &mut bench, motion.timeunit_us()).unwrap();
        // 254 * 100 / 150
        assert_eq!(first.steps, 169);
        let rest = reg[id].movement.unwrap();
        assert_eq!(rest.steps_needed, needed - first.steps);
        assert_eq!(rest.window, Window { start: 0, end: 49 });

        let second = exec.run(&mut reg, &mut bench, motion.timeunit_us()).unwrap();
        assert_eq!(second.steps, needed - first.steps);
        assert_eq!(reg.queued_count(), 0);
        assert_eq!(bench.board.position(BoardSlot::new(1, 1)), 254);
    }

    // =========================================================================
    // Abort Tests
    // =========================================================================

    #[test]
    fn fault_stops_pulses_and_clears_queue() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let mut bench = Bench::mock();
        bench.board.fault_after_steps = Some(20);
        queue(&mut reg, &motion, "l1", 100, Window::FULL);
        queue(&mut reg, &motion, "l2", 100, Window::FULL);

        let err = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap_err();
        assert_eq!(err, MotionError::Fault);
        assert_eq!(bench.board.pulses.len(), 20);
        assert_eq!(reg.queued_count(), 0);
    }

    #[test]
    fn operator_interrupt_aborts() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let mut bench = Bench::mock();
        bench.console.interrupt_after_polls = Some((10, Interrupt::StopAndHome));
        queue(&mut reg, &motion, "l1", 100, Window::FULL);

        let err = Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap_err();
        assert!(err.wants_home());
        assert_eq!(reg.queued_count(), 0);
        assert!(bench.board.pulses.len() < 254);
    }

    // =========================================================================
    // Power Tests
    // =========================================================================

    #[test]
    fn always_on_axles_powered_at_start() {
        let motion = MotionConfig::default();
        let mut reg = registry();
        let mut bench = Bench::mock();
        queue(&mut reg, &motion, "l1", 100, Window::FULL);
        Executor::new(&motion)
            .run(&mut reg, &mut bench, motion.timeunit_us())
            .unwrap();
        let hold = reg.find("hold").unwrap();
        assert_eq!(reg[hold].power, PowerState::On);
        // 254 steps ends off a full step, so l1 stays on
        assert_eq!(reg[reg.find("l1").unwrap()].power, PowerState::On);
        assert_eq!(reg[reg.find("l1").unwrap()].microstep_offset, 2);
    }

    #[test]
    fn power_off_denied_then_forced() {
        let mut reg = registry();
        let mut bench = Bench::mock();
        let id = reg.find("l1").unwrap();
        power_axle(&mut reg, &mut bench, id, PowerState::On, false, 0).unwrap();
        reg[id].temp_on = true;
        power_axle(&mut reg, &mut bench, id, PowerState::Off, false, 0).unwrap();
        assert_eq!(reg[id].power, PowerState::On);
        power_axle(&mut reg, &mut bench, id, PowerState::Off, true, 0).unwrap();
        assert_eq!(reg[id].power, PowerState::Off);
        assert_eq!(bench.board.power(BoardSlot::new(1, 1)), PowerState::Off);
    }

    #[test]
    fn power_on_resets_offset() {
        let mut reg = registry();
        let mut bench = Bench::mock();
        let id = reg.find("l2").unwrap();
        reg[id].microstep_offset = 3;
        power_axle(&mut reg, &mut bench, id, PowerState::On, false, 0).unwrap();
        assert_eq!(reg[id].microstep_offset, 0);
    }

    #[test]
    fn power_all_on_enables_everything() {
        let mut reg = registry();
        let mut bench = Bench::mock();
        power_all(&mut reg, &mut bench, PowerState::On, true, 0).unwrap();
        assert!(reg.iter().all(|(_, a)| a.power == PowerState::On));
        assert!(bench.board.fans);
        power_all(&mut reg, &mut bench, PowerState::Off, false, 0).unwrap();
        assert_eq!(reg[reg.find("hold").unwrap()].power, PowerState::On);
        power_all(&mut reg, &mut bench, PowerState::Off, true, 0).unwrap();
        assert!(reg.iter().all(|(_, a)| a.power == PowerState::Off));
    }
}
