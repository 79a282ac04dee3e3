//! Zeroing a digit wheel against its index switch.
//!
//! The only absolute reference an axle has is a single-bit switch that sees
//! one element on its wheel. To find zero:
//!
//! 1. Rotate ten digit positions so the finger is certainly engaged with the
//!    wheel.
//! 2. If the switch is engaged, step forward one degree at a time until it
//!    releases.
//! 3. Step forward one degree at a time until it just engages again.
//! 4. Rotate the stored calibration offset past the transition.
//!
//! The transition is always approached clockwise, so mechanical hysteresis
//! never enters the result. Both single-degree loops give up after the
//! configured retry ceiling.
//!
//! In calibration mode step 4 is replaced by operator nudges from the
//! console, and the accumulated degrees become the new offset.

use alloc::format;
use tracing::info;

use crate::axle::{AxleId, AxleRegistry, MoveKind, Window};
use crate::calibration::CalibrationTable;
use crate::config::MotionConfig;
use crate::convert::MicrostepConverter;
use crate::error::MotionError;
use crate::executor::Executor;
use crate::traits::{Key, Testbed};

/// Result of a successful zeroing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZeroOutcome {
    /// Moved to zero using the stored offset.
    Zeroed {
        /// Offset applied past the transition.
        degrees: i16,
    },
    /// The operator set a new offset.
    Calibrated {
        /// Previous offset, if any.
        old: Option<i16>,
        /// Offset now stored in the table.
        new: i16,
    },
    /// The operator left calibration with Escape; nothing was stored.
    Cancelled,
}

/// Degrees a calibration key nudges the wheel, or `None` for other keys.
///
/// ```
/// use rs_engine::seek::nudge_degrees;
/// use rs_engine::traits::Key;
///
/// assert_eq!(nudge_degrees(Key::Char(' ')), Some(1));
/// assert_eq!(nudge_degrees(Key::Char('7')), Some(7));
/// assert_eq!(nudge_degrees(Key::Char('i')), Some(18));
/// assert_eq!(nudge_degrees(Key::Char('0')), None);
/// ```
pub fn nudge_degrees(key: Key) -> Option<i32> {
    match key {
        Key::Char(' ') => Some(1),
        Key::Char(c @ '1'..='9') => Some(c as i32 - '0' as i32),
        Key::Char(c @ 'a'..='z') => Some(c as i32 - 'a' as i32 + 10),
        _ => None,
    }
}

/// Runs the switch-seek procedure.
#[derive(Clone, Copy, Debug)]
pub struct Seeker<'a> {
    motion: &'a MotionConfig,
}

impl<'a> Seeker<'a> {
    /// Create a seeker using the given motion constants.
    pub fn new(motion: &'a MotionConfig) -> Self {
        Self { motion }
    }

    /// Zero `rotator`, or calibrate it when `calibrate` is set.
    ///
    /// The rotator and its compensating lifter are held powered for the whole
    /// procedure and released on every exit path. On success the rotator's
    /// logical position becomes 0. A calibration result is written to `table`;
    /// persisting it is the caller's job.
    ///
    /// # Errors
    ///
    /// [`MotionError::NoIndexSwitch`], [`MotionError::SwitchAlwaysOn`],
    /// [`MotionError::SwitchAlwaysOff`], [`MotionError::NotCalibrated`], and
    /// anything the executor reports.
    pub fn zero<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        table: &mut CalibrationTable,
        rotator: AxleId,
        calibrate: bool,
    ) -> Result<ZeroOutcome, MotionError> {
        let axle = &registry[rotator];
        let switch = axle
            .spec()
            .index_switch
            .ok_or(MotionError::NoIndexSwitch { axle: axle.name() })?;
        let lifter = axle.compensator();

        hold(registry, rotator, lifter, true);
        let result = self.seek(registry, hw, rotator, switch).and_then(|()| {
            if calibrate {
                self.calibrate(registry, hw, table, rotator)
            } else {
                self.apply_offset(registry, hw, table, rotator)
            }
        });
        hold(registry, rotator, lifter, false);

        if matches!(result, Ok(ZeroOutcome::Zeroed { .. } | ZeroOutcome::Calibrated { .. })) {
            registry[rotator].position = 0;
        }
        result
    }

    fn seek<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        rotator: AxleId,
        switch: u8,
    ) -> Result<(), MotionError> {
        let name = registry[rotator].name();
        let verbose = self.motion.verbosity >= 1;

        if verbose {
            info!(axle = name, "rotating {} 10 digits", name);
        }
        self.turn(
            registry,
            hw,
            rotator,
            self.motion.degrees_per_digit() * 10,
            self.motion.timeunit_us().saturating_mul(10),
        )?;

        if hw.switch_engaged(switch) {
            if verbose {
                info!(axle = name, "getting {} off the switch", name);
            }
            self.step_until(registry, hw, rotator, switch, false)
                .map_err(|e| e.unwrap_or(MotionError::SwitchAlwaysOn { axle: name }))?;
        }

        if verbose {
            info!(axle = name, "rotating {} to the switch position", name);
        }
        self.step_until(registry, hw, rotator, switch, true)
            .map_err(|e| e.unwrap_or(MotionError::SwitchAlwaysOff { axle: name }))
    }

    /// Single-degree steps until the switch reads `engaged`. `Err(None)` when
    /// the retry ceiling is hit.
    fn step_until<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        rotator: AxleId,
        switch: u8,
        engaged: bool,
    ) -> Result<(), Option<MotionError>> {
        for _ in 1..self.motion.seek_retry_limit {
            if hw.switch_engaged(switch) == engaged {
                return Ok(());
            }
            self.turn(registry, hw, rotator, 1, self.motion.degree_time_us())
                .map_err(Some)?;
        }
        if hw.switch_engaged(switch) == engaged {
            Ok(())
        } else {
            Err(None)
        }
    }

    fn calibrate<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        table: &mut CalibrationTable,
        rotator: AxleId,
    ) -> Result<ZeroOutcome, MotionError> {
        hw.write_line(
            "hit space, 1-9, or a-z until wheel is at zero and aligned, then hit Enter; ESC aborts",
        );
        let mut degrees: i32 = 0;
        loop {
            match hw.wait_key() {
                Key::Escape => return Ok(ZeroOutcome::Cancelled),
                Key::Enter => break,
                key => {
                    let Some(delta) = nudge_degrees(key) else {
                        continue;
                    };
                    let duration = self.motion.degree_time_us().saturating_mul(delta as u32);
                    self.turn(registry, hw, rotator, delta, duration)?;
                    hw.sleep_us(self.motion.debounce_ms.saturating_mul(1000));
                    degrees += delta;
                }
            }
        }

        let new = degrees.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let old = table.set(rotator, new);
        let name = registry[rotator].name();
        hw.write_line(&format!(
            "axle {} zero changed from {} to {} degrees past the switch",
            name,
            old.map_or(-1, i32::from),
            new
        ));
        info!(axle = name, degrees = new, "calibrated");
        Ok(ZeroOutcome::Calibrated { old, new })
    }

    fn apply_offset<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        table: &CalibrationTable,
        rotator: AxleId,
    ) -> Result<ZeroOutcome, MotionError> {
        let name = registry[rotator].name();
        let degrees = table
            .get(rotator)
            .ok_or(MotionError::NotCalibrated { axle: name })?;
        if degrees != 0 {
            if self.motion.verbosity >= 1 {
                info!(axle = name, degrees, "rotating {} {} degrees to zero", name, degrees);
            }
            let duration = self
                .motion
                .degree_time_us()
                .saturating_mul(degrees.unsigned_abs() as u32);
            self.turn(registry, hw, rotator, degrees as i32, duration)?;
        }
        Ok(ZeroOutcome::Zeroed { degrees })
    }

    fn turn<H: Testbed>(
        &self,
        registry: &mut AxleRegistry,
        hw: &mut H,
        rotator: AxleId,
        degrees: i32,
        duration_us: u32,
    ) -> Result<(), MotionError> {
        MicrostepConverter::new(self.motion).queue(
            registry,
            rotator,
            MoveKind::Rotate,
            degrees,
            Window::FULL,
        )?;
        Executor::new(self.motion).run(registry, hw, duration_us)?;
        Ok(())
    }
}

fn hold(registry: &mut AxleRegistry, rotator: AxleId, lifter: Option<AxleId>, on: bool) {
    registry[rotator].temp_on = on;
    if let Some(lifter) = lifter {
        registry[lifter].temp_on = on;
    }
}
