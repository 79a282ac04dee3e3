//! Hardware abstraction traits for stepper drivers, index switches, fault
//! detection, the operator console and time.
//!
//! This module defines the narrow interfaces the motion core consumes from the
//! physical I/O layer, so the scheduler and interpreter run unchanged on the
//! multiplexed motor boards, on a desktop simulation, or against test mocks.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`StepperDriver`] | Step pulses and enable latches for one driver slot |
//! | [`IndexSwitches`] | Single-bit index sensors on digit wheels |
//! | [`FaultSignal`] | Shared driver fault line |
//! | [`OperatorConsole`] | Interrupt keys, calibration keys, report lines |
//! | [`Clock`] | Monotonic microsecond timer with a blocking sleep |
//! | [`Testbed`] | Everything above, bundled |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For the physical boards, use
//! `hal::board` (requires the `hardware` feature).
//!
//! # Example
//!
//! ```rust
//! use rs_engine::traits::{BoardSlot, PowerState, Rotation, StepperDriver};
//! use rs_engine::hal::MockBoard;
//!
//! let mut board = MockBoard::new();
//! let slot = BoardSlot::new(1, 7);
//! board.set_power(slot, PowerState::On).unwrap();
//! board.step(slot, Rotation::Clockwise).unwrap();
//!
//! assert_eq!(board.position(slot), 1);
//! ```

use core::fmt::Debug;

/// Location of one motor driver: board 1..=6 in daisy-chain order,
/// position 1..=16 on that board (both as printed on the silkscreen).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardSlot {
    /// Board number, 1-origin.
    pub board: u8,
    /// Driver position on the board, 1-origin.
    pub position: u8,
}

impl BoardSlot {
    /// Number of daisy-chained boards.
    pub const BOARDS: u8 = 6;
    /// Driver positions per board.
    pub const POSITIONS: u8 = 16;

    /// Create a slot from silkscreen numbering.
    pub const fn new(board: u8, position: u8) -> Self {
        Self { board, position }
    }

    /// Returns true if both numbers are within the physical range.
    pub const fn is_valid(&self) -> bool {
        self.board >= 1
            && self.board <= Self::BOARDS
            && self.position >= 1
            && self.position <= Self::POSITIONS
    }

    /// 0-origin index across all boards.
    pub const fn index(&self) -> usize {
        (self.board as usize - 1) * Self::POSITIONS as usize + (self.position as usize - 1)
    }
}

/// Whether a driver is enabled (holding torque) or released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PowerState {
    /// Driver enabled.
    On,
    /// Driver disabled. The default at startup.
    #[default]
    Off,
}

impl PowerState {
    /// Returns the state as a lowercase string.
    ///
    /// ```
    /// use rs_engine::traits::PowerState;
    ///
    /// assert_eq!(PowerState::On.as_str(), "on");
    /// assert_eq!(PowerState::Off.as_str(), "off");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

/// Direction of one step pulse, as seen from the axle's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Rotation {
    /// Positive distances: clockwise rotation, or upward lift.
    #[default]
    Clockwise,
    /// Negative distances.
    CounterClockwise,
}

impl Rotation {
    /// Direction for a signed step count; zero counts as clockwise.
    #[inline]
    pub const fn from_signed(steps: i64) -> Self {
        if steps < 0 {
            Rotation::CounterClockwise
        } else {
            Rotation::Clockwise
        }
    }

    /// +1 or -1.
    #[inline]
    pub const fn sign(&self) -> i64 {
        match self {
            Rotation::Clockwise => 1,
            Rotation::CounterClockwise => -1,
        }
    }

    /// Short label used in reports.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Rotation::Clockwise => "CW",
            Rotation::CounterClockwise => "CCW",
        }
    }
}

/// Stepper driver trait - one step input and one enable latch per slot.
///
/// # Implementation Notes
///
/// - `step` emits exactly one microstep pulse in the given direction
/// - `set_power` latches the enable state; powering on may reset the
///   driver's microstep phase, which callers account for
/// - Errors are reported through the associated type and surface as
///   [`MotionError::Hardware`](crate::MotionError::Hardware)
pub trait StepperDriver {
    /// Error type for driver operations.
    type Error: Debug;

    /// Enable or disable the driver in `slot`.
    fn set_power(&mut self, slot: BoardSlot, state: PowerState) -> Result<(), Self::Error>;

    /// Emit one microstep pulse.
    fn step(&mut self, slot: BoardSlot, direction: Rotation) -> Result<(), Self::Error>;

    /// Switch the board cooling fans. Boards without fans ignore this.
    fn set_fans(&mut self, _on: bool) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Single-bit index sensors, addressed by switch number 0..=15.
pub trait IndexSwitches {
    /// Returns true while the sensor detects its index element.
    fn switch_engaged(&mut self, switch: u8) -> bool;

    /// Bitmap of all 16 switches, bit n = switch n engaged.
    fn switch_bitmap(&mut self) -> u16 {
        (0..16u8).fold(0u16, |bits, n| {
            bits | ((self.switch_engaged(n) as u16) << n)
        })
    }
}

/// Shared fault line of all motor drivers.
pub trait FaultSignal {
    /// Returns true while any driver reports a fault.
    fn fault_asserted(&mut self) -> bool;
}

/// An operator request to stop motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// Stop immediately and leave everything where it is (ESC).
    Stop,
    /// Stop, then run the `home` script (DEL).
    StopAndHome,
}

/// One key from the operator console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// A printable character.
    Char(char),
    /// Return/Enter.
    Enter,
    /// Escape.
    Escape,
}

/// Operator console: interrupt polling, blocking key reads and report output.
pub trait OperatorConsole {
    /// Non-blocking check for an interrupt key. Consumes it.
    fn poll_interrupt(&mut self) -> Option<Interrupt>;

    /// Block until a key arrives.
    fn wait_key(&mut self) -> Key;

    /// Write one line of user-visible output.
    fn write_line(&mut self, line: &str);
}

/// Monotonic time source with a blocking sleep.
///
/// # Example
///
/// ```rust
/// use rs_engine::traits::Clock;
/// use rs_engine::hal::MockClock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_us(), 0);
///
/// clock.sleep_us(50);
/// assert_eq!(clock.now_us(), 50);
/// ```
pub trait Clock {
    /// Microseconds since an arbitrary epoch. Must be monotonically increasing.
    fn now_us(&self) -> u64;

    /// Busy-wait or sleep for at least `us` microseconds.
    fn sleep_us(&mut self, us: u32);

    /// Milliseconds since the same epoch.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}

/// Everything the interpreter needs from the outside world.
///
/// Implemented automatically for any type providing all the pieces; see
/// [`crate::hal::Bench`] for a composite built from separate parts.
pub trait Testbed: StepperDriver + IndexSwitches + FaultSignal + OperatorConsole + Clock {}

impl<T> Testbed for T where T: StepperDriver + IndexSwitches + FaultSignal + OperatorConsole + Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // BoardSlot Tests
    // =========================================================================

    #[test]
    fn board_slot_validity() {
        assert!(BoardSlot::new(1, 1).is_valid());
        assert!(BoardSlot::new(6, 16).is_valid());
        assert!(!BoardSlot::new(0, 1).is_valid());
        assert!(!BoardSlot::new(7, 1).is_valid());
        assert!(!BoardSlot::new(1, 17).is_valid());
    }

    #[test]
    fn board_slot_index_is_dense() {
        assert_eq!(BoardSlot::new(1, 1).index(), 0);
        assert_eq!(BoardSlot::new(1, 16).index(), 15);
        assert_eq!(BoardSlot::new(2, 1).index(), 16);
        assert_eq!(BoardSlot::new(6, 16).index(), 95);
    }

    // =========================================================================
    // Rotation Tests
    // =========================================================================

    #[test]
    fn rotation_from_signed() {
        assert_eq!(Rotation::from_signed(5), Rotation::Clockwise);
        assert_eq!(Rotation::from_signed(0), Rotation::Clockwise);
        assert_eq!(Rotation::from_signed(-1), Rotation::CounterClockwise);
        assert_eq!(Rotation::Clockwise.sign(), 1);
        assert_eq!(Rotation::CounterClockwise.sign(), -1);
    }

    #[test]
    fn power_state_default_is_off() {
        assert_eq!(PowerState::default(), PowerState::Off);
    }

    // =========================================================================
    // IndexSwitches Default Methods Tests
    // =========================================================================

    struct FixedSwitches(u16);

    impl IndexSwitches for FixedSwitches {
        fn switch_engaged(&mut self, switch: u8) -> bool {
            self.0 & (1 << switch) != 0
        }
    }

    #[test]
    fn switch_bitmap_default_impl() {
        let mut switches = FixedSwitches(0b1000_0000_0000_0101);
        assert_eq!(switches.switch_bitmap(), 0b1000_0000_0000_0101);
    }
}
