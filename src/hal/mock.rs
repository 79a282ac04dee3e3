//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and storage traits,
//! enabling development and testing on desktop without the motor boards.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBoard`] | [`StepperDriver`], [`IndexSwitches`], [`FaultSignal`] | Records pulses, simulates index wheels and faults |
//! | [`MockConsole`] | [`OperatorConsole`] | Scripted keys and interrupts, captured output |
//! | [`MockClock`] | [`Clock`] | Time that only moves when slept |
//! | [`MemoryStore`] | [`CalibrationStore`] | In-memory calibration record |
//!
//! [`Bench::mock`] bundles the first three into one [`Testbed`].
//!
//! # Example
//!
//! ```rust
//! use rs_engine::hal::Bench;
//! use rs_engine::traits::{BoardSlot, Rotation, StepperDriver};
//!
//! let mut bench = Bench::mock();
//! let slot = BoardSlot::new(2, 4);
//! bench.step(slot, Rotation::CounterClockwise).unwrap();
//!
//! assert_eq!(bench.board.position(slot), -1);
//! assert_eq!(bench.board.pulses, vec![(slot, Rotation::CounterClockwise)]);
//! ```
//!
//! [`StepperDriver`]: crate::traits::StepperDriver
//! [`IndexSwitches`]: crate::traits::IndexSwitches
//! [`FaultSignal`]: crate::traits::FaultSignal
//! [`OperatorConsole`]: crate::traits::OperatorConsole
//! [`Clock`]: crate::traits::Clock
//! [`CalibrationStore`]: crate::traits::CalibrationStore
//! [`Testbed`]: crate::traits::Testbed

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::axle::{AxleRegistry, Gearing};
use crate::config::MotionConfig;
use crate::hal::Bench;
use crate::traits::{
    BoardSlot, CalibrationStore, Clock, FaultSignal, IndexSwitches, Interrupt, Key,
    OperatorConsole, PowerState, Rotation, StepperDriver,
};

const SIMULATED_START_DEG: i64 = 20;
const SIMULATED_SPAN_DEG: i64 = 4;

const SLOTS: usize = BoardSlot::BOARDS as usize * BoardSlot::POSITIONS as usize;

// ============================================================================
// Hardware Mocks
// ============================================================================

/// A digit wheel carrying the element an index switch detects.
///
/// The wheel angle follows the net microsteps of the driver in `slot`
/// through `gearing`. The switch is engaged while the angle, reduced to
/// `0..360`, lies in `[0, span_deg)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexWheel {
    /// Switch number reporting this wheel.
    pub switch: u8,
    /// Driver turning the wheel.
    pub slot: BoardSlot,
    /// Motor-to-wheel gearing.
    pub gearing: Gearing,
    /// Microsteps per motor rotation.
    pub usteps_per_rev: u32,
    /// Wheel angle at net position zero, in degrees.
    pub start_deg: i64,
    /// Angular width of the detected element, in degrees.
    pub span_deg: i64,
}

impl IndexWheel {
    /// Wheel angle for a net microstep position, to the nearest whole degree.
    pub fn angle_deg(&self, position: i64) -> i64 {
        let num = position * 360 * self.gearing.small as i64;
        let den = (self.usteps_per_rev as i64 * self.gearing.big as i64).max(1);
        (self.start_deg + (num + den / 2).div_euclid(den)).rem_euclid(360)
    }

    /// Returns true if the switch would be engaged at `position`.
    pub fn engaged_at(&self, position: i64) -> bool {
        self.angle_deg(position) < self.span_deg
    }
}

/// Mock motor boards for testing.
///
/// Records every pulse and power change, tracks the net position and enable
/// state of all 96 driver slots, and simulates index switches either as
/// fixed bits or as [`IndexWheel`]s that follow the pulses.
///
/// # Example
///
/// ```rust
/// use rs_engine::axle::Gearing;
/// use rs_engine::hal::MockBoard;
/// use rs_engine::traits::{BoardSlot, IndexSwitches, Rotation, StepperDriver};
///
/// let slot = BoardSlot::new(1, 7);
/// let mut board = MockBoard::new();
/// // switch 0 sees the first 10 degrees of a direct-drive wheel
/// board.add_index_wheel(0, slot, Gearing::DIRECT, 800, 0, 10);
/// assert!(board.switch_engaged(0));
///
/// for _ in 0..40 {
///     board.step(slot, Rotation::Clockwise).unwrap();
/// }
/// assert!(!board.switch_engaged(0)); // 18 degrees
/// ```
#[derive(Debug)]
pub struct MockBoard {
    /// Every pulse in emission order.
    pub pulses: Vec<(BoardSlot, Rotation)>,
    /// Every power latch change in order.
    pub power_changes: Vec<(BoardSlot, PowerState)>,
    /// Current fan state.
    pub fans: bool,
    /// Force the fault line on.
    pub fault: bool,
    /// Assert the fault line once this many pulses have been emitted.
    pub fault_after_steps: Option<usize>,
    /// Switch bits that read engaged regardless of wheels.
    pub forced_switches: u16,
    /// Simulated index wheels.
    pub wheels: Vec<IndexWheel>,
    /// Make every driver operation fail.
    pub fail: bool,
    positions: Vec<i64>,
    power: Vec<PowerState>,
}

impl MockBoard {
    /// Creates a board set with every driver off and at position zero.
    pub fn new() -> Self {
        Self {
            pulses: Vec::new(),
            power_changes: Vec::new(),
            fans: false,
            fault: false,
            fault_after_steps: None,
            forced_switches: 0,
            wheels: Vec::new(),
            fail: false,
            positions: vec![0; SLOTS],
            power: vec![PowerState::Off; SLOTS],
        }
    }

    /// Attach a simulated index wheel to `switch`.
    pub fn add_index_wheel(
        &mut self,
        switch: u8,
        slot: BoardSlot,
        gearing: Gearing,
        usteps_per_rev: u32,
        start_deg: i64,
        span_deg: i64,
    ) {
        self.wheels.push(IndexWheel {
            switch,
            slot,
            gearing,
            usteps_per_rev,
            start_deg,
            span_deg,
        });
    }

    /// A board set with an index wheel behind every switch the registry names.
    ///
    /// Each wheel starts a little past its switch so a `zero` has to go
    /// around to find it.
    pub fn simulating(registry: &AxleRegistry, motion: &MotionConfig) -> Self {
        let mut board = Self::new();
        for (_, axle) in registry.iter() {
            let spec = axle.spec();
            if let (Some(switch), Some(slot)) = (spec.index_switch, spec.slot) {
                board.add_index_wheel(
                    switch,
                    slot,
                    spec.gearing,
                    motion.microsteps_per_rotation(),
                    SIMULATED_START_DEG,
                    SIMULATED_SPAN_DEG,
                );
            }
        }
        board
    }

    /// Net microsteps emitted to `slot`, clockwise positive.
    pub fn position(&self, slot: BoardSlot) -> i64 {
        self.positions.get(slot.index()).copied().unwrap_or(0)
    }

    /// Latched enable state of `slot`.
    pub fn power(&self, slot: BoardSlot) -> PowerState {
        self.power.get(slot.index()).copied().unwrap_or_default()
    }

    /// Pulses emitted to `slot`.
    pub fn pulses_for(&self, slot: BoardSlot) -> impl Iterator<Item = Rotation> + '_ {
        self.pulses
            .iter()
            .filter(move |(s, _)| *s == slot)
            .map(|(_, r)| *r)
    }

    /// Forget recorded pulses and power changes, keeping positions.
    pub fn clear_log(&mut self) {
        self.pulses.clear();
        self.power_changes.clear();
    }

    fn check(&self, slot: BoardSlot) -> Result<usize, ()> {
        if self.fail || !slot.is_valid() {
            return Err(());
        }
        Ok(slot.index())
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StepperDriver for MockBoard {
    type Error = ();

    fn set_power(&mut self, slot: BoardSlot, state: PowerState) -> Result<(), ()> {
        let index = self.check(slot)?;
        self.power[index] = state;
        self.power_changes.push((slot, state));
        Ok(())
    }

    fn step(&mut self, slot: BoardSlot, direction: Rotation) -> Result<(), ()> {
        let index = self.check(slot)?;
        self.positions[index] += direction.sign();
        self.pulses.push((slot, direction));
        Ok(())
    }

    fn set_fans(&mut self, on: bool) -> Result<(), ()> {
        self.fans = on;
        Ok(())
    }
}

impl IndexSwitches for MockBoard {
    fn switch_engaged(&mut self, switch: u8) -> bool {
        if switch < 16 && self.forced_switches & (1 << switch) != 0 {
            return true;
        }
        self.wheels
            .iter()
            .filter(|w| w.switch == switch)
            .any(|w| w.engaged_at(self.position(w.slot)))
    }
}

impl FaultSignal for MockBoard {
    fn fault_asserted(&mut self) -> bool {
        self.fault
            || self
                .fault_after_steps
                .is_some_and(|limit| self.pulses.len() >= limit)
    }
}

// ============================================================================
// Console Mock
// ============================================================================

/// Mock operator console for testing.
///
/// Keys are handed out in order; an empty queue reads as Escape so a test
/// can never hang in a key wait. An interrupt can be scheduled for a given
/// poll count.
///
/// # Example
///
/// ```rust
/// use rs_engine::hal::MockConsole;
/// use rs_engine::traits::{Interrupt, Key, OperatorConsole};
///
/// let mut console = MockConsole::new().with_keys("5\n");
/// assert_eq!(console.wait_key(), Key::Char('5'));
/// assert_eq!(console.wait_key(), Key::Enter);
/// assert_eq!(console.wait_key(), Key::Escape);
///
/// console.interrupt_after_polls = Some((2, Interrupt::Stop));
/// assert_eq!(console.poll_interrupt(), None);
/// assert_eq!(console.poll_interrupt(), Some(Interrupt::Stop));
/// assert_eq!(console.poll_interrupt(), None); // delivered once
/// ```
#[derive(Debug, Default)]
pub struct MockConsole {
    /// Keys returned by `wait_key`.
    pub keys: VecDeque<Key>,
    /// Deliver this interrupt on the given poll (1-origin).
    pub interrupt_after_polls: Option<(usize, Interrupt)>,
    /// Number of interrupt polls so far.
    pub polls: usize,
    /// Lines written.
    pub output: Vec<String>,
}

impl MockConsole {
    /// Creates a console with no keys and no interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keys from text: `\n` is Enter, `\x1b` is Escape.
    pub fn with_keys(mut self, keys: &str) -> Self {
        self.push_keys(keys);
        self
    }

    /// Append keys from text.
    pub fn push_keys(&mut self, keys: &str) {
        self.keys.extend(keys.chars().map(|c| match c {
            '\n' | '\r' => Key::Enter,
            '\x1b' => Key::Escape,
            other => Key::Char(other),
        }));
    }

    /// Returns true if any output line contains `text`.
    pub fn printed(&self, text: &str) -> bool {
        self.output.iter().any(|line| line.contains(text))
    }
}

impl OperatorConsole for MockConsole {
    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        self.polls += 1;
        match self.interrupt_after_polls {
            Some((after, interrupt)) if self.polls >= after => {
                self.interrupt_after_polls = None;
                Some(interrupt)
            }
            _ => None,
        }
    }

    fn wait_key(&mut self) -> Key {
        self.keys.pop_front().unwrap_or(Key::Escape)
    }

    fn write_line(&mut self, line: &str) {
        self.output.push(line.into());
    }
}

// ============================================================================
// Time Mock
// ============================================================================

/// Mock clock for testing.
///
/// Time only advances through `sleep_us` or the explicit setters, so
/// executor runs are instant and exactly repeatable.
///
/// # Example
///
/// ```rust
/// use rs_engine::hal::MockClock;
/// use rs_engine::traits::Clock;
///
/// let mut clock = MockClock::new();
/// clock.set(1_000);
/// clock.advance(500);
/// assert_eq!(clock.now_us(), 1_500);
///
/// clock.sleep_us(2_000);
/// assert_eq!(clock.now_ms(), 3);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_us: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in microseconds.
    pub fn set(&mut self, us: u64) {
        self.current_us = us;
    }

    /// Advances the clock by the given number of microseconds.
    pub fn advance(&mut self, us: u64) {
        self.current_us += us;
    }
}

impl Clock for MockClock {
    fn now_us(&self) -> u64 {
        self.current_us
    }

    fn sleep_us(&mut self, us: u32) {
        self.current_us += us as u64;
    }
}

// ============================================================================
// Storage Mock
// ============================================================================

/// In-memory calibration store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// The stored record, if any.
    pub record: Option<Vec<u8>>,
    /// Make every operation fail.
    pub fail: bool,
    /// Number of successful stores.
    pub writes: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `record`.
    pub fn with_record(record: Vec<u8>) -> Self {
        Self {
            record: Some(record),
            ..Self::default()
        }
    }
}

impl CalibrationStore for MemoryStore {
    type Error = ();

    fn load(&mut self) -> Result<Option<Vec<u8>>, ()> {
        if self.fail {
            return Err(());
        }
        Ok(self.record.clone())
    }

    fn store(&mut self, record: &[u8]) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.record = Some(record.to_vec());
        self.writes += 1;
        Ok(())
    }
}

impl Bench<MockBoard, MockConsole, MockClock> {
    /// A fully simulated testbed with fresh mocks.
    pub fn mock() -> Self {
        Bench::new(MockBoard::new(), MockConsole::new(), MockClock::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_tracks_position_and_power() {
        let mut board = MockBoard::new();
        let slot = BoardSlot::new(3, 9);
        board.set_power(slot, PowerState::On).unwrap();
        board.step(slot, Rotation::Clockwise).unwrap();
        board.step(slot, Rotation::Clockwise).unwrap();
        board.step(slot, Rotation::CounterClockwise).unwrap();
        assert_eq!(board.position(slot), 1);
        assert_eq!(board.power(slot), PowerState::On);
        assert_eq!(board.pulses_for(slot).count(), 3);
    }

    #[test]
    fn board_rejects_invalid_slot() {
        let mut board = MockBoard::new();
        assert!(board.step(BoardSlot::new(0, 1), Rotation::Clockwise).is_err());
        assert!(board.set_power(BoardSlot::new(1, 17), PowerState::On).is_err());
    }

    #[test]
    fn fault_after_steps_trips() {
        let mut board = MockBoard::new();
        board.fault_after_steps = Some(2);
        let slot = BoardSlot::new(1, 1);
        assert!(!board.fault_asserted());
        board.step(slot, Rotation::Clockwise).unwrap();
        board.step(slot, Rotation::Clockwise).unwrap();
        assert!(board.fault_asserted());
    }

    #[test]
    fn index_wheel_follows_gearing() {
        // 114:11 wheel, 800 usteps per motor turn: one wheel degree is about 23 usteps
        let wheel = IndexWheel {
            switch: 0,
            slot: BoardSlot::new(1, 7),
            gearing: Gearing::new(114, 11),
            usteps_per_rev: 800,
            start_deg: 350,
            span_deg: 5,
        };
        assert!(!wheel.engaged_at(0));
        assert_eq!(wheel.angle_deg(-230), 340);
        assert!(wheel.engaged_at(10 * 800 * 114 / (360 * 11) + 1));
    }

    #[test]
    fn forced_switch_bits() {
        let mut board = MockBoard::new();
        board.forced_switches = 0b1010;
        assert!(board.switch_engaged(1));
        assert!(!board.switch_engaged(2));
        assert_eq!(board.switch_bitmap(), 0b1010);
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load(), Ok(None));
        store.store(&[1, 2, 3]).unwrap();
        assert_eq!(store.load(), Ok(Some(vec![1, 2, 3])));
        assert_eq!(store.writes, 1);
        store.fail = true;
        assert!(store.load().is_err());
    }

    #[test]
    fn simulated_board_has_a_wheel_per_switch() {
        let registry = AxleRegistry::prototype().unwrap();
        let mut board = MockBoard::simulating(&registry, &MotionConfig::default());
        assert_eq!(board.wheels.len(), 4);
        // every wheel starts off its switch
        assert_eq!(board.switch_bitmap(), 0);
    }
}
