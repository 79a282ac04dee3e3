//! Multiplexed stepper boards driven through embedded-hal pins.
//!
//! Each of the six boards carries sixteen drivers behind a 4-bit
//! multiplexer. A board is addressed by pulling two select lines low at the
//! same time, one from a group of two and one from a group of three, so
//! six boards need only five select lines.
//!
//! Control logic:
//! - MUX A..D: bits 1, 2, 4, 8 of the driver position (0..15)
//! - STEP/ENB: high routes the select strobe to the step input, low to the
//!   enable latch
//! - ENABLE: level latched on an enable strobe (low = powered)
//! - DIR: shared direction line (high = clockwise)
//! - SWITCH: index switch selected by the mux, low while engaged
//! - FAULT: wired-or driver fault, low while any driver faults

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin, PinState};
use tracing::warn;

use crate::traits::{BoardSlot, FaultSignal, IndexSwitches, PowerState, Rotation, StepperDriver};

/// Select lines for boards 1..=6: (group-of-two index, group-of-three index).
const BOARD_SELECT: [(usize, usize); 6] = [(0, 0), (1, 1), (0, 2), (1, 0), (0, 1), (1, 2)];

/// Errors from the board interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardError {
    /// A GPIO operation failed.
    Pin(ErrorKind),
    /// The slot does not name a physical driver.
    InvalidSlot(BoardSlot),
}

/// GPIO lines of the board interface.
///
/// All outputs share one pin type and both inputs another, which is how
/// most HALs expose type-erased pins.
#[derive(Debug)]
pub struct BoardPins<O, I> {
    /// Select lines 2A and 2B.
    pub group2: [O; 2],
    /// Select lines 3A, 3B and 3C.
    pub group3: [O; 3],
    /// Multiplexer address lines A, B, C, D.
    pub mux: [O; 4],
    /// Routes the select strobe to step (high) or enable (low).
    pub step_not_enable: O,
    /// Enable level latched by an enable strobe.
    pub enable: O,
    /// Step direction for every driver.
    pub direction: O,
    /// Cooling fans.
    pub fans: O,
    /// Index switch read through the multiplexer (pulled up).
    pub switch: I,
    /// Driver fault line (pulled up).
    pub fault: I,
}

/// The six daisy-chained motor boards.
///
/// # Hardware Setup
///
/// Reference wiring on the controller:
/// - pins 7, 8 → select 2A, 2B
/// - pins 3, 4, 5 → select 3A, 3B, 3C
/// - pins 17, 16, 15, 14 → MUX A, B, C, D
/// - pin 19 → STEP/ENB, pin 22 → ENABLE, pin 21 → DIR, pin 11 → FAN
/// - pin 23 ← SWITCH, pin 20 ← FAULT
///
/// # Example
///
/// ```ignore
/// use rs_engine::hal::{BoardPins, MotorBoards};
///
/// let pins = BoardPins { group2, group3, mux, step_not_enable, enable,
///                        direction, fans, switch, fault };
/// let mut boards = MotorBoards::new(pins, delay)?;
/// boards.step(BoardSlot::new(1, 8), Rotation::Clockwise)?;
/// ```
pub struct MotorBoards<O, I, D> {
    pins: BoardPins<O, I>,
    delay: D,
}

impl<O, I, D> MotorBoards<O, I, D>
where
    O: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    /// Setup time between changing levels and strobing a select, in microseconds.
    const SETUP_US: u32 = 1;

    /// Width of a step strobe, in microseconds.
    const STEP_PULSE_US: u32 = 3;

    /// Settling time for the switch multiplexer, in microseconds.
    const SWITCH_SETTLE_US: u32 = 3;

    /// Takes the pins, drives every output high and releases every driver.
    ///
    /// # Errors
    ///
    /// Returns an error if any pin operation fails.
    pub fn new(pins: BoardPins<O, I>, delay: D) -> Result<Self, BoardError> {
        let mut boards = Self { pins, delay };
        boards.idle_outputs()?;
        for board in 1..=BoardSlot::BOARDS {
            for position in 1..=BoardSlot::POSITIONS {
                boards.set_power(BoardSlot::new(board, position), PowerState::Off)?;
            }
        }
        Ok(boards)
    }

    /// Give the pins back.
    pub fn release(self) -> (BoardPins<O, I>, D) {
        (self.pins, self.delay)
    }

    fn idle_outputs(&mut self) -> Result<(), BoardError> {
        let p = &mut self.pins;
        for pin in p.group2.iter_mut().chain(p.group3.iter_mut()).chain(p.mux.iter_mut()) {
            pin.set_high().map_err(pin_error)?;
        }
        p.step_not_enable.set_high().map_err(pin_error)?;
        p.enable.set_high().map_err(pin_error)?;
        p.direction.set_high().map_err(pin_error)?;
        p.fans.set_high().map_err(pin_error)?;
        Ok(())
    }

    fn select_mux(&mut self, position: u8) -> Result<(), BoardError> {
        let index = position.wrapping_sub(1);
        for (bit, pin) in self.pins.mux.iter_mut().enumerate() {
            pin.set_state(PinState::from(index & (1 << bit) != 0))
                .map_err(pin_error)?;
        }
        Ok(())
    }

    /// Pull both select lines of `board` low for `width_us`, then release them.
    fn strobe(&mut self, board: u8, width_us: u32) -> Result<(), BoardError> {
        let (two, three) = BOARD_SELECT[usize::from(board - 1)];
        self.pins.group2[two].set_low().map_err(pin_error)?;
        self.pins.group3[three].set_low().map_err(pin_error)?;
        self.delay.delay_us(width_us);
        self.pins.group2[two].set_high().map_err(pin_error)?;
        self.pins.group3[three].set_high().map_err(pin_error)?;
        Ok(())
    }

    fn checked(slot: BoardSlot) -> Result<BoardSlot, BoardError> {
        if slot.is_valid() {
            Ok(slot)
        } else {
            Err(BoardError::InvalidSlot(slot))
        }
    }
}

fn pin_error<E: embedded_hal::digital::Error>(e: E) -> BoardError {
    BoardError::Pin(e.kind())
}

impl<O, I, D> StepperDriver for MotorBoards<O, I, D>
where
    O: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    type Error = BoardError;

    fn set_power(&mut self, slot: BoardSlot, state: PowerState) -> Result<(), BoardError> {
        let slot = Self::checked(slot)?;
        self.select_mux(slot.position)?;
        self.pins.step_not_enable.set_low().map_err(pin_error)?;
        self.pins
            .enable
            .set_state(PinState::from(state == PowerState::Off))
            .map_err(pin_error)?;
        self.delay.delay_us(Self::SETUP_US);
        self.strobe(slot.board, Self::SETUP_US)
    }

    fn step(&mut self, slot: BoardSlot, direction: Rotation) -> Result<(), BoardError> {
        let slot = Self::checked(slot)?;
        self.pins
            .direction
            .set_state(PinState::from(direction == Rotation::Clockwise))
            .map_err(pin_error)?;
        self.select_mux(slot.position)?;
        self.pins.step_not_enable.set_high().map_err(pin_error)?;
        self.delay.delay_us(Self::SETUP_US);
        self.strobe(slot.board, Self::STEP_PULSE_US)
    }

    fn set_fans(&mut self, on: bool) -> Result<(), BoardError> {
        self.pins.fans.set_state(PinState::from(on)).map_err(pin_error)
    }
}

impl<O, I, D> IndexSwitches for MotorBoards<O, I, D>
where
    O: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    fn switch_engaged(&mut self, switch: u8) -> bool {
        if switch >= BoardSlot::POSITIONS {
            return false;
        }
        if let Err(e) = self.select_mux(switch + 1) {
            warn!(switch, error = ?e, "Switch select failed");
            return false;
        }
        self.delay.delay_us(Self::SWITCH_SETTLE_US);
        match self.pins.switch.is_low() {
            Ok(engaged) => engaged,
            Err(e) => {
                warn!(switch, error = ?e.kind(), "Switch read failed");
                false
            }
        }
    }
}

impl<O, I, D> FaultSignal for MotorBoards<O, I, D>
where
    O: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    fn fault_asserted(&mut self) -> bool {
        // an unreadable fault line counts as a fault
        self.pins.fault.is_low().unwrap_or(true)
    }
}
