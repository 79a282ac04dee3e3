//! A testbed assembled from separate board, console and clock parts.

use crate::traits::{
    BoardSlot, Clock, FaultSignal, IndexSwitches, Interrupt, Key, OperatorConsole, PowerState,
    Rotation, StepperDriver,
};

/// Board I/O, operator console and clock combined into one
/// [`Testbed`](crate::traits::Testbed).
///
/// The parts stay public so tests and the console can inspect or adjust them
/// between commands.
///
/// # Example
///
/// ```rust
/// use rs_engine::hal::{Bench, MockBoard, MockClock, MockConsole};
/// use rs_engine::traits::OperatorConsole;
///
/// let mut bench = Bench::new(MockBoard::new(), MockConsole::new(), MockClock::new());
/// bench.write_line("hello");
/// assert_eq!(bench.console.output, vec!["hello".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct Bench<B, C, T> {
    /// Motor drivers, index switches and fault line.
    pub board: B,
    /// Operator console.
    pub console: C,
    /// Time source.
    pub clock: T,
}

impl<B, C, T> Bench<B, C, T> {
    /// Combine the three parts.
    pub fn new(board: B, console: C, clock: T) -> Self {
        Self {
            board,
            console,
            clock,
        }
    }
}

impl<B: StepperDriver, C, T> StepperDriver for Bench<B, C, T> {
    type Error = B::Error;

    fn set_power(&mut self, slot: BoardSlot, state: PowerState) -> Result<(), Self::Error> {
        self.board.set_power(slot, state)
    }

    fn step(&mut self, slot: BoardSlot, direction: Rotation) -> Result<(), Self::Error> {
        self.board.step(slot, direction)
    }

    fn set_fans(&mut self, on: bool) -> Result<(), Self::Error> {
        self.board.set_fans(on)
    }
}

impl<B: IndexSwitches, C, T> IndexSwitches for Bench<B, C, T> {
    fn switch_engaged(&mut self, switch: u8) -> bool {
        self.board.switch_engaged(switch)
    }

    fn switch_bitmap(&mut self) -> u16 {
        self.board.switch_bitmap()
    }
}

impl<B: FaultSignal, C, T> FaultSignal for Bench<B, C, T> {
    fn fault_asserted(&mut self) -> bool {
        self.board.fault_asserted()
    }
}

impl<B, C: OperatorConsole, T> OperatorConsole for Bench<B, C, T> {
    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        self.console.poll_interrupt()
    }

    fn wait_key(&mut self) -> Key {
        self.console.wait_key()
    }

    fn write_line(&mut self, line: &str) {
        self.console.write_line(line)
    }
}

impl<B, C, T: Clock> Clock for Bench<B, C, T> {
    fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    fn sleep_us(&mut self, us: u32) {
        self.clock.sleep_us(us)
    }
}
