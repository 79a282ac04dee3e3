//! Trait definitions for hardware abstraction and persistence.
//!
//! This module defines the seams that allow rs-engine to:
//! - Run on different hardware (multiplexed motor boards, desktop simulation)
//! - Be tested deterministically with mocks
//! - Persist calibration values wherever the platform keeps them
//!
//! # Submodules
//!
//! - `hardware`: stepper drivers, index switches, fault line, console, clock
//! - `storage`: calibration record persistence
//!
//! # Hardware Abstraction
//!
//! The motion core only ever talks to:
//!
//! - [`StepperDriver`]: step pulses and enable latches
//! - [`IndexSwitches`]: single-bit index sensors
//! - [`FaultSignal`]: the shared driver fault line
//! - [`OperatorConsole`]: interrupt keys and report output
//! - [`Clock`]: a monotonic microsecond timer
//!
//! [`Testbed`] bundles all five.

pub mod hardware;
pub mod storage;

pub use hardware::*;
pub use storage::*;
