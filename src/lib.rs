//! # rs-engine
//!
//! Motion scheduler and script interpreter for a stepper-driven mechanical
//! calculating-engine testbed.
//!
//! ## Features
//!
//! - **Hardware abstraction**: Traits for stepper drivers, index switches, the fault line, console and clock
//! - **Exact positioning**: Degrees and mils become microsteps with the rounding error carried forward
//! - **Time units**: Every movement queued on one line runs inside one shared, interleaved time unit
//! - **Functional moves**: `lock A2 top`, `mesh FP2 A2`, `giveoff A2` and friends resolve to axle moves
//! - **Concurrent scripts**: Up to five scripts advance in lockstep, one line per time unit each
//! - **Calibration**: Index-switch seeks and persistent per-axle zero offsets
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and storage abstractions
//! - `axle` - Axle declarations, gearing and runtime state
//! - `convert` - Degree/mil to microstep conversion and movement queuing
//! - `executor` - Interleaved execution of one time unit, power management
//! - `functions` - Functional command tables
//! - `seek` - Index-switch zeroing and interactive calibration
//! - `script` - Script library and parameter substitution
//! - `interpreter` - Command language and concurrent script scheduling
//! - `hal` - Concrete implementations (mock and desktop for testing, pin-level boards for hardware)
//!
//! ## Example
//!
//! ```rust
//! use rs_engine::{
//!     config::{Config, MotionConfig},
//!     hal::{Bench, MemoryStore},
//!     Interpreter,
//! };
//!
//! let config = Config::default().with_motion(MotionConfig::default().with_timeunit_ms(20));
//! let mut engine = Interpreter::new(Bench::mock(), MemoryStore::new(), config).unwrap();
//!
//! // Both movements share one time unit
//! engine.execute("rot a2r 36; lift a2k 100").unwrap();
//!
//! let a2k = engine.registry().find("a2k").unwrap();
//! assert_eq!(engine.registry()[a2k].net_steps, 254);
//! assert_eq!(engine.cycles(), 1);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Axle declarations, the version-2 prototype table and runtime state.
pub mod axle;
/// Persistent per-axle zero offsets.
pub mod calibration;
/// Shared configuration system for desktop and embedded builds.
pub mod config;
/// Degree/mil to microstep conversion.
pub mod convert;
/// Error types for motion and command failures.
pub mod error;
/// Time-unit executor and driver power management.
pub mod executor;
/// Functional command tables (`lock`, `mesh`, `giveoff`, ...).
pub mod functions;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Command interpreter with concurrent script scheduling.
pub mod interpreter;
/// Case-insensitive command scanner.
pub mod parsing;
/// Script library and parameter substitution.
pub mod script;
/// Index-switch seeking and calibration.
pub mod seek;
/// Core traits for hardware abstraction and persistence.
pub mod traits;

// Re-exports for convenience
pub use axle::{Axle, AxleId, AxleRegistry, AxleSpec, Gearing, MoveKind, Movement, Window};
pub use calibration::CalibrationTable;
pub use convert::{Conversion, MicrostepConverter};
pub use error::{CommandError, MotionError};
pub use executor::{ExecutionReport, Executor};
pub use interpreter::Interpreter;
pub use script::{Script, ScriptInstance, ScriptLibrary};
pub use seek::{Seeker, ZeroOutcome};
pub use traits::{
    BoardSlot, CalibrationStore, Clock, FaultSignal, IndexSwitches, Interrupt, Key,
    OperatorConsole, PowerState, Rotation, StepperDriver, Testbed,
};

// Config re-exports
pub use config::{Config, ConsoleConfig, DeviceConfig, MotionConfig};
