//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] for various platforms.
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations and the simulated board
//! - `bench`: Composite testbed built from a board, a console and a clock
//! - `desktop`: stdin/stdout console, wall clock and file store (requires `std` feature)
//! - `board`: Multiplexed motor boards over embedded-hal pins (requires `hardware` feature)

pub mod bench;
pub mod mock;

#[cfg(feature = "std")]
pub mod desktop;

#[cfg(feature = "hardware")]
pub mod board;

pub use bench::Bench;
pub use mock::*;

#[cfg(feature = "std")]
pub use desktop::*;

#[cfg(feature = "hardware")]
pub use board::*;
