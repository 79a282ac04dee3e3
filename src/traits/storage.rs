//! Non-volatile storage for the calibration record.
//!
//! The record itself is encoded by [`crate::calibration::CalibrationTable`];
//! stores only move opaque bytes. On the controller boards this is EEPROM, on
//! desktop a file (see `hal::desktop::FileStore`), in tests
//! [`crate::hal::MemoryStore`].

use alloc::vec::Vec;
use core::fmt::Debug;

/// Byte-level persistence for one fixed-format record.
pub trait CalibrationStore {
    /// Error type for storage operations.
    type Error: Debug;

    /// Read the stored record. `Ok(None)` if nothing was ever written.
    fn load(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Replace the stored record.
    fn store(&mut self, record: &[u8]) -> Result<(), Self::Error>;
}
