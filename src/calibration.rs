//! Persisted zero offsets for axles with index switches.
//!
//! The record is a fixed format so it fits the boards' EEPROM:
//!
//! ```text
//! offset  size  field
//! 0       8     magic "Babbage\0"
//! 8       3*n   per registry axle: flag u8 (1 = calibrated), degrees i16 LE
//! ```
//!
//! A record with the wrong magic or length reads as "nothing calibrated";
//! losing calibration is never fatal.

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use tracing::{info, warn};

use crate::axle::AxleId;
use crate::error::MotionError;
use crate::traits::CalibrationStore;

/// Leading bytes identifying a calibration record.
pub const MAGIC: &[u8; 8] = b"Babbage\0";

const ENTRY_LEN: usize = 3;

/// Degrees past the index transition to true zero, per axle.
///
/// # Example
///
/// ```rust
/// use rs_engine::axle::AxleId;
/// use rs_engine::calibration::CalibrationTable;
///
/// let mut table = CalibrationTable::new(3);
/// table.set(AxleId(1), -12);
///
/// let bytes = table.encode();
/// assert_eq!(bytes.len(), 8 + 3 * 3);
/// assert_eq!(CalibrationTable::decode(&bytes, 3), table);
/// assert_eq!(table.get(AxleId(0)), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalibrationTable {
    offsets: Vec<Option<i16>>,
}

impl CalibrationTable {
    /// An uncalibrated table for `len` axles.
    pub fn new(len: usize) -> Self {
        Self {
            offsets: vec![None; len],
        }
    }

    /// Number of axle entries.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Stored offset for `id`, if calibrated.
    pub fn get(&self, id: AxleId) -> Option<i16> {
        self.offsets.get(id.0).copied().flatten()
    }

    /// Record an offset. Returns the previous one.
    pub fn set(&mut self, id: AxleId, degrees: i16) -> Option<i16> {
        match self.offsets.get_mut(id.0) {
            Some(slot) => slot.replace(degrees),
            None => None,
        }
    }

    /// Number of calibrated axles.
    pub fn calibrated(&self) -> usize {
        self.offsets.iter().filter(|o| o.is_some()).count()
    }

    /// Serialize to the record format.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MAGIC.len() + ENTRY_LEN * self.offsets.len());
        bytes.extend_from_slice(MAGIC);
        for offset in &self.offsets {
            let (flag, degrees) = match offset {
                Some(d) => (1u8, *d),
                None => (0u8, 0i16),
            };
            bytes.push(flag);
            bytes.extend_from_slice(&degrees.to_le_bytes());
        }
        bytes
    }

    /// Parse a record for `len` axles; malformed input gives an uncalibrated table.
    pub fn decode(bytes: &[u8], len: usize) -> Self {
        if !Self::well_formed(bytes, len) {
            return Self::new(len);
        }
        let offsets = bytes[MAGIC.len()..]
            .chunks_exact(ENTRY_LEN)
            .map(|entry| match entry[0] {
                1 => Some(i16::from_le_bytes([entry[1], entry[2]])),
                _ => None,
            })
            .collect();
        Self { offsets }
    }

    fn well_formed(bytes: &[u8], len: usize) -> bool {
        bytes.len() == MAGIC.len() + ENTRY_LEN * len && bytes.starts_with(MAGIC)
    }

    /// Load from a store, falling back to an uncalibrated table on any problem.
    pub fn load_from<S: CalibrationStore>(store: &mut S, len: usize) -> Self {
        match store.load() {
            Ok(Some(bytes)) if !Self::well_formed(&bytes, len) => {
                warn!(bytes = bytes.len(), "calibration record is malformed, ignored");
                Self::new(len)
            }
            Ok(Some(bytes)) => {
                let table = Self::decode(&bytes, len);
                info!(calibrated = table.calibrated(), "calibration loaded");
                table
            }
            Ok(None) => {
                info!("no calibration record");
                Self::new(len)
            }
            Err(e) => {
                warn!("calibration load failed: {:?}", e);
                Self::new(len)
            }
        }
    }

    /// Write the whole record to a store.
    pub fn save_to<S: CalibrationStore>(&self, store: &mut S) -> Result<(), MotionError> {
        store
            .store(&self.encode())
            .map_err(|e| MotionError::Storage(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MemoryStore;

    #[test]
    fn entries_are_flag_and_le_degrees() {
        let mut table = CalibrationTable::new(2);
        table.set(AxleId(1), -2);
        let bytes = table.encode();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(&bytes[8..], &[0, 0, 0, 1, 0xFE, 0xFF]);
    }

    #[test]
    fn zero_offset_is_calibrated() {
        let mut table = CalibrationTable::new(1);
        table.set(AxleId(0), 0);
        let back = CalibrationTable::decode(&table.encode(), 1);
        assert_eq!(back.get(AxleId(0)), Some(0));
    }

    #[test]
    fn bad_magic_is_uncalibrated() {
        let mut bytes = CalibrationTable::new(2).encode();
        bytes[8] = 1;
        bytes[0] = b'X';
        assert_eq!(CalibrationTable::decode(&bytes, 2).calibrated(), 0);
    }

    #[test]
    fn wrong_length_is_uncalibrated() {
        let mut table = CalibrationTable::new(2);
        table.set(AxleId(0), 7);
        let bytes = table.encode();
        let decoded = CalibrationTable::decode(&bytes, 3);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.calibrated(), 0);
    }

    #[test]
    fn set_returns_previous() {
        let mut table = CalibrationTable::new(2);
        assert_eq!(table.set(AxleId(0), 5), None);
        assert_eq!(table.set(AxleId(0), 9), Some(5));
        assert_eq!(table.set(AxleId(7), 1), None);
        assert_eq!(table.get(AxleId(7)), None);
    }

    #[test]
    fn store_round_trip_and_failures() {
        let mut store = MemoryStore::new();
        assert_eq!(CalibrationTable::load_from(&mut store, 4).calibrated(), 0);

        let mut table = CalibrationTable::new(4);
        table.set(AxleId(3), 355);
        table.save_to(&mut store).unwrap();
        assert_eq!(CalibrationTable::load_from(&mut store, 4), table);

        store.fail = true;
        assert!(matches!(table.save_to(&mut store), Err(MotionError::Storage(_))));
        assert_eq!(CalibrationTable::load_from(&mut store, 4).calibrated(), 0);
    }
}
