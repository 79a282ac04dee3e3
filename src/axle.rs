//! Axle declarations, runtime state and the registry that owns them.
//!
//! An axle is one controllable degree of freedom: a rotation or a linear lift
//! driven by one stepper motor, possibly through gearing. Axles are declared
//! statically with [`AxleSpec`] and instantiated once into an
//! [`AxleRegistry`]. The registry is owned by the interpreter and lent to
//! the converter, executor and seek routine; there is no global axle table.
//!
//! # Example
//!
//! ```rust
//! use rs_engine::axle::{AxleRegistry, MoveKind};
//!
//! let registry = AxleRegistry::prototype().unwrap();
//! let a2r = registry.find("A2R").unwrap();
//!
//! assert_eq!(registry[a2r].kind(), MoveKind::Rotate);
//! assert_eq!(registry[a2r].spec().index_switch, Some(0));
//! // rotating the A2 fingers also counter-rotates their lifter
//! assert_eq!(registry[a2r].compensator(), registry.find("a2l"));
//! ```

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use crate::error::MotionError;
use crate::traits::{BoardSlot, PowerState, Rotation};

// ============================================================================
// Declarations
// ============================================================================

/// How an axle's physical distance is expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MoveKind {
    /// Signed degrees of output rotation.
    Rotate,
    /// Signed thousandths of an inch along a lead screw.
    Lift,
}

impl MoveKind {
    /// Unit name used in reports.
    pub const fn unit(&self) -> &'static str {
        match self {
            MoveKind::Rotate => "degrees",
            MoveKind::Lift => "mils",
        }
    }
}

/// Cascaded gear reduction: `big` motor-side turns for `small` output turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gearing {
    /// Driven (big) tooth-equivalent.
    pub big: u32,
    /// Driving (small) tooth-equivalent.
    pub small: u32,
}

impl Gearing {
    /// No reduction.
    pub const DIRECT: Gearing = Gearing::new(1, 1);
    /// The "5:1" gearmotor, really 5+2/11.
    pub const GEARMOTOR: Gearing = Gearing::new(57, 11);
    /// 32:16 digit gears in the mill.
    pub const MILL_DIGIT: Gearing = Gearing::new(2, 1);
    /// 50:16 digit gears in the store.
    pub const STORE_DIGIT: Gearing = Gearing::new(25, 8);

    /// Create a gearing from tooth counts.
    pub const fn new(big: u32, small: u32) -> Self {
        Self { big, small }
    }

    /// This gearing in series with `next`.
    pub const fn then(self, next: Gearing) -> Self {
        Self::new(self.big * next.big, self.small * next.small)
    }
}

impl Default for Gearing {
    fn default() -> Self {
        Self::DIRECT
    }
}

/// Static declaration of one axle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxleSpec {
    /// Name used in `rot`/`lift` commands, lowercase.
    pub name: &'static str,
    /// Longer human description.
    pub description: &'static str,
    /// Default movement kind.
    pub kind: MoveKind,
    /// Gear reduction between motor and output.
    pub gearing: Gearing,
    /// Lifter that must be counter-rotated whenever this axle rotates.
    pub compensator: Option<&'static str>,
    /// Index switch observing this axle's wheel.
    pub index_switch: Option<u8>,
    /// Keep the driver enabled between movements.
    pub always_on: bool,
    /// Round movements down to full steps so the driver can be released.
    pub full_steps: bool,
    /// Driver location, if a driver is plugged in.
    pub slot: Option<BoardSlot>,
}

impl AxleSpec {
    const fn new(name: &'static str, description: &'static str, kind: MoveKind) -> Self {
        Self {
            name,
            description,
            kind,
            gearing: Gearing::DIRECT,
            compensator: None,
            index_switch: None,
            always_on: false,
            full_steps: false,
            slot: None,
        }
    }

    /// Declare a rotating axle.
    pub const fn rotator(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, MoveKind::Rotate)
    }

    /// Declare a lifting axle.
    pub const fn lifter(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, MoveKind::Lift)
    }

    /// Set the gearing.
    pub const fn geared(self, gearing: Gearing) -> Self {
        Self { gearing, ..self }
    }

    /// Link a compensating lifter by name.
    pub const fn compensated_by(self, lifter: &'static str) -> Self {
        Self {
            compensator: Some(lifter),
            ..self
        }
    }

    /// Attach an index switch.
    pub const fn with_switch(self, switch: u8) -> Self {
        Self {
            index_switch: Some(switch),
            ..self
        }
    }

    /// Keep the driver powered.
    pub const fn always_on(self) -> Self {
        Self {
            always_on: true,
            ..self
        }
    }

    /// Round to full steps.
    pub const fn full_steps(self) -> Self {
        Self {
            full_steps: true,
            ..self
        }
    }

    /// Assign a driver slot (silkscreen numbering).
    pub const fn at(self, board: u8, position: u8) -> Self {
        Self {
            slot: Some(BoardSlot::new(board, position)),
            ..self
        }
    }
}

/// Switch numbers on the version-2 testbed.
pub mod switches {
    /// A2 digit stack index.
    pub const SW_A2: u8 = 0;
    /// Store column 1 index.
    pub const SW_S1: u8 = 1;
    /// Rack restorer index.
    pub const SW_RR: u8 = 2;
    /// Carriage 2 index.
    pub const SW_F2: u8 = 3;
}

const MILL_ROTATOR: Gearing = Gearing::MILL_DIGIT.then(Gearing::GEARMOTOR);
const STORE_ROTATOR: Gearing = Gearing::STORE_DIGIT.then(Gearing::GEARMOTOR);

/// The version-2 testbed: one digit stack, one carriage, one store column,
/// the rack restorer, long pinions, locks, carry mechanism, sign, counters,
/// rack lock and a test motor.
///
/// Longer names come first so that no name is shadowed by a prefix.
pub static PROTOTYPE: &[AxleSpec] = &[
    AxleSpec::rotator("fp2k", "fixed long pinion 2 lock")
        .geared(Gearing::GEARMOTOR)
        .at(1, 11),
    AxleSpec::rotator("mp2k", "movable long pinion 2 lock")
        .geared(Gearing::GEARMOTOR)
        .at(1, 12),
    AxleSpec::lifter("p21", "movable long pinion 2 connector to A2 lift").at(1, 4),
    AxleSpec::lifter("p22", "fixed long pinion 2 connector to A2 lift").at(1, 16),
    AxleSpec::lifter("fc2", "carriage 2 connector").at(2, 2),
    AxleSpec::lifter("rev2", "carriage 2 reversing pinion").at(2, 1),
    AxleSpec::lifter("mp2", "movable long pinion 2 lift").at(1, 5),
    AxleSpec::lifter("a2k", "A2 lock lift").at(1, 8),
    AxleSpec::lifter("a2l", "A2 finger lift")
        .geared(Gearing::GEARMOTOR)
        .at(1, 6),
    AxleSpec::rotator("a2r", "A2 finger rotate")
        .geared(MILL_ROTATOR)
        .compensated_by("a2l")
        .with_switch(switches::SW_A2)
        .at(1, 7),
    AxleSpec::lifter("f2l", "carriage 2 finger lift").at(2, 3),
    AxleSpec::rotator("f2r", "carriage 2 finger rotate")
        .geared(Gearing::MILL_DIGIT)
        .compensated_by("f2l")
        .with_switch(switches::SW_F2)
        .at(2, 4),
    AxleSpec::rotator("cl2", "carry lifter 2 rotate")
        .geared(Gearing::GEARMOTOR)
        .at(2, 5),
    AxleSpec::rotator("cs2", "carry sector 2 rotate")
        .geared(Gearing::GEARMOTOR)
        .at(2, 6),
    AxleSpec::lifter("cw2l", "carry warning 2 lift")
        .geared(Gearing::GEARMOTOR)
        .at(2, 7),
    AxleSpec::rotator("cw2r", "carry warning 2 rotate (for reset)")
        .geared(MILL_ROTATOR)
        .compensated_by("cw2l")
        .at(2, 8),
    AxleSpec::lifter("csk2l", "carry sector keepers 2 lift").at(2, 15),
    AxleSpec::rotator("csk2r", "carry sector keepers 2 rotation")
        .geared(Gearing::MILL_DIGIT)
        .compensated_by("csk2l")
        .at(2, 10),
    AxleSpec::lifter("s1l", "store stack 1 lift").at(1, 1),
    AxleSpec::rotator("s1r", "store stack 1 rotate")
        .geared(STORE_ROTATOR)
        .compensated_by("s1l")
        .with_switch(switches::SW_S1)
        .at(1, 2),
    AxleSpec::lifter("rrl", "rack restore lift").at(1, 14),
    AxleSpec::rotator("rrr", "rack restore rotate")
        .geared(STORE_ROTATOR)
        .compensated_by("rrl")
        .with_switch(switches::SW_RR)
        .at(1, 15),
    AxleSpec::lifter("rp2", "rack pinion 2 lift").at(1, 3),
    AxleSpec::lifter("signl", "sign lift").at(1, 9),
    AxleSpec::rotator("signr", "sign rotate")
        .geared(Gearing::GEARMOTOR)
        .at(1, 10),
    AxleSpec::lifter("ctr1l", "counter 1 lift").at(2, 11),
    AxleSpec::rotator("ctr1r", "counter 1 rotate")
        .geared(Gearing::GEARMOTOR)
        .at(2, 12),
    AxleSpec::lifter("ctr2l", "counter 2 lift").at(2, 13),
    AxleSpec::rotator("ctr2r", "counter 2 rotate")
        .geared(Gearing::GEARMOTOR)
        .at(2, 14),
    AxleSpec::lifter("rk", "rack lock").full_steps().at(1, 13),
    AxleSpec::rotator("test", "test motor").at(2, 16),
];

// ============================================================================
// Runtime State
// ============================================================================

/// Index of an axle within its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxleId(pub usize);

/// Part of a time unit, in percent. `end` may exceed 99 for a movement that
/// spans into following time units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// First percentage of the unit in which steps may occur, 0..=99.
    pub start: u32,
    /// Last percentage, >= start.
    pub end: u32,
}

impl Window {
    /// The whole time unit.
    pub const FULL: Window = Window { start: 0, end: 99 };
    /// The second half of the time unit (`delay`).
    pub const DELAYED: Window = Window { start: 50, end: 99 };
    /// Latest accepted end percentage.
    pub const MAX_END: u32 = 299;

    /// Create a window, or `None` if the bounds are out of range.
    pub const fn new(start: u32, end: u32) -> Option<Self> {
        if start > 99 || end < start || end > Self::MAX_END {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Returns true if the window reaches into the next time unit.
    pub const fn spans_units(&self) -> bool {
        self.end > 99
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::FULL
    }
}

/// A queued movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Movement {
    /// Direction of every pulse.
    pub direction: Rotation,
    /// Microsteps still owed across all remaining units.
    pub steps_needed: u32,
    /// Where in the current unit the steps go.
    pub window: Window,
}

/// One axle: its declaration plus everything that changes at run time.
#[derive(Clone, Debug)]
pub struct Axle {
    spec: AxleSpec,
    compensator: Option<AxleId>,
    /// Driver enable state as last latched.
    pub power: PowerState,
    /// Held on by a running procedure (seek).
    pub temp_on: bool,
    /// Logical position relative to neutral, in the axle's own units.
    pub position: i32,
    /// Microsteps clockwise of the last full-step position.
    pub microstep_offset: u32,
    /// Fractional microstep deficit, numerator over `1800 * gearing.small`.
    pub deficit: i64,
    /// Net microsteps emitted since startup.
    pub net_steps: i64,
    /// The outstanding movement, if any.
    pub movement: Option<Movement>,
}

impl Axle {
    fn new(spec: AxleSpec, compensator: Option<AxleId>) -> Self {
        Self {
            spec,
            compensator,
            power: PowerState::Off,
            temp_on: false,
            position: 0,
            microstep_offset: 0,
            deficit: 0,
            net_steps: 0,
            movement: None,
        }
    }

    /// The static declaration.
    pub fn spec(&self) -> &AxleSpec {
        &self.spec
    }

    /// Axle name.
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Default movement kind.
    pub fn kind(&self) -> MoveKind {
        self.spec.kind
    }

    /// Resolved compensating lifter.
    pub fn compensator(&self) -> Option<AxleId> {
        self.compensator
    }

    /// Driver slot, if assigned.
    pub fn slot(&self) -> Option<BoardSlot> {
        self.spec.slot
    }

    /// Returns true if a movement is outstanding.
    pub fn is_queued(&self) -> bool {
        self.movement.is_some()
    }

    /// Returns true if the power-off rules would keep this driver enabled.
    pub fn must_stay_on(&self) -> bool {
        self.spec.always_on || self.temp_on || self.microstep_offset != 0
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All axles of one machine.
#[derive(Clone, Debug)]
pub struct AxleRegistry {
    axles: Vec<Axle>,
    scan_order: Vec<AxleId>,
}

impl AxleRegistry {
    /// Build a registry from declarations.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names, zero gear counts, invalid or duplicate board
    /// slots, and compensators that are undeclared or not lifters.
    pub fn new(specs: &[AxleSpec]) -> Result<Self, MotionError> {
        for (i, spec) in specs.iter().enumerate() {
            let earlier = &specs[..i];
            if earlier
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(spec.name))
            {
                return Err(MotionError::Configuration(format!(
                    "duplicate axle name {}",
                    spec.name
                )));
            }
            if spec.gearing.big == 0 || spec.gearing.small == 0 {
                return Err(MotionError::Configuration(format!(
                    "axle {} has zero gearing {}:{}",
                    spec.name, spec.gearing.big, spec.gearing.small
                )));
            }
            if let Some(slot) = spec.slot {
                if !slot.is_valid() {
                    return Err(MotionError::Configuration(format!(
                        "axle {} has invalid slot board {} position {}",
                        spec.name, slot.board, slot.position
                    )));
                }
                if let Some(other) = earlier.iter().find(|other| other.slot == Some(slot)) {
                    return Err(MotionError::Configuration(format!(
                        "axles {} and {} share board {} position {}",
                        other.name, spec.name, slot.board, slot.position
                    )));
                }
            }
        }

        let mut axles = Vec::with_capacity(specs.len());
        for spec in specs {
            let compensator = match spec.compensator {
                None => None,
                Some(name) => {
                    let (index, lifter) = specs
                        .iter()
                        .enumerate()
                        .find(|(_, s)| s.name.eq_ignore_ascii_case(name))
                        .ok_or_else(|| MotionError::UndefinedAxle(name.into()))?;
                    if lifter.kind != MoveKind::Lift {
                        return Err(MotionError::Configuration(format!(
                            "compensator {} of {} is not a lifter",
                            name, spec.name
                        )));
                    }
                    Some(AxleId(index))
                }
            };
            axles.push(Axle::new(*spec, compensator));
        }

        let mut scan_order: Vec<AxleId> = (0..axles.len()).map(AxleId).collect();
        scan_order.sort_by(|a, b| axles[b.0].name().len().cmp(&axles[a.0].name().len()));

        Ok(Self { axles, scan_order })
    }

    /// The version-2 testbed.
    pub fn prototype() -> Result<Self, MotionError> {
        Self::new(PROTOTYPE)
    }

    /// Number of axles.
    pub fn len(&self) -> usize {
        self.axles.len()
    }

    /// Returns true if no axles are declared.
    pub fn is_empty(&self) -> bool {
        self.axles.is_empty()
    }

    /// Axle by id.
    pub fn get(&self, id: AxleId) -> Option<&Axle> {
        self.axles.get(id.0)
    }

    /// Mutable axle by id.
    pub fn get_mut(&mut self, id: AxleId) -> Option<&mut Axle> {
        self.axles.get_mut(id.0)
    }

    /// Exact case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<AxleId> {
        self.axles
            .iter()
            .position(|a| a.name().eq_ignore_ascii_case(name))
            .map(AxleId)
    }

    /// Ids ordered longest name first, for prefix-safe scanning.
    pub fn scan_order(&self) -> &[AxleId] {
        &self.scan_order
    }

    /// All ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = AxleId> {
        (0..self.axles.len()).map(AxleId)
    }

    /// All axles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (AxleId, &Axle)> {
        self.axles.iter().enumerate().map(|(i, a)| (AxleId(i), a))
    }

    /// Number of axles with an outstanding movement.
    pub fn queued_count(&self) -> usize {
        self.axles.iter().filter(|a| a.is_queued()).count()
    }

    /// Ids of axles with an outstanding movement.
    pub fn queued(&self) -> Vec<AxleId> {
        self.iter()
            .filter(|(_, a)| a.is_queued())
            .map(|(id, _)| id)
            .collect()
    }

    /// Cancel every outstanding movement.
    pub fn clear_movements(&mut self) {
        for axle in &mut self.axles {
            axle.movement = None;
        }
    }

    /// Forget logical positions and queued movements without touching hardware.
    pub fn reset(&mut self) {
        for axle in &mut self.axles {
            axle.movement = None;
            axle.position = 0;
        }
    }

    /// One line per assigned axle that is off neutral or powered.
    pub fn state_report(&self) -> Vec<String> {
        self.axles
            .iter()
            .filter(|a| a.slot().is_some())
            .filter(|a| a.position != 0 || a.power == PowerState::On)
            .map(|a| {
                format!(
                    "{} ({}) is at {} and is {}",
                    a.name(),
                    a.spec.description,
                    a.position,
                    a.power.as_str()
                )
            })
            .collect()
    }

    /// One line per assigned axle describing its driver.
    pub fn motors_report(&self) -> Vec<String> {
        self.axles
            .iter()
            .filter_map(|a| a.slot().map(|slot| (a, slot)))
            .map(|(a, slot)| {
                format!(
                    "  {} ({}) is position {} on board {}, {}, step offset {}",
                    a.name(),
                    a.spec.description,
                    slot.position,
                    slot.board,
                    a.power.as_str(),
                    a.microstep_offset
                )
            })
            .collect()
    }
}

impl Index<AxleId> for AxleRegistry {
    type Output = Axle;

    fn index(&self, id: AxleId) -> &Axle {
        &self.axles[id.0]
    }
}

impl IndexMut<AxleId> for AxleRegistry {
    fn index_mut(&mut self, id: AxleId) -> &mut Axle {
        &mut self.axles[id.0]
    }
}
