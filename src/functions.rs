//! Data-driven functional movements.
//!
//! Scripts rarely name motors directly. They say what should happen
//! mechanically: `lock A2 top`, `mesh FP2 A2 bot`, `keepers F2 up`. Each verb
//! owns a table mapping keyword sequences to one axle and a target. Most
//! targets are absolute logical positions, so repeating a command is
//! harmless and the interpreter reports "already there".
//!
//! Tables cover the full engine design. Entries that name axles the loaded
//! registry does not declare fail with [`MotionError::UndefinedAxle`] when
//! used, which is how a partial testbed reports missing mechanism.
//!
//! Every functional command takes an optional timing suffix:
//!
//! | Suffix | Window |
//! |--------|--------|
//! | (none) | whole time unit, 0..=99 |
//! | `delay` | second half, 50..=99 |
//! | `time <s> <e>` | `s` in 0..=99, `e` in 1..=299 and `e >= s` |

use crate::axle::{AxleId, AxleRegistry, MoveKind, Window};
use crate::convert::MicrostepConverter;
use crate::error::{CommandError, MotionError};
use crate::parsing::Scanner;

/// What a table entry does to its axle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Move to this logical position (degrees or mils from neutral).
    Position(i32),
    /// Move by this distance.
    Distance(i32),
}

/// One keyword sequence of a functional verb.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionEntry {
    /// Keywords following the verb, blank separated.
    pub keywords: &'static str,
    /// Axle moved.
    pub axle: &'static str,
    /// Where it goes.
    pub target: Target,
}

/// What applying an entry did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// A movement was queued.
    Queued {
        /// Axle moved.
        axle: AxleId,
        /// Signed distance queued.
        distance: i32,
    },
    /// The axle is already at the target position.
    AlreadyThere(&'static str),
}

impl FunctionEntry {
    const fn to(keywords: &'static str, axle: &'static str, position: i32) -> Self {
        Self {
            keywords,
            axle,
            target: Target::Position(position),
        }
    }

    const fn by(keywords: &'static str, axle: &'static str, distance: i32) -> Self {
        Self {
            keywords,
            axle,
            target: Target::Distance(distance),
        }
    }

    /// Queue this entry's movement in `window`.
    ///
    /// A position target records the new logical position once queued.
    pub fn apply(
        &self,
        registry: &mut AxleRegistry,
        converter: &MicrostepConverter<'_>,
        window: Window,
    ) -> Result<Applied, MotionError> {
        let id = registry
            .find(self.axle)
            .ok_or_else(|| MotionError::UndefinedAxle(self.axle.into()))?;
        let kind = registry[id].kind();
        let distance = match self.target {
            Target::Distance(d) => d,
            Target::Position(p) => {
                let distance = p - registry[id].position;
                if distance == 0 {
                    return Ok(Applied::AlreadyThere(registry[id].name()));
                }
                distance
            }
        };
        converter.queue(registry, id, kind, distance, window)?;
        if let Target::Position(p) = self.target {
            registry[id].position = p;
        }
        Ok(Applied::Queued { axle: id, distance })
    }
}

/// All entries of one verb.
#[derive(Clone, Copy, Debug)]
pub struct FunctionTable {
    /// Command keyword.
    pub verb: &'static str,
    /// Entries, most specific first.
    pub entries: &'static [FunctionEntry],
}

impl FunctionTable {
    /// Find the first entry whose keywords match at the scanner.
    pub fn scan(&self, scan: &mut Scanner<'_>) -> Option<&'static FunctionEntry> {
        let entries: &'static [FunctionEntry] = self.entries;
        entries.iter().find(|e| scan.key(e.keywords))
    }

    /// Look up an entry by its exact keywords.
    pub fn entry(&self, keywords: &str) -> Option<&'static FunctionEntry> {
        let entries: &'static [FunctionEntry] = self.entries;
        entries
            .iter()
            .find(|e| e.keywords.eq_ignore_ascii_case(keywords))
    }
}

/// Scan an optional timing suffix.
///
/// ```
/// use rs_engine::axle::Window;
/// use rs_engine::functions::scan_window;
/// use rs_engine::parsing::Scanner;
///
/// assert_eq!(scan_window(&mut Scanner::new("")).unwrap(), Window::FULL);
/// assert_eq!(scan_window(&mut Scanner::new("delay")).unwrap(), Window::DELAYED);
/// assert_eq!(
///     scan_window(&mut Scanner::new("time 0 149")).unwrap(),
///     Window { start: 0, end: 149 }
/// );
/// assert!(scan_window(&mut Scanner::new("time 80 20")).is_err());
/// ```
pub fn scan_window(scan: &mut Scanner<'_>) -> Result<Window, CommandError> {
    if scan.key("delay") {
        return Ok(Window::DELAYED);
    }
    if !scan.key("time ") {
        return Ok(Window::FULL);
    }
    let start = scan.int(0, 99);
    let end = scan.int(1, Window::MAX_END as i64);
    match (start, end) {
        (Some(s), Some(e)) => {
            Window::new(s as u32, e as u32).ok_or_else(|| CommandError::parse("bad times", scan.rest()))
        }
        _ => Err(CommandError::parse("bad times", scan.rest())),
    }
}

/// Scan `<entry> [timing]` for `table` and queue the movement.
pub fn run_function(
    table: &FunctionTable,
    scan: &mut Scanner<'_>,
    registry: &mut AxleRegistry,
    converter: &MicrostepConverter<'_>,
) -> Result<Applied, CommandError> {
    let entry = table
        .scan(scan)
        .ok_or_else(|| CommandError::parse("unknown axle and keywords", scan.rest()))?;
    let window = scan_window(scan)?;
    Ok(entry.apply(registry, converter, window)?)
}

/// Rotate a digit wheel by one digit position, or back with `reverse`.
pub fn run_giveoff(
    scan: &mut Scanner<'_>,
    registry: &mut AxleRegistry,
    converter: &MicrostepConverter<'_>,
    degrees_per_digit: i32,
) -> Result<AxleId, CommandError> {
    let (_, rotator) = GIVEOFF
        .iter()
        .find(|(keyword, _)| scan.key(keyword))
        .ok_or_else(|| CommandError::parse("unknown axle", scan.rest()))?;
    let id = registry
        .find(rotator)
        .ok_or_else(|| MotionError::UndefinedAxle((*rotator).into()))?;
    let distance = if scan.key("reverse") {
        -degrees_per_digit
    } else {
        degrees_per_digit
    };
    let window = scan_window(scan)?;
    converter.queue(registry, id, MoveKind::Rotate, distance, window)?;
    Ok(id)
}

/// Resolve the wheel keyword of a `zero` command to its rotator.
pub fn scan_zero_wheel(
    scan: &mut Scanner<'_>,
    registry: &AxleRegistry,
) -> Result<AxleId, CommandError> {
    let (_, rotator) = ZERO
        .iter()
        .find(|(keyword, _)| scan.key(keyword))
        .ok_or_else(|| CommandError::parse("unknown axle and keywords", scan.rest()))?;
    registry
        .find(rotator)
        .ok_or_else(|| MotionError::UndefinedAxle((*rotator).into()).into())
}

/// Find the table for a verb at the scanner.
pub fn scan_verb(scan: &mut Scanner<'_>) -> Option<&'static FunctionTable> {
    FUNCTIONS.iter().find(|t| scan.key(t.verb))
}

// ============================================================================
// Tables
// ============================================================================

use FunctionEntry as E;

/// Store wheel lift that engages only the rack, for writing.
const STORE_RACK: i32 = 270;
/// Store wheel lift that engages both rack and finger, for reading.
const STORE_FINGER: i32 = 525;
/// Rack pinion heights.
const RP_TOP: i32 = 1220;
const RP_BOT: i32 = 370;
/// Backlash, and carry wheels are smaller.
const EXTRA_DEGREES_FOR_CARRY: i32 = 5;
const DIGIT: i32 = 18;

static LOCK: &[FunctionEntry] = &[
    E::to("A1 top", "a1k", -300),
    E::to("A1 bot", "a1k", 300),
    E::to("A1", "a1k", 0),
    E::to("A2 top", "a2k", -300),
    E::to("A2 bot", "a2k", 300),
    E::to("A2", "a2k", 0),
    E::to("A3 top", "a3k", -300),
    E::to("A3 bot", "a3k", 300),
    E::to("A3", "a3k", 0),
    E::to("FP1", "fp1k", 0),
    E::to("MP1", "mp1k", 0),
    E::to("FP2", "fp2k", 0),
    E::to("MP2", "mp2k", 0),
    E::to("FP3", "fp3k", 0),
    E::to("MP3", "mp3k", 0),
];

static LOCK1: &[FunctionEntry] = &[
    E::to("FP1", "fp1k", 30),
    E::to("MP1", "mp1k", 30),
    E::to("FP2", "fp2k", 30),
    E::to("MP2", "mp2k", 30),
    E::to("FP3", "fp3k", 30),
    E::to("MP3", "mp3k", 30),
];

static UNLOCK: &[FunctionEntry] = &[
    E::to("A1 top", "a1k", 300),
    E::to("A1 bot", "a1k", -300),
    E::to("A1", "a1k", 550),
    E::to("A2 top", "a2k", 300),
    E::to("A2 bot", "a2k", -300),
    E::to("A2", "a2k", 550),
    E::to("A3 top", "a3k", 300),
    E::to("A3 bot", "a3k", -300),
    E::to("A3", "a3k", 550),
    E::to("FP1", "fp1k", 15),
    E::to("MP1", "mp1k", 15),
    E::to("FP2", "fp2k", 15),
    E::to("MP2", "mp2k", 15),
    E::to("FP3", "fp3k", 15),
    E::to("MP3", "mp3k", 15),
];

static MESH: &[FunctionEntry] = &[
    E::to("FP1 A1 top", "p12", 400),
    E::to("FP1 A1 bot", "p12", -400),
    E::to("MP1 A1 top", "p11", 400),
    E::to("MP1 A1 bot", "p11", -400),
    E::to("FP1 A2 top", "p14", 400),
    E::to("FP1 A2 bot", "p14", -400),
    E::to("MP1 A2 top", "p13", 400),
    E::to("MP1 A2 bot", "p13", -400),
    E::to("FP2 A2 top", "p22", 400),
    E::to("FP2 A2 bot", "p22", -400),
    E::to("MP2 A2 top", "p21", 400),
    E::to("MP2 A2 bot", "p21", -400),
    E::to("FP2 A3 top", "p24", 400),
    E::to("FP2 A3 bot", "p24", -400),
    E::to("MP2 A3 top", "p23", 400),
    E::to("MP2 A3 bot", "p23", -400),
    E::to("FP3 A3 top", "p32", 400),
    E::to("FP3 A3 bot", "p32", -400),
    E::to("MP3 A3 top", "p31", 400),
    E::to("MP3 A3 bot", "p31", -400),
    E::to("RP1 A1 top", "rp1", RP_TOP),
    E::to("RP1 A1 bot", "rp1", RP_BOT),
    E::to("RP1 MP1", "rp1", (RP_TOP + RP_BOT) / 2),
    E::to("RP2 A2 top", "rp2", RP_TOP),
    E::to("RP2 A2 bot", "rp2", RP_BOT),
    E::to("RP2 MP2", "rp2", (RP_TOP + RP_BOT) / 2),
    E::to("REV2", "rev2", 400),
    E::to("FC2", "fc2", 400),
    E::to("REV3", "rev3", 400),
    E::to("FC3", "fc3", 400),
    E::to("S1 top rack", "s1l", -STORE_RACK),
    E::to("S1 bot rack", "s1l", STORE_RACK),
    E::to("S1 top finger", "s1l", -STORE_FINGER),
    E::to("S1 bot finger", "s1l", STORE_FINGER),
    E::to("S2 top rack", "s2l", -STORE_RACK),
    E::to("S2 bot rack", "s2l", STORE_RACK),
    E::to("S2 top finger", "s2l", -STORE_FINGER),
    E::to("S2 bot finger", "s2l", STORE_FINGER),
    E::to("RR top rack", "rrl", -STORE_RACK),
    E::to("RR bot rack", "rrl", STORE_RACK),
    E::to("RR top finger", "rrl", -STORE_FINGER),
    E::to("RR bot finger", "rrl", STORE_FINGER),
];

static UNMESH: &[FunctionEntry] = &[
    E::to("FP1 A1", "p12", 0),
    E::to("MP1 A1", "p11", 0),
    E::to("FP1 A2", "p14", 0),
    E::to("MP1 A2", "p13", 0),
    E::to("FP2 A2", "p22", 0),
    E::to("MP2 A2", "p21", 0),
    E::to("FP2 A3", "p24", 0),
    E::to("MP2 A3", "p23", 0),
    E::to("FP3 A3", "p32", 0),
    E::to("MP3 A3", "p31", 0),
    E::to("S1", "s1l", 0),
    E::to("S2", "s2l", 0),
    E::to("RR", "rrl", 0),
    E::to("RP1", "rp1", 0),
    E::to("RP2", "rp2", 0),
    E::to("RP3", "rp3", 0),
    E::to("REV2", "rev2", 0),
    E::to("FC2", "fc2", 0),
    E::to("REV3", "rev3", 0),
    E::to("FC3", "fc3", 0),
];

static FINGER: &[FunctionEntry] = &[
    E::to("F2", "f2l", -275),
    E::to("F3", "f3l", -275),
    E::to("A1 top", "a1l", 275),
    E::to("A1 bot", "a1l", -275),
    E::to("A2 top", "a2l", 275),
    E::to("A2 bot", "a2l", -275),
    E::to("A3 top", "a3l", 275),
    E::to("A3 bot", "a3l", -275),
];

static NOFINGER: &[FunctionEntry] = &[
    E::to("F2", "f2l", 0),
    E::to("F3", "f3l", 0),
    E::to("A1", "a1l", 0),
    E::to("A2", "a2l", 0),
    E::to("A3", "a3l", 0),
    E::to("RR", "rrl", 0),
];

static SHIFT: &[FunctionEntry] = &[
    E::to("MP1 up", "mp1", 500),
    E::to("MP1 down", "mp1", 0),
    E::to("MP2 up", "mp2", 500),
    E::to("MP2 down", "mp2", 0),
    E::to("MP3 up", "mp3", 500),
    E::to("MP3 down", "mp3", 0),
];

static SETCARRY: &[FunctionEntry] = &[
    E::to("F2 0", "cl2", 41),
    E::to("F2 9", "cl2", 0),
    E::to("F3 0", "cl3", 41),
    E::to("F3 9", "cl3", 0),
];

static CARRYWARN: &[FunctionEntry] = &[
    // .4 + .05 slop from warning lever to lifter
    E::to("F2 up", "cw2l", 450),
    E::to("F2 down", "cw2l", 0),
    E::to("F2 reset", "cw2r", 20),
    E::to("F2 return", "cw2r", 0),
    E::to("F3 up", "cw3l", 450),
    E::to("F3 down", "cw3l", 0),
    E::to("F3 reset", "cw3r", 20),
    E::to("F3 return", "cw3r", 0),
];

static CARRY: &[FunctionEntry] = &[
    E::to("F2 add", "cs2", -(DIGIT + EXTRA_DEGREES_FOR_CARRY)),
    E::to("F2 sub", "cs2", EXTRA_DEGREES_FOR_CARRY),
    E::to("F2 home", "cs2", 0),
    E::to("F3 add", "cs3", -(DIGIT + EXTRA_DEGREES_FOR_CARRY)),
    E::to("F3 sub", "cs3", EXTRA_DEGREES_FOR_CARRY),
    E::to("F3 home", "cs3", 0),
];

static KEEPERS: &[FunctionEntry] = &[
    E::to("F2 top", "csk2r", 0),
    E::to("F2 bottom", "csk2r", 90),
    E::to("F2 up", "csk2l", 500),
    E::to("F2 mid", "csk2l", 450),
    E::to("F2 down", "csk2l", 0),
    E::to("F3 top", "csk3r", 0),
    E::to("F3 bottom", "csk3r", 90),
    E::to("F3 up", "csk3l", 500),
    E::to("F3 mid", "csk3l", 450),
    E::to("F3 down", "csk3l", 0),
];

static TEST: &[FunctionEntry] = &[E::by("left", "test", -90), E::by("right", "test", 90)];

/// Every table-driven verb, in scan order.
pub static FUNCTIONS: &[FunctionTable] = &[
    FunctionTable { verb: "lock1", entries: LOCK1 },
    FunctionTable { verb: "lock", entries: LOCK },
    FunctionTable { verb: "unlock", entries: UNLOCK },
    FunctionTable { verb: "mesh", entries: MESH },
    FunctionTable { verb: "unmesh", entries: UNMESH },
    FunctionTable { verb: "finger", entries: FINGER },
    FunctionTable { verb: "nofinger", entries: NOFINGER },
    FunctionTable { verb: "shift", entries: SHIFT },
    FunctionTable { verb: "setcarry", entries: SETCARRY },
    FunctionTable { verb: "carrywarn", entries: CARRYWARN },
    FunctionTable { verb: "carry", entries: CARRY },
    FunctionTable { verb: "keepers", entries: KEEPERS },
    FunctionTable { verb: "test", entries: TEST },
];

/// Digit wheels that can give off one digit, with their rotators.
pub static GIVEOFF: &[(&str, &str)] = &[
    ("A1", "a1r"),
    ("A2", "a2r"),
    ("A3", "a3r"),
    ("F2", "f2r"),
    ("F3", "f3r"),
    ("S1", "s1r"),
    ("S2", "s2r"),
    ("RR", "rrr"),
];

/// Digit wheels that can be zeroed, with the rotators carrying their switches.
pub static ZERO: &[(&str, &str)] = &[
    ("F2", "f2r"),
    ("F3", "f3r"),
    ("A1", "a1r"),
    ("A2", "a2r"),
    ("A3", "a3r"),
    ("S1", "s1r"),
    ("S2", "s2r"),
    ("RR", "rrr"),
];
