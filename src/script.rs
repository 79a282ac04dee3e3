//! Named scripts, the built-in library, and running script instances.
//!
//! A script is a list of lines. Each line is dispatched in one round of the
//! interpreter, so consecutive lines happen in consecutive time units. Lines
//! may invoke other scripts, which then run in lockstep with their callers.
//!
//! `#1` .. `#9` in a line are replaced by the parameters given when the
//! script was started:
//!
//! ```rust
//! use rs_engine::script::{param, substitute, Params};
//!
//! let params: Params = ["1", "top"].iter().map(|p| param(p)).collect();
//!
//! let (line, count) = substitute("mesh S#1 #2 finger; zero S#1 #3", &params);
//! assert_eq!(line, "mesh S1 top finger; zero S1 ");
//! assert_eq!(count, 4);
//! ```

use alloc::string::String;
use alloc::vec::Vec;

/// Scripts that can run in parallel at one nesting level.
pub const MAX_PARALLEL_SCRIPTS: usize = 5;
/// Parameters accepted by one script invocation.
pub const MAX_PARAMS: usize = 5;
/// Longest parameter, in bytes.
pub const MAX_PARAM_LEN: usize = 20;
/// Longest line after substitution, in bytes.
pub const MAX_LINE_LEN: usize = 200;

/// One invocation parameter.
pub type Param = heapless::String<MAX_PARAM_LEN>;
/// The parameters of one invocation.
pub type Params = heapless::Vec<Param, MAX_PARAMS>;

/// A named list of command lines.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Script {
    /// Invocation name, matched case-insensitively.
    pub name: String,
    /// Lines, one per round.
    pub lines: Vec<String>,
}

impl Script {
    /// Build a script from string slices.
    pub fn new(name: &str, lines: &[&str]) -> Self {
        Self {
            name: name.into(),
            lines: lines.iter().map(|l| String::from(*l)).collect(),
        }
    }
}

/// Every script the interpreter knows.
#[derive(Clone, Debug, Default)]
pub struct ScriptLibrary {
    scripts: Vec<Script>,
}

impl ScriptLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// The scripts for the version-2 testbed.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        library.extend(builtin_scripts());
        library
    }

    /// Add a script, replacing any with the same name.
    pub fn add(&mut self, script: Script) {
        match self
            .scripts
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&script.name))
        {
            Some(existing) => *existing = script,
            None => self.scripts.push(script),
        }
    }

    /// Add several scripts.
    pub fn extend(&mut self, scripts: impl IntoIterator<Item = Script>) {
        for script in scripts {
            self.add(script);
        }
    }

    /// Index of the script called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.scripts
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Script by index.
    pub fn get(&self, index: usize) -> Option<&Script> {
        self.scripts.get(index)
    }

    /// Indices ordered longest name first, so `readonly` is tried before `read`.
    pub fn scan_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.scripts.len()).collect();
        order.sort_by(|a, b| self.scripts[*b].name.len().cmp(&self.scripts[*a].name.len()));
        order
    }

    /// All script names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().map(|s| s.name.as_str())
    }

    /// Number of scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns true if the library has no scripts.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// A started script: which one, its next line, and its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptInstance {
    /// Index into the library.
    pub script: usize,
    /// Next line to dispatch.
    pub cursor: usize,
    /// Invocation parameters.
    pub params: Params,
}

impl ScriptInstance {
    /// Start `script` at its first line.
    pub fn new(script: usize, params: Params) -> Self {
        Self {
            script,
            cursor: 0,
            params,
        }
    }

    /// Returns true while lines remain.
    pub fn is_running(&self, library: &ScriptLibrary) -> bool {
        library
            .get(self.script)
            .is_some_and(|s| self.cursor < s.lines.len())
    }

    /// The next line, substituted, advancing the cursor.
    pub fn next_line(&mut self, library: &ScriptLibrary) -> Option<(String, usize)> {
        let line = library.get(self.script)?.lines.get(self.cursor)?;
        self.cursor += 1;
        Some(substitute(line, &self.params))
    }
}

/// Replace `#1`..`#9` with parameters.
///
/// Missing parameters become empty. A `#` not followed by a digit 1-9 is
/// kept. The result is cut at [`MAX_LINE_LEN`] bytes. Returns the expanded
/// line and the number of substitutions.
pub fn substitute(line: &str, params: &[Param]) -> (String, usize) {
    let mut out = String::with_capacity(line.len());
    let mut count = 0;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('#', Some(&d @ '1'..='9')) => {
                chars.next();
                let index = d as usize - '1' as usize;
                if let Some(param) = params.get(index) {
                    out.push_str(param);
                }
                count += 1;
            }
            (c, _) => out.push(c),
        }
    }
    if out.len() > MAX_LINE_LEN {
        let mut cut = MAX_LINE_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    (out, count)
}

/// Build a parameter, cutting it at [`MAX_PARAM_LEN`] bytes.
pub fn param(text: &str) -> Param {
    let mut cut = text.len().min(MAX_PARAM_LEN);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut p = Param::new();
    // fits by construction
    let _ = p.push_str(&text[..cut]);
    p
}

const NINE_GIVEOFFS: usize = 9;

fn repeated(prefix: &[&str], line: &str, times: usize, suffix: &[&str]) -> Vec<String> {
    prefix
        .iter()
        .map(|l| String::from(*l))
        .chain(core::iter::repeat(String::from(line)).take(times))
        .chain(suffix.iter().map(|l| String::from(*l)))
        .collect()
}

fn script(name: &str, lines: Vec<String>) -> Script {
    Script {
        name: name.into(),
        lines,
    }
}

/// The scripts for the version-2 testbed: one digit stack, one carriage,
/// one store column and the rack restorer.
pub fn builtin_scripts() -> Vec<Script> {
    alloc::vec![
        // read s {top|bot} a {top|bot}
        script(
            "read",
            repeated(
                &["mesh S#1 #2 finger; mesh RR top rack; mesh RP#3 A#3 #4; mesh MP#3 A#3 #4; unlock A#3 #4; unlock MP#3; unlock FP#3;"],
                "giveoff S#1",
                NINE_GIVEOFFS,
                &[
                    "unmesh S#1; unmesh RR; unmesh MP#3 A#3; lock MP#3; lock FP#3; lock A#3 delay;",
                    "giveoff S#1; unmesh RP#3;",
                ],
            ),
        ),
        // readonly s {top|bot}; the long pinions are meshed only for drag
        script(
            "readonly",
            repeated(
                &["mesh S#1 #2 finger; mesh RR top rack; mesh RP2 MP2; unlock MP2; unlock FP2;"],
                "giveoff S#1",
                NINE_GIVEOFFS,
                &["unmesh S#1; unmesh RR; unmesh RP2; lock MP2; lock FP2;", "giveoff S#1;"],
            ),
        ),
        // write s {top|bot} a {top|bot}
        script(
            "write",
            repeated(
                &["mesh S#1 #2 rack; mesh RR top rack; mesh RP#3 A#3 #4; mesh MP#3 A#3 #4; finger A#3 #4; unlock A#3 #4; unlock MP#3; unlock FP#3;"],
                "giveoff A#3",
                NINE_GIVEOFFS,
                &[
                    "nofinger A#3; lock A#3; lock MP#3; lock FP#3;",
                    "unmesh S#1; unmesh RR; unmesh MP#3 A#3; giveoff A#3; unmesh RP#3;",
                ],
            ),
        ),
        // restore the rack after writing
        script(
            "restore",
            repeated(&["mesh RR top finger;"], "giveoff RR", NINE_GIVEOFFS, &["unmesh RR", "giveoff RR"]),
        ),
        // reverse restore the rack after reading
        script(
            "revrestore",
            repeated(&["mesh RR top finger;"], "giveoff RR reverse", 10, &["unmesh RR"]),
        ),
        // rewrite s {top|bot}: reverse restore after reading and retain
        script(
            "rewrite",
            repeated(
                &["mesh S#1 #2 rack; mesh RR top finger;"],
                "giveoff RR reverse",
                10,
                &["unmesh S#1; unmesh RR"],
            ),
        ),
        // zeroF n [calibrate]
        Script::new(
            "zeroF",
            &[
                "finger F#1; mesh FC#1;",
                "unlock FP#1; unlock MP#1",
                "zero F#1 #2",
                "unmesh FC#1; lock FP#1; lock MP#1",
                "nofinger F#1; carrywarn F#1 reset",
                "giveoff F#1; carrywarn F#1 return",
            ],
        ),
        // zeroA n {top|bot} [calibrate]
        Script::new(
            "zeroA",
            &[
                "finger A#1 #2; mesh MP#1 A#1 #2;",
                "unlock A#1 #2; unlock MP#1; unlock FP#1",
                "zero A#1 #3",
                "nofinger A#1; unmesh MP#1 A#1",
                "lock A#1; lock MP#1; lock FP#1",
                "giveoff A#1;",
            ],
        ),
        // zeroS n {top|bot} [calibrate]
        Script::new(
            "zeroS",
            &[
                "mesh S#1 #2 finger; mesh RP2 MP2; unlock MP2; unlock FP2;",
                "zero S#1 #3",
                "unmesh RP2;",
                "lock MP2;",
                "lock FP2 delay;",
                "unmesh S#1;",
                "giveoff S#1",
            ],
        ),
        // zeroRR {top|bot} [calibrate]
        Script::new(
            "zeroRR",
            &["mesh RR #1 finger;", "zero RR #2", "unmesh RR", "giveoff RR"],
        ),
        // everything to its neutral position
        Script::new(
            "home",
            &[
                "lock A2; lock FP2; lock MP2; nofinger A2; nofinger F2; unmesh FP2 A2; unmesh MP2 A2; unmesh FC2; unmesh REV2;",
                "unmesh S1; unmesh RR; unmesh RP2; setcarry F2 9; carrywarn F2 down; keepers F2 down;",
            ],
        ),
        // move A2 top to bottom
        script(
            "a2tb",
            repeated(
                &[
                    "finger A2 top; mesh MP2 A2 top; mesh FP2 A2 bot;",
                    "unlock A2; unlock MP2; unlock FP2;",
                ],
                "giveoff A2",
                NINE_GIVEOFFS,
                &[
                    "lock A2 top; lock MP2 delay;",
                    "lock FP2; lock A2 delay; nofinger A2;",
                    "unmesh MP2 A2; unmesh FP2 A2; giveoff A2",
                ],
            ),
        ),
        // move A2 bottom to F2
        script(
            "a2bf2",
            repeated(
                &[
                    "finger A2 bot; mesh FC2; mesh MP2 A2 bot;",
                    "unlock A2 bot; unlock FP2 delay; unlock MP2 delay",
                ],
                "giveoff A2",
                NINE_GIVEOFFS,
                &[
                    "lock A2; lock MP2 delay;",
                    "lock FP2; nofinger A2; unmesh FC2; unmesh MP2 A2;",
                    "giveoff A2",
                ],
            ),
        ),
        // move F2 to A2 top
        script(
            "f2a2t",
            repeated(
                &[
                    "finger F2; mesh FC2; mesh MP2 A2 top;",
                    "unlock FP2; unlock MP2; unlock A2 top;",
                ],
                "giveoff F2",
                NINE_GIVEOFFS,
                &[
                    "lock FP2; lock MP2 delay",
                    "lock A2; nofinger F2;",
                    "unmesh FC2; unmesh MP2 A2; giveoff F2",
                ],
            ),
        ),
        // next Fibonacci number: FIB(n) on A2 top, FIB(n-1) on F2, A2 bot zero
        script(
            "fibone",
            repeated(
                &[
                    "finger A2 top; mesh FC2; mesh MP2 A2 top; mesh FP2 A2 bot; keepers F2 mid;",
                    "unlock FP2; unlock MP2; unlock A2 delay;",
                ],
                "giveoff A2",
                NINE_GIVEOFFS,
                &[
                    "lock A2 top; lock MP2 delay;",
                    "lock FP2; lock A2 delay;",
                    "nofinger A2; unmesh FC2; unmesh MP2 A2; unmesh FP2 A2; carrywarn F2 up;",
                    "giveoff A2; keepers F2 bottom;",
                    "carrywarn F2 down; keepers F2 up;",
                    "carry F2 add",
                    "keepers F2 top; carrywarn F2 reset;",
                    "keepers F2 down; carrywarn F2 return;",
                    "run f2a2t",
                    "run a2bf2;",
                    "bell; pause 1000",
                ],
            ),
        ),
        // the first 19 Fibonacci numbers
        script(
            "fib",
            repeated(
                &[
                    "run zeroA 2 top;",
                    "run zeroA 2 bot; run zeroF 2",
                    "finger A2 top; unlock A2 top delay;",
                    "giveoff A2 reverse;",
                    "nofinger A2; lock A2;",
                    "giveoff A2;",
                ],
                "run fibone",
                19,
                &[],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(list: &[&str]) -> Params {
        list.iter().map(|p| param(p)).collect()
    }

    #[test]
    fn substitute_missing_params_are_empty() {
        let (line, count) = substitute("zero A#1 #3", &params(&["2", "top"]));
        assert_eq!(line, "zero A2 ");
        assert_eq!(count, 2);
    }

    #[test]
    fn substitute_keeps_plain_hash() {
        let (line, count) = substitute("#0 # #x#", &params(&["a"]));
        assert_eq!(line, "#0 # #x#");
        assert_eq!(count, 0);
    }

    #[test]
    fn substitute_truncates() {
        let long = param("abcdefghijklmnopqrst");
        let line = "#1".repeat(20);
        let (out, count) = substitute(&line, &[long]);
        assert_eq!(out.len(), MAX_LINE_LEN);
        assert_eq!(count, 20);
    }

    #[test]
    fn param_is_cut() {
        assert_eq!(param("123456789012345678901234").len(), MAX_PARAM_LEN);
        assert_eq!(param("top").as_str(), "top");
    }

    #[test]
    fn instance_walks_lines() {
        let mut lib = ScriptLibrary::new();
        lib.add(Script::new("two", &["rot #1 1", "rot #1 2"]));
        let mut inst = ScriptInstance::new(0, params(&["a2r"]));
        assert!(inst.is_running(&lib));
        assert_eq!(inst.next_line(&lib), Some(("rot a2r 1".into(), 1)));
        assert_eq!(inst.next_line(&lib), Some(("rot a2r 2".into(), 1)));
        assert!(!inst.is_running(&lib));
        assert_eq!(inst.next_line(&lib), None);
    }

    #[test]
    fn library_replaces_by_name() {
        let mut lib = ScriptLibrary::builtin();
        let count = lib.len();
        lib.add(Script::new("HOME", &["reset"]));
        assert_eq!(lib.len(), count);
        let home = lib.find("home").unwrap();
        assert_eq!(lib.get(home).unwrap().lines, alloc::vec![String::from("reset")]);
    }

    #[test]
    fn scan_order_puts_longer_names_first() {
        let lib = ScriptLibrary::builtin();
        let order = lib.scan_order();
        let pos = |name: &str| order.iter().position(|i| *i == lib.find(name).unwrap()).unwrap();
        assert!(pos("readonly") < pos("read"));
        assert!(pos("fibone") < pos("fib"));
    }

    #[test]
    fn builtin_shapes() {
        let lib = ScriptLibrary::builtin();
        let lines = |name: &str| lib.get(lib.find(name).unwrap()).unwrap().lines.len();
        assert_eq!(lines("read"), 12);
        assert_eq!(lines("revrestore"), 12);
        assert_eq!(lines("home"), 2);
        assert_eq!(lines("fibone"), 22);
        assert_eq!(lines("fib"), 25);
    }
}
