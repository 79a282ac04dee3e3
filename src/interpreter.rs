//! The command interpreter: parses lines and runs scripts in lockstep.
//!
//! A line holds commands separated by `;`. Primitive and functional
//! commands queue movements immediately; script invocations register
//! running instances. The instances of one line then advance together: each
//! round dispatches one line of every instance that still has lines, and a
//! time unit executes whatever those lines queued. A dispatched line may
//! start scripts of its own, which run to completion before the round
//! continues.
//!
//! Nesting is an explicit stack of frames rather than recursion. A frame
//! triggers a time unit after a round only while some of its instances
//! still have lines. When its last lines have been dispatched the frame is
//! popped, and their movements are executed by the parent's next time unit.
//! The outermost frame always executes leftover movements once at the end.
//!
//! Any error clears all queued movements and abandons the rest of the
//! line, including every running script. The error stays recorded until the
//! next top-level command.
//!
//! # Example
//!
//! ```rust
//! use rs_engine::config::{Config, MotionConfig};
//! use rs_engine::hal::{Bench, MemoryStore};
//! use rs_engine::interpreter::Interpreter;
//! use rs_engine::script::Script;
//!
//! let config = Config::default().with_motion(MotionConfig::default().with_timeunit_ms(20));
//! let mut interp = Interpreter::new(Bench::mock(), MemoryStore::new(), config).unwrap();
//!
//! interp.library_mut().add(Script::new("wiggle", &["rot test #1", "rot test -#1"]));
//! interp.execute("run wiggle 90; lift a2k 100").unwrap();
//!
//! assert_eq!(interp.cycles(), 2);
//! assert_eq!(interp.registry().queued_count(), 0);
//! ```

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use tracing::{debug, info, warn};

use crate::axle::{AxleId, AxleRegistry, MoveKind, Window};
use crate::calibration::CalibrationTable;
use crate::config::{Config, MAX_TIMEUNIT_MS, MIN_TIMEUNIT_MS};
use crate::convert::MicrostepConverter;
use crate::error::{CommandError, MotionError};
use crate::executor::{power_all, power_axle, ExecutionReport, Executor};
use crate::functions::{self, Applied};
use crate::parsing::Scanner;
use crate::script::{param, Params, ScriptInstance, ScriptLibrary, MAX_PARALLEL_SCRIPTS, MAX_PARAMS};
use crate::seek::{Seeker, ZeroOutcome};
use crate::traits::{CalibrationStore, Key, PowerState, Testbed};

/// Highest `debug` level.
pub const MAX_VERBOSITY: u8 = 6;

const BELL: &str = "\x07";

const HELP: &[&str] = &[
    "commands, separated by ';', all done in the same time unit:",
    "  rot <axle> <degrees>               rotate an axle",
    "  lift <axle> <mils>                 lift an axle",
    "  lock|lock1|unlock|mesh|unmesh|finger|nofinger|shift <mechanism> [delay | time <start> <end>]",
    "  setcarry|carrywarn|carry|keepers <mechanism> [delay | time <start> <end>]",
    "  giveoff <wheel> [reverse]          turn a wheel by one digit",
    "  zero <wheel> [calibrate]           find the zero position of a wheel",
    "  calibrate <axle> <degrees>         set the zero offset past the switch",
    "  [run|step] <script> [params]       start a script",
    "  repeat [count] <commands>          repeat the rest of the line",
    "  pause [msec]                       finish movements, then wait",
    "  timeunit [msec], debug [level], on|off [<axle>|all]",
    "  home, reset, state, motors, switches, bell, help",
];

/// Scripts started on one line, advanced together.
#[derive(Debug)]
struct Frame {
    level: usize,
    instances: heapless::Vec<ScriptInstance, MAX_PARALLEL_SCRIPTS>,
    next: usize,
}

impl Frame {
    fn new(level: usize) -> Self {
        Self {
            level,
            instances: heapless::Vec::new(),
            next: 0,
        }
    }

    /// Next line of this round, or `None` once every instance has had its turn.
    fn dispatch(&mut self, library: &ScriptLibrary) -> Option<(String, usize, usize)> {
        while self.next < self.instances.len() {
            let instance = &mut self.instances[self.next];
            self.next += 1;
            if let Some((line, count)) = instance.next_line(library) {
                return Some((line, count, instance.script));
            }
        }
        self.next = 0;
        None
    }

    fn is_running(&self, library: &ScriptLibrary) -> bool {
        self.instances.iter().any(|i| i.is_running(library))
    }
}

/// Owns the machine state and runs command text against a testbed.
///
/// # Type Parameters
///
/// - `H`: the testbed ([`Testbed`]): motor drivers, switches, fault line,
///   operator console and clock
/// - `S`: where calibration is persisted ([`CalibrationStore`])
pub struct Interpreter<H: Testbed, S: CalibrationStore> {
    hw: H,
    store: S,
    config: Config,
    registry: AxleRegistry,
    calibration: CalibrationTable,
    library: ScriptLibrary,
    step_mode: bool,
    cycle: u64,
    last_error: Option<CommandError>,
}

impl<H: Testbed, S: CalibrationStore> Interpreter<H, S> {
    /// Create an interpreter for the version-2 testbed with the built-in scripts.
    pub fn new(hw: H, store: S, config: Config) -> Result<Self, MotionError> {
        Ok(Self::with_registry(hw, store, config, AxleRegistry::prototype()?))
    }

    /// Create an interpreter for another machine.
    ///
    /// Calibration is loaded from `store`; a missing or malformed record
    /// leaves every axle uncalibrated.
    pub fn with_registry(hw: H, mut store: S, config: Config, registry: AxleRegistry) -> Self {
        let calibration = CalibrationTable::load_from(&mut store, registry.len());
        info!(
            device = config.device.name.as_str(),
            axles = registry.len(),
            "interpreter ready"
        );
        Self {
            hw,
            store,
            config,
            registry,
            calibration,
            library: ScriptLibrary::builtin(),
            step_mode: false,
            cycle: 0,
            last_error: None,
        }
    }

    /// Execute one top-level command line.
    ///
    /// On failure every queued movement is cleared and the error is reported
    /// on the console. An operator "stop and home" runs the `home` script
    /// before returning the original error.
    pub fn execute(&mut self, text: &str) -> Result<(), CommandError> {
        self.last_error = None;
        let result = self.run_text(text, 1);
        if let Err(e) = &result {
            self.fail(e);
            if e.motion().is_some_and(MotionError::wants_home) {
                info!("returning to neutral");
                if let Err(home) = self.run_text("run home", 1) {
                    self.fail(&home);
                }
            }
            self.last_error = Some(e.clone());
        }
        result
    }

    fn fail(&mut self, e: &CommandError) {
        self.registry.clear_movements();
        warn!(error = %e, "command failed");
        // aborts were already announced by whoever saw them
        if !matches!(e.motion(), Some(MotionError::Aborted { .. })) {
            self.hw.write_line(&e.to_string());
        }
    }

    // ========================================================================
    // Lockstep Execution
    // ========================================================================

    fn run_text(&mut self, text: &str, level: usize) -> Result<(), CommandError> {
        let mut stack: Vec<Frame> = Vec::new();
        stack.push(self.parse_line(text, level)?);
        loop {
            let Some(frame) = stack.last_mut() else {
                return Ok(());
            };
            let level = frame.level;
            if let Some((line, count, script)) = frame.dispatch(&self.library) {
                if count > 0 && self.verbosity() >= 3 {
                    let name = self.library.get(script).map_or("", |s| s.name.as_str());
                    debug!(script = name, count, "substituted parameters: {}", line);
                }
                let child = self.parse_line(&line, level + 1)?;
                if !child.instances.is_empty() {
                    stack.push(child);
                }
                continue;
            }
            if frame.is_running(&self.library) {
                self.time_unit()?;
                continue;
            }
            stack.pop();
            if stack.is_empty() {
                self.time_unit()?;
            }
        }
    }

    /// Execute everything queued within one time unit.
    fn time_unit(&mut self) -> Result<ExecutionReport, CommandError> {
        self.cycle += 1;
        if self.registry.queued_count() == 0 {
            Executor::new(&self.config.motion).check_abort(&mut self.hw)?;
            return Ok(ExecutionReport::default());
        }
        if self.step_mode {
            self.step_wait()?;
        }
        if self.verbosity() >= 1 {
            info!(cycle = self.cycle, "at time unit {}", self.cycle);
        }
        let duration = self.config.motion.timeunit_us();
        Ok(Executor::new(&self.config.motion).run(&mut self.registry, &mut self.hw, duration)?)
    }

    fn step_wait(&mut self) -> Result<(), CommandError> {
        self.hw.write_line(" ...waiting");
        match self.hw.wait_key() {
            Key::Escape => Err(MotionError::Aborted { return_home: false }.into()),
            Key::Char('+') => {
                self.step_mode = false;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Queue the primitive commands of a line and register its scripts.
    fn parse_line(&mut self, text: &str, level: usize) -> Result<Frame, CommandError> {
        let mut frame = Frame::new(level);
        let mut scan = Scanner::new(text);
        scan.skip_blanks();
        if level > 1 && self.verbosity() >= 2 {
            debug!(level, "executing: \"{}\"", scan.rest());
        }
        while !scan.is_at_end() {
            if self.command(&mut scan, level)? {
                scan.separator();
                continue;
            }
            if scan.key("step ") {
                if level == 1 {
                    self.step_mode = true;
                }
            } else {
                scan.key("run ");
                if level == 1 {
                    self.step_mode = false;
                }
            }
            let context = scan.rest();
            let script = self
                .scan_script(&mut scan)
                .ok_or_else(|| CommandError::UnknownScript(context.into()))?;
            let mut params = Params::new();
            while params.len() < MAX_PARAMS {
                match scan.word() {
                    Some(word) => {
                        // cannot overflow, checked by the loop
                        let _ = params.push(param(word));
                    }
                    None => break,
                }
            }
            if self.verbosity() >= 3 {
                let name = self.library.get(script).map_or("", |s| s.name.as_str());
                debug!(level, script = name, params = params.len(), "starting script");
            }
            frame
                .instances
                .push(ScriptInstance::new(script, params))
                .map_err(|_| CommandError::TooManyScripts {
                    max: MAX_PARALLEL_SCRIPTS,
                    context: context.into(),
                })?;
            scan.separator();
        }
        Ok(frame)
    }

    fn scan_script(&self, scan: &mut Scanner<'_>) -> Option<usize> {
        self.library.scan_order().into_iter().find(|&index| {
            self.library
                .get(index)
                .is_some_and(|script| scan.key(&script.name))
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Try one command at the scanner. Returns false if none matched.
    fn command(&mut self, scan: &mut Scanner<'_>, level: usize) -> Result<bool, CommandError> {
        if scan.key("rot ") {
            let id = self.scan_axle(scan, MoveKind::Rotate)?;
            let degrees = scan
                .int(-360 * 6, 360 * 6)
                .ok_or_else(|| CommandError::parse("bad degrees", scan.rest()))?;
            MicrostepConverter::new(&self.config.motion).queue(
                &mut self.registry,
                id,
                MoveKind::Rotate,
                degrees as i32,
                Window::FULL,
            )?;
        } else if scan.key("lift ") {
            let id = self.scan_axle(scan, MoveKind::Lift)?;
            let mils = scan
                .int(-1500, 1500)
                .ok_or_else(|| CommandError::parse("bad mils", scan.rest()))?;
            MicrostepConverter::new(&self.config.motion).queue(
                &mut self.registry,
                id,
                MoveKind::Lift,
                mils as i32,
                Window::FULL,
            )?;
        } else if let Some(table) = functions::scan_verb(scan) {
            let converter = MicrostepConverter::new(&self.config.motion);
            let applied = functions::run_function(table, scan, &mut self.registry, &converter)?;
            if self.verbosity() >= 3 {
                match applied {
                    Applied::Queued { axle, distance } => debug!(
                        verb = table.verb,
                        axle = self.registry[axle].name(),
                        distance,
                        "queued"
                    ),
                    Applied::AlreadyThere(axle) => debug!(verb = table.verb, axle, "already there"),
                }
            }
        } else if scan.key("zero ") {
            let rotator = functions::scan_zero_wheel(scan, &self.registry)?;
            let calibrate = scan.key("calibrate");
            self.zero(rotator, calibrate)?;
        } else if scan.key("giveoff ") {
            let converter = MicrostepConverter::new(&self.config.motion);
            let degrees = self.config.motion.degrees_per_digit();
            functions::run_giveoff(scan, &mut self.registry, &converter, degrees)?;
        } else if scan.key("repeat ") {
            let count = scan.int(1, 9999).unwrap_or(9999);
            let rest = scan.rest();
            for _ in 1..count {
                self.run_text(rest, level)?;
            }
        } else if scan.key("timeunit ") {
            let ms = scan
                .int(MIN_TIMEUNIT_MS as i64, MAX_TIMEUNIT_MS as i64)
                .ok_or_else(|| CommandError::parse("bad time in msec", scan.rest()))?;
            self.config.motion.timeunit_ms = ms as u32;
        } else if scan.key("timeunit") {
            let line = format!("{} msec", self.config.motion.timeunit_ms);
            self.hw.write_line(&line);
        } else if scan.key("tu") {
            self.config.motion.timeunit_ms = 157;
        } else if scan.key("debug ") {
            let verbosity = scan
                .int(0, MAX_VERBOSITY as i64)
                .ok_or_else(|| CommandError::parse("bad debug level", scan.rest()))?;
            self.config.motion.verbosity = verbosity as u8;
        } else if scan.key("debug") {
            let line = format!("debug {}", self.config.motion.verbosity);
            self.hw.write_line(&line);
        } else if scan.key("on") {
            self.power(scan, PowerState::On)?;
        } else if scan.key("off") {
            self.power(scan, PowerState::Off)?;
        } else if scan.key("home") {
            self.run_text("run home", level)?;
        } else if scan.key("pause") {
            self.pause(scan)?;
        } else if scan.key("reset") {
            self.registry.reset();
        } else if scan.key("switches") {
            self.show_switches();
        } else if scan.key("motors") {
            for line in self.registry.motors_report() {
                self.hw.write_line(&line);
            }
        } else if scan.key("state") {
            for line in self.registry.state_report() {
                self.hw.write_line(&line);
            }
        } else if scan.key("calibrate") {
            self.calibrate(scan)?;
        } else if scan.key("bell") {
            self.hw.write_line(BELL);
        } else if scan.key("help") || scan.key("?") {
            self.show_help();
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn scan_axle(&self, scan: &mut Scanner<'_>, kind: MoveKind) -> Result<AxleId, CommandError> {
        scan.axle(&self.registry, Some(kind))
            .ok_or_else(|| CommandError::parse("bad motor", scan.rest()))
    }

    fn power(&mut self, scan: &mut Scanner<'_>, state: PowerState) -> Result<(), CommandError> {
        let verbosity = self.verbosity();
        if let Some(id) = scan.axle(&self.registry, None) {
            power_axle(&mut self.registry, &mut self.hw, id, state, true, verbosity)?;
            return Ok(());
        }
        let all = scan.key("all");
        if !scan.end_command() {
            return Err(CommandError::parse("bad motor", scan.rest()));
        }
        power_all(&mut self.registry, &mut self.hw, state, all, verbosity)?;
        Ok(())
    }

    fn pause(&mut self, scan: &mut Scanner<'_>) -> Result<(), CommandError> {
        while self.registry.queued_count() > 0 {
            self.time_unit()?;
        }
        match scan.int(1, 99_999) {
            None => {
                self.hw.write_line("waiting...");
                if self.hw.wait_key() == Key::Escape {
                    return Err(MotionError::Aborted { return_home: false }.into());
                }
            }
            Some(ms) => {
                if self.verbosity() >= 1 {
                    info!(ms, "pausing {} msec", ms);
                }
                let executor = Executor::new(&self.config.motion);
                for _ in 0..ms {
                    executor.check_abort(&mut self.hw)?;
                    self.hw.sleep_us(1000);
                }
            }
        }
        Ok(())
    }

    fn zero(&mut self, rotator: AxleId, calibrate: bool) -> Result<(), CommandError> {
        if self.step_mode {
            self.step_wait()?;
        }
        let outcome = Seeker::new(&self.config.motion).zero(
            &mut self.registry,
            &mut self.hw,
            &mut self.calibration,
            rotator,
            calibrate,
        )?;
        if let ZeroOutcome::Calibrated { .. } = outcome {
            self.calibration.save_to(&mut self.store)?;
        }
        Ok(())
    }

    fn calibrate(&mut self, scan: &mut Scanner<'_>) -> Result<(), CommandError> {
        let id = self.scan_axle(scan, MoveKind::Rotate)?;
        let degrees = scan
            .int(-360, 360)
            .ok_or_else(|| CommandError::parse("bad degrees", scan.rest()))? as i16;
        let old = self.calibration.set(id, degrees);
        let line = format!(
            "axle {} zero changed from {} to {} degrees past the switch",
            self.registry[id].name(),
            old.map_or(-1, i32::from),
            degrees
        );
        self.hw.write_line(&line);
        self.calibration.save_to(&mut self.store)?;
        Ok(())
    }

    fn show_switches(&mut self) {
        let bits = self.hw.switch_bitmap();
        let states: Vec<String> = (0..16)
            .map(|n| format!("sw{}={}", n, (bits >> n) & 1))
            .collect();
        let line = format!("switches: {}", states.join(" "));
        self.hw.write_line(&line);
    }

    fn show_help(&mut self) {
        let names: Vec<&str> = self.library.names().collect();
        let scripts = format!("  <script> is one of: {}", names.join("|"));
        let axles: Vec<&str> = self
            .registry
            .iter()
            .filter(|(_, a)| a.slot().is_some())
            .map(|(_, a)| a.name())
            .collect();
        let axles = format!("<axle> is one of: {}", axles.join(" "));
        for line in HELP {
            self.hw.write_line(line);
        }
        self.hw.write_line(&scripts);
        self.hw.write_line(&axles);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    fn verbosity(&self) -> u8 {
        self.config.motion.verbosity
    }

    /// The axle registry.
    pub fn registry(&self) -> &AxleRegistry {
        &self.registry
    }

    /// Mutable access to the axle registry.
    pub fn registry_mut(&mut self) -> &mut AxleRegistry {
        &mut self.registry
    }

    /// The scripts this interpreter knows.
    pub fn library(&self) -> &ScriptLibrary {
        &self.library
    }

    /// Mutable access to the scripts, to add or replace some.
    pub fn library_mut(&mut self) -> &mut ScriptLibrary {
        &mut self.library
    }

    /// Current calibration offsets.
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// The testbed.
    pub fn testbed(&self) -> &H {
        &self.hw
    }

    /// Mutable access to the testbed.
    pub fn testbed_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// The calibration store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current configuration, including `timeunit` and `debug` changes.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Time units executed since creation.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Whether scripts wait for a key before each time unit.
    pub fn is_stepping(&self) -> bool {
        self.step_mode
    }

    /// Error of the last top-level command, if it failed.
    pub fn last_error(&self) -> Option<&CommandError> {
        self.last_error.as_ref()
    }
}
