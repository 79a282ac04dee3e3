//! Desktop implementations: terminal console, wall clock and file store.
//!
//! Used by the `rs-engine-console` binary together with
//! [`MockBoard::simulating`](crate::hal::MockBoard::simulating).

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::traits::{CalibrationStore, Clock, Interrupt, Key, OperatorConsole};

// ============================================================================
// Console
// ============================================================================

const NO_INTERRUPT: u8 = 0;
const STOP: u8 = 1;
const STOP_AND_HOME: u8 = 2;

/// Shared handle for raising an interrupt from another thread.
///
/// The console binary hands one to its Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle(Arc<AtomicU8>);

impl InterruptHandle {
    /// Raise `interrupt`. A later request replaces an unpolled earlier one.
    pub fn request(&self, interrupt: Interrupt) {
        let code = match interrupt {
            Interrupt::Stop => STOP,
            Interrupt::StopAndHome => STOP_AND_HOME,
        };
        self.0.store(code, Ordering::SeqCst);
    }

    fn take(&self) -> Option<Interrupt> {
        match self.0.swap(NO_INTERRUPT, Ordering::SeqCst) {
            STOP => Some(Interrupt::Stop),
            STOP_AND_HOME => Some(Interrupt::StopAndHome),
            _ => None,
        }
    }
}

/// Line-buffered terminal console.
///
/// Keys are read a line at a time: an empty line is Enter, `esc` is Escape,
/// anything else is its first character. Interrupts arrive through an
/// [`InterruptHandle`].
#[derive(Debug, Default)]
pub struct StdConsole {
    interrupts: InterruptHandle,
}

impl StdConsole {
    /// Creates a console with a fresh interrupt handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that raises interrupts on this console.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupts.clone()
    }

    /// Print `prompt` and read one command line. Returns `None` at end of input.
    pub fn read_command(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut out = io::stdout().lock();
        write!(out, "{prompt} ")?;
        out.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Key for one line of terminal input.
pub fn key_from_line(line: &str) -> Key {
    let line = line.trim();
    if line.eq_ignore_ascii_case("esc") || line.starts_with('\x1b') {
        return Key::Escape;
    }
    match line.chars().next() {
        Some(c) => Key::Char(c),
        None => Key::Enter,
    }
}

impl OperatorConsole for StdConsole {
    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        self.interrupts.take()
    }

    fn wait_key(&mut self) -> Key {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => Key::Escape,
            Ok(_) => key_from_line(&line),
            Err(e) => {
                warn!(error = %e, "Console read failed");
                Key::Escape
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Wall clock measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// Starts a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn sleep_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Calibration record kept in a file.
///
/// # Example
///
/// ```rust
/// use rs_engine::hal::FileStore;
/// use rs_engine::traits::CalibrationStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut store = FileStore::new(dir.path().join("cal.bin"));
/// assert_eq!(store.load().unwrap(), None);
///
/// store.store(b"Babbage").unwrap();
/// assert_eq!(store.load().unwrap(), Some(b"Babbage".to_vec()));
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store the record at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for FileStore {
    type Error = io::Error;

    fn load(&mut self) -> Result<Option<Vec<u8>>, io::Error> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No calibration file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn store(&mut self, record: &[u8]) -> Result<(), io::Error> {
        fs::write(&self.path, record)?;
        debug!(path = %self.path.display(), bytes = record.len(), "Calibration written");
        Ok(())
    }
}
