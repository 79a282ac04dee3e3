//! Configuration for the motion core, the console and device identity.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use rs_engine::config::{Config, MotionConfig, ConsoleConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.motion.timeunit_ms, 500);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_motion(MotionConfig::default().with_timeunit_ms(157))
//!     .with_console(ConsoleConfig::default().with_prompt("engine>"));
//! ```

use heapless::String as HString;

/// Maximum length for short config strings (names, prompts)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (file paths)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

/// Copy `s` into a bounded string, truncating at a UTF-8 boundary.
pub fn bounded_string<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    let mut end = s.len().min(N);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let _ = hs.push_str(&s[..end]);
    hs
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    bounded_string(s)
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    bounded_string(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Motion scheduler configuration
    pub motion: MotionConfig,
    /// Operator console configuration
    pub console: ConsoleConfig,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Set motion configuration
    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    /// Set console configuration
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// Motion Config
// ============================================================================

/// Shortest time unit the `timeunit` command accepts, in milliseconds.
pub const MIN_TIMEUNIT_MS: u32 = 10;

/// Longest time unit the `timeunit` command accepts, in milliseconds.
pub const MAX_TIMEUNIT_MS: u32 = 60_000;

/// Motion scheduler configuration
///
/// The default values describe the version-2 testbed: NEMA 11 motors with
/// 200 full steps per rotation, DRV8825 drivers in 1/4 microstep mode, and
/// 8 mm pitch lead screws on the lifters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotionConfig {
    /// Duration of one time unit in milliseconds
    pub timeunit_ms: u32,
    /// Minimum time between microsteps of one axle, in microseconds
    pub min_step_interval_us: u32,
    /// Executor polling tick, in microseconds
    pub tick_us: u32,
    /// Microsteps per full step, as the drivers are strapped
    pub microsteps_per_step: u32,
    /// Full steps per motor rotation
    pub steps_per_rotation: u32,
    /// Repetitions of 0..9 around each digit wheel
    pub digit_repetitions: u32,
    /// Lead-screw microsteps per 100 mils of lift
    pub lift_usteps_per_100_mils: u32,
    /// Single-degree attempts before the seek declares a stuck switch
    pub seek_retry_limit: u32,
    /// Switch settling time in milliseconds
    pub debounce_ms: u32,
    /// Report verbosity 0..=6
    pub verbosity: u8,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            timeunit_ms: 500,
            min_step_interval_us: 175,
            tick_us: 50,
            microsteps_per_step: 4,
            steps_per_rotation: 200,
            digit_repetitions: 2,
            lift_usteps_per_100_mils: 254,
            seek_retry_limit: 370,
            debounce_ms: 25,
            verbosity: 0,
        }
    }
}

impl MotionConfig {
    /// Set the time unit, clamped to the accepted range
    pub fn with_timeunit_ms(mut self, ms: u32) -> Self {
        self.timeunit_ms = ms.clamp(MIN_TIMEUNIT_MS, MAX_TIMEUNIT_MS);
        self
    }

    /// Set the minimum inter-step interval
    pub fn with_min_step_interval_us(mut self, us: u32) -> Self {
        self.min_step_interval_us = us;
        self
    }

    /// Set the executor tick
    pub fn with_tick_us(mut self, us: u32) -> Self {
        self.tick_us = us.max(1);
        self
    }

    /// Set the driver microstep mode
    pub fn with_microsteps_per_step(mut self, usteps: u32) -> Self {
        self.microsteps_per_step = usteps.max(1);
        self
    }

    /// Set the seek retry ceiling
    pub fn with_seek_retry_limit(mut self, limit: u32) -> Self {
        self.seek_retry_limit = limit;
        self
    }

    /// Set the report verbosity
    pub fn with_verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Time unit in microseconds
    pub fn timeunit_us(&self) -> u32 {
        self.timeunit_ms.saturating_mul(1000)
    }

    /// Microsteps per full motor rotation
    pub fn microsteps_per_rotation(&self) -> u32 {
        self.microsteps_per_step * self.steps_per_rotation
    }

    /// Degrees of wheel rotation per digit
    pub fn degrees_per_digit(&self) -> i32 {
        (360 / 10 / self.digit_repetitions.max(1)) as i32
    }

    /// Time to move one degree at the same circumferential speed as one digit per time unit
    pub fn degree_time_us(&self) -> u32 {
        let us = self.timeunit_us() as u64 * 10 * self.digit_repetitions as u64 / 360;
        us.min(u32::MAX as u64) as u32
    }
}

// ============================================================================
// Console Config
// ============================================================================

/// Operator console configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConsoleConfig {
    /// Prompt printed before each command
    pub prompt: ShortString,
    /// Where the calibration record is kept (desktop only)
    pub calibration_path: LongString,
    /// Whether an empty line repeats the previous command
    pub repeat_on_empty: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: short_string(">"),
            calibration_path: long_string("calibration.bin"),
            repeat_on_empty: true,
        }
    }
}

impl ConsoleConfig {
    /// Set the prompt
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = short_string(prompt);
        self
    }

    /// Set the calibration file path
    pub fn with_calibration_path(mut self, path: &str) -> Self {
        self.calibration_path = long_string(path);
        self
    }

    /// Enable or disable repeat-on-empty
    pub fn with_repeat_on_empty(mut self, repeat: bool) -> Self {
        self.repeat_on_empty = repeat;
        self
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Human-readable device name
    pub name: ShortString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: short_string("engine testbed v2"),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = Config::default();
        assert_eq!(config.motion.timeunit_ms, 500);
        assert_eq!(config.console.prompt.as_str(), ">");
        assert_eq!(config.device.name.as_str(), "engine testbed v2");
    }

    #[test]
    fn config_builder_chain() {
        let config = Config::default()
            .with_motion(MotionConfig::default().with_timeunit_ms(157))
            .with_console(ConsoleConfig::default().with_prompt("$"))
            .with_device(DeviceConfig::default().with_name("bench"));

        assert_eq!(config.motion.timeunit_ms, 157);
        assert_eq!(config.console.prompt.as_str(), "$");
        assert_eq!(config.device.name.as_str(), "bench");
    }

    // =========================================================================
    // MotionConfig Tests
    // =========================================================================

    #[test]
    fn motion_config_derived_values() {
        let motion = MotionConfig::default();
        assert_eq!(motion.microsteps_per_rotation(), 800);
        assert_eq!(motion.degrees_per_digit(), 18);
        assert_eq!(motion.timeunit_us(), 500_000);
        // 500ms * 10 digits * 2 repetitions / 360 degrees
        assert_eq!(motion.degree_time_us(), 27_777);
    }

    #[test]
    fn motion_timeunit_clamped() {
        assert_eq!(MotionConfig::default().with_timeunit_ms(1).timeunit_ms, MIN_TIMEUNIT_MS);
        assert_eq!(
            MotionConfig::default().with_timeunit_ms(1_000_000).timeunit_ms,
            MAX_TIMEUNIT_MS
        );
    }

    #[test]
    fn motion_config_builder() {
        let motion = MotionConfig::default()
            .with_min_step_interval_us(100)
            .with_tick_us(0)
            .with_microsteps_per_step(8)
            .with_seek_retry_limit(20)
            .with_verbosity(3);

        assert_eq!(motion.min_step_interval_us, 100);
        assert_eq!(motion.tick_us, 1);
        assert_eq!(motion.microsteps_per_rotation(), 1600);
        assert_eq!(motion.seek_retry_limit, 20);
        assert_eq!(motion.verbosity, 3);
    }

    // =========================================================================
    // ConsoleConfig Tests
    // =========================================================================

    #[test]
    fn console_config_builder() {
        let console = ConsoleConfig::default()
            .with_calibration_path("/var/lib/engine/cal.bin")
            .with_repeat_on_empty(false);
        assert_eq!(console.calibration_path.as_str(), "/var/lib/engine/cal.bin");
        assert!(!console.repeat_on_empty);
    }

    // =========================================================================
    // String Helper Tests
    // =========================================================================

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn string_helpers_utf8_boundary() {
        let input = "\u{00e9}".repeat(40); // 2 bytes each
        let s = short_string(&input);
        assert!(s.len() <= MAX_SHORT_STRING);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());
    }
}
