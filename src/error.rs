//! Error taxonomy for motion and command handling.
//!
//! Two layers:
//!
//! - [`MotionError`]: raised by the converter, executor, seek routine and
//!   hardware seams. Covers invariant violations (axle already queued,
//!   unassigned), mechanical/sensor failures, and operator aborts.
//! - [`CommandError`]: raised by the interpreter. Wraps [`MotionError`] and adds
//!   parse failures and script lookup failures.
//!
//! Every message names the offending axle or the unparsed command text.

use alloc::string::String;
use thiserror::Error;

/// Errors raised while converting, queueing or executing movements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// A movement was requested for an axle that already has one queued.
    #[error("axle {axle} is already scheduled to move")]
    AlreadyQueued {
        /// Axle name.
        axle: &'static str,
    },

    /// The axle has no board slot, so nothing can drive it.
    #[error("axle {axle} is not assigned to a motor driver")]
    Unassigned {
        /// Axle name.
        axle: &'static str,
    },

    /// A name or table entry referred to an axle the registry does not declare.
    #[error("undefined axle: {0}")]
    UndefinedAxle(String),

    /// The motor driver fault line was asserted during motion.
    #[error("motor fault")]
    Fault,

    /// The operator interrupted motion.
    #[error("aborted by operator")]
    Aborted {
        /// Whether the mechanism should be returned home after the stop.
        return_home: bool,
    },

    /// The index switch never released while seeking.
    #[error("switch is always on for axle {axle}")]
    SwitchAlwaysOn {
        /// Axle name.
        axle: &'static str,
    },

    /// The index switch never engaged while seeking.
    #[error("switch is always off for axle {axle}")]
    SwitchAlwaysOff {
        /// Axle name.
        axle: &'static str,
    },

    /// The axle was asked to zero but has no stored calibration.
    #[error("axle not calibrated: {axle}")]
    NotCalibrated {
        /// Axle name.
        axle: &'static str,
    },

    /// The axle has no index switch to seek against.
    #[error("axle {axle} has no index switch")]
    NoIndexSwitch {
        /// Axle name.
        axle: &'static str,
    },

    /// The axle table itself is inconsistent (duplicate name or slot).
    #[error("invalid axle table: {0}")]
    Configuration(String),

    /// A hardware seam reported an error.
    #[error("hardware error: {0}")]
    Hardware(String),

    /// The calibration store failed to load or save.
    #[error("calibration storage error: {0}")]
    Storage(String),
}

impl MotionError {
    /// Returns true for operator aborts that request a return home.
    pub fn wants_home(&self) -> bool {
        matches!(self, MotionError::Aborted { return_home: true })
    }
}

/// Errors raised while interpreting command text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Malformed command or bad argument. `context` is the remaining text.
    #[error("{message}: {context}")]
    Parse {
        /// What was expected.
        message: &'static str,
        /// The text at which parsing failed.
        context: String,
    },

    /// No command or script matched.
    #[error("unknown command or script: {0}")]
    UnknownScript(String),

    /// More scripts were started in parallel on one line than a frame can hold.
    #[error("too many parallel scripts (max {max}): {context}")]
    TooManyScripts {
        /// Frame capacity.
        max: usize,
        /// Text of the script invocation that did not fit.
        context: String,
    },

    /// A movement failed.
    #[error(transparent)]
    Motion(#[from] MotionError),
}

impl CommandError {
    /// Build a parse error from a message and the unparsed text.
    pub fn parse(message: &'static str, context: &str) -> Self {
        CommandError::Parse {
            message,
            context: context.into(),
        }
    }

    /// The motion error underlying this failure, if any.
    pub fn motion(&self) -> Option<&MotionError> {
        match self {
            CommandError::Motion(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn messages_name_the_axle() {
        let e = MotionError::AlreadyQueued { axle: "a2r" };
        assert_eq!(e.to_string(), "axle a2r is already scheduled to move");

        let e = MotionError::SwitchAlwaysOff { axle: "s1r" };
        assert!(e.to_string().contains("s1r"));
    }

    #[test]
    fn abort_distinguishes_home_request() {
        assert_eq!(
            MotionError::Aborted { return_home: false }.to_string(),
            "aborted by operator"
        );
        assert!(MotionError::Aborted { return_home: true }.wants_home());
        assert!(!MotionError::Fault.wants_home());
    }

    #[test]
    fn parse_error_carries_context() {
        let e = CommandError::parse("bad degrees", "x12");
        assert_eq!(e.to_string(), "bad degrees: x12");
        assert!(e.motion().is_none());
    }

    #[test]
    fn motion_error_converts_transparently() {
        let e: CommandError = MotionError::Fault.into();
        assert_eq!(e.to_string(), "motor fault");
        assert_eq!(e.motion(), Some(&MotionError::Fault));
    }
}
