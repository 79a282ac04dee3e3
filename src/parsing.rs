//! Case-insensitive scanner for the command language.
//!
//! Commands are short keyword sequences separated by `;`:
//!
//! ```text
//! lock A2 top; rot a2r 36; mesh FP2 A2 time 0 149
//! ```
//!
//! The [`Scanner`] walks one line. Every `key`/`int`/`axle` call either
//! consumes what it matched (plus following blanks) or leaves the position
//! untouched, so alternatives can be tried in sequence.
//!
//! # Example
//!
//! ```rust
//! use rs_engine::parsing::Scanner;
//!
//! let mut scan = Scanner::new("ROT  a2r -36; lift a2k 100");
//! assert!(scan.key("rot"));
//! assert_eq!(scan.word(), Some("a2r"));
//! assert_eq!(scan.int(-2160, 2160), Some(-36));
//! assert!(scan.end_command());
//! assert!(scan.key("lift"));
//! ```

use crate::axle::{AxleId, AxleRegistry, MoveKind};

/// A cursor over one command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Start scanning `text` at its beginning.
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// The unconsumed text.
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Skip blanks.
    pub fn skip_blanks(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start_matches(' ').len();
    }

    /// Returns true once only blanks remain.
    pub fn is_at_end(&self) -> bool {
        self.rest().trim_start_matches(' ').is_empty()
    }

    /// Match `keyword` case-insensitively.
    ///
    /// A blank in the keyword matches one or more blanks. A keyword ending
    /// in a letter or digit must not be followed by another one, so `lock`
    /// does not match the start of `lock1`.
    ///
    /// ```
    /// use rs_engine::parsing::Scanner;
    ///
    /// let mut scan = Scanner::new("Mesh   FP2 A2 top");
    /// assert!(!scan.key("mesh fp2 a2 bot"));
    /// assert!(scan.key("mesh fp2 a2"));
    /// assert_eq!(scan.rest(), "top");
    ///
    /// assert!(!Scanner::new("lock1 A2").key("lock"));
    /// ```
    pub fn key(&mut self, keyword: &str) -> bool {
        self.skip_blanks();
        let bytes = self.text.as_bytes();
        let mut at = self.pos;
        for k in keyword.bytes() {
            if k == b' ' {
                if bytes.get(at) != Some(&b' ') {
                    return false;
                }
                while bytes.get(at) == Some(&b' ') {
                    at += 1;
                }
                continue;
            }
            match bytes.get(at) {
                Some(c) if c.eq_ignore_ascii_case(&k) => at += 1,
                _ => return false,
            }
        }
        let needs_boundary = keyword
            .bytes()
            .last()
            .is_some_and(|k| k.is_ascii_alphanumeric());
        if needs_boundary && bytes.get(at).is_some_and(|c| c.is_ascii_alphanumeric()) {
            return false;
        }
        self.pos = at;
        self.skip_blanks();
        true
    }

    /// Scan a signed decimal integer within `min..=max`.
    ///
    /// ```
    /// use rs_engine::parsing::Scanner;
    ///
    /// let mut scan = Scanner::new("  +40 x");
    /// assert_eq!(scan.int(-10, 10), None);
    /// assert_eq!(scan.int(0, 99), Some(40));
    /// assert_eq!(scan.rest(), "x");
    /// ```
    pub fn int(&mut self, min: i64, max: i64) -> Option<i64> {
        self.skip_blanks();
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let sign_len = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
        let digits = bytes[sign_len..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            return None;
        }
        let len = sign_len + digits;
        let value: i64 = rest[..len].parse().ok()?;
        if value < min || value > max {
            return None;
        }
        self.pos += len;
        self.skip_blanks();
        Some(value)
    }

    /// Scan a word up to a blank, `;` or the end of the line.
    pub fn word(&mut self) -> Option<&'a str> {
        self.skip_blanks();
        let rest = self.rest();
        let len = rest.find([' ', ';']).unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    /// Consume a `;` separator. Returns false if none is next.
    pub fn separator(&mut self) -> bool {
        self.skip_blanks();
        if self.rest().starts_with(';') {
            self.pos += 1;
            self.skip_blanks();
            true
        } else {
            false
        }
    }

    /// Returns true if the current command ends here (end of line or `;`).
    pub fn end_command(&mut self) -> bool {
        self.skip_blanks();
        self.rest().is_empty() || self.separator()
    }

    /// Scan an axle name, trying longer names first.
    ///
    /// With a `kind` filter, rotators only match when the kind agrees;
    /// lifters match either kind, since a lifter may be rotated to
    /// compensate for a coupled rotator.
    pub fn axle(&mut self, registry: &AxleRegistry, kind: Option<MoveKind>) -> Option<AxleId> {
        let start = *self;
        for &id in registry.scan_order() {
            let axle = &registry[id];
            let kind_ok = match kind {
                None => true,
                Some(kind) => axle.kind() == MoveKind::Lift || axle.kind() == kind,
            };
            if kind_ok && self.key(axle.name()) {
                return Some(id);
            }
            *self = start;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_blanks_match_runs() {
        let mut scan = Scanner::new("carrywarn   F2    reset ; x");
        assert!(scan.key("carrywarn f2 reset"));
        assert!(scan.end_command());
        assert_eq!(scan.rest(), "x");
    }

    #[test]
    fn keyword_requires_blank_where_keyword_has_one() {
        assert!(!Scanner::new("lockA2").key("lock a2"));
    }

    #[test]
    fn keyword_word_boundary() {
        assert!(!Scanner::new("reset2").key("reset"));
        assert!(Scanner::new("reset;").key("reset"));
        assert!(Scanner::new("?").key("?"));
        // non-alphanumeric keyword ends may be followed by anything
        assert!(Scanner::new("?x").key("?"));
    }

    #[test]
    fn failed_key_does_not_consume() {
        let mut scan = Scanner::new("unlock A2 top");
        assert!(!scan.key("unlock a2 bot"));
        assert_eq!(scan.rest(), "unlock A2 top");
    }

    #[test]
    fn int_rejects_out_of_range_without_consuming() {
        let mut scan = Scanner::new("3000");
        assert_eq!(scan.int(-2160, 2160), None);
        assert_eq!(scan.rest(), "3000");
        assert_eq!(scan.int(0, i64::MAX), Some(3000));
        assert!(scan.is_at_end());
    }

    #[test]
    fn int_needs_digits() {
        assert_eq!(Scanner::new("-").int(-5, 5), None);
        assert_eq!(Scanner::new("abc").int(-5, 5), None);
        assert_eq!(Scanner::new("-5;").int(-5, 5), Some(-5));
    }

    #[test]
    fn word_stops_at_separator() {
        let mut scan = Scanner::new("  zeroF 2;next");
        assert_eq!(scan.word(), Some("zeroF"));
        assert_eq!(scan.word(), Some("2"));
        assert_eq!(scan.word(), None);
        assert!(scan.end_command());
        assert_eq!(scan.word(), Some("next"));
    }

    #[test]
    fn end_command_rejects_trailing_text() {
        let mut scan = Scanner::new("  extra");
        assert!(!scan.end_command());
        assert_eq!(scan.rest(), "extra");
    }

    // =========================================================================
    // Axle Name Tests
    // =========================================================================

    #[test]
    fn axle_prefers_longest_name() {
        let reg = AxleRegistry::prototype().unwrap();
        let mut scan = Scanner::new("csk2r 10");
        assert_eq!(scan.axle(&reg, None), reg.find("csk2r"));
        assert_eq!(scan.int(-10, 10), Some(10));
    }

    #[test]
    fn axle_kind_filter() {
        let reg = AxleRegistry::prototype().unwrap();
        // rotators cannot be lifted
        assert_eq!(Scanner::new("a2r 5").axle(&reg, Some(MoveKind::Lift)), None);
        // lifters can be rotated
        assert_eq!(
            Scanner::new("a2l 5").axle(&reg, Some(MoveKind::Rotate)),
            reg.find("a2l")
        );
        let mut scan = Scanner::new("nosuch 5");
        assert_eq!(scan.axle(&reg, None), None);
        assert_eq!(scan.rest(), "nosuch 5");
    }
}
