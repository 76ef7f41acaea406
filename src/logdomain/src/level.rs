use coreerr::{CoreError, CoreResult};

/// Five ordered severities, numerically `0 = critical … 4 = debug` (spec §3).
/// A message passes a domain's filter when `message_level <= domain.level`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Critical = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    pub const MIN: Level = Level::Critical;
    pub const MAX: Level = Level::Debug;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8_clamped(raw: i64) -> Level {
        match raw.clamp(Level::MIN.as_u8() as i64, Level::MAX.as_u8() as i64) {
            0 => Level::Critical,
            1 => Level::Error,
            2 => Level::Warning,
            3 => Level::Info,
            _ => Level::Debug,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Critical => "CRI",
            Level::Error => "ERR",
            Level::Warning => "WRN",
            Level::Info => "INF",
            Level::Debug => "DBG",
        }
    }

    /// Parses a level string: a decimal integer, or one of the symbolic
    /// names from spec §3 (case-sensitive). Numeric values are clamped to
    /// the representable level range; empty input is a parse failure.
    pub fn parse(s: &str) -> CoreResult<Level> {
        if s.is_empty() {
            return Err(CoreError::InvalidArgument);
        }

        if let Ok(n) = s.parse::<i64>() {
            return Ok(Level::from_u8_clamped(n));
        }

        match s {
            "CRI" | "CRIT" | "CRITICAL" => Ok(Level::Critical),
            "ERR" | "ERROR" => Ok(Level::Error),
            "WRN" | "WARN" | "WARNING" => Ok(Level::Warning),
            "INF" | "INFO" => Ok(Level::Info),
            "DBG" | "DEBUG" => Ok(Level::Debug),
            _ => Err(CoreError::InvalidArgument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_symbolic_parse_agree() {
        assert_eq!(Level::parse("0"), Ok(Level::Critical));
        assert_eq!(Level::parse("4"), Ok(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Ok(Level::Debug));
        assert_eq!(Level::parse("WRN"), Ok(Level::Warning));
    }

    #[test]
    fn empty_is_a_parse_failure() {
        assert_eq!(Level::parse(""), Err(CoreError::InvalidArgument));
    }

    #[test]
    fn out_of_range_numeric_clamps() {
        assert_eq!(Level::parse("99"), Ok(Level::Debug));
        assert_eq!(Level::parse("-5"), Ok(Level::Critical));
    }

    #[test]
    fn lowercase_symbolic_name_is_rejected() {
        // Parsing is case-sensitive per spec §4.2.
        assert_eq!(Level::parse("debug"), Err(CoreError::InvalidArgument));
    }

    #[test]
    fn ordering_matches_numeric_severity() {
        assert!(Level::Critical < Level::Error);
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
        assert!(Level::Info < Level::Debug);
    }
}
