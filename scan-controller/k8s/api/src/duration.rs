//! Parses scan timeouts written as Go `time.Duration` strings, e.g. `1h30m` or `90s`.

use std::{str::FromStr, time::Duration};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GoDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid unit {0:?}: {EXPECTED_UNITS}")]
    InvalidUnit(String),

    #[error("missing a unit: {EXPECTED_UNITS}")]
    NoUnit,

    #[error("invalid number: {0}")]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("negative durations are not allowed")]
    Negative,

    #[error("duration is out of range")]
    Overflow,
}

/// Go durations are signed 64-bit nanosecond counts.
const MAX_NANOS: u64 = i64::MAX as u64;

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

// === impl GoDuration ===

impl GoDuration {
    fn unit(unit: &str) -> Result<Duration, ParseError> {
        const MINUTE: Duration = Duration::from_secs(60);
        let base = match unit {
            "ns" => Duration::from_nanos(1),
            // U+00B5 is the micro sign; U+03BC is the Greek letter mu.
            "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => MINUTE,
            "h" => MINUTE * 60,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };
        Ok(base)
    }
}

impl FromStr for GoDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let s = match s.strip_prefix('-') {
            // "-0" is still zero.
            Some("0") => return Ok(Self::default()),
            Some(_) => return Err(ParseError::Negative),
            None => s.strip_prefix('+').unwrap_or(s),
        };
        if s == "0" {
            return Ok(Self::default());
        }

        let mut rest = s;
        let mut total = Duration::ZERO;
        while !rest.is_empty() {
            let unit_start = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or(ParseError::NoUnit)?;
            let (value, tail) = rest.split_at(unit_start);
            let unit_end = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);

            let value = value.parse::<f64>()?;
            let nanos = (value * Self::unit(unit)?.as_nanos() as f64).round();
            if !nanos.is_finite() || nanos > MAX_NANOS as f64 {
                return Err(ParseError::Overflow);
            }
            total = total
                .checked_add(Duration::from_nanos(nanos as u64))
                .filter(|t| t.as_nanos() <= u128::from(MAX_NANOS))
                .ok_or(ParseError::Overflow)?;
            rest = tail;
        }

        Ok(Self(total))
    }
}

impl From<GoDuration> for Duration {
    fn from(GoDuration(d): GoDuration) -> Self {
        d
    }
}
