use logos::{Lexer, Logos};
use std::{fmt, ops, str::FromStr, time};
use thiserror::Error;

/// A point on the simulated timeline.
///
/// The engine never reads wall-clock time: every lifecycle event carries a
/// `SimTime` supplied by the producing scheduler (or by a live-probe clock
/// adapter). `SimTime` is the number of microseconds elapsed since the start
/// of the observation window. Sub-microsecond precision is truncated, the
/// same way [`Duration`] values are truncated everywhere else in this crate.
///
/// `SimTime` values are points, not spans: they can be compared, a
/// [`Duration`] can be added to them, and the span between two of them is a
/// [`Duration`] obtained with [`saturating_duration_since`] or
/// [`checked_duration_since`]. There is no panicking subtraction.
///
/// ```
/// use flowmon_core::SimTime;
/// use std::time::Duration;
///
/// let t0 = SimTime::from_millis(1_000);
/// let t1 = t0 + Duration::from_millis(250);
///
/// assert_eq!(t1.saturating_duration_since(t0), Duration::from_millis(250));
/// // points are not ordered backwards: the span saturates to zero
/// assert_eq!(t0.saturating_duration_since(t1), Duration::ZERO);
/// ```
///
/// [`Duration`]: std::time::Duration
/// [`saturating_duration_since`]: SimTime::saturating_duration_since
/// [`checked_duration_since`]: SimTime::checked_duration_since
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    /// the start of the observation window
    pub const ZERO: Self = Self(0);

    /// create a `SimTime` from the time elapsed since the start of the
    /// observation window.
    ///
    /// # truncation
    ///
    /// `SimTime` is precise up to the microsecond. Constructing one from a
    /// [`Duration`](time::Duration) holding nanosecond precision truncates
    /// the nanosecond part.
    ///
    /// ```
    /// # use flowmon_core::SimTime;
    /// # use std::time::Duration;
    /// assert_eq!(
    ///     SimTime::new(Duration::from_nanos(987_654_321)),
    ///     SimTime::from_micros(987_654),
    /// );
    /// ```
    #[inline(always)]
    pub const fn new(elapsed: time::Duration) -> Self {
        Self(elapsed.as_micros() as u64)
    }

    /// the point `micros` microseconds after the start of the window
    #[inline(always)]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// the point `millis` milliseconds after the start of the window
    #[inline(always)]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    /// the point `secs` seconds after the start of the window
    #[inline(always)]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// microseconds elapsed since the start of the window
    #[inline(always)]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// seconds elapsed since the start of the window, as a float
    ///
    /// This is the representation used by the structured report.
    #[inline(always)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// the span from `earlier` to `self`, or `None` if `earlier` is
    /// actually later than `self`.
    pub fn checked_duration_since(self, earlier: Self) -> Option<time::Duration> {
        self.0.checked_sub(earlier.0).map(time::Duration::from_micros)
    }

    /// the span from `earlier` to `self`, zero if `earlier` is actually
    /// later than `self`. Never panics.
    pub fn saturating_duration_since(self, earlier: Self) -> time::Duration {
        time::Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl From<time::Duration> for SimTime {
    fn from(elapsed: time::Duration) -> Self {
        Self::new(elapsed)
    }
}

impl ops::Add<time::Duration> for SimTime {
    type Output = Self;
    fn add(self, rhs: time::Duration) -> Self {
        Self(self.0 + rhs.as_micros() as u64)
    }
}

impl ops::AddAssign<time::Duration> for SimTime {
    fn add_assign(&mut self, rhs: time::Duration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Duration(time::Duration::from_micros(self.0)).fmt(f)
    }
}

impl FromStr for SimTime {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = Duration::from_str(s)?;

        Ok(Self::new(duration.into_duration()))
    }
}

/// Error returned when parsing a humane duration string such as `"10s"`
/// or `"1s 250ms"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// The string holds no duration component at all.
    #[error("empty duration string")]
    Empty,
    /// A character that is neither a number nor a known unit.
    #[error("unrecognised token in duration string")]
    Unrecognised,
    /// A unit appeared without a number in front of it.
    #[error("expected a number before the unit")]
    ExpectedValue,
    /// A number appeared without a unit after it.
    #[error("expected a unit (ns, us, ms, s or m) after the number")]
    ExpectedUnit,
    /// The numeric part does not fit in 64 bits.
    #[error("number too large for a duration")]
    InvalidNumber,
}

/// crate-private rendering and parsing for duration-like values.
///
/// [`SimTime`] and [`LossTimeout`] both delegate their `Display` and
/// `FromStr` to this type so the whole crate reads and writes the same
/// grammar: one or more `<number><unit>` segments, summed together.
///
/// [`LossTimeout`]: crate::monitor::LossTimeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub(crate) struct Duration(time::Duration);

impl Duration {
    pub(crate) fn new(dur: time::Duration) -> Self {
        Self(dur)
    }

    #[inline]
    pub(crate) fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl fmt::Display for Duration {
    /// compact concatenated-unit rendering, largest unit first:
    /// `150ms`, `1s542ms`, `2m5s`, `1µs`. The zero duration renders `0s`.
    /// Sub-microsecond precision is not rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_micros();
        if total == 0 {
            return f.write_str("0s");
        }

        let minutes = total / 60_000_000;
        let seconds = (total / 1_000_000) % 60;
        let millis = (total / 1_000) % 1_000;
        let micros = total % 1_000;

        if minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        if seconds > 0 {
            write!(f, "{seconds}s")?;
        }
        if millis > 0 {
            write!(f, "{millis}ms")?;
        }
        if micros > 0 {
            write!(f, "{micros}µs")?;
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::new(s);

        let mut durations = Vec::new();

        while let Some(next) = lex.next() {
            let number: Token = next.map_err(|()| DurationParseError::Unrecognised)?;

            if number != Token::Value {
                return Err(DurationParseError::ExpectedValue);
            }
            let number: u64 = lex
                .slice()
                .parse()
                .map_err(|_| DurationParseError::InvalidNumber)?;

            let Some(Ok(measure)) = lex.next() else {
                return Err(DurationParseError::ExpectedUnit);
            };
            let duration = match measure {
                Token::NanoSeconds => time::Duration::from_nanos(number),
                Token::MicroSeconds => time::Duration::from_micros(number),
                Token::MilliSeconds => time::Duration::from_millis(number),
                Token::Seconds => time::Duration::from_secs(number),
                Token::Minutes => {
                    let seconds = number
                        .checked_mul(60)
                        .ok_or(DurationParseError::InvalidNumber)?;
                    time::Duration::from_secs(seconds)
                }
                Token::Value => return Err(DurationParseError::ExpectedUnit),
            };
            durations.push(duration);
        }

        if durations.is_empty() {
            return Err(DurationParseError::Empty);
        }

        Ok(Self(durations.into_iter().sum()))
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|µs|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logos_lexer() {
        let mut lex = Token::lexer("1ns");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.span(), 0..1);
        assert_eq!(lex.slice(), "1");

        assert_eq!(lex.next(), Some(Ok(Token::NanoSeconds)));
        assert_eq!(lex.span(), 1..3);
        assert_eq!(lex.slice(), "ns");
    }

    #[test]
    fn parse() {
        let Duration(duration) = "123ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 123);

        let Duration(duration) = "1s 2000ms 3000000us".parse().unwrap();
        assert_eq!(duration.as_secs(), 6);
    }

    #[test]
    fn parse_micro_spellings() {
        for s in ["5us", "5µs", "5μs"] {
            let Duration(duration) = s.parse().unwrap();
            assert_eq!(duration.as_micros(), 5, "failed for {s}");
        }
    }

    #[test]
    fn parse_invalid() {
        assert_eq!(
            "".parse::<Duration>().unwrap_err(),
            DurationParseError::Empty
        );
        assert_eq!(
            "150".parse::<Duration>().unwrap_err(),
            DurationParseError::ExpectedUnit
        );
        assert_eq!(
            "abc".parse::<Duration>().unwrap_err(),
            DurationParseError::Unrecognised
        );
        assert_eq!(
            "ms".parse::<Duration>().unwrap_err(),
            DurationParseError::ExpectedValue
        );
        assert_eq!(
            "99999999999999999999s".parse::<Duration>().unwrap_err(),
            DurationParseError::InvalidNumber
        );
    }

    #[test]
    fn display() {
        let display = |d: time::Duration| Duration::new(d).to_string();

        assert_eq!(display(time::Duration::ZERO), "0s");
        assert_eq!(display(time::Duration::from_millis(150)), "150ms");
        assert_eq!(display(time::Duration::from_millis(1_542)), "1s542ms");
        assert_eq!(display(time::Duration::from_secs(125)), "2m5s");
        assert_eq!(display(time::Duration::from_micros(1)), "1µs");
        assert_eq!(display(time::Duration::from_nanos(1_542)), "1µs");
    }

    #[test]
    fn display_round_trip() {
        for micros in [1u64, 999, 1_000, 1_000_000, 61_000_000, 90_123_456] {
            let original = Duration::new(time::Duration::from_micros(micros));
            let parsed: Duration = original.to_string().parse().unwrap();
            assert_eq!(original, parsed, "round-trip failed for {micros}µs");
        }
    }

    // ---- SimTime ----

    #[test]
    fn sim_time_truncates_to_micros() {
        assert_eq!(
            SimTime::new(time::Duration::from_nanos(999)),
            SimTime::ZERO
        );
        assert_eq!(
            SimTime::new(time::Duration::from_nanos(1_000)),
            SimTime::from_micros(1)
        );
    }

    #[test]
    fn sim_time_add_duration() {
        let t = SimTime::from_secs(1) + time::Duration::from_millis(200);
        assert_eq!(t, SimTime::from_millis(1_200));

        let mut t = SimTime::ZERO;
        t += time::Duration::from_micros(42);
        assert_eq!(t, SimTime::from_micros(42));
    }

    #[test]
    fn sim_time_spans() {
        let t0 = SimTime::from_secs(1);
        let t1 = SimTime::from_millis(1_200);

        assert_eq!(
            t1.saturating_duration_since(t0),
            time::Duration::from_millis(200)
        );
        assert_eq!(t0.saturating_duration_since(t1), time::Duration::ZERO);
        assert_eq!(
            t1.checked_duration_since(t0),
            Some(time::Duration::from_millis(200))
        );
        assert_eq!(t0.checked_duration_since(t1), None);
    }

    #[test]
    fn sim_time_as_secs_f64() {
        assert_eq!(SimTime::ZERO.as_secs_f64(), 0.0);
        assert_eq!(SimTime::from_millis(1_200).as_secs_f64(), 1.2);
    }

    #[test]
    fn sim_time_display_and_parse() {
        let t = SimTime::from_millis(1_542);
        assert_eq!(t.to_string(), "1s542ms");
        assert_eq!("1s542ms".parse::<SimTime>().unwrap(), t);

        assert_eq!(SimTime::ZERO.to_string(), "0s");
        assert!("not a time".parse::<SimTime>().is_err());
    }
}
