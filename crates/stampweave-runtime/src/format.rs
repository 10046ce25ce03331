//! Culture-invariant formatting and exact parsing of timestamps with offset
//!
//! Patterns use the custom date/time specifiers of the consuming runtime
//! (`yyyy`, `MM`, `dd`, `HH`, `zzz`, ...) under the invariant culture: English
//! month and day names, `AM`/`PM` designators, `:` and `/` as separators.
//! A pattern of exactly one character is a standard format and is expanded
//! to its invariant custom equivalent first.
//!
//! Parsing is exact: every pattern element must match and the whole input
//! must be consumed. Components missing from the pattern default to
//! `0001-01-01 00:00:00 +00:00`.

use crate::error::ConversionError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Weekday};

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const MONTHS_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
// Indexed by days from Sunday
const DAYS: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const DAYS_ABBR: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];
const DESIGNATORS: [&str; 2] = ["AM", "PM"];
const DESIGNATORS_SHORT: [&str; 2] = ["A", "P"];

const MAX_FRACTION_DIGITS: usize = 7;
const MAX_OFFSET_MINUTES: u32 = 14 * 60;
const TWO_DIGIT_YEAR_MAX: i32 = 2049;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year(usize),
    Month(usize),
    Day(usize),
    Hour24(usize),
    Hour12(usize),
    Minute(usize),
    Second(usize),
    Fraction { digits: usize, optional: bool },
    Designator(usize),
    Offset(usize),
    Zone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(Field),
    Literal(String),
}

/// Compiled format pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
}

fn invalid(pattern: &str, reason: &str) -> ConversionError {
    ConversionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

fn standard_pattern(pattern: &str) -> Result<&'static str, ConversionError> {
    Ok(match pattern {
        "d" => "MM/dd/yyyy",
        "D" => "dddd, dd MMMM yyyy",
        "f" => "dddd, dd MMMM yyyy HH:mm",
        "F" => "dddd, dd MMMM yyyy HH:mm:ss",
        "g" => "MM/dd/yyyy HH:mm",
        "G" => "MM/dd/yyyy HH:mm:ss",
        "m" | "M" => "MMMM dd",
        "o" | "O" => "yyyy'-'MM'-'dd'T'HH':'mm':'ss'.'fffffffzzz",
        "s" => "yyyy'-'MM'-'dd'T'HH':'mm':'ss",
        "t" => "HH:mm",
        "T" => "HH:mm:ss",
        "y" | "Y" => "yyyy MMMM",
        _ => return Err(invalid(pattern, "unsupported standard format")),
    })
}

fn push_literal(tokens: &mut Vec<Token>, c: char) {
    if let Some(Token::Literal(s)) = tokens.last_mut() {
        s.push(c);
    } else {
        tokens.push(Token::Literal(c.to_string()));
    }
}

impl Pattern {
    /// Compile a pattern
    ///
    /// # Errors
    /// Returns [`ConversionError::InvalidPattern`] for empty patterns, unknown
    /// standard formats, unterminated quotes and more than seven fraction digits
    pub fn parse(pattern: &str) -> Result<Self, ConversionError> {
        if pattern.is_empty() {
            return Err(invalid(pattern, "empty pattern"));
        }
        let custom = if pattern.chars().count() == 1 {
            standard_pattern(pattern)?
        } else {
            pattern
        };

        let chars: Vec<char> = custom.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                'y' | 'M' | 'd' | 'H' | 'h' | 'm' | 's' | 'f' | 'F' | 't' | 'z' => {
                    let run = chars[i..].iter().take_while(|&&x| x == c).count();
                    tokens.push(Token::Field(Self::field(c, run, pattern)?));
                    i += run;
                }
                'K' => {
                    tokens.push(Token::Field(Field::Zone));
                    i += 1;
                }
                '\'' | '"' => {
                    let close = chars[i + 1..]
                        .iter()
                        .position(|&q| q == c)
                        .ok_or_else(|| invalid(pattern, "unterminated quoted literal"))?;
                    for &lit in &chars[i + 1..i + 1 + close] {
                        push_literal(&mut tokens, lit);
                    }
                    i += close + 2;
                }
                '\\' => {
                    let escaped = chars
                        .get(i + 1)
                        .ok_or_else(|| invalid(pattern, "dangling escape"))?;
                    push_literal(&mut tokens, *escaped);
                    i += 2;
                }
                '%' => {
                    match chars.get(i + 1) {
                        None | Some('%') => return Err(invalid(pattern, "misplaced '%'")),
                        Some(_) => {}
                    }
                    i += 1;
                }
                other => {
                    push_literal(&mut tokens, other);
                    i += 1;
                }
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    fn field(c: char, run: usize, pattern: &str) -> Result<Field, ConversionError> {
        Ok(match c {
            'y' => Field::Year(run.min(9)),
            'M' => Field::Month(run.min(4)),
            'd' => Field::Day(run.min(4)),
            'H' => Field::Hour24(run.min(2)),
            'h' => Field::Hour12(run.min(2)),
            'm' => Field::Minute(run.min(2)),
            's' => Field::Second(run.min(2)),
            'f' | 'F' => {
                if run > MAX_FRACTION_DIGITS {
                    return Err(invalid(pattern, "more than seven fraction digits"));
                }
                Field::Fraction {
                    digits: run,
                    optional: c == 'F',
                }
            }
            't' => Field::Designator(run.min(2)),
            _ => Field::Offset(run.min(3)),
        })
    }

    /// Pattern text as given
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Format a value
    #[must_use]
    pub fn format(&self, value: &DateTime<FixedOffset>) -> String {
        let mut out = String::with_capacity(self.source.len() + 8);
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Field(field) => write_field(&mut out, *field, value),
            }
        }
        out
    }

    /// Parse `text`, which must match the pattern exactly
    ///
    /// # Errors
    /// Returns a [`ConversionError`] describing the first mismatch
    pub fn parse_exact(&self, text: &str) -> Result<DateTime<FixedOffset>, ConversionError> {
        let mut cursor = Cursor { text, pos: 0 };
        let mut parts = Parts::default();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => cursor.literal(s)?,
                Token::Field(field) => read_field(&mut cursor, *field, &mut parts)?,
            }
        }
        if cursor.pos < text.len() {
            return Err(ConversionError::TrailingInput(cursor.pos));
        }
        parts.assemble()
    }
}

fn pad(out: &mut String, value: impl std::fmt::Display, width: usize) {
    out.push_str(&format!("{value:0width$}"));
}

fn write_offset(out: &mut String, seconds: i32, width: usize) {
    out.push(if seconds < 0 { '-' } else { '+' });
    let abs = seconds.unsigned_abs();
    let hours = abs / 3600;
    let minutes = (abs % 3600) / 60;
    match width {
        1 => pad(out, hours, 1),
        2 => pad(out, hours, 2),
        _ => out.push_str(&format!("{hours:02}:{minutes:02}")),
    }
}

fn write_field(out: &mut String, field: Field, value: &DateTime<FixedOffset>) {
    match field {
        Field::Year(n) if n <= 2 => pad(out, value.year().rem_euclid(100), n),
        Field::Year(n) => pad(out, value.year(), n),
        Field::Month(n) if n <= 2 => pad(out, value.month(), n),
        Field::Month(n) => {
            let names = if n == 3 { &MONTHS_ABBR } else { &MONTHS };
            out.push_str(names[value.month0() as usize]);
        }
        Field::Day(n) if n <= 2 => pad(out, value.day(), n),
        Field::Day(n) => {
            let names = if n == 3 { &DAYS_ABBR } else { &DAYS };
            out.push_str(names[value.weekday().num_days_from_sunday() as usize]);
        }
        Field::Hour24(n) => pad(out, value.hour(), n),
        Field::Hour12(n) => {
            let h = value.hour() % 12;
            pad(out, if h == 0 { 12 } else { h }, n);
        }
        Field::Minute(n) => pad(out, value.minute(), n),
        Field::Second(n) => pad(out, value.second(), n),
        Field::Fraction { digits, optional } => {
            // leap-second nanos run past 1e9
            let nanos = value.nanosecond() % 1_000_000_000;
            let scaled = nanos / 10u32.pow(9 - digits as u32);
            let mut text = format!("{scaled:0digits$}");
            if optional {
                text.truncate(text.trim_end_matches('0').len());
                if text.is_empty() && out.ends_with('.') {
                    out.pop();
                }
            }
            out.push_str(&text);
        }
        Field::Designator(n) => {
            let pm = usize::from(value.hour() >= 12);
            out.push_str(if n == 1 { DESIGNATORS_SHORT[pm] } else { DESIGNATORS[pm] });
        }
        Field::Offset(n) => write_offset(out, value.offset().local_minus_utc(), n),
        Field::Zone => write_offset(out, value.offset().local_minus_utc(), 3),
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn mismatch(&self, expected: impl Into<String>) -> ConversionError {
        let expected = expected.into();
        if self.pos >= self.text.len() {
            ConversionError::UnexpectedEnd {
                position: self.pos,
                expected,
            }
        } else {
            ConversionError::Mismatch {
                position: self.pos,
                expected,
            }
        }
    }

    /// Consume between `min` and `max` ASCII digits, returning value and count
    fn digits(&mut self, min: usize, max: usize, what: &str) -> Result<(u32, usize), ConversionError> {
        let count = self
            .rest()
            .bytes()
            .take(max)
            .take_while(u8::is_ascii_digit)
            .count();
        if count < min {
            return Err(self.mismatch(format!("{min} digit(s) of {what}")));
        }
        let value = self.rest()[..count]
            .bytes()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
        self.pos += count;
        Ok((value, count))
    }

    fn literal(&mut self, literal: &str) -> Result<(), ConversionError> {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            Ok(())
        } else {
            Err(self.mismatch(format!("{literal:?}")))
        }
    }

    /// Case-insensitive match against a name table, longest name first
    fn name(&mut self, names: &[&str], what: &str) -> Result<usize, ConversionError> {
        let rest = self.rest();
        let found = names
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                rest.len() >= n.len()
                    && rest.is_char_boundary(n.len())
                    && rest[..n.len()].eq_ignore_ascii_case(n)
            })
            .max_by_key(|(_, n)| n.len());
        match found {
            Some((index, n)) => {
                self.pos += n.len();
                Ok(index)
            }
            None => Err(self.mismatch(what)),
        }
    }

    fn sign(&mut self) -> Result<i32, ConversionError> {
        match self.rest().as_bytes().first() {
            Some(b'+') => {
                self.pos += 1;
                Ok(1)
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(-1)
            }
            _ => Err(self.mismatch("offset sign")),
        }
    }

    fn offset(&mut self, width: usize) -> Result<i32, ConversionError> {
        let sign = self.sign()?;
        let (hours, minutes) = match width {
            1 => (self.digits(1, 2, "offset hours")?.0, 0),
            2 => (self.digits(2, 2, "offset hours")?.0, 0),
            _ => {
                let (h, _) = self.digits(2, 2, "offset hours")?;
                self.literal(":")?;
                (h, self.digits(2, 2, "offset minutes")?.0)
            }
        };
        if minutes >= 60 {
            return Err(ConversionError::OutOfRange("offset minutes"));
        }
        let total = hours * 60 + minutes;
        if total > MAX_OFFSET_MINUTES {
            return Err(ConversionError::OutOfRange("offset"));
        }
        // bounded by MAX_OFFSET_MINUTES
        Ok(sign * i32::try_from(total).unwrap_or(0))
    }
}

#[derive(Debug, Default)]
struct Parts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    weekday: Option<Weekday>,
    hour24: Option<u32>,
    hour12: Option<u32>,
    pm: Option<bool>,
    minute: Option<u32>,
    second: Option<u32>,
    nanos: Option<u32>,
    offset_minutes: Option<i32>,
}

fn set<T: PartialEq + Copy>(
    slot: &mut Option<T>,
    value: T,
    name: &'static str,
) -> Result<(), ConversionError> {
    match slot {
        Some(existing) if *existing != value => Err(ConversionError::Conflict(name)),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

fn two_or_n(cursor: &mut Cursor<'_>, n: usize, what: &str) -> Result<u32, ConversionError> {
    let min = if n == 1 { 1 } else { 2 };
    Ok(cursor.digits(min, 2, what)?.0)
}

fn read_field(cursor: &mut Cursor<'_>, field: Field, parts: &mut Parts) -> Result<(), ConversionError> {
    match field {
        Field::Year(n) if n <= 2 => {
            let (yy, _) = cursor.digits(n, 2, "year")?;
            // two-digit years map into the century window ending at 2049
            let yy = i32::try_from(yy).map_err(|_| ConversionError::OutOfRange("year"))?;
            let century = TWO_DIGIT_YEAR_MAX - TWO_DIGIT_YEAR_MAX % 100;
            let year = if century + yy > TWO_DIGIT_YEAR_MAX {
                century - 100 + yy
            } else {
                century + yy
            };
            set(&mut parts.year, year, "year")
        }
        Field::Year(n) => {
            let (y, _) = cursor.digits(n, n.max(4), "year")?;
            let year = i32::try_from(y).map_err(|_| ConversionError::OutOfRange("year"))?;
            set(&mut parts.year, year, "year")
        }
        Field::Month(n) if n <= 2 => {
            let month = two_or_n(cursor, n, "month")?;
            set(&mut parts.month, month, "month")
        }
        Field::Month(n) => {
            let names = if n == 3 { &MONTHS_ABBR } else { &MONTHS };
            let index = cursor.name(names, "month name")?;
            // index < 12
            set(&mut parts.month, u32::try_from(index + 1).unwrap_or(0), "month")
        }
        Field::Day(n) if n <= 2 => {
            let day = two_or_n(cursor, n, "day")?;
            set(&mut parts.day, day, "day")
        }
        Field::Day(n) => {
            let names = if n == 3 { &DAYS_ABBR } else { &DAYS };
            let index = cursor.name(names, "day name")?;
            let weekday = WEEKDAYS[index];
            set(&mut parts.weekday, weekday, "day of week")
        }
        Field::Hour24(n) => {
            let hour = two_or_n(cursor, n, "hour")?;
            set(&mut parts.hour24, hour, "hour")
        }
        Field::Hour12(n) => {
            let hour = two_or_n(cursor, n, "hour")?;
            set(&mut parts.hour12, hour, "hour")
        }
        Field::Minute(n) => {
            let minute = two_or_n(cursor, n, "minute")?;
            set(&mut parts.minute, minute, "minute")
        }
        Field::Second(n) => {
            let second = two_or_n(cursor, n, "second")?;
            set(&mut parts.second, second, "second")
        }
        Field::Fraction { digits, optional } => {
            let min = if optional { 0 } else { digits };
            let (value, count) = cursor.digits(min, digits, "fraction")?;
            let nanos = value * 10u32.pow(9 - count as u32);
            set(&mut parts.nanos, nanos, "fraction")
        }
        Field::Designator(n) => {
            let names = if n == 1 { &DESIGNATORS_SHORT } else { &DESIGNATORS };
            let index = cursor.name(names, "AM/PM designator")?;
            set(&mut parts.pm, index == 1, "AM/PM designator")
        }
        Field::Offset(n) => {
            let minutes = cursor.offset(n)?;
            set(&mut parts.offset_minutes, minutes, "offset")
        }
        Field::Zone => {
            let minutes = if cursor.rest().starts_with(['Z', 'z']) {
                cursor.pos += 1;
                0
            } else {
                cursor.offset(3)?
            };
            set(&mut parts.offset_minutes, minutes, "offset")
        }
    }
}

impl Parts {
    fn hour(&self) -> Result<u32, ConversionError> {
        let from12 = match self.hour12 {
            Some(h) if h > 12 => return Err(ConversionError::OutOfRange("hour")),
            Some(h) => Some(match self.pm {
                Some(true) => h % 12 + 12,
                Some(false) => h % 12,
                None => h,
            }),
            None => None,
        };
        match (self.hour24, from12) {
            (Some(a), Some(b)) if a != b => Err(ConversionError::Conflict("hour")),
            (Some(h), _) => {
                if self.pm.is_some_and(|pm| pm != (h >= 12)) {
                    return Err(ConversionError::Conflict("AM/PM designator"));
                }
                Ok(h)
            }
            (None, Some(h)) => Ok(h),
            (None, None) => Ok(0),
        }
    }

    fn assemble(self) -> Result<DateTime<FixedOffset>, ConversionError> {
        let year = self.year.unwrap_or(1);
        if !(1..=9999).contains(&year) {
            return Err(ConversionError::OutOfRange("year"));
        }
        let date = NaiveDate::from_ymd_opt(year, self.month.unwrap_or(1), self.day.unwrap_or(1))
            .ok_or(ConversionError::OutOfRange("date"))?;
        if self.weekday.is_some_and(|w| w != date.weekday()) {
            return Err(ConversionError::DayOfWeekMismatch);
        }
        let time = NaiveTime::from_hms_nano_opt(
            self.hour()?,
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.nanos.unwrap_or(0),
        )
        .ok_or(ConversionError::OutOfRange("time"))?;
        let offset = FixedOffset::east_opt(self.offset_minutes.unwrap_or(0) * 60)
            .ok_or(ConversionError::OutOfRange("offset"))?;
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or(ConversionError::OutOfRange("offset"))
    }
}

/// Format `value` with `pattern` under the invariant culture
///
/// # Errors
/// Returns [`ConversionError::InvalidPattern`] if the pattern is malformed
pub fn format(value: &DateTime<FixedOffset>, pattern: &str) -> Result<String, ConversionError> {
    Ok(Pattern::parse(pattern)?.format(value))
}

/// Parse `text` exactly against `pattern` under the invariant culture
///
/// # Errors
/// Returns a [`ConversionError`] if the pattern is malformed or the text
/// does not match it
pub fn parse_exact(text: &str, pattern: &str) -> Result<DateTime<FixedOffset>, ConversionError> {
    Pattern::parse(pattern)?.parse_exact(text)
}
