use core::{fmt, str::FromStr};

use crate::{Error, MAX_SEED, Result, TICK_OVER};

/// Field separator in the on-disk record.
pub const FIELD_SEPARATOR: char = '|';

/// Marker standing in for a field that should come from configuration.
pub const PLACEHOLDER: char = '~';

/// Upper bound on the encoded size of a record, in bytes.
///
/// The longest full record is `281474976710655|65535|65535|` (28 bytes).
pub const PROGRESS_FILESIZE: usize = 32;

/// The persisted progress of a generator.
///
/// `base` is always the seed form (`base >> 16` of the live generator).
/// `counter` and `increment` are `None` in a *partial* record, meaning
/// "resume with the configured start/increment".
///
/// # Encoding
///
/// - Full: `<base>|<counter>|<increment>`
/// - Partial: `<base>|~|~`
///
/// # Example
/// ```
/// use txnid::ProgressRecord;
///
/// let full: ProgressRecord = "100|42|3".parse().unwrap();
/// assert_eq!(full, ProgressRecord::full(100, 42, 3));
///
/// let partial = ProgressRecord::partial(7);
/// assert_eq!(partial.to_string(), "7|~|~");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressRecord {
    pub base: u64,
    pub counter: Option<u64>,
    pub increment: Option<u16>,
}

/// A [`ProgressRecord`] with every placeholder replaced by its configured
/// default: everything needed to construct a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumePoint {
    pub base: u64,
    pub counter: u64,
    pub increment: u16,
}

impl ProgressRecord {
    /// An exact, resumable state. Written at graceful shutdown.
    pub const fn full(base: u64, counter: u64, increment: u16) -> Self {
        Self {
            base,
            counter: Some(counter),
            increment: Some(increment),
        }
    }

    /// Only the base. Written on rollover and at startup.
    pub const fn partial(base: u64) -> Self {
        Self {
            base,
            counter: None,
            increment: None,
        }
    }

    pub const fn is_partial(&self) -> bool {
        self.counter.is_none() && self.increment.is_none()
    }

    /// Fills placeholder fields from configuration.
    pub fn resolve(&self, start: u64, increment: u16) -> ResumePoint {
        ResumePoint {
            base: self.base,
            counter: self.counter.unwrap_or(start),
            increment: self.increment.unwrap_or(increment),
        }
    }
}

impl fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        match self.counter {
            Some(counter) => write!(f, "{FIELD_SEPARATOR}{counter}")?,
            None => write!(f, "{FIELD_SEPARATOR}{PLACEHOLDER}")?,
        }
        match self.increment {
            Some(increment) => write!(f, "{FIELD_SEPARATOR}{increment}"),
            None => write!(f, "{FIELD_SEPARATOR}{PLACEHOLDER}"),
        }
    }
}

impl FromStr for ProgressRecord {
    type Err = Error;

    /// Parses `<base>|<counter>|<increment>`.
    ///
    /// Trailing whitespace and a single trailing `|` are tolerated, since
    /// older writers terminated every record with a separator.
    fn from_str(raw: &str) -> Result<Self> {
        let malformed = || Error::Malformed {
            raw: raw.to_string(),
        };

        let trimmed = raw.trim_end();
        let trimmed = trimmed
            .strip_suffix(FIELD_SEPARATOR)
            .unwrap_or(trimmed);

        let mut fields = trimmed.split(FIELD_SEPARATOR);
        let (Some(base), Some(counter), Some(increment), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        let base = parse_field::<u64>("base", base)?;
        if base > MAX_SEED {
            return Err(invalid("base", base, format!("exceeds {MAX_SEED}")));
        }

        let counter = parse_optional::<u64>("counter", counter)?;
        if let Some(counter) = counter.filter(|c| *c >= TICK_OVER) {
            return Err(invalid("counter", counter, format!("must be below {TICK_OVER}")));
        }

        let increment = parse_optional::<u16>("increment", increment)?;
        if increment == Some(0) {
            return Err(invalid("increment", 0, "must be positive".to_string()));
        }

        Ok(Self {
            base,
            counter,
            increment,
        })
    }
}

fn invalid(field: &'static str, value: impl fmt::Display, reason: String) -> Error {
    Error::InvalidField {
        field,
        value: value.to_string(),
        reason,
    }
}

fn parse_field<T>(field: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    // `u64::from_str` accepts a leading `+`, which no writer ever produces.
    if !value.bytes().all(|b| b.is_ascii_digit()) || value.is_empty() {
        return Err(invalid(field, value, "not a non-negative integer".to_string()));
    }
    value
        .parse::<T>()
        .map_err(|e| invalid(field, value, e.to_string()))
}

fn parse_optional<T>(field: &'static str, value: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if value.starts_with(PLACEHOLDER) {
        return Ok(None);
    }
    parse_field(field, value).map(Some)
}
