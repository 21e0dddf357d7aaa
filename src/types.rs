//! Shared value types: logical time, content hashes and boundary parsing
use super::error::CustodyError;
use chrono::{DateTime, Utc};
use std::fmt;

/// A host-assigned ordering value. Components read it from the invocation
/// context and never sample the clock themselves.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct LogicalTimestamp(i64);

impl LogicalTimestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }
    pub fn value(&self) -> i64 {
        self.0
    }
    /// Interprets the value as nanoseconds since the unix epoch. Display only.
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl From<DateTime<Utc>> for LogicalTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        // dates past 2262 do not fit in i64 nanoseconds
        LogicalTimestamp(value.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> minicbor::Encode<C> for LogicalTimestamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for LogicalTimestamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(LogicalTimestamp(d.i64()?))
    }
}

/// A sha256 digest in lowercase hex, used to reference content by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(raw: &str) -> Result<Self, CustodyError> {
        let raw = raw.trim();
        if raw.len() != 64 {
            return Err(CustodyError::validation(
                "content hash",
                format!("expected 64 hex characters, got {}", raw.len()),
            ));
        }
        if !raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(CustodyError::validation(
                "content hash",
                "only lowercase hex characters are allowed",
            ));
        }
        Ok(Self(raw.to_string()))
    }
    /// Digest of arbitrary content.
    pub fn of(content: &[u8]) -> Self {
        Self(sha256::digest(content))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for ContentHash {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ContentHash {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw = d.str()?;

        ContentHash::parse(raw)
            .map_err(|_| minicbor::decode::Error::message("malformed content hash"))
    }
}

/// Parses a unit count supplied as text. Zero is allowed.
pub fn parse_quantity(field: &str, raw: &str) -> Result<u64, CustodyError> {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(value) => Ok(value),
        Err(_) if raw.parse::<i128>().is_ok() => {
            Err(CustodyError::validation(field, "must not be negative"))
        }
        Err(_) => Err(CustodyError::validation(
            field,
            format!("'{raw}' is not a whole number"),
        )),
    }
}

/// Parses a unit count that must be strictly positive.
pub fn parse_positive_quantity(field: &str, raw: &str) -> Result<u64, CustodyError> {
    match parse_quantity(field, raw)? {
        0 => Err(CustodyError::validation(field, "must be greater than zero")),
        value => Ok(value),
    }
}

/// Rejects empty or whitespace-only values for required text fields.
pub fn require_text(field: &str, value: &str) -> Result<(), CustodyError> {
    if value.trim().is_empty() {
        return Err(CustodyError::validation(field, "must not be empty"));
    }
    Ok(())
}
