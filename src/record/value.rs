//! Tagged cell values.
//!
//! Every table column has a fixed [`ColumnKind`] taken from its schema; cells carry
//! the matching [`CellValue`] variant. Only free-text columns fall back to sniffing
//! the shape of a value ([`Domain::sniff`]) when they are compared.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Display and parse format for dates.
pub const DATE_FORMAT: &str = "%d.%m.%Y";
/// Display and parse format for times of day.
pub const TIME_FORMAT: &str = "%H:%M:%S";
/// Shown for missing values; always sorts last in ascending order.
pub const PLACEHOLDER: &str = "-";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnKind {
    /// Whole numbers (ids, session references)
    Integer,
    /// Measured values
    Float,
    /// Calendar dates, `DD.MM.YYYY`
    Date,
    /// Times of day, `HH:MM:SS`
    Time,
    /// Free text
    Text,
}

impl ColumnKind {
    /// Parse operator input into a cell of this kind.
    pub fn parse(self, raw: &str) -> Option<CellValue> {
        let raw = raw.trim();
        if raw == PLACEHOLDER || raw.is_empty() {
            return Some(CellValue::Missing);
        }
        match self {
            ColumnKind::Integer => raw.parse().ok().map(CellValue::Integer),
            ColumnKind::Float => parse_number(raw).map(CellValue::Float),
            ColumnKind::Date => parse_date(raw).map(CellValue::Date),
            ColumnKind::Time => parse_time(raw).map(CellValue::Time),
            ColumnKind::Text => Some(CellValue::Text(raw.to_string())),
        }
    }

    /// Comparison domain of a typed column; `None` for text, which is sniffed per value.
    pub fn domain(self) -> Option<Domain> {
        match self {
            ColumnKind::Integer | ColumnKind::Float => Some(Domain::Number),
            ColumnKind::Date => Some(Domain::Date),
            ColumnKind::Time => Some(Domain::Time),
            ColumnKind::Text => None,
        }
    }
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Whole number
    Integer(i64),
    /// Real number
    Float(f64),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Free text
    Text(String),
    /// No value
    Missing,
}

impl CellValue {
    /// Numeric view of the cell. Text is parsed; non-finite numbers count as missing.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            CellValue::Integer(v) => *v as f64,
            CellValue::Float(v) => *v,
            CellValue::Text(s) => parse_number(s)?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// `Missing`, a non-finite float, or the literal `-`.
    pub fn is_placeholder(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Float(v) => !v.is_finite(),
            CellValue::Text(s) => s.trim() == PLACEHOLDER,
            _ => false,
        }
    }

    /// Comparison key of this cell in `domain`.
    pub fn key(&self, domain: Domain) -> Option<Key> {
        if self.is_placeholder() {
            return None;
        }
        match (self, domain) {
            (CellValue::Date(d), Domain::Date) => Some(Key::Date(*d)),
            (CellValue::Time(t), Domain::Time) => Some(Key::Time(*t)),
            (CellValue::Text(s), _) => Key::parse(domain, s),
            (_, Domain::Number) => self.as_f64().map(Key::Number),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Float(v) if v.is_finite() => {
                write!(f, "{}", (v * 10_000.0).round() / 10_000.0)
            }
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            CellValue::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Float(_) | CellValue::Missing => f.write_str(PLACEHOLDER),
        }
    }
}

/// How two values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Numeric order
    Number,
    /// Calendar order
    Date,
    /// Time-of-day order
    Time,
    /// Plain string order
    Text,
}

impl Domain {
    /// Guess the domain of a free-text value from its shape: a `:` means a time,
    /// more than one `.` means a date, anything that parses as a number is
    /// numeric, everything else is plain text.
    pub fn sniff(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains(':') {
            Domain::Time
        } else if raw.matches('.').count() > 1 {
            Domain::Date
        } else if parse_number(raw).is_some() {
            Domain::Number
        } else {
            Domain::Text
        }
    }
}

/// A value reduced to its comparison domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Numeric key
    Number(f64),
    /// Date key
    Date(NaiveDate),
    /// Time key
    Time(NaiveTime),
    /// Text key
    Text(String),
}

impl Key {
    /// Parse `raw` in `domain`.
    pub fn parse(domain: Domain, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match domain {
            Domain::Number => parse_number(raw).map(Key::Number),
            Domain::Date => parse_date(raw).map(Key::Date),
            Domain::Time => parse_time(raw).map(Key::Time),
            Domain::Text => Some(Key::Text(raw.to_string())),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b),
            (Key::Date(a), Key::Date(b)) => a.partial_cmp(b),
            (Key::Time(a), Key::Time(b)) => a.partial_cmp(b),
            (Key::Text(a), Key::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Parse a finite number; a decimal comma is accepted.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let parsed = match raw.parse::<f64>() {
        Ok(v) => v,
        Err(_) => raw.replacen(',', ".", 1).parse::<f64>().ok()?,
    };
    parsed.is_finite().then_some(parsed)
}

/// Parse a `DD.MM.YYYY` date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Parse an `HH:MM:SS` time of day.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).ok()
}
