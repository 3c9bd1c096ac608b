//! The decoded log record.

use crate::error::{HydraError, Result};
use chrono::{DateTime, Local, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// One decoded log event.
///
/// A record is a typed timestamp plus a mapping from field name to value.
/// The reserved names (`level`, `message`, `facility`, `identity`) have
/// convenience accessors; anything else declared in the file's field
/// vector is reachable through [`get`](Self::get). Accessing a field the
/// record does not carry is an explicit error; probe with
/// [`has`](Self::has) first.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    timestamp: f64,
    fields: BTreeMap<String, String>,
}

impl LogRecord {
    /// Creates an empty record at the given epoch timestamp.
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Value of a field, or [`HydraError::NoSuchField`] when the record
    /// does not carry it.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| HydraError::NoSuchField(name.to_string()))
    }

    /// Returns `true` when the record carries the field.
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates `(name, value)` pairs in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Seconds since the Unix epoch, fractional when the file's tick scale
    /// is finer than one second.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Timestamp as a UTC datetime.
    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        let secs = self.timestamp.floor();
        let nanos = ((self.timestamp - secs) * 1e9).round() as u32;
        let nanos = nanos.min(999_999_999);
        DateTime::from_timestamp(secs as i64, nanos).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Timestamp in the local timezone.
    pub fn timestamp_local(&self) -> DateTime<Local> {
        self.timestamp_utc().with_timezone(&Local)
    }

    /// The canonicalized level, when present.
    pub fn level(&self) -> Option<&str> {
        self.fields.get("level").map(String::as_str)
    }

    /// The message, when present.
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").map(String::as_str)
    }

    /// The facility, when present.
    pub fn facility(&self) -> Option<&str> {
        self.fields.get("facility").map(String::as_str)
    }

    /// The identity, when present.
    pub fn identity(&self) -> Option<&str> {
        self.fields.get("identity").map(String::as_str)
    }
}

impl fmt::Display for LogRecord {
    /// Renders `"<local-ts> <level> <facility> <identity>: <message>"`,
    /// omitting absent parts, without a trailing newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp_local();
        let stamp = if self.timestamp.fract() == 0.0 {
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        };
        let mut head = stamp;
        for part in [self.level(), self.facility(), self.identity()]
            .into_iter()
            .flatten()
        {
            head.push(' ');
            head.push_str(part);
        }
        match self.message() {
            Some(msg) => write!(f, "{head}: {msg}"),
            None => write!(f, "{head}"),
        }
    }
}
