//! Request validators.
//!
//! Every function here is pure: it inspects its input and either passes a
//! typed value on or returns the first `AppError` it hits. Nothing touches a
//! store, so the same request always gets the same verdict.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::store::ObjectId;

lazy_static! {
    /// Something before `@`, something after it containing a dot, no whitespace.
    pub static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    /// The storage layer's primary-key surface format.
    pub static ref OBJECT_ID_REGEX: Regex = Regex::new(r"^[0-9a-fA-F]{24}$").unwrap();
}

/// A closed set of string values checked by membership.
pub trait Enumerated: Sized + Copy + 'static {
    /// Field name used in messages, e.g. `status`.
    const LABEL: &'static str;
    /// Every member, in the order messages list them.
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|member| member.as_str() == value)
    }

    /// `"Status must be pending, in-progress, not-started, or completed"`.
    fn allowed_message() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
        format!("{} must be {}", capitalize(Self::LABEL), join_or(&names))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_or(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} or {}", first, second),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Fails on the first field, in the order given, that is absent, `null`,
/// `false` or an empty string.
pub fn require_fields(payload: &Map<String, Value>, fields: &[&str]) -> Result<(), AppError> {
    match fields.iter().find(|field| is_missing(payload.get(**field))) {
        Some(field) => Err(AppError::invalid_field(
            *field,
            format!("{} is required", field),
        )),
        None => Ok(()),
    }
}

/// Optional enum field: absent or empty means "use the default", anything
/// else must be a member.
pub fn check_enum<E: Enumerated>(value: Option<&str>) -> Result<Option<E>, AppError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => require_enum::<E>(raw).map(Some),
    }
}

/// Mandatory enum value, such as a path segment.
pub fn require_enum<E: Enumerated>(value: &str) -> Result<E, AppError> {
    E::parse(value)
        .ok_or_else(|| AppError::invalid_enum(E::LABEL, value, E::allowed_message()))
}

/// Parses the date formats the API accepts. Values without an offset are
/// read as UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn check_date(field: &str, value: &str, message: &str) -> Result<DateTime<Utc>, AppError> {
    parse_date(value).ok_or_else(|| AppError::invalid_date(field, message))
}

/// Both bounds must parse and `start <= end`.
pub fn check_date_range(
    start: &str,
    end: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    const FORMAT_MESSAGE: &str = "Invalid date format. Use YYYY-MM-DD";
    let start = check_date("startDate", start, FORMAT_MESSAGE)?;
    let end = check_date("endDate", end, FORMAT_MESSAGE)?;
    if start > end {
        return Err(AppError::validation("Start date must be before end date"));
    }
    Ok((start, end))
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

pub fn check_email(value: &str, field: &str, message: &str) -> Result<(), AppError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(AppError::invalid_field(field, message))
    }
}

/// A non-empty JSON array whose every element is a member of `E`. The first
/// offending element, in array order, is reported.
pub fn check_enum_list<E: Enumerated>(
    value: Option<&Value>,
    field: &str,
) -> Result<Vec<E>, AppError> {
    let items = match value {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(AppError::invalid_field(
                field,
                format!("{} must be a non-empty array", field),
            ))
        }
    };

    items
        .iter()
        .map(|item| {
            let raw = match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            E::parse(&raw).ok_or_else(|| {
                let message = format!("Invalid {}: {}", E::LABEL, raw);
                AppError::invalid_enum(E::LABEL, raw.clone(), message)
            })
        })
        .collect()
}

/// Exactly 24 hex characters, either case.
pub fn check_object_id(value: &str, message: &str) -> Result<ObjectId, AppError> {
    value
        .parse::<ObjectId>()
        .map_err(|_| AppError::invalid_field("id", message))
}
