//!
//! # Error Taxonomy
//!
//! This module defines `AppError`, the single error type every handler returns.
//! An `AppError` pairs a closed `ErrorKind` with a caller-facing message; the HTTP
//! status code is derived from the kind and the `fail`/`error` classification is
//! derived from the status code, so no call site picks a status ad hoc.
//!
//! `AppError` implements `actix_web::error::ResponseError`. The default rendering
//! is the production shape (see `crate::responder`); the `ErrorResponder`
//! middleware upgrades it to the verbose development shape when configured.
//! `From` implementations cover the library errors that reach handlers, so the
//! `?` operator works throughout. Persistence failures are converted in
//! `crate::classify`.

use actix_web::{
    error::{BlockingError, JsonPayloadError, PathError, QueryPayloadError, ResponseError},
    http::StatusCode,
    HttpResponse,
};
use serde::Serialize;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use validator::ValidationErrors;

use crate::config::Environment;
use crate::responder;

/// Boxed source error kept for logging and the development rendering.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The closed set of failure kinds.
///
/// Each kind maps to exactly one status code: 4xx for client-caused failures,
/// 500 for `Internal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name")]
pub enum ErrorKind {
    /// A requested document does not exist (404).
    #[serde(rename = "NotFoundError")]
    NotFound { resource: String },
    /// Malformed or incomplete input (400).
    #[serde(rename = "ValidationError")]
    Validation {
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// A unique field collided with an existing document (409).
    #[serde(rename = "DuplicateFieldError")]
    DuplicateField {
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    /// A value outside a closed enumeration (400).
    #[serde(rename = "InvalidEnumValueError")]
    InvalidEnumValue {
        #[serde(rename = "enumName")]
        enum_name: String,
        value: String,
    },
    /// A string that does not parse to an instant (400).
    #[serde(rename = "InvalidDateError")]
    InvalidDate {
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    /// Anything server-caused (500).
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound { .. } => StatusCode::NOT_FOUND,
            ErrorKind::Validation { .. } => StatusCode::BAD_REQUEST,
            ErrorKind::DuplicateField { .. } => StatusCode::CONFLICT,
            ErrorKind::InvalidEnumValue { .. } => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidDate { .. } => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound { .. } => "NotFoundError",
            ErrorKind::Validation { .. } => "ValidationError",
            ErrorKind::DuplicateField { .. } => "DuplicateFieldError",
            ErrorKind::InvalidEnumValue { .. } => "InvalidEnumValueError",
            ErrorKind::InvalidDate { .. } => "InvalidDateError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Message used when a kind is raised without a more specific one.
    pub fn default_message(&self) -> String {
        match self {
            ErrorKind::NotFound { resource } => format!("{} not found", capitalize(resource)),
            ErrorKind::Validation { .. } => "Invalid input data".to_string(),
            ErrorKind::DuplicateField { field_name } => {
                format!("{} already exists", capitalize(field_name))
            }
            ErrorKind::InvalidEnumValue { enum_name, .. } => format!("Invalid {} value", enum_name),
            ErrorKind::InvalidDate { .. } => "Invalid date format".to_string(),
            ErrorKind::Internal => responder::GENERIC_MESSAGE.to_string(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Wire classification of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    /// The caller did something wrong (4xx).
    Fail,
    /// The server did something wrong.
    Error,
}

impl ErrorStatus {
    /// `Fail` iff the decimal code starts with `4`.
    pub fn for_code(code: u16) -> Self {
        if code.to_string().starts_with('4') {
            ErrorStatus::Fail
        } else {
            ErrorStatus::Error
        }
    }
}

/// Represents every failure a request can end with.
///
/// Built where a rule is violated, consumed once by the responder, never
/// mutated in between.
pub struct AppError {
    kind: ErrorKind,
    message: String,
    is_operational: bool,
    source: Option<BoxError>,
    backtrace: Backtrace,
}

impl AppError {
    /// Creates an operational error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            is_operational: true,
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates an operational error carrying the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        let message = kind.default_message();
        Self::new(kind, message)
    }

    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NotFound {
                resource: resource.into(),
            },
            message,
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation { field: None }, message)
    }

    /// A validation failure attributed to one input field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Validation {
                field: Some(field.into()),
            },
            message,
        )
    }

    pub fn duplicate_field(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::DuplicateField {
                field_name: field_name.into(),
            },
            message,
        )
    }

    pub fn invalid_enum(
        enum_name: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorKind::InvalidEnumValue {
                enum_name: enum_name.into(),
                value: value.into(),
            },
            message,
        )
    }

    pub fn invalid_date(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidDate {
                field_name: field_name.into(),
            },
            message,
        )
    }

    /// A deliberate, describable server-side failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wraps a failure nobody anticipated. Non-operational: its message is
    /// only shown in development.
    pub fn unexpected<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Internal,
            message: error.to_string(),
            is_operational: false,
            source: Some(Box::new(error)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_operational(&self) -> bool {
        self.is_operational
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::for_code(self.http_status().as_u16())
    }

    /// Human-readable trace: the error line, its source chain, and the
    /// captured backtrace when `RUST_BACKTRACE` enabled one.
    pub fn stack(&self) -> String {
        let mut stack = self.to_string();
        let mut source: Option<&(dyn std::error::Error + 'static)> = self
            .source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(cause) = source {
            stack.push_str(&format!("\n    caused by: {}", cause));
            source = cause.source();
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            stack.push_str(&format!("\n{}", self.backtrace));
        }
        stack
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("is_operational", &self.is_operational)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Renders the production shape. Verbose rendering happens in
/// `responder::ErrorResponder`, which has access to the configured environment.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        if !self.is_operational {
            log::error!("unexpected failure: {:?}", self);
        }
        responder::render(self, Environment::Production).into_response()
    }
}

/// Picks the lexically first offending field so the reported message does not
/// depend on hash map iteration order.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        let first = fields
            .into_iter()
            .find_map(|(field, errs)| errs.first().map(|err| (field, err.clone())));

        match first {
            Some((field, err)) => {
                let message = err
                    .message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                AppError::invalid_field(field, message)
            }
            None => AppError::validation(errors.to_string()),
        }
    }
}

/// A payload that is valid JSON but has the wrong shape for its target type.
impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> AppError {
        AppError::validation(format!("Invalid input data. {}", error))
    }
}

impl From<JsonPayloadError> for AppError {
    fn from(error: JsonPayloadError) -> AppError {
        AppError::validation(format!("Invalid request body: {}", error))
    }
}

impl From<QueryPayloadError> for AppError {
    fn from(error: QueryPayloadError) -> AppError {
        AppError::validation(format!("Invalid query string: {}", error))
    }
}

impl From<PathError> for AppError {
    fn from(error: PathError) -> AppError {
        AppError::validation(format!("Invalid path: {}", error))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::unexpected(error)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::unexpected(error)
    }
}

impl From<BlockingError> for AppError {
    fn from(error: BlockingError) -> AppError {
        AppError::unexpected(error)
    }
}
