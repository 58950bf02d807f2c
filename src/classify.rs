//! Turns storage-layer failures into client-facing `AppError`s.
//!
//! Handlers propagate `StoreError` with `?`; the conversion below decides
//! which failures the client caused (bad cast, duplicate key, schema
//! violation) and which are our own. Anything unrecognised stays a
//! non-operational internal error.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;
use crate::store::StoreError;

lazy_static! {
    // First double- or single-quoted run, honouring backslash escapes.
    static ref QUOTED_VALUE: Regex =
        Regex::new(r#""((?:\\.|[^"\\])*)"|'((?:\\.|[^'\\])*)'"#).unwrap();
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> AppError {
        match error {
            StoreError::Cast { path, value, .. } => {
                AppError::invalid_field(path.clone(), format!("Invalid {}: {}", path, value))
            }
            StoreError::DuplicateKey {
                ref errmsg,
                ref key_value,
            } => {
                let field = key_value
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "value".to_string());
                let value = quoted_value(errmsg)
                    .or_else(|| key_value.values().next().cloned());
                match value {
                    Some(value) => AppError::duplicate_field(
                        field,
                        format!(
                            "Duplicate field value: {}. Please use another value!",
                            value
                        ),
                    ),
                    None => AppError::unexpected(error),
                }
            }
            StoreError::Validation { errors } => {
                AppError::validation(format!("Invalid input data. {}", errors.join(". ")))
            }
            // Handlers check ids up front with their own message; this arm
            // covers ids a store rejects or a caller parses with `?`.
            StoreError::InvalidId(_) => AppError::validation("Invalid ID format"),
            other @ (StoreError::Database(_) | StoreError::Migration(_)) => {
                AppError::unexpected(other)
            }
        }
    }
}

/// The contents of the first quoted string in `text`, without the quotes.
fn quoted_value(text: &str) -> Option<String> {
    let captures = QUOTED_VALUE.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::ObjectId;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_cast_error_names_path_and_value() {
        let error: AppError = StoreError::Cast {
            path: "_id".into(),
            value: "abc".into(),
            kind: "ObjectId".into(),
        }
        .into();
        assert_eq!(error.http_status(), 400);
        assert_eq!(error.message(), "Invalid _id: abc");
        assert!(error.is_operational());
    }

    #[test]
    fn test_duplicate_key_takes_first_quoted_value() {
        let mut key_value = BTreeMap::new();
        key_value.insert("email".to_string(), "a@b.co".to_string());
        let error: AppError = StoreError::DuplicateKey {
            errmsg: concat!(
                "E11000 duplicate key error collection: users ",
                r#"index: email_1 dup key: { email: "a@b.co" }"#
            )
            .into(),
            key_value,
        }
        .into();
        assert_eq!(error.http_status(), 409);
        assert_eq!(
            error.message(),
            "Duplicate field value: a@b.co. Please use another value!"
        );
        assert_eq!(
            error.kind(),
            &ErrorKind::DuplicateField {
                field_name: "email".into()
            }
        );
    }

    #[test]
    fn test_duplicate_key_single_quotes_and_fallback() {
        let error: AppError = StoreError::DuplicateKey {
            errmsg: "dup key: { name: 'Ana' }".into(),
            key_value: BTreeMap::new(),
        }
        .into();
        assert_eq!(
            error.message(),
            "Duplicate field value: Ana. Please use another value!"
        );

        let mut key_value = BTreeMap::new();
        key_value.insert("email".to_string(), "x@y.io".to_string());
        let error: AppError = StoreError::DuplicateKey {
            errmsg: "Key (email)=(x@y.io) already exists.".into(),
            key_value,
        }
        .into();
        assert_eq!(
            error.message(),
            "Duplicate field value: x@y.io. Please use another value!"
        );
    }

    #[test]
    fn test_duplicate_key_without_value_is_internal() {
        let error: AppError = StoreError::DuplicateKey {
            errmsg: "duplicate".into(),
            key_value: BTreeMap::new(),
        }
        .into();
        assert_eq!(error.http_status(), 500);
        assert!(!error.is_operational());
    }

    #[test]
    fn test_schema_validation_joins_messages() {
        let error: AppError = StoreError::Validation {
            errors: vec!["Title is required".into(), "Due date is required".into()],
        }
        .into();
        assert_eq!(
            error.message(),
            "Invalid input data. Title is required. Due date is required"
        );
        assert_eq!(error.http_status(), 400);
    }

    #[test]
    fn test_database_failure_is_not_operational() {
        let error: AppError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(error.http_status(), 500);
        assert!(!error.is_operational());
    }

    #[test]
    fn test_unparseable_id_is_a_client_error() {
        fn lookup(raw: &str) -> Result<ObjectId, AppError> {
            Ok(raw.parse::<ObjectId>()?)
        }

        let error = lookup("not-an-id").unwrap_err();
        assert_eq!(error.http_status(), 400);
        assert_eq!(error.message(), "Invalid ID format");
        assert!(lookup("507f1f77bcf86cd799439011").is_ok());
    }
}
