use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::store::ObjectId;
use crate::validation::{self, EMAIL_REGEX};

/// Represents a user document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub name: String,
    /// bcrypt hash. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// `password_hash` must already be hashed.
    pub fn new(input: UserInput, password_hash: Option<String>) -> Self {
        Self {
            id: ObjectId::new(),
            email: input.email,
            name: input.name,
            password: password_hash,
            github_id: input.github_id,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Applies an update. A missing password or GitHub id keeps the stored one.
    pub fn apply(&mut self, changes: UserChanges) {
        self.email = changes.email;
        self.name = changes.name;
        if changes.password.is_some() {
            self.password = changes.password;
        }
        if changes.github_id.is_some() {
            self.github_id = changes.github_id;
        }
        self.updated_at = Some(Utc::now());
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < 2 {
        let mut error = ValidationError::new("name_length");
        error.message = Some("Name must be at least 2 characters long".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    #[validate(regex(path = "EMAIL_REGEX", message = "Invalid email format"))]
    pub email: String,

    #[validate(custom = "validate_name")]
    pub name: String,

    /// Plain text on the way in; hashed before it reaches a store.
    pub password: Option<String>,

    pub github_id: Option<String>,
}

impl UserInput {
    pub const REQUIRED: &'static [&'static str] = &["email", "name"];

    /// Required fields first, then format rules.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, AppError> {
        validation::require_fields(&payload, Self::REQUIRED)?;
        let input: UserInput = serde_json::from_value(Value::Object(payload))?;
        input.validate()?;
        Ok(input)
    }
}

/// Fields written by an update, with the password already hashed.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub email: String,
    pub name: String,
    pub password: Option<String>,
    pub github_id: Option<String>,
}
