//! Persistence interface.
//!
//! Handlers talk to the document store only through `TaskStore` and
//! `UserStore`. Two backends exist: `postgres::PgStore` for deployments and
//! `memory::MemoryStore` for tests and database-less runs. Backends report
//! failures as `StoreError`, whose variants mirror the failure shapes the
//! classifier knows how to turn into client errors.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    DateField, GroupCount, Task, TaskDraft, TaskPriority, TaskStatus, User, UserChanges,
};
use crate::validation::OBJECT_ID_REGEX;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 24-character hex primary key, lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Four bytes of big-endian Unix seconds followed by eight random bytes.
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let random = Uuid::new_v4();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);

        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if OBJECT_ID_REGEX.is_match(s) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(StoreError::InvalidId(s.to_string()))
        }
    }
}

/// Failure shapes reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value could not be converted to the type of its column or field.
    #[error("Cast to {kind} failed for value \"{value}\" at path \"{path}\"")]
    Cast {
        path: String,
        value: String,
        kind: String,
    },
    /// A unique index rejected a write. `errmsg` is the store's own text;
    /// `key_value` holds the colliding field(s) when the store reports them.
    #[error("duplicate key error: {errmsg}")]
    DuplicateKey {
        errmsg: String,
        key_value: BTreeMap<String, String>,
    },
    /// Schema-level constraints rejected a document.
    #[error("document failed validation: {}", .errors.join(", "))]
    Validation { errors: Vec<String> },
    /// A reference that is not a well-formed identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Which timestamp a `DateRange` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub field: DateField,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// When false, `to` is an exclusive upper bound.
    pub to_inclusive: bool,
}

impl DateRange {
    pub fn between(field: DateField, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            field,
            from: Some(from),
            to: Some(to),
            to_inclusive: true,
        }
    }

    pub fn until(field: DateField, to: DateTime<Utc>) -> Self {
        Self {
            field,
            from: None,
            to: Some(to),
            to_inclusive: true,
        }
    }

    pub fn before(field: DateField, to: DateTime<Utc>) -> Self {
        Self {
            field,
            from: None,
            to: Some(to),
            to_inclusive: false,
        }
    }

    pub fn since(field: DateField, from: DateTime<Utc>) -> Self {
        Self {
            field,
            from: Some(from),
            to: None,
            to_inclusive: true,
        }
    }

    fn contains(&self, task: &Task) -> bool {
        let value = match self.field {
            DateField::CreatedDate => task.created_at,
            DateField::DueDate => task.due_date,
        };
        let after_start = self.from.map_or(true, |from| value >= from);
        let before_end = self.to.map_or(true, |to| {
            if self.to_inclusive {
                value <= to
            } else {
                value < to
            }
        });
        after_start && before_end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Insertion order.
    #[default]
    Natural,
    DueDateAsc,
    CreatedDateAsc,
    CreatedDateDesc,
}

/// Conditions for `TaskStore::find`. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub assigned_user: Option<String>,
    pub statuses: Vec<TaskStatus>,
    pub priorities: Vec<TaskPriority>,
    pub exclude_status: Option<TaskStatus>,
    pub range: Option<DateRange>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub order: TaskOrder,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(email) = &self.assigned_user {
            if &task.assigned_user != email {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&task.priority) {
            return false;
        }
        if self.exclude_status == Some(task.status) {
            return false;
        }
        if let Some(range) = &self.range {
            if !range.contains(task) {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !task.title.to_lowercase().contains(&term)
                && !task.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

/// Field a statistics query groups on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Status,
    Priority,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Task>, StoreError>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Task>, StoreError>;
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
    async fn insert(&self, task: Task) -> Result<Task, StoreError>;
    /// Returns the updated document, or `None` when no task has that id.
    async fn update(&self, id: &ObjectId, draft: TaskDraft) -> Result<Option<Task>, StoreError>;
    /// Returns the number of deleted documents.
    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError>;
    /// Counts tasks per value of `field`, optionally for one assignee.
    async fn count_by(
        &self,
        field: GroupField,
        assigned_user: Option<&str>,
    ) -> Result<Vec<GroupCount>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<User>, StoreError>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Fails with `StoreError::DuplicateKey` when the email is taken.
    async fn insert(&self, user: User) -> Result<User, StoreError>;
    async fn update(&self, id: &ObjectId, changes: UserChanges)
        -> Result<Option<User>, StoreError>;
    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError>;
}

/// Sorts group counts by key so both backends answer in the same order.
pub(crate) fn sorted_counts(mut counts: Vec<GroupCount>) -> Vec<GroupCount> {
    counts.sort_by(|a, b| a.id.cmp(&b.id));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_generation() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_eq!(a.as_str().len(), 24);
        assert!(OBJECT_ID_REGEX.is_match(a.as_str()));
        assert_ne!(a, b);
        // High timestamp bytes only roll over every ~18 hours.
        assert_eq!(&a.as_str()[..4], &b.as_str()[..4]);
    }

    #[test]
    fn test_object_id_parse_normalises_case() {
        let id: ObjectId = "507F1F77BCF86CD799439011".parse().unwrap();
        assert_eq!(id.as_str(), "507f1f77bcf86cd799439011");

        match "xyz".parse::<ObjectId>() {
            Err(StoreError::InvalidId(raw)) => assert_eq!(raw, "xyz"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
