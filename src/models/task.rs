use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;
use crate::store::ObjectId;
use crate::validation::{self, Enumerated};

/// Represents the priority of a task.
/// Corresponds to the `task_priority` SQL enum.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type,
)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl Enumerated for TaskPriority {
    const LABEL: &'static str = "priority";
    const ALL: &'static [Self] = &[TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

/// Represents the status of a task.
/// Corresponds to the `task_status` SQL enum.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type,
)]
#[sqlx(type_name = "task_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task is waiting to be picked up.
    #[default]
    Pending,
    /// Task is currently being worked on.
    InProgress,
    /// Task was acknowledged but nobody has started it.
    NotStarted,
    /// Task is done.
    Completed,
}

impl Enumerated for TaskStatus {
    const LABEL: &'static str = "status";
    const ALL: &'static [Self] = &[
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::NotStarted,
        TaskStatus::Completed,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::NotStarted => "not-started",
            TaskStatus::Completed => "completed",
        }
    }
}

/// The timestamp a date-range query filters on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DateField {
    CreatedDate,
    #[default]
    DueDate,
}

impl Enumerated for DateField {
    const LABEL: &'static str = "date field";
    const ALL: &'static [Self] = &[DateField::CreatedDate, DateField::DueDate];

    fn as_str(&self) -> &'static str {
        match self {
            DateField::CreatedDate => "createdDate",
            DateField::DueDate => "dueDate",
        }
    }
}

/// Represents a task document as stored and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Email address of the assignee.
    pub assigned_user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new `Task` from a validated draft, filling in the default
    /// priority and status when the draft left them out.
    pub fn new(draft: TaskDraft) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            title: draft.title,
            description: draft.description,
            due_date: draft.due_date,
            priority: draft.priority.unwrap_or_default(),
            status: draft.status.unwrap_or_default(),
            assigned_user: draft.assigned_user,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the document with a draft. Absent enum fields keep their
    /// stored value.
    pub fn apply(&mut self, draft: TaskDraft) {
        self.title = draft.title;
        self.description = draft.description;
        self.due_date = draft.due_date;
        self.assigned_user = draft.assigned_user;
        if let Some(priority) = draft.priority {
            self.priority = priority;
        }
        if let Some(status) = draft.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }
}

/// Raw task payload, after the required-field check has passed.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[validate(length(max = 200, message = "title must be at most 200 characters"))]
    pub title: String,

    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: String,

    pub due_date: String,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub assigned_user: String,
}

impl TaskInput {
    pub const REQUIRED: &'static [&'static str] =
        &["title", "description", "dueDate", "assignedUser"];
}

/// A task payload that passed every rule, ready for the store.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub assigned_user: String,
}

impl TaskDraft {
    /// Runs the task rules in order: required fields, enum fields, date
    /// fields, then cross-field rules. The first failure is returned.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, AppError> {
        validation::require_fields(&payload, TaskInput::REQUIRED)?;
        let input: TaskInput = serde_json::from_value(Value::Object(payload))?;

        let priority = validation::check_enum::<TaskPriority>(input.priority.as_deref())?;
        let status = validation::check_enum::<TaskStatus>(input.status.as_deref())?;

        let due_date =
            validation::check_date("dueDate", &input.due_date, "Invalid due date format")?;

        validation::check_email(
            &input.assigned_user,
            "assignedUser",
            "Invalid email format for assignedUser",
        )?;
        input.validate()?;

        Ok(Self {
            title: input.title,
            description: input.description,
            due_date,
            priority,
            status,
            assigned_user: input.assigned_user,
        })
    }
}

/// Count of documents sharing one value of the grouped field.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct GroupCount {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: i64,
}

/// Task totals for one assignee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTaskStats {
    pub email: String,
    pub total: i64,
    pub by_status: Vec<GroupCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    fn valid() -> Value {
        json!({
            "title": "Write report",
            "description": "Quarterly numbers",
            "dueDate": "2024-05-10",
            "assignedUser": "ana@example.com"
        })
    }

    #[test]
    fn test_task_creation_defaults() {
        let draft = TaskDraft::from_payload(payload(valid())).unwrap();
        let task = Task::new(draft);
        assert_eq!(task.title, "Write report");
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(task.id.as_str().len(), 24);
    }

    #[test]
    fn test_empty_enum_fields_take_defaults() {
        let mut body = payload(valid());
        body.insert("priority".into(), json!(""));
        body.insert("status".into(), json!(""));
        let draft = TaskDraft::from_payload(body).unwrap();
        assert_eq!(draft.priority, None);
        assert_eq!(draft.status, None);

        let task = Task::new(draft);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_missing_required_field_is_named() {
        for field in TaskInput::REQUIRED {
            let mut body = payload(valid());
            body.remove(*field);
            let error = TaskDraft::from_payload(body).unwrap_err();
            assert_eq!(error.message(), format!("{} is required", field));
            assert_eq!(error.http_status(), 400);
        }
    }

    #[test]
    fn test_enum_checks_run_before_date_checks() {
        let mut body = payload(valid());
        body.insert("status".into(), json!("archived"));
        body.insert("dueDate".into(), json!("not a date"));
        let error = TaskDraft::from_payload(body).unwrap_err();
        assert_eq!(
            error.message(),
            "Status must be pending, in-progress, not-started, or completed"
        );
        assert!(matches!(error.kind(), ErrorKind::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_invalid_due_date() {
        let mut body = payload(valid());
        body.insert("dueDate".into(), json!("someday"));
        let error = TaskDraft::from_payload(body).unwrap_err();
        assert_eq!(error.message(), "Invalid due date format");
        assert!(matches!(error.kind(), ErrorKind::InvalidDate { .. }));
    }

    #[test]
    fn test_invalid_assignee_email() {
        let mut body = payload(valid());
        body.insert("assignedUser".into(), json!("ana at example"));
        let error = TaskDraft::from_payload(body).unwrap_err();
        assert_eq!(error.message(), "Invalid email format for assignedUser");
    }

    #[test]
    fn test_title_length_limit() {
        let mut body = payload(valid());
        body.insert("title".into(), json!("a".repeat(201)));
        let error = TaskDraft::from_payload(body).unwrap_err();
        assert_eq!(error.message(), "title must be at most 200 characters");
    }

    #[test]
    fn test_apply_keeps_enums_when_absent() {
        let mut task = Task::new(TaskDraft::from_payload(payload(valid())).unwrap());
        task.status = TaskStatus::InProgress;

        let mut body = payload(valid());
        body.insert("title".into(), json!("Rewritten"));
        task.apply(TaskDraft::from_payload(body).unwrap());

        assert_eq!(task.title, "Rewritten");
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_task_serializes_with_document_field_names() {
        let task = Task::new(TaskDraft::from_payload(payload(valid())).unwrap());
        let value = serde_json::to_value(&task).unwrap();
        assert!(value["_id"].is_string());
        assert_eq!(value["assignedUser"], "ana@example.com");
        assert_eq!(value["status"], "pending");
        assert!(value["dueDate"].is_string());
    }
}
