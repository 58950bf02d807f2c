//! Postgres backend.
//!
//! Tasks and users live in two tables keyed by `ObjectId` text. Status and
//! priority use the `task_status` / `task_priority` SQL enums. Database
//! errors are translated into the `StoreError` shapes the classifier
//! understands (unique violations, bad casts, constraint failures).

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::postgres::{PgDatabaseError, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;

use super::{
    GroupField, ObjectId, StoreError, TaskFilter, TaskOrder, TaskStore, UserStore,
};
use crate::models::{DateField, GroupCount, Task, TaskDraft, User, UserChanges};
use crate::validation::Enumerated;

const TASK_COLUMNS: &str =
    "id, title, description, due_date, priority, status, assigned_user, created_at, updated_at";
const USER_COLUMNS: &str = "id, email, name, password, github_id, created_at, updated_at";

lazy_static! {
    // Key (email)=(ana@example.com) already exists.
    static ref KEY_DETAIL_REGEX: Regex =
        Regex::new(r"Key \((?P<keys>[^)]*)\)=\((?P<values>.*)\) already exists").unwrap();
    // invalid input value for enum task_status: "archived"
    static ref CAST_MESSAGE_REGEX: Regex = Regex::new(
        r#"^invalid input (?:value|syntax) for (?:enum |type )?(?P<kind>.+?): "(?P<value>.*)"$"#
    )
    .unwrap();
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> StoreError {
        let (code, message, detail) = match &error {
            sqlx::Error::Database(db) => (
                db.code().map(|code| code.into_owned()),
                db.message().to_string(),
                db.try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_string),
            ),
            _ => return StoreError::Database(error),
        };

        match code.as_deref() {
            // unique_violation
            Some("23505") => {
                let errmsg = detail.unwrap_or(message);
                StoreError::DuplicateKey {
                    key_value: parse_key_detail(&errmsg),
                    errmsg,
                }
            }
            // invalid_text_representation, invalid_datetime_format, datetime_field_overflow
            Some("22P02") | Some("22007") | Some("22008") => match parse_cast_message(&message) {
                Some(cast) => cast,
                None => StoreError::Database(error),
            },
            // not_null_violation, check_violation
            Some("23502") | Some("23514") => StoreError::Validation {
                errors: vec![message],
            },
            _ => StoreError::Database(error),
        }
    }
}

/// Splits `Key (a, b)=(x, y) already exists.` into `{a: x, b: y}`.
fn parse_key_detail(detail: &str) -> BTreeMap<String, String> {
    let Some(captures) = KEY_DETAIL_REGEX.captures(detail) else {
        return BTreeMap::new();
    };
    let keys = captures["keys"].split(", ");
    let values = captures["values"].split(", ");
    keys.zip(values)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_cast_message(message: &str) -> Option<StoreError> {
    let captures = CAST_MESSAGE_REGEX.captures(message)?;
    let kind = captures["kind"].to_string();
    Some(StoreError::Cast {
        path: kind.clone(),
        value: captures["value"].to_string(),
        kind,
    })
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn date_column(field: DateField) -> &'static str {
    match field {
        DateField::CreatedDate => "created_at",
        DateField::DueDate => "due_date",
    }
}

/// Builds `SELECT ... FROM tasks WHERE ... ORDER BY ...` for a filter.
fn select_tasks(filter: &TaskFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
    let mut first = true;
    let mut and_where = |builder: &mut QueryBuilder<'static, Postgres>| {
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if let Some(email) = &filter.assigned_user {
        and_where(&mut builder);
        builder.push("assigned_user = ").push_bind(email.clone());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        and_where(&mut builder);
        builder.push("status::text = ANY(").push_bind(statuses).push(")");
    }
    if !filter.priorities.is_empty() {
        let priorities: Vec<String> =
            filter.priorities.iter().map(|p| p.as_str().to_string()).collect();
        and_where(&mut builder);
        builder.push("priority::text = ANY(").push_bind(priorities).push(")");
    }
    if let Some(status) = filter.exclude_status {
        and_where(&mut builder);
        builder.push("status::text <> ").push_bind(status.as_str().to_string());
    }
    if let Some(range) = &filter.range {
        let column = date_column(range.field);
        if let Some(from) = range.from {
            and_where(&mut builder);
            builder.push(format!("{} >= ", column)).push_bind(from);
        }
        if let Some(to) = range.to {
            and_where(&mut builder);
            let op = if range.to_inclusive { "<=" } else { "<" };
            builder.push(format!("{} {} ", column, op)).push_bind(to);
        }
    }
    if let Some(term) = &filter.search {
        let pattern = format!("%{}%", escape_like(term));
        and_where(&mut builder);
        builder
            .push("(title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    builder.push(match filter.order {
        TaskOrder::Natural | TaskOrder::CreatedDateAsc => " ORDER BY created_at, id",
        TaskOrder::DueDateAsc => " ORDER BY due_date, id",
        TaskOrder::CreatedDateDesc => " ORDER BY created_at DESC, id DESC",
    });
    builder
}

#[async_trait]
impl TaskStore for PgStore {
    async fn find_all(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks ORDER BY created_at, id",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut builder = select_tasks(filter);
        let tasks = builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let inserted = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {cols}",
            cols = TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority)
        .bind(task.status)
        .bind(&task.assigned_user)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update(&self, id: &ObjectId, draft: TaskDraft) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $1, description = $2, due_date = $3, assigned_user = $4,
                 priority = COALESCE($5, priority), status = COALESCE($6, status),
                 updated_at = NOW()
             WHERE id = $7
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(draft.title)
        .bind(draft.description)
        .bind(draft.due_date)
        .bind(draft.assigned_user)
        .bind(draft.priority)
        .bind(draft.status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_by(
        &self,
        field: GroupField,
        assigned_user: Option<&str>,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let column = match field {
            GroupField::Status => "status",
            GroupField::Priority => "priority",
        };
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}::text AS id, COUNT(*) AS count FROM tasks",
            column
        ));
        if let Some(email) = assigned_user {
            builder.push(" WHERE assigned_user = ").push_bind(email.to_string());
        }
        builder.push(format!(" GROUP BY {} ORDER BY 1", column));

        let counts = builder
            .build_query_as::<GroupCount>()
            .fetch_all(&self.pool)
            .await?;
        Ok(counts)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at, id",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let inserted = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {cols}",
            cols = USER_COLUMNS
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password)
        .bind(&user.github_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update(
        &self,
        id: &ObjectId,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET email = $1, name = $2,
                 password = COALESCE($3, password), github_id = COALESCE($4, github_id),
                 updated_at = NOW()
             WHERE id = $5
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(changes.email)
        .bind(changes.name)
        .bind(changes.password)
        .bind(changes.github_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
