use actix_web::{delete, get, post, put, web, Responder};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    error::AppError,
    models::{DateField, Task, TaskDraft, TaskPriority, TaskStatus, UserTaskStats},
    response,
    state::AppState,
    store::{DateRange, GroupField, ObjectId, TaskFilter, TaskOrder},
    validation,
};

const RECENT_DAYS_DEFAULT: i64 = 7;

fn task_id(raw: &str) -> Result<ObjectId, AppError> {
    validation::check_object_id(raw, "Invalid task ID format")
}

/// Names the id as the caller wrote it.
fn task_not_found(id: &str) -> AppError {
    AppError::not_found("task", format!("No task found with id: {}", id))
}

/// Lists every task in insertion order.
#[get("")]
pub async fn get_tasks(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let tasks = state.tasks.find_all().await?;
    Ok(response::ok(tasks))
}

/// Creates a task.
///
/// ## Request Body:
/// - `title`, `description`, `dueDate`, `assignedUser` (required)
/// - `priority` (optional): `low`, `medium` (default) or `high`
/// - `status` (optional): `pending` (default), `in-progress`, `not-started`, `completed`
///
/// ## Responses:
/// - `201 Created`: the stored task.
/// - `400 Bad Request`: the first rule the payload breaks.
#[post("")]
pub async fn create_task(
    state: web::Data<AppState>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let draft = TaskDraft::from_payload(body.into_inner())?;
    let task = state.tasks.insert(Task::new(draft)).await?;
    Ok(response::created(task))
}

/// Fetches one task by its 24-hex id.
#[get("/{id}")]
pub async fn get_task(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = task_id(&path)?;
    match state.tasks.find_by_id(&id).await? {
        Some(task) => Ok(response::ok(task)),
        None => Err(task_not_found(&path)),
    }
}

/// Replaces a task's fields. The payload follows the creation rules; a
/// missing `priority` or `status` keeps the stored value.
#[put("/{id}")]
pub async fn update_task(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let draft = TaskDraft::from_payload(body.into_inner())?;
    let id = task_id(&path)?;
    match state.tasks.update(&id, draft).await? {
        Some(task) => Ok(response::ok(task)),
        None => Err(task_not_found(&path)),
    }
}

#[delete("/{id}")]
pub async fn delete_task(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = task_id(&path)?;
    if state.tasks.delete(&id).await? == 0 {
        return Err(task_not_found(&path));
    }
    Ok(response::ok(json!({ "message": "Task deleted successfully" })))
}

#[get("/user/{email}")]
pub async fn tasks_by_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let filter = TaskFilter {
        assigned_user: Some(path.into_inner()),
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Task count per status for one assignee, plus the total.
#[get("/user/{email}/stats")]
pub async fn user_task_stats(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let email = path.into_inner();
    let by_status = state
        .tasks
        .count_by(GroupField::Status, Some(&email))
        .await?;
    let total = by_status.iter().map(|group| group.count).sum::<i64>();
    Ok(response::ok(UserTaskStats {
        email,
        total,
        by_status,
    }))
}

#[get("/status/{status}")]
pub async fn tasks_by_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let status = validation::require_enum::<TaskStatus>(&path)?;
    let filter = TaskFilter {
        statuses: vec![status],
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

#[get("/priority/{priority}")]
pub async fn tasks_by_priority(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let priority = validation::require_enum::<TaskPriority>(&path)?;
    let filter = TaskFilter {
        priorities: vec![priority],
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Tasks whose status is any of `{"statuses": [...]}`.
#[post("/status/multiple")]
pub async fn tasks_by_statuses(
    state: web::Data<AppState>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let statuses = validation::check_enum_list::<TaskStatus>(body.get("statuses"), "statuses")?;
    let filter = TaskFilter {
        statuses,
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Tasks whose priority is any of `{"priorities": [...]}`.
#[post("/priority/multiple")]
pub async fn tasks_by_priorities(
    state: web::Data<AppState>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let priorities =
        validation::check_enum_list::<TaskPriority>(body.get("priorities"), "priorities")?;
    let filter = TaskFilter {
        priorities,
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Tasks due on or before `date`, soonest first.
#[get("/due/{date}")]
pub async fn tasks_due_by(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let due = validation::check_date("date", &path, "Invalid date format")?;
    let filter = TaskFilter {
        range: Some(DateRange::until(DateField::DueDate, due)),
        order: TaskOrder::DueDateAsc,
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub date_field: Option<String>,
}

/// Tasks whose `dateField` (default `dueDate`) falls inside
/// `[startDate, endDate]`, ascending.
#[get("/date-range")]
pub async fn tasks_in_date_range(
    state: web::Data<AppState>,
    query: web::Query<DateRangeQuery>,
) -> Result<impl Responder, AppError> {
    let query = query.into_inner();
    let (start, end) = match (query.start_date, query.end_date) {
        (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => (start, end),
        _ => {
            return Err(AppError::validation(
                "Start date and end date are required",
            ))
        }
    };
    let field = validation::check_enum::<DateField>(query.date_field.as_deref())?
        .unwrap_or_default();
    let (from, to) = validation::check_date_range(&start, &end)?;

    let filter = TaskFilter {
        range: Some(DateRange::between(field, from, to)),
        order: match field {
            DateField::DueDate => TaskOrder::DueDateAsc,
            DateField::CreatedDate => TaskOrder::CreatedDateAsc,
        },
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub days: Option<String>,
}

/// Tasks created in the last `days` days (default 7), newest first.
#[get("/recent")]
pub async fn recent_tasks(
    state: web::Data<AppState>,
    query: web::Query<RecentQuery>,
) -> Result<impl Responder, AppError> {
    let days = query
        .days
        .as_deref()
        .and_then(|days| days.trim().parse::<i64>().ok())
        .filter(|days| (1..=36_500).contains(days))
        .unwrap_or(RECENT_DAYS_DEFAULT);

    let filter = TaskFilter {
        range: Some(DateRange::since(
            DateField::CreatedDate,
            Utc::now() - Duration::days(days),
        )),
        order: TaskOrder::CreatedDateDesc,
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Tasks past their due date that are not completed, most overdue first.
#[get("/overdue")]
pub async fn overdue_tasks(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let filter = TaskFilter {
        exclude_status: Some(TaskStatus::Completed),
        range: Some(DateRange::before(DateField::DueDate, Utc::now())),
        order: TaskOrder::DueDateAsc,
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

#[get("/stats/status")]
pub async fn status_stats(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let counts = state.tasks.count_by(GroupField::Status, None).await?;
    Ok(response::ok(counts))
}

#[get("/stats/priority")]
pub async fn priority_stats(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let counts = state.tasks.count_by(GroupField::Priority, None).await?;
    Ok(response::ok(counts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_term: Option<String>,
}

/// Case-insensitive substring match on title or description.
#[get("/search")]
pub async fn search_tasks(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<impl Responder, AppError> {
    let term = match query.into_inner().search_term {
        Some(term) if !term.is_empty() => term,
        _ => {
            return Err(AppError::invalid_field(
                "searchTerm",
                "Search term is required",
            ))
        }
    };
    let filter = TaskFilter {
        search: Some(term),
        ..TaskFilter::default()
    };
    let tasks = state.tasks.find(&filter).await?;
    Ok(response::ok(tasks))
}

/// Registers the task routes. Fixed paths come before `/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(user_task_stats)
        .service(tasks_by_user)
        .service(tasks_by_statuses)
        .service(tasks_by_status)
        .service(tasks_by_priorities)
        .service(tasks_by_priority)
        .service(tasks_due_by)
        .service(tasks_in_date_range)
        .service(recent_tasks)
        .service(overdue_tasks)
        .service(status_stats)
        .service(priority_stats)
        .service(search_tasks)
        .service(get_tasks)
        .service(create_task)
        .service(get_task)
        .service(update_task)
        .service(delete_task);
}
