use actix_web::{delete, get, post, put, web, Responder};
use serde_json::{json, Map, Value};

use crate::{
    auth::hash_password,
    error::AppError,
    models::{User, UserChanges, UserInput},
    response,
    state::AppState,
    store::ObjectId,
    validation,
};

fn user_id(raw: &str) -> Result<ObjectId, AppError> {
    validation::check_object_id(raw, "Invalid user ID format")
}

/// Names the id as the caller wrote it.
fn user_not_found(id: &str) -> AppError {
    AppError::not_found("user", format!("No user found with id: {}", id))
}

async fn hash_optional(password: Option<String>) -> Result<Option<String>, AppError> {
    match password {
        Some(password) if !password.is_empty() => Ok(Some(hash_password(password).await?)),
        _ => Ok(None),
    }
}

#[get("")]
pub async fn get_users(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let users = state.users.find_all().await?;
    Ok(response::ok(users))
}

#[get("/email/{email}")]
pub async fn get_user_by_email(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let email = path.into_inner();
    validation::check_email(&email, "email", "Invalid email format")?;
    match state.users.find_by_email(&email).await? {
        Some(user) => Ok(response::ok(user)),
        None => Err(AppError::not_found(
            "user",
            format!("No user found with email: {}", email),
        )),
    }
}

#[get("/{id}")]
pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = user_id(&path)?;
    match state.users.find_by_id(&id).await? {
        Some(user) => Ok(response::ok(user)),
        None => Err(user_not_found(&path)),
    }
}

/// Creates a user. A taken email is reported by the store and surfaces as
/// `409 Duplicate field value`.
#[post("")]
pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let mut input = UserInput::from_payload(body.into_inner())?;
    let password = hash_optional(input.password.take()).await?;
    let user = state.users.insert(User::new(input, password)).await?;
    Ok(response::created(user))
}

#[put("/{id}")]
pub async fn update_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> Result<impl Responder, AppError> {
    let id = user_id(&path)?;
    let input = UserInput::from_payload(body.into_inner())?;
    let changes = UserChanges {
        email: input.email,
        name: input.name,
        password: hash_optional(input.password).await?,
        github_id: input.github_id,
    };
    match state.users.update(&id, changes).await? {
        Some(user) => Ok(response::ok(user)),
        None => Err(user_not_found(&path)),
    }
}

#[delete("/{id}")]
pub async fn delete_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = user_id(&path)?;
    if state.users.delete(&id).await? == 0 {
        return Err(user_not_found(&path));
    }
    Ok(response::ok(json!({ "message": "User deleted successfully" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_user_by_email)
        .service(get_users)
        .service(create_user)
        .service(get_user)
        .service(update_user)
        .service(delete_user);
}
