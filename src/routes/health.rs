use actix_web::{get, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

/// Liveness probe. Not behind the session gate.
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": Utc::now()
    }))
}

/// `GET /api`
#[get("")]
pub async fn welcome() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Welcome to the Task Management API"
    }))
}
