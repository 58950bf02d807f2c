//! Error rendering through the whole app, in both environments.

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{http::header, http::StatusCode, test, web, App};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use taskboard::auth::{Profile, TokenService};
use taskboard::config::Environment;
use taskboard::models::{GroupCount, Task, TaskDraft};
use taskboard::responder::ErrorResponder;
use taskboard::routes;
use taskboard::state::AppState;
use taskboard::store::{
    GroupField, MemoryStore, ObjectId, StoreError, TaskFilter, TaskStore,
};

/// A task store whose every call fails like a dropped connection.
struct UnreachableStore;

fn unreachable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl TaskStore for UnreachableStore {
    async fn find_all(&self) -> Result<Vec<Task>, StoreError> {
        Err(unreachable())
    }
    async fn find_by_id(&self, _id: &ObjectId) -> Result<Option<Task>, StoreError> {
        Err(unreachable())
    }
    async fn find(&self, _filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        Err(unreachable())
    }
    async fn insert(&self, _task: Task) -> Result<Task, StoreError> {
        Err(unreachable())
    }
    async fn update(&self, _id: &ObjectId, _draft: TaskDraft) -> Result<Option<Task>, StoreError> {
        Err(unreachable())
    }
    async fn delete(&self, _id: &ObjectId) -> Result<u64, StoreError> {
        Err(unreachable())
    }
    async fn count_by(
        &self,
        _field: GroupField,
        _assigned_user: Option<&str>,
    ) -> Result<Vec<GroupCount>, StoreError> {
        Err(unreachable())
    }
}

async fn spawn_app(
    environment: Environment,
    broken: bool,
) -> (
    impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    String,
) {
    let tokens = Arc::new(TokenService::new("errors-test-secret", 1));
    let token = tokens
        .issue(&Profile {
            id: "5".into(),
            display_name: "Ops".into(),
            username: "ops".into(),
            email: None,
        })
        .expect("token");

    let users = Arc::new(MemoryStore::new());
    let tasks: Arc<dyn TaskStore> = if broken {
        Arc::new(UnreachableStore)
    } else {
        Arc::new(MemoryStore::new())
    };
    let state = AppState::new(tasks, users, tokens.clone()).with_environment(environment);

    let app = test::init_service(
        App::new()
            .wrap(ErrorResponder::new(environment))
            .app_data(web::Data::new(state))
            .configure(routes::configure(tokens)),
    )
    .await;
    (app, token)
}

async fn get(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    token: &str,
    uri: &str,
) -> (StatusCode, Value) {
    let req = test::TestRequest::get()
        .uri(uri)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[test_log::test(actix_rt::test)]
async fn test_production_hides_unexpected_failures() {
    let (app, token) = spawn_app(Environment::Production, true).await;
    let (status, body) = get(&app, &token, "/api/tasks").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"status": "error", "message": "Something went wrong!"})
    );
    assert!(!body.to_string().contains("pool timed out"));
}

#[test_log::test(actix_rt::test)]
async fn test_development_exposes_details() {
    let (app, token) = spawn_app(Environment::Development, true).await;
    let (status, body) = get(&app, &token, "/api/tasks").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["name"], "InternalError");
    assert_eq!(body["error"]["isOperational"], false);
    assert!(body["message"].as_str().unwrap().contains("pool timed out"));
    assert!(body["stack"].as_str().unwrap().starts_with("InternalError:"));
}

#[actix_rt::test]
async fn test_development_shape_for_client_errors() {
    let (app, token) = spawn_app(Environment::Development, false).await;
    let (status, body) = get(&app, &token, "/api/tasks/507f1f77bcf86cd799439011").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert_eq!(
        body["message"],
        "No task found with id: 507f1f77bcf86cd799439011"
    );
    assert_eq!(body["error"]["name"], "NotFoundError");
    assert_eq!(body["error"]["resource"], "task");
    assert_eq!(body["error"]["statusCode"], 404);
    assert!(body["stack"].is_string());
}

#[actix_rt::test]
async fn test_unknown_route() {
    let (app, token) = spawn_app(Environment::Production, false).await;
    let (status, body) = get(&app, &token, "/nowhere?x=1").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"status": "fail", "message": "Can't find /nowhere?x=1 on this server!"})
    );
}

#[actix_rt::test]
async fn test_malformed_json_body() {
    let (app, token) = spawn_app(Environment::Production, false).await;
    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"title\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "fail");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
}

#[actix_rt::test]
async fn test_public_routes_need_no_session() {
    let (app, _) = spawn_app(Environment::Production, false).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::get().uri("/api").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Welcome to the Task Management API");

    let req = test::TestRequest::get().uri("/auth").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "Logged Out");
}
