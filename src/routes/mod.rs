pub mod auth;
pub mod health;
pub mod tasks;
pub mod users;

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::auth::{AuthMiddleware, TokenService};
use crate::error::AppError;

/// Registers every route plus the extractor error handlers.
///
/// `/api/users` and `/api/tasks` sit behind `AuthMiddleware`; `/health`,
/// `/api` and `/auth/*` do not. Anything else falls through to `not_found`.
pub fn configure(tokens: Arc<TokenService>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(
            web::JsonConfig::default().error_handler(|err, _req| AppError::from(err).into()),
        )
        .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::from(err).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _req| AppError::from(err).into()))
        .service(health::health)
        .service(web::scope("/auth").configure(auth::configure))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/users")
                        .wrap(AuthMiddleware::new(tokens.clone()))
                        .configure(users::configure),
                )
                .service(
                    web::scope("/tasks")
                        .wrap(AuthMiddleware::new(tokens))
                        .configure(tasks::configure),
                )
                .service(health::welcome),
        )
        .default_service(web::route().to(not_found));
    }
}

/// Catch-all for unknown routes.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.path());
    Err(AppError::not_found(
        "route",
        format!("Can't find {} on this server!", url),
    ))
}
