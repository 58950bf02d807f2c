use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde_json::json;
use std::sync::Arc;

use crate::auth::TokenService;

/// Session gate for the `/api/users` and `/api/tasks` scopes.
///
/// A request with a valid session gets its `Profile` inserted into the
/// request extensions. Anything else is answered with
/// `401 {"status": "fail", "message": "Unauthorized"}` without reaching the
/// handler.
pub struct AuthMiddleware {
    tokens: Arc<TokenService>,
}

impl AuthMiddleware {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.tokens.session_from(req.request()) {
            Some(profile) => {
                req.extensions_mut().insert(profile);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            None => {
                let response = HttpResponse::Unauthorized().json(json!({
                    "status": "fail",
                    "message": "Unauthorized"
                }));
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Profile, SESSION_COOKIE};
    use actix_web::{cookie::Cookie, http::StatusCode, test, web, App};

    async fn whoami(req: actix_web::HttpRequest) -> HttpResponse {
        let name = req
            .extensions()
            .get::<Profile>()
            .map(|p| p.username.clone())
            .unwrap_or_default();
        HttpResponse::Ok().body(name)
    }

    #[actix_rt::test]
    async fn test_requests_without_session_are_rejected() {
        let tokens = Arc::new(TokenService::new("secret", 1));
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(tokens))
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "fail", "message": "Unauthorized"}));
    }

    #[actix_rt::test]
    async fn test_valid_session_reaches_handler() {
        let tokens = Arc::new(TokenService::new("secret", 1));
        let token = tokens
            .issue(&Profile {
                id: "7".into(),
                display_name: "Mona".into(),
                username: "mona".into(),
                email: None,
            })
            .unwrap();
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(tokens))
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .cookie(Cookie::new(SESSION_COOKIE, token))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "mona");
    }
}
