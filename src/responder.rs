//! Error response rendering.
//!
//! `render` builds the JSON body for an `AppError` in one of two shapes:
//!
//! * development: `{status, error, message, stack}` where `error` carries the
//!   kind's fields, `statusCode`, `status` and `isOperational`;
//! * production: `{status, message}` for operational errors, and a generic
//!   500 for everything else.
//!
//! `AppError::error_response` always renders production. `ErrorResponder`
//! wraps the app and swaps in the development shape when configured.

use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde_json::{json, Map, Value};

use crate::config::Environment;
use crate::error::{AppError, ErrorStatus};

/// Message sent in place of details for non-operational errors in production.
pub const GENERIC_MESSAGE: &str = "Something went wrong!";

/// A rendered error: status line plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    status: StatusCode,
    body: Value,
}

impl Rendered {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::build(self.status).json(self.body)
    }
}

pub fn render(error: &AppError, environment: Environment) -> Rendered {
    match environment {
        Environment::Development => Rendered {
            status: error.http_status(),
            body: json!({
                "status": error.status(),
                "error": details(error),
                "message": error.message(),
                "stack": error.stack(),
            }),
        },
        Environment::Production if error.is_operational() => Rendered {
            status: error.http_status(),
            body: json!({
                "status": error.status(),
                "message": error.message(),
            }),
        },
        Environment::Production => Rendered {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({
                "status": ErrorStatus::Error,
                "message": GENERIC_MESSAGE,
            }),
        },
    }
}

fn details(error: &AppError) -> Value {
    let mut details = match serde_json::to_value(error.kind()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    details.insert("statusCode".into(), json!(error.http_status().as_u16()));
    details.insert("status".into(), json!(error.status()));
    details.insert("isOperational".into(), json!(error.is_operational()));
    Value::Object(details)
}

/// Re-renders `AppError` responses in the development shape.
///
/// In production the response produced by `AppError::error_response` is
/// passed through untouched.
#[derive(Debug, Clone, Copy)]
pub struct ErrorResponder {
    environment: Environment,
}

impl ErrorResponder {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ErrorResponder
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ErrorResponderService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorResponderService {
            service,
            environment: self.environment,
        }))
    }
}

pub struct ErrorResponderService<S> {
    service: S,
    environment: Environment,
}

impl<S, B> Service<ServiceRequest> for ErrorResponderService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let environment = self.environment;
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            if environment != Environment::Development {
                return Ok(res.map_into_left_body());
            }

            let rendered = res
                .response()
                .error()
                .and_then(|e| e.as_error::<AppError>())
                .map(|e| render(e, environment));

            match rendered {
                Some(rendered) => {
                    let (req, _) = res.into_parts();
                    Ok(ServiceResponse::new(req, rendered.into_response()).map_into_right_body())
                }
                None => Ok(res.map_into_left_body()),
            }
        })
    }
}
