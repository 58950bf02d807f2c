use actix_web::{
    cookie::{time, Cookie, SameSite},
    get,
    http::header,
    web, HttpRequest, HttpResponse, Responder,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{MaybeSession, SESSION_COOKIE, STATE_COOKIE},
    error::AppError,
    state::AppState,
};

fn redirect(location: &str) -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Found();
    builder.insert_header((header::LOCATION, location));
    builder
}

fn removal(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::named(name);
    cookie.set_path(path);
    cookie.make_removal();
    cookie
}

/// Sends the browser to GitHub with a fresh anti-forgery `state`.
async fn start_login(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::internal("GitHub login is not configured"))?;

    let oauth_state = Uuid::new_v4().to_string();
    let url = provider
        .authorize_url(&oauth_state)
        .map_err(AppError::unexpected)?;

    let cookie = Cookie::build(STATE_COOKIE, oauth_state)
        .path("/auth")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10))
        .finish();

    Ok(redirect(&url).cookie(cookie).finish())
}

#[get("/login")]
pub async fn login(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    start_login(state).await
}

#[get("/github")]
pub async fn github(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    start_login(state).await
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Finishes the OAuth round trip. On success the session cookie is set and
/// the browser goes to `/`; any failure sends it back to `/auth`.
#[get("/github/callback")]
pub async fn github_callback(
    state: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let failed = || {
        redirect("/auth")
            .cookie(removal(STATE_COOKIE, "/auth"))
            .finish()
    };

    let provider = match state.identity.as_ref() {
        Some(provider) => provider,
        None => {
            log::warn!("OAuth callback received but GitHub login is not configured");
            return Ok(failed());
        }
    };

    let expected = req.cookie(STATE_COOKIE).map(|c| c.value().to_string());
    let query = query.into_inner();
    let code = match (query.code, query.state, expected) {
        (Some(code), Some(got), Some(expected)) if got == expected => code,
        _ => {
            log::warn!("OAuth callback rejected: missing code or state mismatch");
            return Ok(failed());
        }
    };

    let profile = match provider.exchange(&code).await {
        Ok(profile) => profile,
        Err(e) => {
            log::warn!("OAuth code exchange failed: {}", e);
            return Ok(failed());
        }
    };

    let token = state.tokens.issue(&profile)?;
    let session = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(state.tokens.ttl().num_seconds()))
        .finish();

    log::info!("{} logged in", profile.username);
    Ok(redirect("/")
        .cookie(session)
        .cookie(removal(STATE_COOKIE, "/auth"))
        .finish())
}

#[get("/logout")]
pub async fn logout() -> impl Responder {
    redirect("/").cookie(removal(SESSION_COOKIE, "/")).finish()
}

/// Plain-text session status.
#[get("")]
pub async fn status(session: MaybeSession) -> impl Responder {
    let body = match session.0 {
        Some(profile) => format!("Logged in as {}", profile.display_name),
        None => "Logged Out".to_string(),
    };
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(login)
        .service(github)
        .service(github_callback)
        .service(logout)
        .service(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityError, IdentityProvider, Profile, TokenService};
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str) -> Result<String, IdentityError> {
            Ok(format!("https://github.test/authorize?state={}", state))
        }

        async fn exchange(&self, code: &str) -> Result<Profile, IdentityError> {
            if code == "good" {
                Ok(Profile {
                    id: "42".into(),
                    display_name: "Mona Lisa".into(),
                    username: "mona".into(),
                    email: None,
                })
            } else {
                Err(IdentityError::Rejected("bad_verification_code".into()))
            }
        }
    }

    fn state() -> web::Data<AppState> {
        let tokens = Arc::new(TokenService::new("secret", 1));
        web::Data::new(AppState::in_memory(tokens).with_identity(Arc::new(FakeProvider)))
    }

    fn location(resp: &actix_web::dev::ServiceResponse) -> String {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[actix_rt::test]
    async fn test_login_redirects_with_state_cookie() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/auth").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get().uri("/auth/github").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == STATE_COOKIE)
            .expect("state cookie");
        assert!(location(&resp).ends_with(&format!("state={}", cookie.value())));
    }

    #[actix_rt::test]
    async fn test_callback_with_mismatched_state_goes_back_to_auth() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/auth").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/auth/github/callback?code=good&state=abc")
            .cookie(Cookie::new(STATE_COOKIE, "xyz"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/auth");
    }

    #[actix_rt::test]
    async fn test_callback_sets_session_and_status_reports_it() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/auth").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/auth/github/callback?code=good&state=abc")
            .cookie(Cookie::new(STATE_COOKIE, "abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(location(&resp), "/");
        let session = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie")
            .into_owned();

        let req = test::TestRequest::get()
            .uri("/auth")
            .cookie(session)
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "Logged in as Mona Lisa");

        let req = test::TestRequest::get().uri("/auth").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "Logged Out");
    }

    #[actix_rt::test]
    async fn test_failed_exchange_goes_back_to_auth() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/auth").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/auth/github/callback?code=bad&state=abc")
            .cookie(Cookie::new(STATE_COOKIE, "abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(location(&resp), "/auth");
    }
}
