use actix_web::dev::Payload;
use actix_web::{web, Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::Profile;
use crate::state::AppState;

/// The caller's profile when the request carries a valid session.
///
/// Works on routes outside `AuthMiddleware` too: if the middleware has not
/// already stored a profile, the session is checked here with the app's
/// `TokenService`. Never fails.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Profile>);

impl FromRequest for MaybeSession {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if let Some(profile) = req.extensions().get::<Profile>().cloned() {
            return ready(Ok(MaybeSession(Some(profile))));
        }
        let profile = req
            .app_data::<web::Data<AppState>>()
            .and_then(|state| state.tokens.session_from(req));
        ready(Ok(MaybeSession(profile)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenService, SESSION_COOKIE};
    use actix_web::cookie::Cookie;
    use actix_web::test;
    use std::sync::Arc;

    fn profile() -> Profile {
        Profile {
            id: "123".into(),
            display_name: "Ana Lima".into(),
            username: "ana".into(),
            email: None,
        }
    }

    #[actix_rt::test]
    async fn test_extractor_reads_extensions() {
        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(profile());

        let mut payload = Payload::None;
        let session = MaybeSession::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(session.0, Some(profile()));
    }

    #[actix_rt::test]
    async fn test_extractor_checks_cookie() {
        let tokens = Arc::new(TokenService::new("secret", 1));
        let token = tokens.issue(&profile()).unwrap();
        let state = AppState::in_memory(tokens);

        let req = test::TestRequest::default()
            .app_data(web::Data::new(state))
            .cookie(Cookie::new(SESSION_COOKIE, token))
            .to_http_request();

        let mut payload = Payload::None;
        let session = MaybeSession::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(session.0.map(|p| p.display_name), Some("Ana Lima".to_string()));
    }

    #[actix_rt::test]
    async fn test_extractor_without_session() {
        let req = test::TestRequest::default().to_http_request();
        let mut payload = Payload::None;
        let session = MaybeSession::from_request(&req, &mut payload).await.unwrap();
        assert!(session.0.is_none());
    }
}
