use actix_web::{http::header, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::{Profile, SESSION_COOKIE};
use crate::error::AppError;

/// Represents the claims encoded within a session token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Provider-side account id.
    pub sub: String,
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

impl Claims {
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.sub.clone(),
            display_name: self.name.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Issues and checks HS256 session tokens.
///
/// The secret comes from configuration; nothing here reads the environment.
pub struct TokenService {
    secret: String,
    ttl: Duration,
}

impl TokenService {
    /// `ttl_hours` is clamped to between one hour and one year.
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(ttl_hours.clamp(1, 24 * 365)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, profile: &Profile) -> Result<String, AppError> {
        let expiration = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::internal("Session expiry out of range"))?
            .timestamp() as usize;

        let claims = Claims {
            sub: profile.id.clone(),
            name: profile.display_name.clone(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            exp: expiration,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }

    /// The profile behind the request's session cookie or bearer token, if
    /// it carries a valid one.
    pub fn session_from(&self, req: &HttpRequest) -> Option<Profile> {
        let token = req
            .cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .or_else(|| {
                req.headers()
                    .get(header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
                    .map(str::to_string)
            })?;

        match self.verify(&token) {
            Ok(claims) => Some(claims.profile()),
            Err(e) => {
                log::debug!("rejected session token: {}", e);
                None
            }
        }
    }
}
