//! GitHub OAuth login.
//!
//! The web layer only sees `IdentityProvider`: it asks for the URL to send
//! the browser to, and later trades the callback `code` for a `Profile`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::Profile;
use crate::config::GitHubConfig;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";
const SCOPE: &str = "user:email";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider rejected the code: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser. `state` comes back on the callback.
    fn authorize_url(&self, state: &str) -> Result<String, IdentityError>;

    /// Trades an authorization code for the user's profile.
    async fn exchange(&self, code: &str) -> Result<Profile, IdentityError>;
}

pub struct GitHubProvider {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Falls back to the login for the display name and to the primary verified
/// address when the public profile hides its email.
fn profile_from(user: GitHubUser, emails: &[GitHubEmail]) -> Profile {
    let email = user.email.or_else(|| {
        emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone())
    });
    Profile {
        id: user.id.to_string(),
        display_name: user.name.unwrap_or_else(|| user.login.clone()),
        username: user.login,
        email,
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    fn authorize_url(&self, state: &str) -> Result<String, IdentityError> {
        let request = self
            .client
            .get(AUTHORIZE_URL)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("scope", SCOPE),
                ("state", state),
            ])
            .build()?;
        Ok(request.url().to_string())
    }

    async fn exchange(&self, code: &str) -> Result<Profile, IdentityError> {
        let token: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let access_token = match token.access_token {
            Some(access_token) => access_token,
            None => {
                return Err(IdentityError::Rejected(
                    token
                        .error_description
                        .or(token.error)
                        .unwrap_or_else(|| "no access token".to_string()),
                ))
            }
        };

        let user: GitHubUser = self
            .client
            .get(format!("{}/user", API_URL))
            .bearer_auth(&access_token)
            .header(USER_AGENT, env!("CARGO_PKG_NAME"))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let emails = if user.email.is_some() {
            Vec::new()
        } else {
            let response = self
                .client
                .get(format!("{}/user/emails", API_URL))
                .bearer_auth(&access_token)
                .header(USER_AGENT, env!("CARGO_PKG_NAME"))
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match response {
                Ok(response) => response.json::<Vec<GitHubEmail>>().await.unwrap_or_default(),
                Err(e) => {
                    log::warn!("could not read GitHub emails for {}: {}", user.login, e);
                    Vec::new()
                }
            }
        };

        Ok(profile_from(user, &emails))
    }
}
