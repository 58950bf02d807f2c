use std::env;
use thiserror::Error;

/// Controls how much detail error responses carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Full error object and stack in every error response.
    Development,
    /// Only the status and a safe message.
    Production,
}

impl Environment {
    /// Only the exact name `development` enables verbose errors.
    pub fn from_name(name: &str) -> Self {
        if name == "development" {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
}

pub struct Config {
    /// Postgres connection string. Without it the in-memory store is used.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    pub environment: Environment,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// Present only when all three GitHub variables are set.
    pub github: Option<GitHubConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github = match (
            lookup("GITHUB_CLIENT_ID"),
            lookup("GITHUB_CLIENT_SECRET"),
            lookup("CALLBACK_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => Some(GitHubConfig {
                client_id,
                client_secret,
                callback_url,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            server_port: parse_number(&lookup, "SERVER_PORT", 8080)?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            environment: Environment::from_name(&lookup("APP_ENV").unwrap_or_default()),
            session_secret: lookup("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?,
            session_ttl_hours: parse_number(&lookup, "SESSION_TTL_HOURS", 24)?,
            github,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("SESSION_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.session_ttl_hours, 24);
        assert!(config.github.is_none());
        assert_eq!(config.server_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_config_custom_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("SESSION_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://test"),
            ("SERVER_PORT", "3000"),
            ("SERVER_HOST", "0.0.0.0"),
            ("APP_ENV", "development"),
            ("GITHUB_CLIENT_ID", "id"),
            ("GITHUB_CLIENT_SECRET", "secret"),
            ("CALLBACK_URL", "http://localhost:3000/auth/github/callback"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://test"));
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.github.unwrap().client_id, "id");
    }

    #[test]
    fn test_config_errors() {
        assert_eq!(
            Config::from_lookup(lookup_from(&[])).err(),
            Some(ConfigError::Missing("SESSION_SECRET"))
        );
        assert_eq!(
            Config::from_lookup(lookup_from(&[("SESSION_SECRET", "x"), ("SERVER_PORT", "http")]))
                .err(),
            Some(ConfigError::NotANumber {
                name: "SERVER_PORT",
                value: "http".into()
            })
        );
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(Environment::from_name("development"), Environment::Development);
        assert_eq!(Environment::from_name("production"), Environment::Production);
        assert_eq!(Environment::from_name("test"), Environment::Production);
        assert_eq!(Environment::from_name(""), Environment::Production);
    }
}
