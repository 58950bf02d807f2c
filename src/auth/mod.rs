pub mod extractors;
pub mod github;
pub mod middleware;
pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};

// Re-export necessary items
pub use extractors::MaybeSession;
pub use github::{GitHubProvider, IdentityError, IdentityProvider};
pub use middleware::AuthMiddleware;
pub use password::hash_password;
pub use token::{Claims, TokenService};

/// Cookie holding the signed session token.
pub const SESSION_COOKIE: &str = "session";
/// Cookie holding the anti-forgery `state` of an OAuth round trip.
pub const STATE_COOKIE: &str = "oauth_state";

/// The identity an external provider vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Provider-side account id.
    pub id: String,
    pub display_name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
