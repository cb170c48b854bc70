//! OAuth 2.0 authorization code client with PKCE.
//!
//! Drives one client through the authorization code grant, keeps the issued
//! tokens fresh, and checks every access token both locally (signature,
//! issuer, audience, expiry against the server's published keys) and remotely
//! (token introspection) before it is used on a protected resource.
//!
//! # Components
//!
//! - [`pkce`]: verifier/challenge pairs and CSRF state nonces
//! - [`oauth`]: configuration, authorization URL, callback parsing, and the HTTP client for the token, introspection and resource endpoints
//! - [`jwks`]: key set parsing and the cached key source
//! - [`jwt`]: local access token validation
//! - [`token_store`]: token record storage and the refresh protocol
//! - [`session`]: the session state machine tying it all together
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> sigil_oauth::Result<()> {
//! use sigil_oauth::{OAuthConfig, OAuthSession, parse_callback};
//!
//! let config = OAuthConfig::new("https://auth.example.com", "my-client");
//! let session = OAuthSession::new(config, "http://localhost:8080/callback")?;
//!
//! println!("Open {}", session.authorization_url());
//! let callback = parse_callback("http://localhost:8080/callback?code=abc&state=xyz")?;
//! session.exchange_code(&callback.code, &callback.state).await?;
//!
//! let profile = session.authenticated_request("https://api.example.com/user").await?;
//! println!("{profile}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod jwks;
pub mod jwt;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod token_store;

pub use error::{OAuthError, Result, TransportError};
pub use jwks::{KeyRecord, KeySet, KeySetCache};
pub use jwt::{JwtClaims, JwtValidator};
pub use oauth::{
    AuthServerClient, CallbackParams, IntrospectionResponse, OAuthConfig, TokenResponse,
    build_authorization_url, parse_callback,
};
pub use pkce::{PkceMaterial, generate_state};
pub use session::{OAuthSession, SessionState, SessionStatus};
pub use token_store::{TokenRecord, TokenStore};
