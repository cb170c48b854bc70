//! Error types for the OAuth client.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while driving an OAuth session.
///
/// Every failure mode of the flow maps to exactly one variant so callers can
/// decide between re-authenticating and reporting a transient failure.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The JWKS endpoint could not be read.
    #[error("Key source unavailable: {0}")]
    KeySourceUnavailable(#[source] TransportError),

    /// Signature, issuer, audience, expiry or key-id check failed.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Callback state does not match the nonce issued for this attempt.
    #[error("Callback state does not match the session state")]
    CsrfStateMismatch,

    /// The callback state for this attempt was already used.
    #[error("Authorization state has already been consumed")]
    StateAlreadyConsumed,

    /// Authorization code could not be exchanged for tokens.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(#[source] TransportError),

    /// Access token could not be refreshed.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] TransportError),

    /// Introspection endpoint could not be queried.
    #[error("Token introspection failed: {0}")]
    IntrospectionFailed(#[source] TransportError),

    /// The protected resource call itself failed.
    #[error("Resource request failed: {0}")]
    ResourceRequestFailed(#[source] TransportError),

    /// No tokens have been issued for this session.
    #[error("No tokens have been issued for this session")]
    NoTokens,

    /// The session was revoked and must restart authorization.
    #[error("Session has been revoked")]
    SessionRevoked,

    /// Authorization restarted while this call was in flight; its result
    /// belonged to the previous attempt and was dropped.
    #[error("Authorization was restarted while the request was in flight")]
    AuthorizationRestarted,

    /// The redirect callback could not be parsed or carried an error.
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Outcome of [`authenticated_request`](crate::OAuthSession::authenticated_request)
    /// after any of the above. The specific kind is kept as the source.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[source] Box<OAuthError>),
}

impl OAuthError {
    /// Check if re-running authorization is the only way forward.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            OAuthError::InvalidToken(_)
            | OAuthError::CsrfStateMismatch
            | OAuthError::StateAlreadyConsumed
            | OAuthError::NoTokens
            | OAuthError::SessionRevoked
            | OAuthError::AuthorizationRestarted => true,
            OAuthError::RefreshFailed(cause) => !cause.is_transient(),
            OAuthError::Unauthenticated(inner) => inner.requires_reauthorization(),
            _ => false,
        }
    }

    /// The innermost error, looking through [`OAuthError::Unauthenticated`].
    pub fn kind(&self) -> &OAuthError {
        match self {
            OAuthError::Unauthenticated(inner) => inner.kind(),
            other => other,
        }
    }
}

/// Underlying cause of a failed call to the authorization or resource server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, TLS or timeout failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the expected JSON.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Response was well-formed JSON but violated the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The request was never sent.
    #[error("not sent: {0}")]
    NotSent(&'static str),
}

impl TransportError {
    /// Whether the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_timeout())
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(_) => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
