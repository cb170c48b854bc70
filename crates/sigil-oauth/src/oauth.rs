//! Authorization server endpoints: configuration, authorization URL, token
//! exchange/refresh, introspection, and the protected-resource call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, Result, TransportError};

/// Default timeout for every network call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Client configuration for one authorization server.
///
/// Immutable once handed to a session; build it with [`OAuthConfig::new`] and
/// the `with_*` setters.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub introspection_url: String,
    pub jwks_url: String,
    pub scope: String,
    /// Expected `iss` claim of access tokens.
    pub issuer: String,
    /// Expected `aud` claim of access tokens.
    pub audience: String,
    pub timeout: Duration,
    /// Grace period applied to the `exp` claim during local validation.
    pub leeway: Duration,
}

impl OAuthConfig {
    /// Create a config whose endpoints hang off `auth_server`.
    ///
    /// The issuer defaults to the server URL and the audience to the client id.
    pub fn new(auth_server: &str, client_id: impl Into<String>) -> Self {
        let base = auth_server.trim_end_matches('/');
        let client_id = client_id.into();
        Self {
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
            introspection_url: format!("{}/introspect", base),
            jwks_url: format!("{}/.well-known/jwks.json", base),
            scope: "profile email".to_string(),
            issuer: base.to_string(),
            audience: client_id.clone(),
            client_id,
            client_secret: None,
            timeout: DEFAULT_TIMEOUT,
            leeway: Duration::ZERO,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_introspection_url(mut self, url: impl Into<String>) -> Self {
        self.introspection_url = url.into();
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Check that the config can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(OAuthError::Config("client_id must not be empty".to_string()));
        }
        for (name, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("introspection_url", &self.introspection_url),
            ("jwks_url", &self.jwks_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| OAuthError::Config(format!("invalid {} '{}': {}", name, value, e)))?;
        }
        if self.timeout.is_zero() {
            return Err(OAuthError::Config("timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("introspection_url", &self.introspection_url)
            .field("jwks_url", &self.jwks_url)
            .field("scope", &self.scope)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("timeout", &self.timeout)
            .field("leeway", &self.leeway)
            .finish()
    }
}

/// Build the authorization URL the user agent is redirected to.
pub fn build_authorization_url(
    config: &OAuthConfig,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> String {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", config.scope.as_str()),
        ("state", state),
        ("code_challenge", challenge),
        ("code_challenge_method", crate::pkce::CHALLENGE_METHOD),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if config.authorize_url.contains('?') {
        '&'
    } else {
        '?'
    };
    format!("{}{}{}", config.authorize_url, separator, query)
}

/// Code and state carried back on the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Parse what the user pasted back after authorizing.
///
/// Accepts the full redirect URL, a bare `code=..&state=..` query, or the
/// `code#state` shorthand. An `error` parameter on the redirect is reported as
/// [`OAuthError::InvalidCallback`].
pub fn parse_callback(input: &str) -> Result<CallbackParams> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(OAuthError::InvalidCallback("empty input".to_string()));
    }

    if let Ok(url) = url::Url::parse(trimmed)
        && url.has_host()
    {
        return params_from_query(url.query_pairs());
    }

    if trimmed.contains('=') {
        let query = trimmed.trim_start_matches('?');
        return params_from_query(url::form_urlencoded::parse(query.as_bytes()));
    }

    let (code, state) = trimmed.split_once('#').ok_or_else(|| {
        OAuthError::InvalidCallback(
            "expected a redirect URL or code#state".to_string(),
        )
    })?;
    if code.is_empty() || state.is_empty() {
        return Err(OAuthError::InvalidCallback(
            "missing code or state".to_string(),
        ));
    }
    Ok(CallbackParams {
        code: code.to_string(),
        state: state.to_string(),
    })
}

fn params_from_query<'a>(
    pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
) -> Result<CallbackParams> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in pairs {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        let message = match description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        };
        return Err(OAuthError::InvalidCallback(format!(
            "authorization server returned {}",
            message
        )));
    }

    match (code, state) {
        (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
            Ok(CallbackParams { code, state })
        }
        _ => Err(OAuthError::InvalidCallback(
            "missing code or state".to_string(),
        )),
    }
}

/// Token endpoint response after protocol checks.
#[derive(Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token endpoint response as it appears on the wire.
#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

impl TryFrom<RawTokenResponse> for TokenResponse {
    type Error = TransportError;

    fn try_from(raw: RawTokenResponse) -> std::result::Result<Self, Self::Error> {
        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransportError::Protocol("response has no access_token".to_string()))?;
        let expires_in = raw
            .expires_in
            .ok_or_else(|| TransportError::Protocol("response has no expires_in".to_string()))?;
        Ok(Self {
            access_token,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
            expires_in,
            token_type: raw.token_type,
            scope: raw.scope,
        })
    }
}

/// Introspection endpoint response (RFC 7662).
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Serialize)]
struct AuthorizationCodeGrant<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    code_verifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshTokenGrant<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Serialize)]
struct IntrospectionRequest<'a> {
    token: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// HTTP client for the authorization server and protected resources.
///
/// Every call carries the configured timeout and is never retried.
#[derive(Debug, Clone)]
pub struct AuthServerClient {
    http: reqwest::Client,
    config: Arc<OAuthConfig>,
}

impl AuthServerClient {
    /// Create a client with its own connection pool.
    pub fn new(config: Arc<OAuthConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("sigil/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OAuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http_client(config, http))
    }

    /// Create a client on top of an existing `reqwest::Client`.
    pub fn with_http_client(config: Arc<OAuthConfig>, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Exchange an authorization code for tokens (`authorization_code` grant).
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> std::result::Result<TokenResponse, TransportError> {
        let form = AuthorizationCodeGrant {
            grant_type: "authorization_code",
            code,
            redirect_uri,
            client_id: &self.config.client_id,
            code_verifier: verifier,
            client_secret: self.config.client_secret.as_deref(),
        };

        tracing::debug!(url = %self.config.token_url, "Exchanging authorization code");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let raw: RawTokenResponse = read_json(response).await?;
        TokenResponse::try_from(raw)
    }

    /// Obtain new tokens with a refresh token (`refresh_token` grant).
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<TokenResponse, TransportError> {
        let form = RefreshTokenGrant {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.as_deref(),
        };

        tracing::debug!(url = %self.config.token_url, "Refreshing access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let raw: RawTokenResponse = read_json(response).await?;
        TokenResponse::try_from(raw)
    }

    /// Ask the authorization server whether `token` is still active.
    pub async fn introspect(
        &self,
        token: &str,
    ) -> std::result::Result<IntrospectionResponse, TransportError> {
        let form = IntrospectionRequest {
            token,
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.as_deref(),
        };

        tracing::debug!(url = %self.config.introspection_url, "Introspecting token");
        let response = self
            .http
            .post(&self.config.introspection_url)
            .form(&form)
            .timeout(self.config.timeout)
            .send()
            .await?;

        read_json(response).await
    }

    /// GET a protected JSON resource with a bearer token.
    pub async fn get_json(
        &self,
        url: &str,
        access_token: &str,
    ) -> std::result::Result<serde_json::Value, TransportError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.timeout)
            .send()
            .await?;

        read_json(response).await
    }
}

/// Read a JSON body, turning non-success statuses into [`TransportError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
}
