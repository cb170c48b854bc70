//! OAuth session: one authorization attempt and the tokens it produced.
//!
//! ```text
//! Created ─authorization_url─▶ AuthorizationPending ─exchange_code─▶ TokensIssued
//!                                     │                                 │
//!                              state mismatch                 access attempts
//!                                     ▼                                 ▼
//!                                  Revoked ◀── inactive ── Valid ⇄ Refreshing ─▶ Expired
//! ```

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use subtle::ConstantTimeEq;

use crate::error::{OAuthError, Result};
use crate::jwks::{KeySet, KeySetCache};
use crate::jwt::{JwtClaims, JwtValidator};
use crate::oauth::{AuthServerClient, IntrospectionResponse, OAuthConfig, build_authorization_url};
use crate::pkce::{PkceMaterial, generate_state};
use crate::token_store::{TokenRecord, TokenStore};

/// Where a session is in the authorization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// PKCE material and state nonce generated, nothing sent yet.
    Created,
    /// Authorization URL handed out, waiting for the callback.
    AuthorizationPending,
    /// Code exchanged, tokens stored, not yet checked on use.
    TokensIssued,
    /// Last access attempt verified the token locally and remotely.
    Valid,
    /// A refresh is in flight.
    Refreshing,
    /// The token expired and could not be refreshed.
    Expired,
    /// CSRF mismatch, inactive token, or sign-out. Terminal until
    /// [`OAuthSession::restart_authorization`].
    Revoked,
}

/// CSRF nonce and redirect target of one authorization attempt.
#[derive(Debug, Clone)]
pub struct SessionState {
    state: String,
    redirect_uri: String,
    consumed: bool,
}

impl SessionState {
    /// Mint a fresh nonce for `redirect_uri`.
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            state: generate_state(),
            redirect_uri: redirect_uri.into(),
            consumed: false,
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Check a callback state against the nonce.
    ///
    /// The nonce is spent by this call whether or not the values match.
    pub fn consume(&mut self, received: &str) -> Result<()> {
        if self.consumed {
            return Err(OAuthError::StateAlreadyConsumed);
        }
        self.consumed = true;
        if !constant_time_eq(&self.state, received) {
            return Err(OAuthError::CsrfStateMismatch);
        }
        Ok(())
    }

    /// Re-arm a matched nonce whose exchange never produced tokens.
    fn release(&mut self) {
        self.consumed = false;
    }
}

/// Compare two strings in constant time.
///
/// Unequal lengths still perform a comparison so timing does not reveal how
/// much of the value matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}

#[derive(Debug)]
struct SessionInner {
    status: SessionStatus,
    pkce: PkceMaterial,
    state: SessionState,
    /// Bumped on every restart and sign-out so late results of an ended
    /// attempt are dropped.
    attempt: u64,
}

impl SessionInner {
    /// Fails once `attempt` has been signed out or superseded by a restart.
    fn ensure_live(&self, attempt: u64) -> Result<()> {
        if self.status == SessionStatus::Revoked {
            return Err(OAuthError::SessionRevoked);
        }
        if self.attempt != attempt {
            return Err(OAuthError::AuthorizationRestarted);
        }
        Ok(())
    }
}

/// Drives one client through authorization, token use and refresh.
///
/// Exchange, refresh, restart and sign-out are serialized per session through
/// the token store's write gate; read-only checks run concurrently.
#[derive(Debug)]
pub struct OAuthSession {
    config: Arc<OAuthConfig>,
    client: AuthServerClient,
    keys: KeySetCache,
    validator: JwtValidator,
    tokens: TokenStore,
    inner: Mutex<SessionInner>,
}

impl OAuthSession {
    /// Start a session that redirects back to `redirect_uri`.
    pub fn new(config: OAuthConfig, redirect_uri: impl Into<String>) -> Result<Self> {
        let config = Arc::new(config);
        let client = AuthServerClient::new(config.clone())?;
        Self::from_parts(config, client, redirect_uri.into())
    }

    /// Start a session on top of an existing `reqwest::Client`.
    pub fn with_http_client(
        config: OAuthConfig,
        redirect_uri: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let client = AuthServerClient::with_http_client(config.clone(), http);
        Self::from_parts(config, client, redirect_uri.into())
    }

    fn from_parts(
        config: Arc<OAuthConfig>,
        client: AuthServerClient,
        redirect_uri: String,
    ) -> Result<Self> {
        config.validate()?;
        url::Url::parse(&redirect_uri).map_err(|e| {
            OAuthError::Config(format!("invalid redirect_uri '{}': {}", redirect_uri, e))
        })?;

        let keys = KeySetCache::new(client.http().clone(), config.timeout);
        let validator =
            JwtValidator::new(config.issuer.clone(), config.audience.clone()).with_leeway(config.leeway);

        tracing::info!(client_id = %config.client_id, redirect_uri = %redirect_uri, "OAuth session created");

        Ok(Self {
            keys,
            validator,
            tokens: TokenStore::new(),
            inner: Mutex::new(SessionInner {
                status: SessionStatus::Created,
                pkce: PkceMaterial::generate(),
                state: SessionState::new(redirect_uri),
                attempt: 0,
            }),
            config,
            client,
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn redirect_uri(&self) -> String {
        self.inner.lock().state.redirect_uri().to_string()
    }

    /// The session's token store.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// A copy of the current token record.
    pub fn token_record(&self) -> Option<TokenRecord> {
        self.tokens.current()
    }

    /// The current attempt, or [`OAuthError::SessionRevoked`].
    fn current_attempt(&self) -> Result<u64> {
        let inner = self.inner.lock();
        if inner.status == SessionStatus::Revoked {
            return Err(OAuthError::SessionRevoked);
        }
        Ok(inner.attempt)
    }

    /// Move to `status` if `attempt` is still the live one.
    ///
    /// A sign-out or restart since `attempt` began wins over the transition.
    fn transition(&self, attempt: u64, status: SessionStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_live(attempt)?;
        inner.status = status;
        Ok(())
    }

    fn revoke(&self, attempt: u64, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.attempt == attempt && inner.status != SessionStatus::Revoked {
            tracing::warn!(reason, "OAuth session revoked");
            inner.status = SessionStatus::Revoked;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    /// URL to send the user agent to for this attempt.
    pub fn authorization_url(&self) -> String {
        let mut inner = self.inner.lock();
        let url = build_authorization_url(
            &self.config,
            inner.state.redirect_uri(),
            inner.pkce.challenge(),
            inner.state.state(),
        );
        if inner.status == SessionStatus::Created {
            inner.status = SessionStatus::AuthorizationPending;
        }
        url
    }

    /// Exchange the callback's code for tokens.
    ///
    /// The state is checked before anything is sent. A mismatch revokes the
    /// session; any later call fails with [`OAuthError::StateAlreadyConsumed`].
    /// A session revoked with its nonce unspent, e.g. by
    /// [`sign_out`](Self::sign_out), fails with [`OAuthError::SessionRevoked`].
    pub async fn exchange_code(&self, code: &str, received_state: &str) -> Result<()> {
        let (verifier, redirect_uri, attempt) = {
            let mut inner = self.inner.lock();
            if inner.state.is_consumed() {
                tracing::warn!("Rejected callback replay");
                return Err(OAuthError::StateAlreadyConsumed);
            }
            if inner.status == SessionStatus::Revoked {
                return Err(OAuthError::SessionRevoked);
            }
            match inner.state.consume(received_state) {
                Ok(()) => {}
                Err(OAuthError::CsrfStateMismatch) => {
                    tracing::warn!("Callback state mismatch, possible CSRF");
                    inner.status = SessionStatus::Revoked;
                    return Err(OAuthError::CsrfStateMismatch);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected callback replay");
                    return Err(e);
                }
            }
            (
                inner.pkce.verifier().to_string(),
                inner.state.redirect_uri().to_string(),
                inner.attempt,
            )
        };

        // Sign-out and restart take the same gate, so the attempt cannot end
        // between this check and storing the result.
        let _gate = self.tokens.lock_writes().await;
        if let Err(e) = self.inner.lock().ensure_live(attempt) {
            tracing::debug!(error = %e, "Attempt ended before the exchange, code not sent");
            return Err(e);
        }

        let result = self
            .client
            .exchange_code(code, &verifier, &redirect_uri)
            .await;

        let mut inner = self.inner.lock();
        match result {
            Ok(response) => {
                let record = self.tokens.store(response);
                inner.status = SessionStatus::TokensIssued;
                tracing::info!(expires_at = %record.expires_at, "Authorization code exchanged");
                Ok(())
            }
            Err(cause) => {
                inner.state.release();
                inner.status = SessionStatus::AuthorizationPending;
                tracing::warn!(error = %cause, "Authorization code exchange failed");
                Err(OAuthError::TokenExchangeFailed(cause))
            }
        }
    }

    /// Throw away the current attempt and tokens and start over.
    ///
    /// Waits for an in-flight exchange or refresh to finish, then drops
    /// whatever it stored.
    pub async fn restart_authorization(&self) {
        let _gate = self.tokens.lock_writes().await;
        let mut inner = self.inner.lock();
        let redirect_uri = inner.state.redirect_uri().to_string();
        inner.pkce = PkceMaterial::generate();
        inner.state = SessionState::new(redirect_uri);
        inner.status = SessionStatus::Created;
        inner.attempt += 1;
        self.tokens.clear();
        tracing::info!(attempt = inner.attempt, "Authorization restarted");
    }

    /// End the session: tokens are dropped and the session is revoked.
    pub async fn sign_out(&self) {
        let _gate = self.tokens.lock_writes().await;
        let mut inner = self.inner.lock();
        inner.attempt += 1;
        inner.status = SessionStatus::Revoked;
        self.tokens.clear();
        tracing::info!("Signed out");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the authorization server's key set, replacing the cached one.
    ///
    /// Session status is never changed by this call.
    pub async fn fetch_keys(&self) -> Result<Arc<KeySet>> {
        self.keys.fetch(&self.config.jwks_url).await
    }

    /// Forget the cached key set; the next validation fetches it again.
    pub fn invalidate_keys(&self) {
        self.keys.invalidate();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Token use
    // ─────────────────────────────────────────────────────────────────────────

    /// The current access token, refreshed first if it has expired.
    pub async fn access_token(&self) -> Result<String> {
        self.live_access_token().await.map(|(token, _)| token)
    }

    /// The access token together with the attempt it belongs to.
    async fn live_access_token(&self) -> Result<(String, u64)> {
        let attempt = self.current_attempt()?;
        let record = self.tokens.current().ok_or(OAuthError::NoTokens)?;

        let now = Utc::now();
        if !record.is_expired(now) {
            return Ok((record.access_token, attempt));
        }

        tracing::info!("Access token expired, refreshing");
        self.transition(attempt, SessionStatus::Refreshing)?;
        let result = self.tokens.refresh_if_expired(&self.client, now).await;

        // Anything refreshed for an attempt that has since ended is not handed out.
        match result {
            Ok(token) => {
                self.transition(attempt, SessionStatus::Valid)?;
                Ok((token, attempt))
            }
            Err(e) => {
                self.transition(attempt, SessionStatus::Expired)?;
                Err(e)
            }
        }
    }

    /// Verify `token` locally against the cached key set, fetching it if none
    /// is cached.
    pub async fn validate_local(&self, token: &str) -> Result<JwtClaims> {
        let keys = match self.keys.key_set() {
            Some(keys) => keys,
            None => self.fetch_keys().await?,
        };
        self.validator.validate(token, &keys)
    }

    /// Ask the authorization server about `token`.
    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResponse> {
        self.client
            .introspect(token)
            .await
            .map_err(OAuthError::IntrospectionFailed)
    }

    /// An access token that is fresh, locally valid and active on the server.
    ///
    /// Local validation runs first; introspection is skipped when it fails.
    pub async fn verified_access_token(&self) -> Result<String> {
        let (token, attempt) = self.live_access_token().await?;

        let claims = match self.validate_local(&token).await {
            Ok(claims) => claims,
            Err(e @ OAuthError::InvalidToken(_)) => {
                self.revoke(attempt, "local validation failed");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let introspection = self.introspect(&token).await?;
        if !introspection.active {
            self.revoke(attempt, "token inactive at authorization server");
            return Err(OAuthError::InvalidToken(
                "authorization server reports token inactive".to_string(),
            ));
        }

        self.transition(attempt, SessionStatus::Valid)?;
        tracing::debug!(kid = %claims.key_id, expires_at = %claims.expiry, "Access token verified");
        Ok(token)
    }

    /// GET `url` with a verified bearer token and return the JSON body.
    ///
    /// Every failure is reported as [`OAuthError::Unauthenticated`] wrapping
    /// the specific cause; use [`OAuthError::kind`] to tell them apart.
    pub async fn authenticated_request(&self, url: &str) -> Result<serde_json::Value> {
        let result = match self.verified_access_token().await {
            Ok(token) => self
                .client
                .get_json(url, &token)
                .await
                .map_err(OAuthError::ResourceRequestFailed),
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            tracing::warn!(error = %e, url, "Authenticated request failed");
            OAuthError::Unauthenticated(Box::new(e))
        })
    }
}
