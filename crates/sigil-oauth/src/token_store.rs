//! Token storage and the refresh protocol.
//!
//! Writes (code exchange and refresh) are serialized through an async gate
//! held across the network call, so two refreshes can never race and lose a
//! rotated refresh token. The record itself sits behind a synchronous lock
//! that is never held across an await.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{OAuthError, Result, TransportError};
use crate::oauth::{AuthServerClient, TokenResponse};

/// The current access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Build a record from a token response received at `now`.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(response.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            token_type: response.token_type,
            scope: response.scope,
        }
    }

    /// Strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds left before expiry (zero once expired).
    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Holds the token record of one session.
#[derive(Debug, Default)]
pub struct TokenStore {
    record: RwLock<Option<TokenRecord>>,
    write_gate: Mutex<()>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole record with a fresh response, expiring `expires_in`
    /// seconds from now.
    pub fn store(&self, response: TokenResponse) -> TokenRecord {
        self.store_at(response, Utc::now())
    }

    pub(crate) fn store_at(&self, response: TokenResponse, now: DateTime<Utc>) -> TokenRecord {
        let record = TokenRecord::from_response(response, now);
        *self.record.write() = Some(record.clone());
        tracing::debug!(expires_at = %record.expires_at, "Tokens stored");
        record
    }

    /// A copy of the current record.
    pub fn current(&self) -> Option<TokenRecord> {
        self.record.read().clone()
    }

    pub fn has_tokens(&self) -> bool {
        self.record.read().is_some()
    }

    /// True when no record is held or the held one is past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.record
            .read()
            .as_ref()
            .is_none_or(|record| record.is_expired(now))
    }

    /// Drop the record.
    pub fn clear(&self) {
        *self.record.write() = None;
    }

    /// Wait for exclusive write access. Exchange and refresh both go through here.
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Refresh the access token unconditionally.
    pub async fn refresh(&self, client: &AuthServerClient) -> Result<String> {
        let _gate = self.lock_writes().await;
        self.refresh_locked(client).await
    }

    /// Refresh only if the record is still expired once write access is held.
    ///
    /// Callers that queued behind another refresh get the new token without a
    /// second network call.
    pub async fn refresh_if_expired(
        &self,
        client: &AuthServerClient,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let _gate = self.lock_writes().await;
        if let Some(record) = self.current()
            && !record.is_expired(now)
        {
            tracing::debug!("Token already refreshed by a concurrent caller");
            return Ok(record.access_token);
        }
        self.refresh_locked(client).await
    }

    async fn refresh_locked(&self, client: &AuthServerClient) -> Result<String> {
        let previous = self.current();
        let refresh_token = previous
            .as_ref()
            .and_then(|record| record.refresh_token.clone())
            .filter(|token| !token.is_empty())
            .ok_or(OAuthError::RefreshFailed(TransportError::NotSent(
                "no refresh token held",
            )))?;

        let mut response = client
            .refresh_token(&refresh_token)
            .await
            .map_err(OAuthError::RefreshFailed)?;

        if response.refresh_token.is_none() {
            response.refresh_token = Some(refresh_token);
        }

        let record = self.store(response);
        tracing::info!(expires_at = %record.expires_at, "Access token refreshed");
        Ok(record.access_token)
    }
}
