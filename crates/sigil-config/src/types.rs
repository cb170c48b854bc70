//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]        # authorization server base URL and endpoint overrides
//! [client]        # client registration
//! [http]          # network timeouts
//! [validation]    # local token validation
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default scope requested when the config names none.
pub const DEFAULT_SCOPE: &str = "profile email";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigilConfig {
    pub server: Option<ServerConfig>,
    pub client: Option<ClientConfig>,
    pub http: Option<HttpConfig>,
    pub validation: Option<ValidationConfig>,
}

impl SigilConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: SigilConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.client.is_some() {
            self.client = other.client;
        }
        if other.http.is_some() {
            self.http = other.http;
        }
        if other.validation.is_some() {
            self.validation = other.validation;
        }
    }

    /// Authorization server base URL (`server.base_url`).
    pub fn base_url(&self) -> Result<&str> {
        self.server
            .as_ref()
            .and_then(|s| s.base_url.as_deref())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| missing("base_url", "[server]"))
    }

    /// Registered client id (`client.id`).
    pub fn client_id(&self) -> Result<&str> {
        self.client
            .as_ref()
            .and_then(|c| c.id.as_deref())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing("id", "[client]"))
    }

    /// Redirect URI registered for the client (`client.redirect_uri`).
    pub fn redirect_uri(&self) -> Result<&str> {
        self.client
            .as_ref()
            .and_then(|c| c.redirect_uri.as_deref())
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| missing("redirect_uri", "[client]"))
    }

    pub fn scope(&self) -> &str {
        self.client
            .as_ref()
            .and_then(|c| c.scope.as_deref())
            .unwrap_or(DEFAULT_SCOPE)
    }

    /// Per-request network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.as_ref().map_or(DEFAULT_TIMEOUT_SECS, |h| h.timeout_secs))
    }

    /// Clock leeway allowed past a token's `exp`.
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.validation.as_ref().map_or(0, |v| v.leeway_secs))
    }

    /// Whether the client secret is written in the config file.
    pub fn has_plaintext_secret(&self) -> bool {
        self.client
            .as_ref()
            .and_then(|c| c.secret.as_deref())
            .is_some_and(|s| !s.is_empty())
    }

    /// A copy safe to print: the client secret is masked.
    pub fn redacted(&self) -> SigilConfig {
        let mut config = self.clone();
        if let Some(client) = config.client.as_mut()
            && client.secret.is_some()
        {
            client.secret = Some("********".to_string());
        }
        config
    }
}

fn missing(field: &str, context: &str) -> ConfigError {
    ConfigError::MissingField {
        field: field.to_string(),
        context: context.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Authorization server configuration (`[server]`).
///
/// Endpoint URLs default to the usual paths under `base_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    /// Expected `iss` claim; defaults to `base_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,
}

/// Client registration (`[client]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub id: Option<String>,
    /// Prefer `SIGIL_CLIENT_SECRET`; a value here triggers a load warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expected `aud` claim; defaults to the client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

/// Network settings (`[http]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Local token validation (`[validation]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub leeway_secs: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
