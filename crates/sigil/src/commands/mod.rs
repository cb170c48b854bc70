//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use sigil_config::{ConfigLocator, LoadedConfig, SigilConfig};
use sigil_oauth::{OAuthConfig, OAuthSession};

pub mod config;
pub mod fetch;
pub mod keys;
pub mod login;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, replacing discovery.
    pub config_file: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the config the way every command sees it.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = match &self.config_file {
            Some(path) => LoadedConfig::from_file(path)?,
            None => ConfigLocator::from_env().load()?,
        };
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        Ok(loaded)
    }

    /// Build a session from the loaded config.
    pub fn session(&self) -> Result<OAuthSession> {
        let loaded = self.load_config()?;
        let oauth = oauth_config(&loaded.config)?;
        let redirect_uri = loaded.config.redirect_uri()?;
        OAuthSession::new(oauth, redirect_uri).context("Failed to start OAuth session")
    }
}

/// Map the file config onto the library's [`OAuthConfig`].
pub fn oauth_config(config: &SigilConfig) -> Result<OAuthConfig> {
    let mut oauth = OAuthConfig::new(config.base_url()?, config.client_id()?)
        .with_scope(config.scope())
        .with_timeout(config.timeout())
        .with_leeway(config.leeway());

    if let Some(server) = &config.server {
        if let Some(issuer) = &server.issuer {
            oauth = oauth.with_issuer(issuer);
        }
        if let Some(url) = &server.authorize_url {
            oauth = oauth.with_authorize_url(url);
        }
        if let Some(url) = &server.token_url {
            oauth = oauth.with_token_url(url);
        }
        if let Some(url) = &server.introspection_url {
            oauth = oauth.with_introspection_url(url);
        }
        if let Some(url) = &server.jwks_url {
            oauth = oauth.with_jwks_url(url);
        }
    }

    let client = config.client.as_ref();
    if let Some(audience) = client.and_then(|c| c.audience.as_ref()) {
        oauth = oauth.with_audience(audience);
    }
    if let Some(secret) =
        sigil_config::resolve_client_secret(client.and_then(|c| c.secret.as_deref()))
    {
        tracing::debug!(source = %secret.source, "Client secret resolved");
        oauth = oauth.with_client_secret(secret.value);
    }

    Ok(oauth)
}
