//! Keys command - list the authorization server's signing keys.

use anyhow::{Context as _, Result};
use clap::Args;
use sigil_oauth::KeySetCache;

use super::{Context, oauth_config};

/// Arguments for the keys command.
#[derive(Args, Debug)]
pub struct KeysArgs {}

/// Run the keys command.
pub async fn run(_args: KeysArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let oauth = oauth_config(&loaded.config)?;

    let cache = KeySetCache::new(reqwest::Client::new(), oauth.timeout);
    let key_set = cache
        .fetch(&oauth.jwks_url)
        .await
        .with_context(|| format!("Failed to fetch keys from {}", oauth.jwks_url))?;

    let keys = key_set.keys();

    if ctx.json_output {
        let entries: Vec<_> = keys
            .iter()
            .map(|key| serde_json::json!({"kid": key.kid, "alg": key.algorithm}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if keys.is_empty() {
        println!("No usable signing keys at {}", oauth.jwks_url);
        return Ok(());
    }

    println!("Signing keys ({}):", oauth.jwks_url);
    for key in keys {
        println!("  {:<24} {:?}", key.kid, key.algorithm);
    }
    Ok(())
}
