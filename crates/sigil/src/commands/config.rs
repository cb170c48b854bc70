//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use sigil_config::{ConfigLocator, InitOutcome};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration (client secret masked)
    Show,

    /// Show which config files are loaded and their precedence
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./sigil.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let shown = loaded.config.redacted();

    let secret = sigil_config::resolve_client_secret(
        loaded
            .config
            .client
            .as_ref()
            .and_then(|c| c.secret.as_deref()),
    );

    if ctx.json_output {
        let out = serde_json::json!({
            "config": shown,
            "sources": loaded.loaded_from(),
            "client_secret": secret.map(|s| s.source.to_string()),
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("# Sigil Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    match &secret {
        Some(secret) => println!("Client secret: from {}\n", secret.source),
        None => println!("Client secret: none (public client)\n"),
    }

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    println!("{}", shown.to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&loaded.sources)?);
        return Ok(());
    }

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} [{}] {}", status, source.layer, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'sigil config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    match ConfigLocator::from_env().init(local, TEMPLATE)? {
        InitOutcome::Created(path) => println!("Created {}", path.display()),
        InitOutcome::AlreadyExists(path) => {
            println!("Config file already exists: {}", path.display())
        }
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Sigil Configuration

[server]
base_url = "https://auth-server.com"
# issuer = "https://auth-server.com"
# authorize_url = "https://auth-server.com/authorize"
# token_url = "https://auth-server.com/token"
# introspection_url = "https://auth-server.com/introspect"
# jwks_url = "https://auth-server.com/.well-known/jwks.json"

[client]
id = "client123"
redirect_uri = "https://example.com/callback"
scope = "profile email"
# audience = "client123"
# Set SIGIL_CLIENT_SECRET rather than writing the secret here.

[http]
timeout_secs = 5

[validation]
leeway_secs = 0
"#;
