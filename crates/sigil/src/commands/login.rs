//! Login command - run the authorization code flow.

use std::io::Write;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use sigil_oauth::{OAuthSession, parse_callback};

use super::Context;

/// Options shared by every command that has to log in first.
#[derive(Args, Debug, Clone, Default)]
pub struct LoginOptions {
    /// Callback to use instead of prompting (redirect URL or code#state)
    #[arg(long)]
    pub callback: Option<String>,

    /// Don't try to open the authorization URL in a browser
    #[arg(long)]
    pub no_browser: bool,
}

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[command(flatten)]
    pub options: LoginOptions,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    authorize(&session, &args.options, ctx).await?;
    print_summary(&session, ctx)
}

/// Walk the user through authorization and exchange the returned code.
pub async fn authorize(session: &OAuthSession, options: &LoginOptions, ctx: &Context) -> Result<()> {
    let auth_url = session.authorization_url();

    let input = match &options.callback {
        Some(callback) => {
            tracing::debug!("Using callback from command line");
            callback.clone()
        }
        None => prompt_for_callback(&auth_url, options.no_browser, ctx)?,
    };

    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("No callback provided, aborting.");
    }

    let callback = parse_callback(input).context("Failed to parse callback")?;

    if !ctx.json_output {
        eprintln!("Exchanging code for tokens...");
    }
    session
        .exchange_code(&callback.code, &callback.state)
        .await
        .context("Authorization failed")?;

    Ok(())
}

fn prompt_for_callback(auth_url: &str, no_browser: bool, ctx: &Context) -> Result<String> {
    // stdout carries only command output.
    eprintln!("Open this URL in your browser:");
    eprintln!();
    eprintln!("  {}", auth_url);
    eprintln!();

    if !no_browser && open_url(auth_url).is_err() {
        eprintln!("(Could not open browser automatically)");
        eprintln!();
    }

    eprintln!("After authorizing, paste the URL you were redirected to");
    eprintln!("(or the code#state value):");
    if !ctx.json_output {
        eprint!("callback> ");
    }
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input)
}

fn print_summary(session: &OAuthSession, ctx: &Context) -> Result<()> {
    let record = session
        .token_record()
        .context("No tokens after a successful exchange")?;
    let expires_in = record.expires_in(Utc::now());

    if ctx.json_output {
        let summary = serde_json::json!({
            "status": format!("{:?}", session.status()),
            "token_type": record.token_type,
            "scope": record.scope,
            "expires_in": expires_in,
            "expires_at": record.expires_at.to_rfc3339(),
            "refresh_token": record.has_refresh_token(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Authentication successful!");
    println!("  Expires in: {} seconds", expires_in);
    if let Some(scope) = &record.scope {
        println!("  Scope: {}", scope);
    }
    println!(
        "  Refresh token: {}",
        if record.has_refresh_token() { "yes" } else { "no" }
    );
    Ok(())
}

/// Try to open a URL in the default browser.
fn open_url(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).status()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).status()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .status()?;
    }
    Ok(())
}
