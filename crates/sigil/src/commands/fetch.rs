//! Fetch command - log in, then GET a protected resource.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::login::{LoginOptions, authorize};

/// Arguments for the fetch command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Protected resource URL
    pub url: String,

    #[command(flatten)]
    pub options: LoginOptions,
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    authorize(&session, &args.options, ctx).await?;

    let body = match session.authenticated_request(&args.url).await {
        Ok(body) => body,
        Err(e) => {
            if ctx.verbose {
                eprintln!("Cause: {}", e.kind());
            }
            return Err(e.into());
        }
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string(&body)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(())
}
