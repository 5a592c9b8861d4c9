//! Discover command - checks that a provider can serve this gateway.

use anyhow::{Context as _, Result};
use clap::Args;
use portier_auth::oidc::ProviderDirectory;

use super::Context;

/// Arguments for the discover command.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Provider URL (overrides `[oidc] provider_url`)
    #[arg(long)]
    pub provider_url: Option<String>,

    /// Don't require refresh token support
    #[arg(long)]
    pub no_refresh: bool,

    /// Print the discovery document as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the discover command.
pub async fn run(args: DiscoverArgs, ctx: &Context) -> Result<()> {
    let oidc = ctx.loaded.config.oidc.as_ref();

    let provider_url = args
        .provider_url
        .or_else(|| oidc.and_then(|o| o.provider_url.clone()))
        .context("no provider URL: pass --provider-url or set [oidc] provider_url")?;
    let require_refresh =
        !args.no_refresh && oidc.and_then(|o| o.use_refresh_tokens).unwrap_or(true);

    let http = reqwest::Client::builder()
        .user_agent(concat!("portier/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let directory = ProviderDirectory::new(http, &provider_url, require_refresh);

    let provider = directory
        .fetch()
        .await
        .with_context(|| format!("provider at {} is not usable", directory.discovery_url()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&provider)?);
        return Ok(());
    }

    println!("Provider OK: {}", provider_url);
    if let Some(issuer) = &provider.issuer {
        println!("  issuer:                 {}", issuer);
    }
    println!("  authorization_endpoint: {}", provider.authorization_endpoint);
    println!("  token_endpoint:         {}", provider.token_endpoint);
    println!("  userinfo_endpoint:      {}", provider.userinfo_endpoint);
    match &provider.revocation_endpoint {
        Some(endpoint) => println!("  revocation_endpoint:    {}", endpoint),
        None => println!("  revocation_endpoint:    (none, logout will not revoke)"),
    }
    println!(
        "  refresh tokens:         {}",
        if require_refresh { "required" } else { "not required" }
    );
    Ok(())
}
