//! Gen-cookie-key command - prints a fresh AES-256 key.

use anyhow::Result;
use clap::Args;
use portier_auth::CookieKey;

use super::Context;

/// Arguments for the gen-cookie-key command.
#[derive(Args, Debug)]
pub struct GenCookieKeyArgs {}

/// Print a key suitable for `[oidc.session] cookie_key` or `PORTIER_COOKIE_KEY`.
pub fn run(_args: GenCookieKeyArgs, _ctx: &Context) -> Result<()> {
    println!("{}", CookieKey::generate().to_config_string());
    Ok(())
}
