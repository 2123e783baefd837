use chrono::Duration;

use crate::config::Config;
use crate::db::Store;

pub async fn cmd_issue_token(config: &Config, email: &str) -> anyhow::Result<()> {
    let email = email.trim();
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    let store = Store::new(&config.general.database_url).await?;

    if store.get_user_by_email(email).await?.is_some() {
        println!("{email} already has an account; no claim token needed.");
        return Ok(());
    }

    let issued = store
        .issue_signup_token(email, Duration::days(config.auth.signup_token_ttl_days))
        .await?;

    let link = format!(
        "{}/claim?token={}",
        config.server.base_url,
        urlencoding::encode(&issued.token.token)
    );

    if issued.reused {
        println!("Reusing live token for {email}");
    } else {
        println!("Issued token for {email}");
    }
    println!("  Link:    {link}");
    println!(
        "  Expires: {}",
        issued.token.expires_at.format("%Y-%m-%d %H:%M UTC")
    );

    Ok(())
}
