use chrono::Utc;

use crate::config::Config;
use crate::db::Store;

pub async fn cmd_profile_show(config: &Config, email: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_url).await?;

    let profile = store
        .get_profile_by_email(email.trim())
        .await?
        .ok_or_else(|| anyhow::anyhow!("No profile for '{email}'"))?;

    println!("Profile: {}", profile.email);
    println!("{:-<60}", "");
    println!(
        "Linked user:  {}",
        profile.user_id.as_deref().unwrap_or("(not claimed)")
    );
    println!(
        "Customer:     {}",
        profile.stripe_customer_id.as_deref().unwrap_or("-")
    );
    println!(
        "Expires:      {}",
        profile
            .expires_at
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
    );
    println!(
        "Disabled:     {}",
        if profile.disabled { "Yes" } else { "No" }
    );
    println!(
        "Entitled:     {}",
        if profile.is_entitled_at(Utc::now()) {
            "Yes"
        } else {
            "No"
        }
    );

    Ok(())
}

pub async fn cmd_profile_set_disabled(
    config: &Config,
    email: &str,
    disabled: bool,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_url).await?;

    if !store.set_profile_disabled(email.trim(), disabled).await? {
        anyhow::bail!("No profile for '{email}'");
    }

    let action = if disabled { "Disabled" } else { "Enabled" };
    println!("{action} profile for {}", email.trim());
    Ok(())
}
