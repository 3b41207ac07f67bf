use anyhow::{Context, Result};
use outreach_provider::WhatsAppClient;
use std::time::Duration;

/// Verify a sender's credential against the WhatsApp Cloud API by fetching
/// its business profile.
pub async fn verify_sender_credential(
    api_base: &str,
    access_credential: &str,
    phone_number_id: &str,
) -> Result<String> {
    let client = WhatsAppClient::new(api_base, Duration::from_secs(15));
    let profile = client
        .test_connection(access_credential, phone_number_id)
        .await
        .context("sender credential check failed")?;

    Ok(format!(
        "sender ok: verified_name={} quality_rating={} tier={}",
        profile.verified_name, profile.quality_rating, profile.tier
    ))
}
