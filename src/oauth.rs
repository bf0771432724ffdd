//! OAuth 2.0 token refresh for the Gmail API

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Response from Google's token endpoint
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: String,
}

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh an access token using a long lived refresh token
pub async fn refresh_access_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse, anyhow::Error> {
    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    let res = client
        .post(token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&params)
        .send()
        .await?;
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Token refresh failed: {} ({})", status, text);
    }

    let mut token: TokenResponse = serde_json::from_str(&text)?;
    // The refresh endpoint does not always return refresh_token, so preserve the old one.
    token.refresh_token = Some(refresh_token.to_string());
    Ok(token)
}
