//! Gmail API client for sending plain text email

use std::time::{Duration, Instant};

use anyhow::{Error, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::{STANDARD, URL_SAFE}};
use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::email::{EmailTransport, OutgoingEmail};
use crate::oauth::{TOKEN_URL, refresh_access_token};

pub const GMAIL_API_URL: &str = "https://gmail.googleapis.com";

// Tokens are refreshed this long before they actually expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct GmailSender {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_url: String,
    api_base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl GmailSender {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base_url: GMAIL_API_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Point the sender at different token and API hosts
    pub fn with_endpoints(mut self, token_url: &str, api_base_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self.api_base_url = api_base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the cached access token, refreshing it when it is
    /// missing or about to expire.
    async fn access_token(&self) -> Result<String, Error> {
        let mut token = self.token.lock().await;
        if let Some(cached) = token.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let oauth = refresh_access_token(
            &self.client,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
        )
        .await?;
        let lifetime = Duration::from_secs(oauth.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!("Refreshed Gmail access token valid for {:?}", lifetime);
        *token = Some(CachedToken {
            access_token: oauth.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(oauth.access_token)
    }
}

#[async_trait]
impl EmailTransport for GmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), Error> {
        let access_token = self.access_token().await?;

        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_base_url);
        let payload = serde_json::json!({
            "raw": URL_SAFE.encode(build_mime(email).as_bytes()),
        });
        let res = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Send failed: {} ({})", status, text);
        }
        tracing::info!("Email sent to {}", email.to);
        Ok(())
    }
}

// Header values come from model output so line breaks are dropped to
// keep them from smuggling extra headers.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

// RFC 2047 encoded-word for anything outside of ASCII
fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        subject
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(subject.as_bytes()))
    }
}

/// Build an RFC 2822 plain text message
pub fn build_mime(email: &OutgoingEmail) -> String {
    format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nDate: {date}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{body}",
        from = header_value(&email.from),
        to = header_value(&email.to),
        subject = encode_subject(&email.subject),
        date = Utc::now().to_rfc2822(),
        body = email.body,
    )
}
