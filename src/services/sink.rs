use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::MessagingConfig;

/// Failure of a single notification attempt.
///
/// Both kinds simply fail the attempt; the scheduler retries on the next
/// tick while the entry is still inside its window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

/// Outbound channel used to tell a user that a saved offer is about to expire.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, destination: &str, title: &str, platform: &str)
        -> Result<(), SendError>;
}

pub fn render_message(title: &str, platform: &str) -> String {
    format!(
        "⚠️ Hurry! The offer on *{}* ({}) is expiring soon!",
        title, platform
    )
}

/// Turn a stored subscriber number into an international one.
///
/// Separators are dropped. Numbers already carrying a `+` prefix are kept as
/// they are; otherwise leading trunk zeros are removed and `country_code`
/// is prepended. Returns `None` for anything that is not a phone number.
pub fn normalize_destination(raw: &str, country_code: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if let Some(rest) = compact.strip_prefix('+') {
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        return Some(compact);
    }

    let local = compact.trim_start_matches('0');
    if local.is_empty() || !local.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let prefix = country_code.trim();
    let prefix = prefix.strip_prefix('+').unwrap_or(prefix);
    Some(format!("+{}{}", prefix, local))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    WhatsApp,
    Sms,
}

impl Channel {
    pub fn from_name(name: &str) -> Self {
        match name {
            "sms" => Channel::Sms,
            _ => Channel::WhatsApp,
        }
    }

    fn address(&self, number: &str) -> String {
        match self {
            Channel::WhatsApp => format!("whatsapp:{}", number),
            Channel::Sms => number.to_string(),
        }
    }
}

/// Sends alerts through the Twilio Messages API (WhatsApp or SMS).
#[derive(Clone)]
pub struct TwilioSink {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    country_code: String,
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: Option<String>,
}

impl TwilioSink {
    /// Build the sink when credentials are configured; `Ok(None)` otherwise.
    pub fn from_config(config: &MessagingConfig, timeout: Duration) -> anyhow::Result<Option<Self>> {
        let Some((sid, token, from)) = config.twilio_credentials() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Some(Self {
            client,
            api_base: config.twilio_api_base.trim_end_matches('/').to_string(),
            account_sid: sid.to_string(),
            auth_token: token.to_string(),
            from_number: from.to_string(),
            country_code: config.country_code.clone(),
            channel: Channel::from_name(&config.channel),
        }))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl NotificationSink for TwilioSink {
    async fn send(
        &self,
        destination: &str,
        title: &str,
        platform: &str,
    ) -> Result<(), SendError> {
        let to = normalize_destination(destination, &self.country_code).ok_or_else(|| {
            SendError::Permanent(format!("invalid destination number {:?}", destination))
        })?;

        let params = [
            ("From", self.channel.address(&self.from_number)),
            ("To", self.channel.address(&to)),
            ("Body", render_message(title, platform)),
        ];

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("failed to send: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            let sid = resp
                .json::<TwilioMessage>()
                .await
                .ok()
                .and_then(|m| m.sid)
                .unwrap_or_default();
            tracing::info!("Sent offer alert to {}: sid={}", to, sid);
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let detail: String = body.chars().take(200).collect();
        let message = format!("Twilio API error ({}): {}", status.as_u16(), detail);

        if status.as_u16() == 429 || status.is_server_error() {
            Err(SendError::Transient(message))
        } else {
            Err(SendError::Permanent(message))
        }
    }
}

/// Sink used when no messaging credentials are configured: writes the alert
/// to the log and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(
        &self,
        destination: &str,
        title: &str,
        platform: &str,
    ) -> Result<(), SendError> {
        tracing::info!(
            "[dry-run] alert for {}: {}",
            destination,
            render_message(title, platform)
        );
        Ok(())
    }
}
