//! HTTP client for the messaging gateway
//!
//! One HTTP round-trip per operation. Replies are classified into a
//! tri-state outcome: success, gateway rejection (the service answered and
//! said no), or transport failure (the service never answered usefully).

use std::time::Duration;

use async_trait::async_trait;
use herald_common::DispatchSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GatewayError, GatewayReply, MessageGateway};

#[derive(Debug, Serialize)]
struct TextMessageRequest<'a> {
    phone: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct MediaMessageRequest<'a> {
    to: &'a str,
    #[serde(rename = "imageUrl")]
    image_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    media: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(rename = "publicUrl")]
    public_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    connected: bool,
}

/// Messaging gateway HTTP client
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpGateway {
    /// Create a new gateway client from dispatch settings
    pub fn new(settings: &DispatchSettings) -> herald_common::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.http_timeout_ms))
            .build()
            .map_err(|e| {
                herald_common::Error::Gateway(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a send-shaped request and classify the reply
    async fn post_send<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<GatewayReply, GatewayError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let http_status = response.status();
        let text = response.text().await?;
        let reply: SendResponse = serde_json::from_str(&text).unwrap_or_default();

        let gateway_ok = !matches!(reply.status.as_deref(), Some("error") | Some("failed"));
        if http_status.is_success() && gateway_ok {
            return Ok(GatewayReply {
                message: reply.message,
            });
        }

        Err(GatewayError::Rejected {
            message: rejection_text(reply.message, &text, http_status.as_u16()),
            retry_after: reply.retry_after,
        })
    }
}

/// Pick the most informative rejection text available
fn rejection_text(message: Option<String>, raw_body: &str, http_status: u16) -> String {
    if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
        return message;
    }
    let trimmed = raw_body.trim();
    if !trimmed.is_empty() {
        let mut snippet: String = trimmed.chars().take(200).collect();
        if snippet.len() < trimmed.len() {
            snippet.push_str("...");
        }
        return snippet;
    }
    format!("HTTP {}", http_status)
}

#[async_trait]
impl MessageGateway for HttpGateway {
    async fn send_text(
        &self,
        phone: &str,
        message: &str,
    ) -> Result<GatewayReply, GatewayError> {
        let url = self.endpoint("/messages/text");
        debug!(phone, "Sending text message");

        self.post_send(&url, &TextMessageRequest { phone, message })
            .await
    }

    async fn send_media(
        &self,
        phone: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<GatewayReply, GatewayError> {
        let url = self.endpoint("/send-message");
        debug!(phone, media_url, "Sending media message");

        // Blank captions trip gateway validation; only forward real text.
        let text = caption.map(str::trim).filter(|c| !c.is_empty());

        self.post_send(
            &url,
            &MediaMessageRequest {
                to: phone,
                image_url: media_url,
                text,
            },
        )
        .await
    }

    async fn upload_media(&self, payload: &str) -> Result<String, GatewayError> {
        let url = self.endpoint("/upload");
        debug!(bytes = payload.len(), "Uploading media");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&UploadRequest { media: payload })
            .send()
            .await?;

        let http_status = response.status();
        let text = response.text().await?;
        let reply: UploadResponse = serde_json::from_str(&text).unwrap_or_default();

        if http_status.is_success() {
            if let Some(public_url) = reply.public_url.filter(|u| !u.is_empty()) {
                return Ok(public_url);
            }
        }

        Err(GatewayError::Rejected {
            message: rejection_text(reply.message, &text, http_status.as_u16()),
            retry_after: None,
        })
    }

    async fn check_connection(&self) -> Result<bool, GatewayError> {
        let url = self.endpoint("/status");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let http_status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                message: rejection_text(None, &text, http_status.as_u16()),
                retry_after: None,
            });
        }

        let reply: StatusResponse = response.json().await?;
        Ok(reply.connected)
    }

    fn is_hosted_media_url(&self, url: &str) -> bool {
        url.starts_with(&self.base_url)
    }
}
