//! Common types for Herald

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// What gets sent to a recipient: a plain text message, or one message
/// per media item with an optional caption on the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Plain text message
    Text(String),
    /// One or more media items, each sent as its own message
    Media {
        /// Media sources: gateway-hosted URLs, remote URLs, or base64 payloads
        sources: Vec<String>,
        /// Caption attached to the first media item only
        caption: Option<String>,
    },
}

impl MessagePayload {
    /// Number of individual gateway messages this payload expands to
    pub fn message_count(&self) -> u32 {
        match self {
            MessagePayload::Text(_) => 1,
            MessagePayload::Media { sources, .. } => sources.len() as u32,
        }
    }
}

/// One message target in a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Raw phone number as supplied by the caller; normalized at dispatch time
    pub phone: String,

    /// Display name, if known
    pub name: Option<String>,

    /// The message payload for this recipient
    pub payload: MessagePayload,
}

impl Recipient {
    /// Create a text-message recipient
    pub fn text(phone: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            name: None,
            payload: MessagePayload::Text(message.into()),
        }
    }

    /// Create a media-message recipient
    pub fn media(
        phone: impl Into<String>,
        sources: Vec<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            name: None,
            payload: MessagePayload::Media { sources, caption },
        }
    }

    /// Attach a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
