//! Herald Gateway - Messaging gateway client
//!
//! This crate speaks the external messaging gateway's HTTP API and exposes
//! the `MessageGateway` trait as the seam the dispatcher consumes, so tests
//! can substitute an in-memory gateway.

pub mod client;

pub use client::HttpGateway;

use async_trait::async_trait;
use thiserror::Error;

/// Gateway call errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The gateway answered and refused the request
    #[error("gateway rejected request: {message}")]
    Rejected {
        /// Free-form rejection text from the gateway
        message: String,
        /// Seconds the gateway asked us to wait before retrying, if supplied
        retry_after: Option<u64>,
    },

    /// The request produced no gateway answer (connect failure, timeout)
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        GatewayError::Transport(error.to_string())
    }
}

impl GatewayError {
    /// Rejection text, if this is a rejection
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            GatewayError::Rejected { message, .. } => Some(message),
            GatewayError::Transport(_) => None,
        }
    }
}

/// Payload of a successful gateway reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayReply {
    /// Optional informational text returned by the gateway
    pub message: Option<String>,
}

/// Messaging gateway trait
///
/// The three primitive operations plus the session probe. Implementations
/// perform exactly one HTTP round-trip per call: no retries, no pacing.
/// Those are the responsibility of layers above.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, phone: &str, message: &str)
        -> Result<GatewayReply, GatewayError>;

    /// Send a media message referencing gateway-hosted media.
    ///
    /// A `None` caption omits the field from the request entirely; the
    /// gateway rejects blank strings for optional text fields.
    async fn send_media(
        &self,
        phone: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<GatewayReply, GatewayError>;

    /// Upload base64 media and return its public URL
    async fn upload_media(&self, payload: &str) -> Result<String, GatewayError>;

    /// Whether the gateway's account session is up
    async fn check_connection(&self) -> Result<bool, GatewayError>;

    /// Whether `url` already points at gateway-hosted media (no re-upload needed)
    fn is_hosted_media_url(&self, _url: &str) -> bool {
        false
    }
}
