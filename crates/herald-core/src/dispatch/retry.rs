//! Send retries and failure classification
//!
//! Two retry axes, deliberately separate: a rate-limit rejection gets one
//! retry against the same phone candidate after a computed wait, while a
//! number-format rejection advances to the next candidate with no extra
//! wait. Retrying a format problem against the rate limiter would waste
//! the send budget; retrying a rate-limited send against a different
//! candidate would fix nothing. Every other failure is terminal
//! immediately so persistent errors are not masked as transient ones.

use herald_gateway::{GatewayError, GatewayReply, MessageGateway};
use serde::Serialize;
use tracing::{debug, warn};

use super::dispatcher::Clock;
use super::pacing::PacingPolicy;

/// Typed classification of a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The per-account protection window was violated
    RateLimited,
    /// The gateway does not accept the number in this rendering
    NumberInvalid,
    /// Any other gateway rejection
    Rejected,
    /// The gateway never answered
    Transport,
}

/// Rejection phrases indicating the protection window was violated
const RATE_LIMIT_SIGNATURES: &[&str] = &[
    "rate limit",
    "too many",
    "flood",
    "spam detected",
    "protection",
    "wait a moment",
];

/// Rejection phrases indicating the number rendering is not accepted
const NUMBER_SIGNATURES: &[&str] = &[
    "not on whatsapp",
    "not registered",
    "invalid number",
    "unregistered",
    "no account",
    "invalid phone",
];

/// Classify free-form gateway rejection text into a typed kind.
///
/// The recognized signature sets live here and nowhere else, so wording
/// changes on the gateway side have a single place to land.
pub fn classify_rejection(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();

    if RATE_LIMIT_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return ErrorKind::RateLimited;
    }
    if NUMBER_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return ErrorKind::NumberInvalid;
    }
    ErrorKind::Rejected
}

/// Terminal result of one recipient-message send, after retries
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    /// The phone rendering used on the final attempt
    pub phone: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Raw gateway text, kept for diagnosis
    pub raw_message: Option<String>,
    /// Gateway calls made for this message
    pub attempts: u32,
}

impl SendOutcome {
    fn succeeded(phone: &str, attempts: u32) -> Self {
        Self {
            phone: phone.to_string(),
            success: true,
            error_kind: None,
            raw_message: None,
            attempts,
        }
    }

    pub(crate) fn failed(
        phone: &str,
        kind: ErrorKind,
        raw_message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            phone: phone.to_string(),
            success: false,
            error_kind: Some(kind),
            raw_message: Some(raw_message.into()),
            attempts,
        }
    }

    fn from_error(phone: &str, error: GatewayError, attempts: u32) -> Self {
        match error {
            GatewayError::Rejected { message, .. } => {
                let kind = classify_rejection(&message);
                Self::failed(phone, kind, message, attempts)
            }
            GatewayError::Transport(cause) => {
                Self::failed(phone, ErrorKind::Transport, cause, attempts)
            }
        }
    }
}

/// One message to send, media already resolved to a hosted URL
#[derive(Debug, Clone, Copy)]
pub enum SendRequest<'a> {
    Text(&'a str),
    Media {
        url: &'a str,
        caption: Option<&'a str>,
    },
}

/// Wraps gateway calls with the two-axis retry
pub struct RetryController<'a> {
    gateway: &'a dyn MessageGateway,
    pacing: &'a PacingPolicy,
    clock: &'a dyn Clock,
}

impl<'a> RetryController<'a> {
    pub fn new(
        gateway: &'a dyn MessageGateway,
        pacing: &'a PacingPolicy,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            gateway,
            pacing,
            clock,
        }
    }

    /// Send one message, walking phone candidates on number-format
    /// rejections and retrying once after a rate-limit rejection.
    pub async fn send(&self, candidates: &[String], request: SendRequest<'_>) -> SendOutcome {
        let mut attempts = 0u32;
        let mut last_phone = "";

        for candidate in candidates {
            last_phone = candidate.as_str();
            attempts += 1;

            let error = match self.attempt(candidate, request).await {
                Ok(_) => return SendOutcome::succeeded(candidate, attempts),
                Err(error) => error,
            };

            match error {
                GatewayError::Rejected {
                    message,
                    retry_after,
                } => match classify_rejection(&message) {
                    ErrorKind::RateLimited => {
                        let wait = self.pacing.rate_limit_wait(retry_after);
                        warn!(
                            phone = candidate.as_str(),
                            wait_ms = wait.as_millis() as u64,
                            "Rate limited, retrying once"
                        );
                        self.clock.sleep(wait).await;

                        attempts += 1;
                        return match self.attempt(candidate, request).await {
                            Ok(_) => SendOutcome::succeeded(candidate, attempts),
                            // Any failure after the rate-limit retry is terminal.
                            Err(error) => SendOutcome::from_error(candidate, error, attempts),
                        };
                    }
                    ErrorKind::NumberInvalid => {
                        debug!(
                            phone = candidate.as_str(),
                            "Number rejected, trying next candidate"
                        );
                        continue;
                    }
                    kind => return SendOutcome::failed(candidate, kind, message, attempts),
                },
                GatewayError::Transport(cause) => {
                    return SendOutcome::failed(candidate, ErrorKind::Transport, cause, attempts)
                }
            }
        }

        SendOutcome::failed(
            last_phone,
            ErrorKind::NumberInvalid,
            "no phone rendering accepted by the gateway",
            attempts,
        )
    }

    async fn attempt(
        &self,
        phone: &str,
        request: SendRequest<'_>,
    ) -> Result<GatewayReply, GatewayError> {
        match request {
            SendRequest::Text(message) => self.gateway.send_text(phone, message).await,
            SendRequest::Media { url, caption } => {
                self.gateway.send_media(phone, url, caption).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{FakeClock, ScriptedGateway, SendScript};
    use super::*;
    use herald_common::DispatchSettings;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn policy() -> PacingPolicy {
        PacingPolicy::from_settings(&DispatchSettings::default())
    }

    fn candidates() -> Vec<String> {
        vec!["+628123456789".to_string(), "628123456789".to_string()]
    }

    #[test]
    fn test_classify_rejection() {
        assert_eq!(
            classify_rejection("Rate limit exceeded, wait a moment"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_rejection("too many messages sent"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_rejection("number is NOT registered"),
            ErrorKind::NumberInvalid
        );
        assert_eq!(
            classify_rejection("recipient not on whatsapp"),
            ErrorKind::NumberInvalid
        );
        assert_eq!(classify_rejection("media too large"), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_candidate_fallback_on_number_rejection() {
        let gateway = ScriptedGateway::with_script(vec![
            SendScript::Reject("number not registered"),
            SendScript::Ok,
        ]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.phone, "628123456789");
        assert_eq!(gateway.send_count(), 2);
        assert!(clock.sleeps().is_empty(), "format fallback must not wait");
    }

    #[tokio::test]
    async fn test_rate_limit_retries_once_then_gives_up() {
        let gateway = ScriptedGateway::with_script(vec![
            SendScript::RejectWithHint("rate limit exceeded", 7),
            SendScript::Reject("rate limit exceeded"),
        ]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error_kind, Some(ErrorKind::RateLimited));
        assert_eq!(gateway.send_count(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn test_rate_limit_retry_without_hint_waits_floor_plus_margin() {
        let gateway = ScriptedGateway::with_script(vec![
            SendScript::Reject("rate limit exceeded"),
            SendScript::Ok,
        ]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5250)]);
    }

    #[tokio::test]
    async fn test_failure_after_rate_limit_retry_is_terminal_even_if_format_shaped() {
        let gateway = ScriptedGateway::with_script(vec![
            SendScript::Reject("rate limit exceeded"),
            SendScript::Reject("number not registered"),
        ]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NumberInvalid));
        assert_eq!(gateway.send_count(), 2, "no further candidates tried");
    }

    #[tokio::test]
    async fn test_other_rejection_is_terminal_immediately() {
        let gateway =
            ScriptedGateway::with_script(vec![SendScript::Reject("malformed payload")]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Rejected));
        assert_eq!(outcome.raw_message.as_deref(), Some("malformed payload"));
        assert_eq!(gateway.send_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal_immediately() {
        let gateway = ScriptedGateway::with_script(vec![SendScript::Fail("connection reset")]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Transport));
        assert_eq!(gateway.send_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausting_candidates_is_terminal() {
        let gateway = ScriptedGateway::with_script(vec![
            SendScript::Reject("invalid number"),
            SendScript::Reject("invalid number"),
        ]);
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(&candidates(), SendRequest::Text("hello"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NumberInvalid));
    }

    #[tokio::test]
    async fn test_media_request_carries_caption() {
        let gateway = ScriptedGateway::always_ok();
        let clock = FakeClock::default();
        let policy = policy();
        let controller = RetryController::new(&gateway, &policy, &clock);

        let outcome = controller
            .send(
                &candidates(),
                SendRequest::Media {
                    url: "https://media.test/hosted/1",
                    caption: Some("promo"),
                },
            )
            .await;

        assert!(outcome.success);
        let calls = gateway.send_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].media_url.as_deref(), Some("https://media.test/hosted/1"));
        assert_eq!(calls[0].caption.as_deref(), Some("promo"));
    }
}
