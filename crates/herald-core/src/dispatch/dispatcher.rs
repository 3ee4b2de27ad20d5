//! Sequential campaign dispatcher
//!
//! One campaign, one logical worker: the gateway's per-account protection
//! window makes concurrent sends counterproductive, so recipients are
//! processed strictly in order. The loop suspends only for pacing waits
//! and gateway round-trips, and checks the campaign control state before
//! every send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_common::types::{CampaignId, MessagePayload, Recipient};
use herald_common::DispatchSettings;
use herald_gateway::MessageGateway;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::manager::DispatchError;
use super::media::MediaResolver;
use super::pacing::PacingPolicy;
use super::phone::normalize_phone;
use super::progress::{CampaignPhase, ProgressTracker};
use super::retry::{ErrorKind, RetryController, SendOutcome, SendRequest};

/// Time source seam, so tests observe waits instead of sleeping through them
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Tokio-backed clock
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Campaign control states observed by the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

/// One message of a recipient's payload
enum MessageUnit<'a> {
    Text(&'a str),
    Media {
        source: &'a str,
        caption: Option<&'a str>,
    },
}

/// Expand a recipient into its ordered message units. The caption rides
/// only on the first media item, matching the embedding product's rule.
fn message_units<'a>(recipient: &'a Recipient) -> Vec<MessageUnit<'a>> {
    match &recipient.payload {
        MessagePayload::Text(message) => vec![MessageUnit::Text(message)],
        MessagePayload::Media { sources, caption } => sources
            .iter()
            .enumerate()
            .map(|(i, source)| MessageUnit::Media {
                source,
                caption: if i == 0 { caption.as_deref() } else { None },
            })
            .collect(),
    }
}

/// Wait until the campaign may proceed. Returns false when cancelled,
/// either explicitly or because the controlling handle went away while
/// the campaign was parked.
async fn wait_until_runnable(control: &mut watch::Receiver<ControlState>) -> bool {
    loop {
        let state = *control.borrow();
        match state {
            ControlState::Running => return true,
            ControlState::Cancelled => return false,
            ControlState::Paused => {
                if control.changed().await.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Resolve every distinct media source exactly once, before anything is
/// sent. Any failure here is campaign-fatal.
async fn prepare_media(
    gateway: &dyn MessageGateway,
    settings: &DispatchSettings,
    recipients: &[Recipient],
) -> Result<HashMap<String, String>, DispatchError> {
    let mut resolver = MediaResolver::new(Duration::from_millis(settings.http_timeout_ms))?;

    for recipient in recipients {
        if let MessagePayload::Media { sources, .. } = &recipient.payload {
            for source in sources {
                resolver.resolve(gateway, source).await?;
            }
        }
    }

    Ok(resolver.into_cache())
}

/// Sequential driver for one campaign
pub(crate) struct Dispatcher<R: Rng + Send> {
    campaign_id: CampaignId,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    pacing: PacingPolicy,
    tracker: ProgressTracker,
    control: watch::Receiver<ControlState>,
    rng: R,
}

impl<R: Rng + Send> Dispatcher<R> {
    pub(crate) fn new(
        campaign_id: CampaignId,
        gateway: Arc<dyn MessageGateway>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
        tracker: ProgressTracker,
        control: watch::Receiver<ControlState>,
        rng: R,
    ) -> Self {
        let pacing = PacingPolicy::from_settings(&settings);
        Self {
            campaign_id,
            gateway,
            clock,
            settings,
            pacing,
            tracker,
            control,
            rng,
        }
    }

    /// Run the campaign to a terminal phase. Recipient-local failures are
    /// recorded and never abort the run; campaign-fatal conditions stop it
    /// with the cause on the progress state.
    pub(crate) async fn run(self, recipients: Vec<Recipient>) {
        let Dispatcher {
            campaign_id,
            gateway,
            clock,
            settings,
            pacing,
            tracker,
            mut control,
            mut rng,
        } = self;

        if !wait_until_runnable(&mut control).await {
            tracker
                .fail_campaign(&DispatchError::Cancelled.to_string())
                .await;
            return;
        }

        tracker.set_phase(CampaignPhase::Preparing).await;

        let media = match prepare_media(gateway.as_ref(), &settings, &recipients).await {
            Ok(media) => media,
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "Media preparation failed");
                tracker.fail_campaign(&e.to_string()).await;
                return;
            }
        };

        // Normalize every phone up front; unusable ones fail fast below.
        let candidate_lists: Vec<Option<Vec<String>>> = recipients
            .iter()
            .map(|r| normalize_phone(&r.phone, &settings.default_country_code).ok())
            .collect();

        if candidate_lists.iter().all(Option::is_none) {
            tracker
                .fail_campaign(&DispatchError::NoValidRecipients.to_string())
                .await;
            return;
        }

        tracker.set_phase(CampaignPhase::Sending).await;
        info!(
            campaign = %campaign_id,
            recipients = recipients.len(),
            media = media.len(),
            "Campaign sending started"
        );

        let retry = RetryController::new(gateway.as_ref(), &pacing, clock.as_ref());
        let mut send_index: u64 = 0;

        for (recipient_index, recipient) in recipients.iter().enumerate() {
            if !wait_until_runnable(&mut control).await {
                tracker
                    .fail_campaign(&DispatchError::Cancelled.to_string())
                    .await;
                return;
            }

            let Some(candidates) = &candidate_lists[recipient_index] else {
                warn!(
                    campaign = %campaign_id,
                    phone = recipient.phone.as_str(),
                    "Skipping recipient with unusable phone number"
                );
                tracker
                    .fail_recipient(recipient_index, "invalid phone number")
                    .await;
                continue;
            };

            tracker.begin_recipient(recipient_index).await;

            for unit in message_units(recipient) {
                if !wait_until_runnable(&mut control).await {
                    tracker
                        .fail_campaign(&DispatchError::Cancelled.to_string())
                        .await;
                    return;
                }

                let delay = pacing.delay_for(send_index, &mut rng);
                debug!(
                    index = send_index,
                    delay_ms = delay.as_millis() as u64,
                    "Pacing before send"
                );
                clock.sleep(delay).await;

                let outcome = match unit {
                    MessageUnit::Text(message) => {
                        retry.send(candidates, SendRequest::Text(message)).await
                    }
                    MessageUnit::Media { source, caption } => match media.get(source) {
                        Some(url) => {
                            retry
                                .send(
                                    candidates,
                                    SendRequest::Media {
                                        url: url.as_str(),
                                        caption,
                                    },
                                )
                                .await
                        }
                        None => SendOutcome::failed(
                            &recipient.phone,
                            ErrorKind::Rejected,
                            "media source was not prepared",
                            0,
                        ),
                    },
                };

                if !outcome.success {
                    warn!(
                        campaign = %campaign_id,
                        phone = outcome.phone.as_str(),
                        error = outcome.raw_message.as_deref().unwrap_or("unknown"),
                        "Send failed"
                    );
                }

                tracker.record_outcome(recipient_index, &outcome).await;
                send_index += 1;
            }

            tracker.finish_recipient(recipient_index).await;
        }

        tracker.complete().await;
        info!(campaign = %campaign_id, sends = send_index, "Campaign finished");
    }
}
