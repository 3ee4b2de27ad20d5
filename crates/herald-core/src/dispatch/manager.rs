//! Campaign Manager - campaign lifecycle and control
//!
//! The caller-facing surface: starting a campaign spawns the sequential
//! dispatcher on the runtime and returns a handle carrying progress
//! snapshots and the cancel/pause/resume controls. One campaign runs at a
//! time per handle; the gateway's per-account rate limit makes wider
//! fan-out pointless.

use std::sync::Arc;

use herald_common::types::{CampaignId, MessagePayload, Recipient};
use herald_gateway::MessageGateway;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::dispatcher::{Clock, ControlState, Dispatcher, TokioClock};
use super::progress::{CampaignProgress, ProgressTracker};
use super::settings::SettingsStore;

/// Campaign dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("failed to prepare media '{origin}': {reason}")]
    MediaResolution { origin: String, reason: String },

    #[error("campaign has no recipients")]
    NoRecipients,

    #[error("no recipient has a usable phone number")]
    NoValidRecipients,

    #[error("campaign cancelled by caller")]
    Cancelled,

    #[error("settings unavailable: {0}")]
    Settings(#[from] herald_common::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Handle to one in-flight campaign
#[derive(Debug)]
pub struct CampaignHandle {
    id: CampaignId,
    tracker: ProgressTracker,
    control: watch::Sender<ControlState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl CampaignHandle {
    /// Campaign identifier
    pub fn id(&self) -> CampaignId {
        self.id
    }

    /// Snapshot of campaign progress; cheap and safe to poll repeatedly
    pub async fn progress(&self) -> CampaignProgress {
        self.tracker.snapshot().await
    }

    /// Stop the campaign before its next send. Recorded progress stays
    /// intact; the campaign ends in the error phase with a cancellation
    /// reason.
    pub fn cancel(&self) {
        let _ = self.control.send(ControlState::Cancelled);
    }

    /// Park the dispatcher between sends. A cancelled campaign stays
    /// cancelled.
    pub fn pause(&self) {
        self.control.send_if_modified(|state| {
            if *state == ControlState::Running {
                *state = ControlState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Resume a paused campaign
    pub fn resume(&self) {
        self.control.send_if_modified(|state| {
            if *state == ControlState::Paused {
                *state = ControlState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Wait for the dispatcher to reach a terminal phase and return the
    /// final progress
    pub async fn wait(&self) -> CampaignProgress {
        let handle = self.join.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(campaign = %self.id, error = %e, "Dispatcher task aborted");
            }
        }
        self.tracker.snapshot().await
    }
}

/// Campaign Manager - starts campaigns against one configured gateway
pub struct CampaignManager {
    gateway: Arc<dyn MessageGateway>,
    settings_store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(gateway: Arc<dyn MessageGateway>, settings_store: Arc<dyn SettingsStore>) -> Self {
        Self {
            gateway,
            settings_store,
            clock: Arc::new(TokioClock),
        }
    }

    /// Substitute the time source (deterministic tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether the gateway's account session is up
    pub async fn check_gateway(&self) -> herald_common::Result<bool> {
        self.gateway
            .check_connection()
            .await
            .map_err(|e| herald_common::Error::Gateway(e.to_string()))
    }

    /// Start a campaign over `recipients`.
    ///
    /// A non-empty `media` set overrides every recipient's payload with the
    /// shared media list and caption, which is how broadcast campaigns are
    /// built from an imported contact sheet. With an empty `media` set each
    /// recipient's own payload is used unchanged.
    pub async fn start_campaign(
        &self,
        mut recipients: Vec<Recipient>,
        media: Vec<String>,
        caption: Option<String>,
    ) -> Result<CampaignHandle, DispatchError> {
        if recipients.is_empty() {
            return Err(DispatchError::NoRecipients);
        }

        if !media.is_empty() {
            for recipient in &mut recipients {
                recipient.payload = MessagePayload::Media {
                    sources: media.clone(),
                    caption: caption.clone(),
                };
            }
        }

        let settings = self.settings_store.dispatch_settings().await?;
        let id = Uuid::new_v4();
        let tracker = ProgressTracker::new(id, &recipients);
        let (control_tx, control_rx) = watch::channel(ControlState::Running);

        let dispatcher = Dispatcher::new(
            id,
            Arc::clone(&self.gateway),
            Arc::clone(&self.clock),
            settings,
            tracker.clone(),
            control_rx,
            StdRng::from_entropy(),
        );

        info!(campaign = %id, recipients = recipients.len(), "Campaign accepted");

        let join = tokio::spawn(dispatcher.run(recipients));

        Ok(CampaignHandle {
            id,
            tracker,
            control: control_tx,
            join: Mutex::new(Some(join)),
        })
    }
}
