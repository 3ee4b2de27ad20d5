//! Campaign progress tracking
//!
//! Pure aggregation over per-recipient sub-states. The dispatcher is the
//! only writer; callers read cloned snapshots, applied in strict send
//! order so observed counts never regress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use herald_common::types::{CampaignId, Recipient};
use serde::Serialize;
use tokio::sync::RwLock;

use super::retry::SendOutcome;

/// Campaign lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    Idle,
    Preparing,
    Sending,
    Done,
    Error,
}

/// Per-recipient dispatch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sending,
    Done,
    Error,
}

/// Per-recipient sub-state
#[derive(Debug, Clone, Serialize)]
pub struct RecipientProgress {
    pub phone: String,
    pub name: Option<String>,
    pub status: RecipientStatus,
    /// Messages attempted for this recipient, success or failure
    pub done_images: u32,
    /// Messages this recipient expands to
    pub total_images: u32,
    pub success: u32,
    pub failed: u32,
    /// Raw text of the most recent failure, kept for diagnosis
    pub last_error: Option<String>,
}

/// Aggregate campaign state
#[derive(Debug, Clone, Serialize)]
pub struct CampaignProgress {
    pub id: CampaignId,
    pub phase: CampaignPhase,
    pub total_customers: u32,
    pub done_customers: u32,
    pub total_messages: u32,
    pub attempted_messages: u32,
    pub total_success: u32,
    pub total_failed: u32,
    /// Campaign-fatal reason, set only in the error phase
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub recipients: Vec<RecipientProgress>,
}

impl CampaignProgress {
    /// Share of messages attempted so far, 0 to 100
    pub fn progress_percentage(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            (self.attempted_messages as f64 / self.total_messages as f64) * 100.0
        }
    }

    /// Estimated completion time while sending, from the configured base
    /// delay and the remaining message count
    pub fn estimated_completion(&self, base_delay_ms: u64) -> Option<DateTime<Utc>> {
        if self.phase != CampaignPhase::Sending {
            return None;
        }
        let remaining = self.total_messages.saturating_sub(self.attempted_messages);
        if remaining == 0 {
            return None;
        }
        Some(Utc::now() + chrono::Duration::milliseconds(remaining as i64 * base_delay_ms as i64))
    }

    /// Whether the campaign has reached a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, CampaignPhase::Done | CampaignPhase::Error)
    }
}

/// Sole-writer handle over shared campaign progress
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    inner: Arc<RwLock<CampaignProgress>>,
}

impl ProgressTracker {
    /// Create tracking state for a campaign over `recipients`
    pub fn new(id: CampaignId, recipients: &[Recipient]) -> Self {
        let recipient_progress: Vec<RecipientProgress> = recipients
            .iter()
            .map(|r| RecipientProgress {
                phone: r.phone.clone(),
                name: r.name.clone(),
                status: RecipientStatus::Pending,
                done_images: 0,
                total_images: r.payload.message_count(),
                success: 0,
                failed: 0,
                last_error: None,
            })
            .collect();

        let total_messages = recipient_progress.iter().map(|r| r.total_images).sum();

        Self {
            inner: Arc::new(RwLock::new(CampaignProgress {
                id,
                phase: CampaignPhase::Idle,
                total_customers: recipient_progress.len() as u32,
                done_customers: 0,
                total_messages,
                attempted_messages: 0,
                total_success: 0,
                total_failed: 0,
                error: None,
                started_at: None,
                finished_at: None,
                recipients: recipient_progress,
            })),
        }
    }

    /// Cloned snapshot, safe to poll repeatedly
    pub async fn snapshot(&self) -> CampaignProgress {
        self.inner.read().await.clone()
    }

    pub(crate) async fn set_phase(&self, phase: CampaignPhase) {
        let mut progress = self.inner.write().await;
        if progress.started_at.is_none() && phase != CampaignPhase::Idle {
            progress.started_at = Some(Utc::now());
        }
        progress.phase = phase;
    }

    pub(crate) async fn begin_recipient(&self, index: usize) {
        let mut progress = self.inner.write().await;
        progress.recipients[index].status = RecipientStatus::Sending;
    }

    /// Record one terminal send outcome, success or failure
    pub(crate) async fn record_outcome(&self, index: usize, outcome: &SendOutcome) {
        let mut progress = self.inner.write().await;
        progress.attempted_messages += 1;

        let recipient = &mut progress.recipients[index];
        recipient.done_images += 1;

        if outcome.success {
            recipient.success += 1;
        } else {
            recipient.failed += 1;
            recipient.last_error = outcome
                .raw_message
                .clone()
                .or_else(|| Some("send failed".to_string()));
        }

        if outcome.success {
            progress.total_success += 1;
        } else {
            progress.total_failed += 1;
        }
    }

    /// Close out a recipient once all of its messages were attempted
    pub(crate) async fn finish_recipient(&self, index: usize) {
        let mut progress = self.inner.write().await;
        let recipient = &mut progress.recipients[index];
        recipient.status = if recipient.failed > 0 {
            RecipientStatus::Error
        } else {
            RecipientStatus::Done
        };
        progress.done_customers += 1;
    }

    /// Fail a recipient without gateway calls, counting its unattempted
    /// messages as failed so the aggregate invariants hold
    pub(crate) async fn fail_recipient(&self, index: usize, reason: &str) {
        let mut progress = self.inner.write().await;

        let recipient = &mut progress.recipients[index];
        let remaining = recipient.total_images - recipient.done_images;
        recipient.done_images = recipient.total_images;
        recipient.failed += remaining;
        recipient.last_error = Some(reason.to_string());
        recipient.status = RecipientStatus::Error;

        progress.attempted_messages += remaining;
        progress.total_failed += remaining;
        progress.done_customers += 1;
    }

    /// Campaign-fatal stop; recorded progress stays intact
    pub(crate) async fn fail_campaign(&self, reason: &str) {
        let mut progress = self.inner.write().await;
        if progress.started_at.is_none() {
            progress.started_at = Some(Utc::now());
        }
        progress.phase = CampaignPhase::Error;
        progress.error = Some(reason.to_string());
        progress.finished_at = Some(Utc::now());
    }

    /// Every message of every recipient has been attempted
    pub(crate) async fn complete(&self) {
        let mut progress = self.inner.write().await;
        progress.phase = CampaignPhase::Done;
        progress.finished_at = Some(Utc::now());
    }
}
