//! Herald Core - Throttled bulk-messaging dispatch
//!
//! This crate implements the campaign dispatcher: phone normalization,
//! media upload deduplication, randomized pacing with cool-down breaks,
//! rate-limit retries, and per-recipient progress reporting over a
//! rate-limited messaging gateway.

pub mod dispatch;

pub use dispatch::{
    CampaignHandle, CampaignManager, CampaignPhase, CampaignProgress, DispatchError, ErrorKind,
    RecipientProgress, RecipientStatus, SendOutcome,
};
