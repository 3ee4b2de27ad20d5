//! Settings store collaborator

use async_trait::async_trait;
use herald_common::{DispatchSettings, Result};

/// Read-only source of dispatch settings.
///
/// Settings are fetched once per campaign and stay immutable for its
/// duration; mid-campaign changes apply to the next campaign.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the current dispatch settings
    async fn dispatch_settings(&self) -> Result<DispatchSettings>;
}

/// Fixed settings for embedders that load configuration themselves
pub struct StaticSettings(DispatchSettings);

impl StaticSettings {
    /// Wrap already-loaded settings
    pub fn new(settings: DispatchSettings) -> Self {
        Self(settings)
    }
}

#[async_trait]
impl SettingsStore for StaticSettings {
    async fn dispatch_settings(&self) -> Result<DispatchSettings> {
        Ok(self.0.clone())
    }
}
