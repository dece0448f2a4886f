//! Persisted allocation policy and renumbering opt-in.

use std::path::{Path, PathBuf};

use curator_engine::{Policy, PolicySettings};
use serde::Serialize;

use crate::error::Result;
use crate::files;

/// Settings as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyView {
    pub strategy: Policy,
    pub enabled: bool,
    pub description: &'static str,
}

impl From<PolicySettings> for PolicyView {
    fn from(settings: PolicySettings) -> Self {
        Self {
            strategy: settings.policy,
            enabled: settings.enabled,
            description: settings.policy.description(),
        }
    }
}

/// `policy.json` in the state directory.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join("policy.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings; defaults when nothing was saved yet.
    pub async fn load(&self) -> Result<PolicySettings> {
        match files::read_optional(&self.path).await? {
            Some(json) => Ok(PolicySettings::from_json(&json)?),
            None => Ok(PolicySettings::default()),
        }
    }

    pub async fn save(&self, settings: &PolicySettings) -> Result<()> {
        let json = settings.to_json_pretty()?;
        files::write_atomic(&self.path, json.as_bytes()).await?;
        Ok(())
    }

    /// Change the strategy, the opt-in, or both. Omitted values keep their
    /// stored setting.
    pub async fn update(
        &self,
        policy: Option<Policy>,
        enabled: Option<bool>,
    ) -> Result<PolicySettings> {
        let mut settings = self.load().await?;
        if let Some(policy) = policy {
            settings.policy = policy;
        }
        if let Some(enabled) = enabled {
            settings.enabled = enabled;
        }
        self.save(&settings).await?;

        tracing::info!(
            "Policy set to {} (renumbering {})",
            settings.policy,
            if settings.enabled { "enabled" } else { "disabled" }
        );
        Ok(settings)
    }
}
