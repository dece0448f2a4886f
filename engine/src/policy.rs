//! Identifier allocation policies and their persisted settings.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How new identifiers are chosen.
///
/// Each policy combines a start point (lowest free slot, or above the highest
/// live record) with a treatment of attachment rows (they either block their
/// slot or are evicted from it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Lowest free id; attachments occupy their slot (`skip`)
    MinFreeSkipAttachments,
    /// Lowest free id; an attachment in the way is deleted (`ignore`)
    #[default]
    MinFreeDeleteAttachments,
    /// Above the highest live id; attachments occupy their slot (`grow_skip`)
    GrowFreeSkipAttachments,
    /// Above the highest live id; an attachment in the way is deleted (`grow_ignore`)
    GrowFreeDeleteAttachments,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::MinFreeSkipAttachments,
        Policy::MinFreeDeleteAttachments,
        Policy::GrowFreeSkipAttachments,
        Policy::GrowFreeDeleteAttachments,
    ];

    /// The persisted `cidStrategy` value.
    pub fn as_key(&self) -> &'static str {
        match self {
            Policy::MinFreeSkipAttachments => "skip",
            Policy::MinFreeDeleteAttachments => "ignore",
            Policy::GrowFreeSkipAttachments => "grow_skip",
            Policy::GrowFreeDeleteAttachments => "grow_ignore",
        }
    }

    /// Whether allocation starts above the highest live id.
    pub fn grows(&self) -> bool {
        matches!(
            self,
            Policy::GrowFreeSkipAttachments | Policy::GrowFreeDeleteAttachments
        )
    }

    /// Whether an attachment occupying a candidate slot may be deleted.
    pub fn deletes_attachments(&self) -> bool {
        matches!(
            self,
            Policy::MinFreeDeleteAttachments | Policy::GrowFreeDeleteAttachments
        )
    }

    /// Human readable description for operator surfaces.
    pub fn description(&self) -> &'static str {
        match self {
            Policy::MinFreeSkipAttachments => "lowest free id, attachments keep their slot",
            Policy::MinFreeDeleteAttachments => {
                "lowest free id, attachments in the way are deleted"
            }
            Policy::GrowFreeSkipAttachments => {
                "above the highest live id, attachments keep their slot"
            }
            Policy::GrowFreeDeleteAttachments => {
                "above the highest live id, attachments in the way are deleted"
            }
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Policy::ALL
            .into_iter()
            .find(|policy| policy.as_key() == s)
            .ok_or_else(|| Error::Validation(format!("unknown strategy: {s}")))
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl Serialize for Policy {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_key())
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

/// Persisted `{cidStrategy, enableStrategy}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicySettings {
    pub policy: Policy,
    /// Operator opt-in for destructive renumbering
    pub enabled: bool,
}

/// On-disk shape. Both values are strings, as the host stores them.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    cid_strategy: Option<String>,
    #[serde(default)]
    enable_strategy: Option<String>,
}

impl PolicySettings {
    pub fn new(policy: Policy, enabled: bool) -> Self {
        Self { policy, enabled }
    }

    /// Parse stored settings.
    ///
    /// An unrecognised strategy falls back to the default policy, and anything
    /// other than `"1"` leaves the opt-in off.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(json)
            .map_err(|e| Error::MalformedData(format!("invalid policy settings: {e}")))?;

        let policy = raw
            .cid_strategy
            .as_deref()
            .and_then(|key| key.parse().ok())
            .unwrap_or_default();
        let enabled = raw.enable_strategy.as_deref() == Some("1");

        Ok(Self { policy, enabled })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let raw = RawSettings {
            cid_strategy: Some(self.policy.as_key().to_string()),
            enable_strategy: Some(if self.enabled { "1" } else { "0" }.to_string()),
        };
        serde_json::to_string_pretty(&raw)
            .map_err(|e| Error::MalformedData(format!("cannot encode policy settings: {e}")))
    }
}
