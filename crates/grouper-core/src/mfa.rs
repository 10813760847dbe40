use crate::error::{GrouperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaStatus {
    Enabled,
    Disabled,
    /// Not in the last scan; usually an org invite that was never accepted.
    Unknown,
}

impl std::fmt::Display for MfaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaStatus::Enabled => write!(f, "enabled"),
            MfaStatus::Disabled => write!(f, "disabled"),
            MfaStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of the org MFA scan: `{"enabled": [...], "disabled": [...]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MfaFeed {
    #[serde(default)]
    enabled: HashSet<String>,
    #[serde(default)]
    disabled: HashSet<String>,
}

impl MfaFeed {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| GrouperError::MfaFeed(format!("{}: {e}", path.display())))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| GrouperError::MfaFeed(e.to_string()))
    }

    pub fn from_lists<E, D>(enabled: E, disabled: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Enabled wins if a login somehow appears in both lists.
    pub fn status(&self, login: &str) -> MfaStatus {
        if self.enabled.contains(login) {
            MfaStatus::Enabled
        } else if self.disabled.contains(login) {
            MfaStatus::Disabled
        } else {
            MfaStatus::Unknown
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }
}
