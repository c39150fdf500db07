use std::path::Path;

use oms_types::MechanismId;
use serde::{Deserialize, Serialize};

use crate::error::{MuxerError, MuxerResult};

/// Muxer configuration, usually loaded from a TOML file:
///
/// ```toml
/// preferred_mechanism = "memory"
/// disabled_mechanisms = ["legacy"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuxerConfig {
    /// Searched first when choosing the active mechanism.
    pub preferred_mechanism: Option<MechanismId>,
    /// Registered mechanisms this muxer never initializes.
    pub disabled_mechanisms: Vec<MechanismId>,
}

impl MuxerConfig {
    pub fn from_toml_str(s: &str) -> MuxerResult<Self> {
        toml::from_str(s).map_err(|e| MuxerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> MuxerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MuxerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn is_disabled(&self, id: &MechanismId) -> bool {
        self.disabled_mechanisms.contains(id)
    }
}
