use serde::{Deserialize, Serialize};

use crate::types::Role;

/// Pipeline policy knobs.
///
/// Ordering and failure policy are fixed by the protocol; this only covers
/// the parts operators are expected to tune.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether to send a best-effort pin request after anchoring.
    pub pin_after_anchor: bool,
    /// Holding any one of these roles allows verification and retrieval.
    pub authorized_roles: Vec<Role>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pin_after_anchor: true,
            authorized_roles: Role::ALL.to_vec(),
        }
    }
}
