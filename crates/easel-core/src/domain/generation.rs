//! Success payload produced by the generation provider.

use serde::{Deserialize, Serialize};

/// What a successful generation call returns: where the artifact lives and
/// the provider's own identifier for the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub artifact_url: String,
    pub provider_id: String,
}

impl Generation {
    pub fn new(artifact_url: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            artifact_url: artifact_url.into(),
            provider_id: provider_id.into(),
        }
    }
}
