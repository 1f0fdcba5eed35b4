use bond_core::{BondError, PairKey};
use bond_memory::{AdminOutcome, AdminParams};
use serde::{Deserialize, Serialize};

/// Body of `POST /relationship/update-affection`.
///
/// Identifiers default to empty so a missing one is reported as a
/// validation failure on that field rather than a generic parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAffectionRequest {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub counterpart_id: String,
    /// POSITIVE, NEUTRAL or NEGATIVE (case-insensitive).
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub message_content: Option<String>,
}

impl UpdateAffectionRequest {
    pub fn key(&self) -> Result<PairKey, BondError> {
        PairKey::new(self.subject_id.as_str(), self.counterpart_id.as_str())
    }
}

/// Query string of the stats and history reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQuery {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub counterpart_id: Option<String>,
    /// History page size.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PairQuery {
    pub fn key(&self) -> Result<PairKey, BondError> {
        PairKey::new(
            self.subject_id.clone().unwrap_or_default(),
            self.counterpart_id.clone().unwrap_or_default(),
        )
    }
}

/// Body of `POST /dev/relationship`. Action parameters sit beside the action name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub counterpart_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(flatten)]
    pub params: AdminParams,
}

impl AdminRequest {
    pub fn key(&self) -> Result<PairKey, BondError> {
        PairKey::new(self.subject_id.as_str(), self.counterpart_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub success: bool,
    pub relationship: AdminOutcome,
}

/// Error payload for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}
