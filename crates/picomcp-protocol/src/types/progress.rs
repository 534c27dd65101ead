//! Progress notification parameters.

use serde::{Deserialize, Serialize};

/// Parameters of a notifications/progress message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    /// The token the client attached to the originating request.
    #[serde(rename = "progressToken")]
    pub progress_token: String,
    /// Current progress value.
    pub progress: f64,
    /// Total expected; omitted when indeterminate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
