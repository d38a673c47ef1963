//! Bridge messages and their JSON encoding.

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;

/// Error type for bridge message encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed bridge message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages posted by the webview to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WebviewMessage {
    /// Sent once after the webview script has loaded.
    Connected,

    /// Sent when the user explicitly asks for fresh data.
    Refresh {
        #[serde(default)]
        text: String,
    },
}

/// Messages posted by the host to the webview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostMessage {
    /// Replace everything the grid displays.
    Update { data: GridPayload },
}

/// The full dataset carried by an `update` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridPayload {
    pub columns: Vec<String>,
    pub data: Vec<Vec<CellValue>>,
    /// Why the grid is empty, when the host could not fetch the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GridPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    /// An empty payload annotated with the failure that produced it.
    pub fn failed(error: impl Into<String>) -> Self {
        GridPayload {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl WebviewMessage {
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl HostMessage {
    pub fn update(data: GridPayload) -> Self {
        HostMessage::Update { data }
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
