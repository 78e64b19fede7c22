use serde::{Deserialize, Serialize};

use crate::{Comment, ErrorInfo};

/// Opaque reference to the surface (e.g. a browser tab) that started
/// monitoring. Used only for best-effort direct pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverHandle(pub String);

impl ObserverHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pushed to observers. Delivery is best-effort; the history is the
/// fallback an observer re-reads when it (re)attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ObserverEvent {
    NewSpecialComments {
        stream_id: String,
        comments: Vec<Comment>,
    },
    ShowDetailedError {
        error_info: ErrorInfo,
    },
    MonitoringAutoStopped {
        reason: String,
    },
    MonitoringStateChanged {
        active: bool,
        stream_id: Option<String>,
    },
}

impl ObserverEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewSpecialComments { .. } => "newSpecialComments",
            Self::ShowDetailedError { .. } => "showDetailedError",
            Self::MonitoringAutoStopped { .. } => "monitoringAutoStopped",
            Self::MonitoringStateChanged { .. } => "monitoringStateChanged",
        }
    }
}
