//! Request/response protocol spoken between observers and the daemon.

use serde::{Deserialize, Serialize};

use crate::{analyze_error, Comment, ErrorInfo, FilterConfig, ObserverHandle};

/// Environment signal reported by an observer surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceSignal {
    /// The surface's page became hidden.
    Hidden,
    /// The surface was closed.
    Closed,
    /// The window holding the surface lost focus.
    FocusLost,
    /// The surface became the foreground one.
    Activated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlRequest {
    StartMonitoring {
        stream_id: String,
        /// Already-resolved chat id; resolved upstream when absent.
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        observer: Option<ObserverHandle>,
        #[serde(default)]
        filters: Option<FilterConfig>,
    },
    StopMonitoring,
    SwitchStream {
        stream_id: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
    GetMonitoringState,
    GetMonitoringStream,
    GetHistory {
        #[serde(default)]
        stream_id: Option<String>,
    },
    SetFilters {
        filters: FilterConfig,
    },
    GetFilters,
    SetCredential {
        api_key: String,
    },
    GetCredential,
    ResolveChat {
        stream_id: String,
    },
    RequestAutoStop {
        #[serde(default)]
        reason: Option<String>,
    },
    SurfaceSignal {
        observer: ObserverHandle,
        signal: SurfaceSignal,
    },
}

/// Poll loop phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    #[default]
    Idle,
    Fetching,
    Scheduled,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringState {
    pub active: bool,
    pub stream_id: Option<String>,
    pub has_continuation_token: bool,
    pub history_length: usize,
    pub observer: Option<ObserverHandle>,
    pub poll_state: PollState,
}

/// Failure returned to observers instead of being raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no stream target: a resolvable stream identifier is required")]
    NoStreamTarget,

    #[error("API key not found. Set an upstream API key before monitoring.")]
    MissingCredential,

    #[error("{0}")]
    Upstream(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("engine is not running")]
    EngineUnavailable,
}

impl ControlError {
    /// Structured description for errors the UI can act on.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            Self::MissingCredential | Self::Upstream(_) => Some(analyze_error(&self.to_string())),
            _ => None,
        }
    }
}

/// Response to any [`ControlRequest`]. Only the fields relevant to the action
/// are present on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    #[serde(flatten)]
    pub state: Option<MonitoringState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_credential: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(err: &ControlError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_info: err.error_info(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: MonitoringState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
        self.comments = Some(comments);
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_request_wire_shape() {
        let req: ControlRequest = serde_json::from_str(
            r#"{"action":"startMonitoring","streamId":"abc","observer":"tab-7"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            ControlRequest::StartMonitoring {
                stream_id: "abc".into(),
                chat_id: None,
                observer: Some(ObserverHandle::new("tab-7")),
                filters: None,
            }
        );

        let req: ControlRequest = serde_json::from_str(r#"{"action":"stopMonitoring"}"#).unwrap();
        assert_eq!(req, ControlRequest::StopMonitoring);

        let req: ControlRequest = serde_json::from_str(
            r#"{"action":"surfaceSignal","observer":"tab-7","signal":"focus_lost"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            ControlRequest::SurfaceSignal {
                observer: ObserverHandle::new("tab-7"),
                signal: SurfaceSignal::FocusLost,
            }
        );
    }

    #[test]
    fn test_state_response_is_flat() {
        let resp = ControlResponse::ok().with_state(MonitoringState {
            active: true,
            stream_id: Some("abc".into()),
            has_continuation_token: false,
            history_length: 3,
            observer: None,
            poll_state: PollState::Scheduled,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["active"], true);
        assert_eq!(json["streamId"], "abc");
        assert_eq!(json["historyLength"], 3);
        assert_eq!(json["pollState"], "scheduled");
        assert!(json.get("comments").is_none());
    }

    #[test]
    fn test_missing_credential_failure_carries_info() {
        let resp = ControlResponse::failure(&ControlError::MissingCredential);
        assert!(!resp.success);
        let info = resp.error_info.unwrap();
        assert_eq!(info.kind, ErrorKind::MissingCredential);

        let resp = ControlResponse::failure(&ControlError::NoStreamTarget);
        assert!(resp.error_info.is_none());
        assert!(resp.error.unwrap().contains("no stream target"));
    }
}
