use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Classification of an upstream or control-surface failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingCredential,
    InvalidCredential,
    QuotaExceeded,
    RateLimited,
    ChatDisabled,
    ChatNotFound,
    NotLive,
    NetworkError,
    PermissionDenied,
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// User-facing description of a failure, shown to observers as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub title: String,
    /// Upstream message with markup removed.
    pub message: String,
    pub solution: String,
    /// Machine-readable remedy hint for the UI.
    pub action: String,
    pub severity: Severity,
    pub original_error: String,
    /// Signature that matched, or `"unknown"`.
    pub pattern: String,
}

struct Remedy {
    title: &'static str,
    solution: &'static str,
    action: &'static str,
    severity: Severity,
}

impl ErrorKind {
    /// Quota and rate-limit failures are retried on the long delay.
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::RateLimited)
    }

    fn remedy(&self) -> Remedy {
        match self {
            Self::MissingCredential => Remedy {
                title: "API key is not set",
                solution: "Open the settings and enter a YouTube Data API v3 key",
                action: "setApiKey",
                severity: Severity::High,
            },
            Self::InvalidCredential => Remedy {
                title: "API key is invalid",
                solution: "Check the key in Google Cloud Console and make sure YouTube Data API v3 is enabled for it",
                action: "checkApiKey",
                severity: Severity::High,
            },
            Self::QuotaExceeded => Remedy {
                title: "API quota exhausted",
                solution: "Retry tomorrow, or raise the quota in Google Cloud Console",
                action: "waitOrUpgrade",
                severity: Severity::Medium,
            },
            Self::RateLimited => Remedy {
                title: "Requests are too frequent",
                solution: "Wait a minute before retrying",
                action: "waitAndRetry",
                severity: Severity::Low,
            },
            Self::ChatDisabled => Remedy {
                title: "Live chat is disabled",
                solution: "Wait until the broadcaster enables live chat",
                action: "waitForChat",
                severity: Severity::Medium,
            },
            Self::ChatNotFound => Remedy {
                title: "Live chat not found",
                solution: "Retry from the page of a stream that is currently live",
                action: "checkLiveStatus",
                severity: Severity::Medium,
            },
            Self::NotLive => Remedy {
                title: "Video is not live",
                solution: "Monitoring only works on videos that are streaming live",
                action: "findLiveStream",
                severity: Severity::Medium,
            },
            Self::NetworkError => Remedy {
                title: "Network error",
                solution: "Check the internet connection and retry",
                action: "checkConnection",
                severity: Severity::High,
            },
            Self::PermissionDenied => Remedy {
                title: "Permission denied",
                solution: "Check the key's API restrictions and that YouTube Data API v3 is enabled",
                action: "checkPermissions",
                severity: Severity::High,
            },
            Self::Unrecognized => Remedy {
                title: "An unexpected error occurred",
                solution: "Reload the page and retry; if it persists, check the API key settings",
                action: "reload",
                severity: Severity::Medium,
            },
        }
    }
}

/// Known error signatures, matched case-insensitively in order. First match wins.
const SIGNATURES: &[(&str, ErrorKind)] = &[
    ("API key not valid", ErrorKind::InvalidCredential),
    ("API key not found", ErrorKind::MissingCredential),
    ("quotaExceeded", ErrorKind::QuotaExceeded),
    ("exceeded your quota", ErrorKind::QuotaExceeded),
    ("rateLimitExceeded", ErrorKind::RateLimited),
    ("Too Many Requests", ErrorKind::RateLimited),
    ("liveChatDisabled", ErrorKind::ChatDisabled),
    ("liveChatNotFound", ErrorKind::ChatNotFound),
    ("liveChatEnded", ErrorKind::ChatNotFound),
    ("videoNotLive", ErrorKind::NotLive),
    ("NetworkError", ErrorKind::NetworkError),
    ("Forbidden", ErrorKind::PermissionDenied),
    ("Access denied", ErrorKind::PermissionDenied),
    ("quota", ErrorKind::QuotaExceeded),
    ("rate limit", ErrorKind::RateLimited),
    ("network", ErrorKind::NetworkError),
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Remove markup the upstream embeds in error messages.
pub fn strip_html_tags(raw: &str) -> String {
    TAG_RE.replace_all(raw, "").trim().to_string()
}

/// Match `raw` against the signature table. Never fails: unmatched input
/// yields an [`ErrorKind::Unrecognized`] entry.
pub fn analyze_error(raw: &str) -> ErrorInfo {
    let cleaned = strip_html_tags(raw);
    let haystacks = [raw.to_lowercase(), cleaned.to_lowercase()];

    let matched = SIGNATURES.iter().find(|(pattern, _)| {
        let needle = pattern.to_lowercase();
        haystacks.iter().any(|h| h.contains(&needle))
    });

    let (kind, pattern) = match matched {
        Some((pattern, kind)) => (*kind, (*pattern).to_string()),
        None => (ErrorKind::Unrecognized, "unknown".to_string()),
    };
    let remedy = kind.remedy();

    ErrorInfo {
        kind,
        title: remedy.title.to_string(),
        message: cleaned,
        solution: remedy.solution.to_string(),
        action: remedy.action.to_string(),
        severity: remedy.severity,
        original_error: raw.to_string(),
        pattern,
    }
}
