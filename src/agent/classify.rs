//! Failure classification from agent diagnostic output.
//!
//! The agent reports errors as free text on stderr; classification is
//! keyword matching into a closed taxonomy, first category wins.
//! `Unknown` catches everything that emits text without matching a
//! known category.

use serde::{Deserialize, Serialize};

/// Closed taxonomy of agent failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// No diagnostic output.
    None,
    /// Too many requests; recoverable after a cooldown.
    RateLimit,
    /// Out of tokens or credits; no budget to continue.
    TokenLimit,
    /// Transient upstream server error.
    ApiError,
    /// The invocation exceeded its wall-clock ceiling.
    Timeout,
    /// Diagnostic text that matched no known category.
    Unknown,
}

impl AgentErrorKind {
    /// Token exhaustion halts the whole loop; nothing else does.
    pub fn is_fatal_for_loop(&self) -> bool {
        matches!(self, AgentErrorKind::TokenLimit)
    }
}

impl std::fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentErrorKind::None => "none",
            AgentErrorKind::RateLimit => "rate_limit",
            AgentErrorKind::TokenLimit => "token_limit",
            AgentErrorKind::ApiError => "api_error",
            AgentErrorKind::Timeout => "timeout",
            AgentErrorKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Classify captured stderr. Returns the kind and the diagnostic text.
///
/// Category order matters: rate-limit terms, then credit/quota terms,
/// then server-error terms, then timeout terms, else unknown when any
/// text is present.
pub fn classify(stderr: &str) -> (AgentErrorKind, String) {
    if stderr.trim().is_empty() {
        return (AgentErrorKind::None, String::new());
    }
    let lower = stderr.to_lowercase();
    let kind = if lower.contains("rate limit") || stderr.contains("429") {
        AgentErrorKind::RateLimit
    } else if lower.contains("insufficient") || lower.contains("credit") || lower.contains("quota")
    {
        AgentErrorKind::TokenLimit
    } else if stderr.contains("500")
        || lower.contains("internal server error")
        || lower.contains("api_error")
    {
        AgentErrorKind::ApiError
    } else if lower.contains("timeout") {
        AgentErrorKind::Timeout
    } else {
        AgentErrorKind::Unknown
    };
    (kind, stderr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_none() {
        assert_eq!(classify("").0, AgentErrorKind::None);
        assert_eq!(classify("  \n ").0, AgentErrorKind::None);
    }

    #[test]
    fn test_429_is_rate_limit() {
        let (kind, msg) = classify("Error: request failed with status 429");
        assert_eq!(kind, AgentErrorKind::RateLimit);
        assert!(msg.contains("429"));
    }

    #[test]
    fn test_rate_limit_phrase() {
        assert_eq!(
            classify("Rate limit exceeded, try later").0,
            AgentErrorKind::RateLimit
        );
    }

    #[test]
    fn test_insufficient_credit_is_token_limit() {
        assert_eq!(
            classify("insufficient credit remaining").0,
            AgentErrorKind::TokenLimit
        );
        assert_eq!(classify("Quota exhausted").0, AgentErrorKind::TokenLimit);
    }

    #[test]
    fn test_server_errors_are_api_error() {
        assert_eq!(classify("HTTP 500 from upstream").0, AgentErrorKind::ApiError);
        assert_eq!(
            classify("Internal Server Error").0,
            AgentErrorKind::ApiError
        );
        assert_eq!(classify("api_error: overloaded").0, AgentErrorKind::ApiError);
    }

    #[test]
    fn test_timeout_term() {
        assert_eq!(classify("connection timeout").0, AgentErrorKind::Timeout);
    }

    #[test]
    fn test_unmatched_text_is_unknown() {
        assert_eq!(
            classify("something inexplicable happened").0,
            AgentErrorKind::Unknown
        );
    }

    #[test]
    fn test_rate_limit_wins_over_later_categories() {
        // "429" and "timeout" both present: first category in order wins.
        assert_eq!(
            classify("429 received after timeout").0,
            AgentErrorKind::RateLimit
        );
    }

    #[test]
    fn test_only_token_limit_is_fatal() {
        assert!(AgentErrorKind::TokenLimit.is_fatal_for_loop());
        assert!(!AgentErrorKind::RateLimit.is_fatal_for_loop());
        assert!(!AgentErrorKind::ApiError.is_fatal_for_loop());
        assert!(!AgentErrorKind::Timeout.is_fatal_for_loop());
        assert!(!AgentErrorKind::Unknown.is_fatal_for_loop());
    }
}
