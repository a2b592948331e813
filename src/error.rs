use std::fmt;

use thiserror::Error;

/// Why a single bounded call did not produce an accepted response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    #[error("request timed out after {deadline_ms} ms")]
    Timeout { deadline_ms: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {cause}")]
    NetworkError { cause: String },

    #[error("rejected response: HTTP {status}")]
    RejectedResponse { status: u16, body: String },

    #[error("malformed response body: {reason}")]
    MalformedBody { reason: String },

    #[error("invalid request: {reason}")]
    InvalidTarget { reason: String },
}

impl RequestFailure {
    /// True when the service could not be reached at all, as opposed to the
    /// service answering with something we cannot use.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestFailure::Timeout { .. } | RequestFailure::NetworkError { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestFailure::RejectedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One failed attempt inside a fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<E> {
    /// The strategy itself returned an error.
    Failed { label: String, error: E },
    /// The strategy returned a value that the acceptance predicate refused.
    Unacceptable { label: String },
}

impl<E> Attempt<E> {
    pub fn label(&self) -> &str {
        match self {
            Attempt::Failed { label, .. } | Attempt::Unacceptable { label } => label,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Attempt::Failed { error, .. } => Some(error),
            Attempt::Unacceptable { .. } => None,
        }
    }
}

/// Every attempt of a fallback chain failed; attempts are kept in the order
/// they ran.
#[derive(Debug, Clone, PartialEq)]
pub struct AllFailed<E> {
    pub attempts: Vec<Attempt<E>>,
}

impl<E> AllFailed<E> {
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl AllFailed<RequestFailure> {
    /// The provider could not be reached on any attempt.
    pub fn is_transient(&self) -> bool {
        !self.attempts.is_empty()
            && self
                .attempts
                .iter()
                .all(|a| a.error().is_some_and(RequestFailure::is_transient))
    }

    /// At least one attempt was cancelled by the caller.
    pub fn was_cancelled(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.error(), Some(RequestFailure::Cancelled)))
    }
}

impl<E: fmt::Display> fmt::Display for AllFailed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} attempts failed", self.attempts.len())?;
        for attempt in &self.attempts {
            match attempt {
                Attempt::Failed { label, error } => write!(f, "; {label}: {error}")?,
                Attempt::Unacceptable { label } => write!(f, "; {label}: unusable response")?,
            }
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AllFailed<E> {}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationFailure {
    #[error("details unavailable: {0}")]
    DetailsUnavailable(AllFailed<RequestFailure>),

    #[error("aggregation cancelled")]
    Cancelled,
}

impl AggregationFailure {
    pub fn attempts(&self) -> Option<&AllFailed<RequestFailure>> {
        match self {
            AggregationFailure::DetailsUnavailable(all) => Some(all),
            AggregationFailure::Cancelled => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.attempts().is_some_and(AllFailed::is_transient)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileFailure {
    #[error("not signed in")]
    Unauthenticated,

    #[error("a watchlist change for this title is already in progress")]
    AlreadyPending,

    #[error("watchlist service refused the change: {message}")]
    RemoteRejected { status: Option<u16>, message: String },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("watchlist request timed out")]
    Timeout,

    #[error("watchlist request cancelled")]
    Cancelled,
}

impl ReconcileFailure {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReconcileFailure::NetworkError(_) | ReconcileFailure::Timeout
        )
    }
}

impl From<RequestFailure> for ReconcileFailure {
    fn from(failure: RequestFailure) -> Self {
        match failure {
            RequestFailure::Timeout { .. } => ReconcileFailure::Timeout,
            RequestFailure::Cancelled => ReconcileFailure::Cancelled,
            RequestFailure::NetworkError { cause } => ReconcileFailure::NetworkError(cause),
            RequestFailure::RejectedResponse { status, body } => ReconcileFailure::RemoteRejected {
                status: Some(status),
                message: error_message_from_body(&body).unwrap_or(body),
            },
            RequestFailure::MalformedBody { reason } => ReconcileFailure::RemoteRejected {
                status: None,
                message: reason,
            },
            RequestFailure::InvalidTarget { reason } => ReconcileFailure::NetworkError(reason),
        }
    }
}

/// Pulls `error` (or failing that `message`) out of a backend JSON body.
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_backend_body_surfaces_error_field() {
        let failure = RequestFailure::RejectedResponse {
            status: 500,
            body: r#"{"message":"Failed to add to watchlist","success":false}"#.to_string(),
        };
        assert_eq!(
            ReconcileFailure::from(failure),
            ReconcileFailure::RemoteRejected {
                status: Some(500),
                message: "Failed to add to watchlist".to_string()
            }
        );

        let failure = RequestFailure::RejectedResponse {
            status: 401,
            body: r#"{"error":"User not authenticated"}"#.to_string(),
        };
        assert_eq!(
            ReconcileFailure::from(failure),
            ReconcileFailure::RemoteRejected {
                status: Some(401),
                message: "User not authenticated".to_string()
            }
        );
    }

    #[test]
    fn all_failed_tells_outage_from_missing_resource() {
        let outage = AllFailed {
            attempts: vec![
                Attempt::Failed {
                    label: "tv".to_string(),
                    error: RequestFailure::Timeout { deadline_ms: 10 },
                },
                Attempt::Failed {
                    label: "movie".to_string(),
                    error: RequestFailure::NetworkError {
                        cause: "connection refused".to_string(),
                    },
                },
            ],
        };
        assert!(outage.is_transient());

        let missing = AllFailed::<RequestFailure> {
            attempts: vec![
                Attempt::Unacceptable {
                    label: "tv".to_string(),
                },
                Attempt::Failed {
                    label: "movie".to_string(),
                    error: RequestFailure::RejectedResponse {
                        status: 404,
                        body: String::new(),
                    },
                },
            ],
        };
        assert!(!missing.is_transient());
        assert!(!AllFailed::<RequestFailure> { attempts: vec![] }.is_transient());
    }
}
