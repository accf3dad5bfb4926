//! 失败分类：将提供方调用的失败归类，以决定重试与退避策略。
//!
//! Provider failure classes.
//!
//! Every failed analysis attempt is classified into one of these classes. The
//! class decides whether the attempt is retried and which backoff schedule is
//! used for the next one.
//!
//! | Class          | Retryable | Backoff                          |
//! |----------------|-----------|----------------------------------|
//! | `connection`   | yes       | short fixed delay                |
//! | `timeout`      | yes       | moderate delay, grows linearly   |
//! | `server_error` | yes       | exponential with jitter          |
//! | `rate_limited` | yes       | exponential, `Retry-After` wins  |
//! | `client_error` | no        | -                                |
//! | `decode`       | no        | -                                |
//!
//! ## Example
//!
//! ```rust
//! use faultline::error_code::FailureClass;
//!
//! let class = FailureClass::from_http_status(503);
//! assert_eq!(class, FailureClass::ServerError);
//! assert!(class.retryable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Connection refused, reset, DNS failure: nothing reached the provider.
    Connection,
    /// The attempt exceeded its per-attempt timeout.
    Timeout,
    /// 5xx response from the provider.
    ServerError,
    /// 429 response from the provider.
    RateLimited,
    /// Other 4xx response: the request itself is wrong and will not improve on retry.
    ClientError,
    /// The provider answered 2xx but the body was not a valid advice document.
    Decode,
}

impl FailureClass {
    /// Returns the standard name (e.g., `"server_error"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::RateLimited => "rate_limited",
            Self::ClientError => "client_error",
            Self::Decode => "decode",
        }
    }

    /// Returns whether another attempt may succeed.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::ServerError | Self::RateLimited
        )
    }

    /// Maps a non-success HTTP status to its failure class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
