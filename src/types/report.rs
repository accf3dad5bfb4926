//! Error snapshot handed to the pipeline by the framework adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::Location;

/// Maximum number of `caused_by` entries captured from an error source chain.
const MAX_SOURCE_DEPTH: usize = 8;

/// Snapshot of an intercepted error.
///
/// Every field is optional: a report built from a malformed value still
/// produces a (degraded) signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: Option<String>,
    pub message: Option<String>,
    /// Reporting call site, usually `file:line`.
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
    /// Key used by the rate limiter (caller identity, tenant, ...). Defaults to a global key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_key: Option<String>,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Build a report from a typed error, recording the caller as origin.
    #[track_caller]
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error,
    {
        let mut report = Self {
            kind: Some(std::any::type_name::<E>().to_string()),
            message: Some(err.to_string()),
            origin: Some(caller_origin(Location::caller())),
            ..Default::default()
        };
        report.capture_sources(err.source());
        report
    }

    /// Build a report from a type-erased error.
    ///
    /// The concrete type name is not available here, so the kind is taken from
    /// the leading identifier of the `Debug` output (`Os { .. }` -> `Os`).
    #[track_caller]
    pub fn from_dyn_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let debug = format!("{:?}", err);
        let kind: String = debug
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
            .collect();
        let mut report = Self {
            kind: (!kind.is_empty()).then_some(kind),
            message: Some(err.to_string()),
            origin: Some(caller_origin(Location::caller())),
            ..Default::default()
        };
        report.capture_sources(err.source());
        report
    }

    /// Build a report from an arbitrary JSON value.
    ///
    /// Objects are read for `kind`/`type`/`name`, `message`/`msg` and
    /// `origin`/`location`; a bare string becomes the message; anything else is
    /// rendered as the message with no kind.
    pub fn from_value(value: &serde_json::Value) -> Self {
        fn first_str(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
                .map(str::to_string)
        }

        match value {
            serde_json::Value::Object(_) => Self {
                kind: first_str(value, &["kind", "type", "name"]),
                message: first_str(value, &["message", "msg"]),
                origin: first_str(value, &["origin", "location"]),
                ..Default::default()
            },
            serde_json::Value::String(s) => Self {
                message: Some(s.clone()),
                ..Default::default()
            },
            serde_json::Value::Null => Self::default(),
            other => Self {
                message: Some(other.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Record the caller of this method as origin.
    #[track_caller]
    pub fn here(mut self) -> Self {
        self.origin = Some(caller_origin(Location::caller()));
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    pub fn with_rate_key(mut self, key: impl Into<String>) -> Self {
        self.rate_key = Some(key.into());
        self
    }

    fn capture_sources(&mut self, mut source: Option<&(dyn std::error::Error + 'static)>) {
        let mut depth = 0;
        while let Some(cause) = source {
            if depth >= MAX_SOURCE_DEPTH {
                break;
            }
            self.details
                .insert(format!("caused_by.{}", depth), cause.to_string());
            source = cause.source();
            depth += 1;
        }
    }
}

fn caller_origin(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}
