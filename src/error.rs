//! # Error Module
//!
//! The single error type used across the engine.
//!
//! Errors fall into two groups. Lifecycle and argument failures
//! (`IllegalParameter`, `StatusChange`, `Configuration`) are returned directly
//! from `init`/`start`/`stop`. Everything a fetcher, extractor or processor
//! reports is turned into a [`SpiderError::Classified`] value, tagged with the
//! kind of module it came from, and delivered through the scheduler's error
//! channel instead of being returned to the caller.

use crate::module::{Mid, ModuleKind};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpiderError>;

/// The pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Fetcher,
    Extractor,
    Processor,
    Scheduler,
}

impl ErrorKind {
    /// Maps a module kind onto the stage it reports errors for.
    pub fn from_module(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::Fetcher => ErrorKind::Fetcher,
            ModuleKind::Extractor => ErrorKind::Extractor,
            ModuleKind::Processor => ErrorKind::Processor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetcher => "fetcher",
            ErrorKind::Extractor => "extractor",
            ErrorKind::Processor => "processor",
            ErrorKind::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SpiderError {
    /// Bad or missing input to a constructor or argument check.
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    /// A lifecycle transition that the state machine does not allow.
    #[error("status change error: {0}")]
    StatusChange(String),

    /// Operation against a closed buffer or pool.
    #[error("buffer closed")]
    BufferClosed,

    /// An error attributed to one pipeline stage.
    #[error("{kind} error: {message}")]
    Classified { kind: ErrorKind, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpiderError {
    pub fn illegal_parameter(message: impl Into<String>) -> Self {
        Self::IllegalParameter(message.into())
    }

    pub fn status_change(message: impl Into<String>) -> Self {
        Self::StatusChange(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Builds an already-classified error.
    pub fn classified(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self::Classified {
            kind,
            message: message.to_string().trim().to_string(),
        }
    }

    /// Attributes this error to the module that produced it.
    ///
    /// Errors that are already classified pass through untouched. Otherwise the
    /// kind is taken from `mid`; an unparsable or absent identity makes it a
    /// scheduler error.
    pub fn classify(self, mid: Option<&str>) -> Self {
        if let Self::Classified { .. } = self {
            return self;
        }
        let kind = mid
            .and_then(|raw| raw.parse::<Mid>().ok())
            .map(|mid| ErrorKind::from_module(mid.kind()))
            .unwrap_or(ErrorKind::Scheduler);
        Self::classified(kind, self)
    }

    /// The stage this error is attributed to, if it has been classified.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Classified { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_buffer_closed(&self) -> bool {
        matches!(self, Self::BufferClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_module_kind() {
        let err = SpiderError::illegal_parameter("boom").classify(Some("E|3|"));
        assert_eq!(err.kind(), Some(ErrorKind::Extractor));
        assert_eq!(err.to_string(), "extractor error: illegal parameter: boom");
    }

    #[test]
    fn classify_falls_back_to_scheduler() {
        let err = SpiderError::from(anyhow::anyhow!("no fetcher")).classify(Some("bogus"));
        assert_eq!(err.kind(), Some(ErrorKind::Scheduler));

        let err = SpiderError::BufferClosed.classify(None);
        assert_eq!(err.kind(), Some(ErrorKind::Scheduler));
    }

    #[test]
    fn classified_errors_keep_their_kind() {
        let err = SpiderError::classified(ErrorKind::Processor, "  bad item ");
        let err = err.classify(Some("F|1|"));
        assert_eq!(err.kind(), Some(ErrorKind::Processor));
        assert_eq!(err.to_string(), "processor error: bad item");
    }
}
