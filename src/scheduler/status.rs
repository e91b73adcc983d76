//! Lifecycle states of the scheduler and the transitions allowed between them.

use crate::error::{Result, SpiderError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl Status {
    /// Whether this is one of the in-progress states.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Status::Initializing | Status::Starting | Status::Stopping)
    }

    /// The state a successful transition through `self` settles in.
    pub(crate) fn settled(&self) -> Option<Status> {
        match self {
            Status::Initializing => Some(Status::Initialized),
            Status::Starting => Some(Status::Started),
            Status::Stopping => Some(Status::Stopped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Uninitialized => "uninitialized",
            Status::Initializing => "initializing",
            Status::Initialized => "initialized",
            Status::Starting => "starting",
            Status::Started => "started",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks whether the scheduler may move from `current` into `wanted`.
///
/// `wanted` must be one of the in-progress states; the settled state is only
/// ever entered by finishing a transition.
pub fn check_transition(current: Status, wanted: Status) -> Result<()> {
    if current.is_transitional() {
        return Err(SpiderError::status_change(format!(
            "the scheduler is {}",
            current
        )));
    }
    if !wanted.is_transitional() {
        return Err(SpiderError::status_change(format!(
            "{} is not a transition",
            wanted
        )));
    }
    match (current, wanted) {
        (Status::Uninitialized, Status::Starting | Status::Stopping) => Err(
            SpiderError::status_change("the scheduler has not been initialized"),
        ),
        (Status::Started, Status::Initializing | Status::Starting) => Err(
            SpiderError::status_change("the scheduler has already been started"),
        ),
        (current, Status::Stopping) if current != Status::Started => Err(
            SpiderError::status_change("the scheduler has not been started"),
        ),
        _ => Ok(()),
    }
}
