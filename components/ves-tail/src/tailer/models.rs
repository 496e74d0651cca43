// Local crates
use crate::source::source::BackendError;

// External crates
use std::fmt;

/// Where the tail loop currently is in its polling cycle.
///
/// ```text
/// Idle -> Querying -> Paging -> Sleeping -> Querying -> ...
///                                   \-> Stopped (cancellation or fatal error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Idle,
    Querying,
    Paging,
    Sleeping,
    Stopped,
}

impl fmt::Display for TailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TailState::Idle => "idle",
            TailState::Querying => "querying",
            TailState::Paging => "paging",
            TailState::Sleeping => "sleeping",
            TailState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Running totals for one tail or one-shot query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    pub cycles: u64,
    pub pages: u64,
    pub emitted: u64,
    pub suppressed: u64,
}

/// Errors that end a tail or one-shot query.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to write to output: {0}")]
    Output(#[from] std::io::Error),
}
