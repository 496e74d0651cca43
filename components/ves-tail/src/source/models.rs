// External crates
use serde::{Deserialize, Serialize};

/// One log event as returned by the backend. Events are immutable once fetched.
///
/// `id` is only unique within the backend's retention window, never across
/// backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp_millis: i64,
    pub stream_name: String,
    pub message: String,
}

/// A single bounded batch of events from one backend call, plus the
/// continuation token for the next batch of the same logical query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Parameters of one logical search against a log group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub group: String,
    pub filter_pattern: Option<String>,
    pub stream_names: Vec<String>,
    pub stream_prefix: Option<String>,
    /// Inclusive lower bound.
    pub start_time_millis: i64,
    /// Inclusive upper bound, `None` means "up to now".
    pub end_time_millis: Option<i64>,
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn new(group: impl Into<String>, start_time_millis: i64) -> Self {
        Self {
            group: group.into(),
            filter_pattern: None,
            stream_names: Vec::new(),
            stream_prefix: None,
            start_time_millis,
            end_time_millis: None,
            limit: None,
        }
    }

    /// Same query with a different start time, used when the tail watermark moves.
    pub fn starting_at(&self, start_time_millis: i64) -> Self {
        Self {
            start_time_millis,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroup {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStream {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GroupPage {
    #[serde(default)]
    pub groups: Vec<LogGroup>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StreamPage {
    #[serde(default)]
    pub streams: Vec<LogStream>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Sort key for stream listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StreamOrder {
    #[default]
    Name,
    LastEventTime,
}

impl StreamOrder {
    pub fn as_query_value(self) -> &'static str {
        match self {
            StreamOrder::Name => "name",
            StreamOrder::LastEventTime => "last_event_time",
        }
    }
}
