//! Duplicate suppression for the tail loop.
//!
//! Every poll re-queries from the newest timestamp seen so far, inclusive, so
//! events sitting exactly on that millisecond come back again on the next poll.
//! `DedupWatermark` remembers the ids seen at that one millisecond and nothing
//! older: memory is bounded by how many events share the newest timestamp, not
//! by how long the tail has been running.

// Local crates
use crate::source::models::Event;

// External crates
use std::collections::HashSet;

/// Outcome of feeding one event to [`DedupWatermark::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The event has not been shown before and should be rendered.
    pub emit: bool,
    /// Set when this event moved the watermark forward; the next poll starts here.
    pub new_start_time: Option<i64>,
}

/// Advancing event-time boundary plus the ids already emitted at it.
///
/// Invariant: every id in `seen_ids` belongs to an event whose timestamp is
/// exactly `last_seen_timestamp`.
#[derive(Debug, Default)]
pub struct DedupWatermark {
    last_seen_timestamp: Option<i64>,
    seen_ids: HashSet<String>,
}

impl DedupWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `event` is new. Must be called once per event, in the
    /// order the backend delivered them.
    pub fn observe(&mut self, event: &Event) -> Observation {
        match self.last_seen_timestamp {
            Some(watermark) if event.timestamp_millis < watermark => Observation {
                emit: false,
                new_start_time: None,
            },
            Some(watermark) if event.timestamp_millis == watermark => Observation {
                // Duplicate ids within one millisecond are treated as the same event.
                emit: self.seen_ids.insert(event.id.clone()),
                new_start_time: None,
            },
            _ => {
                self.last_seen_timestamp = Some(event.timestamp_millis);
                self.seen_ids.clear();
                self.seen_ids.insert(event.id.clone());
                Observation {
                    emit: true,
                    new_start_time: Some(event.timestamp_millis),
                }
            }
        }
    }

    /// Newest event timestamp observed, the inclusive start of the next poll.
    pub fn start_time(&self) -> Option<i64> {
        self.last_seen_timestamp
    }

    /// Number of ids remembered at the current watermark.
    pub fn tracked_ids(&self) -> usize {
        self.seen_ids.len()
    }
}
