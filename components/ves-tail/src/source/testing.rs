//! In-memory backend used by the tests. Serves pre-planned polls page by page,
//! can fail any page, and records every query it was asked.

// Local crates
use crate::source::{
    models::{Event, EventPage, SearchQuery},
    source::{BackendError, EventSource},
};

// External crates
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub type ScriptedPage = Result<Vec<Event>, BackendError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub start_time_millis: i64,
    pub end_time_millis: Option<i64>,
    pub next_token: Option<String>,
}

#[derive(Debug, Default)]
struct Script {
    polls: VecDeque<Vec<ScriptedPage>>,
    current: VecDeque<ScriptedPage>,
    served_in_poll: usize,
    calls: Vec<RecordedCall>,
}

/// Each inner `Vec` is one poll: the sequence of pages one logical query walks
/// through. Once every poll has been served the source hands out empty pages
/// and, if configured, cancels the given token so a tail loop winds down.
#[derive(Debug)]
pub struct ScriptedSource {
    script: Mutex<Script>,
    cancel_when_exhausted: Option<CancellationToken>,
}

impl ScriptedSource {
    pub fn new(polls: Vec<Vec<ScriptedPage>>) -> Self {
        Self {
            script: Mutex::new(Script {
                polls: polls.into(),
                ..Script::default()
            }),
            cancel_when_exhausted: None,
        }
    }

    pub fn single_poll(pages: Vec<ScriptedPage>) -> Self {
        Self::new(vec![pages])
    }

    pub fn cancel_when_exhausted(mut self, token: CancellationToken) -> Self {
        self.cancel_when_exhausted = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Start times of the first page request of every poll.
    pub fn poll_start_times(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter(|c| c.next_token.is_none())
            .map(|c| c.start_time_millis)
            .collect()
    }
}

impl EventSource for ScriptedSource {
    async fn search(
        &self,
        query: &SearchQuery,
        next_token: Option<String>,
    ) -> Result<EventPage, BackendError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(RecordedCall {
            start_time_millis: query.start_time_millis,
            end_time_millis: query.end_time_millis,
            next_token: next_token.clone(),
        });

        if next_token.is_none() {
            match script.polls.pop_front() {
                Some(poll) => {
                    script.current = poll.into();
                    script.served_in_poll = 0;
                }
                None => {
                    script.current.clear();
                    if let Some(token) = &self.cancel_when_exhausted {
                        token.cancel();
                    }
                    return Ok(EventPage::default());
                }
            }
        }

        let Some(page) = script.current.pop_front() else {
            return Ok(EventPage::default());
        };
        script.served_in_poll += 1;

        let events = page?;
        let next_token = if script.current.is_empty() {
            None
        } else {
            Some(format!("p{}", script.served_in_poll))
        };

        Ok(EventPage { events, next_token })
    }
}

pub fn event(id: &str, timestamp_millis: i64) -> Event {
    Event {
        id: id.to_string(),
        timestamp_millis,
        stream_name: "stream-1".to_string(),
        message: format!("message {id}"),
    }
}
