//! The seam between the tailing client and whatever stores the logs.
//!
//! A backend only has to answer one question: "give me the next page of events
//! in this group matching this query". Turning that into a complete, lazily
//! fetched sequence of pages is done once here in [`pages`], so the one-shot
//! query and the tail loop page through results the same way.

// Local crates
use crate::source::models::{Event, EventPage, SearchQuery};

// External crates
use async_stream::try_stream;
use futures::Stream;
use std::future::Future;

/// Failures reported by an [`EventSource`]. All of them are fatal to the caller:
/// a transient network failure cannot be told apart from a permanent auth or
/// configuration failure, so nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("backend response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },
    #[error("backend rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Remote log backend exposing paginated event search.
pub trait EventSource {
    /// Fetch one page of events matching `query`. `next_token` is `None` for the
    /// first page and the token handed back by the previous page afterwards.
    fn search(
        &self,
        query: &SearchQuery,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<EventPage, BackendError>> + Send;
}

/// Lazily page through every result of `query`.
///
/// Pages are requested one at a time, only when the consumer asks for the next
/// item, and the stream ends when the backend stops handing out a continuation
/// token. The first error ends the stream after being yielded.
pub fn pages<'a, S>(
    source: &'a S,
    query: &'a SearchQuery,
) -> impl Stream<Item = Result<Vec<Event>, BackendError>> + 'a
where
    S: EventSource,
{
    try_stream! {
        let mut next_token: Option<String> = None;
        let mut page_number: u64 = 0;

        loop {
            page_number += 1;
            let EventPage { events, next_token: continuation } =
                source.search(query, next_token.take()).await?;

            tracing::trace!(
                group = %query.group,
                page_number,
                page_len = events.len(),
                has_more = continuation.is_some(),
                "Fetched event page from backend"
            );

            yield events;

            match continuation {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
    }
}
