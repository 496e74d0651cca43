//! Follow mode: poll the backend forever, printing each event exactly once.
//!
//! One cycle queries everything from the current watermark onwards (open
//! ended), walks every page, and hands each event to the [`DedupWatermark`].
//! Only events it reports as new are rendered. Then the loop sleeps for a fixed
//! interval. The backend exposes no rate-limit signal, so the interval does not
//! adapt.
//!
//! Cancellation is cooperative: the token is checked before every query and
//! interrupts the sleep, but a page request already in flight is allowed to
//! finish.

// Local crates
use crate::{
    render::render::EventRenderer,
    source::{
        models::SearchQuery,
        source::{EventSource, pages},
    },
    tailer::{
        models::{TailError, TailState, TailStats},
        sink::LineSink,
        watermark::DedupWatermark,
    },
};

// External crates
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Polling driver for follow mode. Owns its watermark; nothing else reads or
/// writes it.
#[derive(Debug)]
pub struct TailLoop<'a, S, R, W> {
    source: &'a S,
    renderer: &'a R,
    sink: &'a mut LineSink<W>,
    query: SearchQuery,
    poll_interval: Duration,
    cancel: CancellationToken,
    watermark: DedupWatermark,
    state: TailState,
    stats: TailStats,
}

impl<'a, S, R, W> TailLoop<'a, S, R, W>
where
    S: EventSource,
    R: EventRenderer,
    W: AsyncWrite + Unpin,
{
    /// `query.start_time_millis` is only used until the first event is seen;
    /// after that every poll starts at the watermark. Any end time on `query`
    /// is dropped.
    pub fn new(
        source: &'a S,
        renderer: &'a R,
        sink: &'a mut LineSink<W>,
        query: SearchQuery,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            renderer,
            sink,
            query: SearchQuery {
                end_time_millis: None,
                ..query
            },
            poll_interval,
            cancel,
            watermark: DedupWatermark::new(),
            state: TailState::Idle,
            stats: TailStats::default(),
        }
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn watermark(&self) -> &DedupWatermark {
        &self.watermark
    }

    /// Poll until cancelled. Returns `Ok` only on cancellation; a backend error
    /// is written to the sink as an `Error:` line and returned.
    #[instrument(
        name = "ves_tail_tailer::run",
        target = "tailer::tailer",
        skip_all,
        fields(group = %self.query.group),
        level = "debug"
    )]
    pub async fn run(&mut self) -> Result<TailStats, TailError> {
        tracing::info!(
            initial_start_time_millis = self.query.start_time_millis,
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Starting tail loop"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.transition(TailState::Querying);
            let start_time = self
                .watermark
                .start_time()
                .unwrap_or(self.query.start_time_millis);
            let query = self.query.starting_at(start_time);
            self.stats.cycles += 1;

            if let Err(e) = self.poll_once(&query).await {
                self.transition(TailState::Stopped);
                if let TailError::Backend(backend) = &e {
                    tracing::error!(error = %backend, start_time_millis = start_time, "Tail poll failed");
                    // The error itself is what gets returned; a second write
                    // failure here has nowhere better to go.
                    let _ = self.sink.write_line(&format!("Error: {backend}")).await;
                }
                return Err(e);
            }

            tracing::debug!(
                cycle = self.stats.cycles,
                pages = self.stats.pages,
                emitted = self.stats.emitted,
                suppressed = self.stats.suppressed,
                watermark = ?self.watermark.start_time(),
                tracked_ids = self.watermark.tracked_ids(),
                "Tail cycle complete"
            );

            self.transition(TailState::Sleeping);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.transition(TailState::Stopped);
        tracing::info!(
            cycles = self.stats.cycles,
            emitted = self.stats.emitted,
            suppressed = self.stats.suppressed,
            "Tail loop cancelled"
        );
        Ok(self.stats)
    }

    async fn poll_once(&mut self, query: &SearchQuery) -> Result<(), TailError> {
        let source = self.source;
        let renderer = self.renderer;
        let stream = pages(source, query);
        tokio::pin!(stream);

        while let Some(page) = stream.next().await {
            let events = page?;
            self.transition(TailState::Paging);
            self.stats.pages += 1;

            for event in &events {
                let observation = self.watermark.observe(event);
                if let Some(start_time) = observation.new_start_time {
                    tracing::trace!(watermark = start_time, "Watermark advanced");
                }

                if observation.emit {
                    self.sink.write_line(&renderer.render(event)).await?;
                    self.stats.emitted += 1;
                } else {
                    self.stats.suppressed += 1;
                }
            }
        }

        Ok(())
    }

    fn transition(&mut self, next: TailState) {
        if self.state != next {
            tracing::trace!(from = %self.state, to = %next, "Tail state transition");
            self.state = next;
        }
    }
}
