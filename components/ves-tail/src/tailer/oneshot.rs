// Local crates
use crate::{
    render::render::EventRenderer,
    source::{
        models::SearchQuery,
        source::{EventSource, pages},
    },
    tailer::{
        models::{TailError, TailStats},
        sink::LineSink,
    },
};

// External crates
use tokio::io::AsyncWrite;
use tokio_stream::StreamExt;
use tracing::instrument;

/// Fetch every event matching a fixed query once and render all of them in
/// arrival order. No de-duplication: whatever the backend returns is printed.
///
/// On a backend error the events already written stay written, an `Error:`
/// line is appended and the error is returned.
#[instrument(
    name = "ves_tail_tailer::one_shot",
    target = "tailer::oneshot",
    skip_all,
    fields(group = %query.group),
    level = "debug"
)]
pub async fn run_one_shot<S, R, W>(
    source: &S,
    renderer: &R,
    sink: &mut LineSink<W>,
    query: &SearchQuery,
) -> Result<TailStats, TailError>
where
    S: EventSource,
    R: EventRenderer,
    W: AsyncWrite + Unpin,
{
    tracing::debug!(
        start_time_millis = query.start_time_millis,
        end_time_millis = ?query.end_time_millis,
        "Running one-shot query"
    );

    let mut stats = TailStats {
        cycles: 1,
        ..TailStats::default()
    };

    let stream = pages(source, query);
    tokio::pin!(stream);

    while let Some(page) = stream.next().await {
        let events = match page {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, pages = stats.pages, "One-shot query failed");
                let _ = sink.write_line(&format!("Error: {e}")).await;
                return Err(e.into());
            }
        };
        stats.pages += 1;

        for event in &events {
            sink.write_line(&renderer.render(event)).await?;
            stats.emitted += 1;
        }
    }

    tracing::debug!(pages = stats.pages, emitted = stats.emitted, "One-shot query complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render::{PrettyRenderer, RawRenderer};
    use crate::source::{
        source::BackendError,
        testing::{ScriptedSource, event},
    };
    use pretty_assertions::assert_eq;

    fn bounded_query() -> SearchQuery {
        let mut query = SearchQuery::new("app", 100);
        query.end_time_millis = Some(200);
        query
    }

    fn lines(sink: LineSink<Vec<u8>>) -> Vec<String> {
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn three_pages_render_all_six_events_in_order() {
        let source = ScriptedSource::single_poll(vec![
            Ok(vec![event("a", 150), event("b", 150)]),
            Ok(vec![event("b", 150), event("c", 120)]),
            Ok(vec![event("d", 190), event("e", 101)]),
        ]);
        let mut sink = LineSink::new(Vec::new());

        let stats = run_one_shot(&source, &RawRenderer, &mut sink, &bounded_query())
            .await
            .unwrap();

        assert_eq!(stats.pages, 3);
        assert_eq!(stats.emitted, 6);
        assert_eq!(
            lines(sink),
            vec![
                "message a",
                "message b",
                "message b",
                "message c",
                "message d",
                "message e",
            ]
        );

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.end_time_millis == Some(200)));
    }

    #[tokio::test]
    async fn failure_after_partial_output_keeps_rendered_events() {
        let source = ScriptedSource::single_poll(vec![
            Ok(vec![event("a", 150)]),
            Err(BackendError::Unauthorized { status: 401 }),
        ]);
        let mut sink = LineSink::new(Vec::new());

        let err = run_one_shot(&source, &RawRenderer, &mut sink, &bounded_query())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TailError::Backend(BackendError::Unauthorized { status: 401 })
        ));
        assert_eq!(
            lines(sink),
            vec![
                "message a",
                "Error: backend rejected credentials (HTTP 401)"
            ]
        );
    }

    #[tokio::test]
    async fn empty_result_writes_nothing() {
        let source = ScriptedSource::single_poll(vec![Ok(vec![])]);
        let mut sink = LineSink::new(Vec::new());

        let stats = run_one_shot(
            &source,
            &PrettyRenderer::new(false, false),
            &mut sink,
            &bounded_query(),
        )
        .await
        .unwrap();

        assert_eq!(stats.emitted, 0);
        assert!(lines(sink).is_empty());
    }
}
