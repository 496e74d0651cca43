//! Wiring between the CLI and the components: builds the backend client, the
//! renderer and the stdout sink for one command and maps failures to exit codes.

// Local crates
use crate::{
    helpers::{
        load_config::Config,
        shutdown::Shutdown,
        time_range::{TimeRangeError, resolve_range},
    },
    render::render::Renderer,
    source::{
        http::HttpEventSource,
        models::{SearchQuery, StreamOrder},
        source::BackendError,
    },
    tailer::{
        models::TailError, oneshot::run_one_shot, sink::LineSink, tailer::TailLoop,
    },
};

// External crates
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::instrument;

/// Exit status for any backend failure.
pub const BACKEND_FAILURE_EXIT_CODE: u8 = 2;
/// Exit status for local failures: configuration, arguments, output.
pub const LOCAL_FAILURE_EXIT_CODE: u8 = 1;

/// What to search for, as typed on the command line.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub group: String,
    pub filter_pattern: Option<String>,
    pub stream_prefix: Option<String>,
    pub stream_names: Vec<String>,
    pub start: String,
    pub stop: Option<String>,
}

impl QueryRequest {
    pub fn to_search_query(
        &self,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Result<SearchQuery, TimeRangeError> {
        let (start_time_millis, end_time_millis) =
            resolve_range(&self.start, self.stop.as_deref(), now)?;

        let mut query = SearchQuery::new(self.group.clone(), start_time_millis);
        query.end_time_millis = end_time_millis;
        query.filter_pattern = self.filter_pattern.clone();
        query.stream_names = self.stream_names.clone();
        query.stream_prefix = self.stream_prefix.clone();
        query.limit = config.backend.page_size;
        Ok(query)
    }
}

fn connect(config: &Config) -> Result<HttpEventSource> {
    // Endpoint problems are configuration errors, not backend failures.
    HttpEventSource::new(&config.backend)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to create backend client")
}

/// `get`: render every event in a bounded range once.
#[instrument(
    name = "ves_tail_runtime::get",
    target = "runtime::runtime",
    skip_all,
    fields(group = %request.group),
    level = "debug"
)]
pub async fn run_get(config: &Config, request: &QueryRequest, renderer: Renderer) -> Result<()> {
    let query = request.to_search_query(config, Utc::now())?;
    let source = connect(config)?;
    let mut sink = LineSink::stdout();

    let stats = run_one_shot(&source, &renderer, &mut sink, &query).await?;

    tracing::info!(
        pages = stats.pages,
        emitted = stats.emitted,
        lines_written = sink.lines_written(),
        "One-shot query finished"
    );
    Ok(())
}

/// `watch`: follow a group until Ctrl-C.
#[instrument(
    name = "ves_tail_runtime::watch",
    target = "runtime::runtime",
    skip_all,
    fields(group = %request.group),
    level = "debug"
)]
pub async fn run_watch(
    config: &Config,
    request: &QueryRequest,
    renderer: Renderer,
    poll_interval: Duration,
) -> Result<()> {
    let query = request.to_search_query(config, Utc::now())?;
    let source = connect(config)?;
    let mut sink = LineSink::stdout();

    let shutdown = Shutdown::new();
    let _ctrl_c = shutdown.listen_for_ctrl_c();

    let mut tail = TailLoop::new(
        &source,
        &renderer,
        &mut sink,
        query,
        poll_interval,
        shutdown.token(),
    );
    let result = tail.run().await;
    tracing::debug!(
        state = %tail.state(),
        watermark = ?tail.watermark().start_time(),
        "Tail loop returned"
    );
    // Lets the Ctrl-C listener task finish.
    shutdown.trigger();

    let stats = result?;
    tracing::info!(
        cycles = stats.cycles,
        emitted = stats.emitted,
        suppressed = stats.suppressed,
        "Tail finished"
    );
    Ok(())
}

/// `groups`: one group name per line.
pub async fn list_groups(config: &Config, prefix: Option<&str>) -> Result<()> {
    let source = connect(config)?;
    let mut sink = LineSink::stdout();

    let groups = match source.list_groups(prefix).await {
        Ok(groups) => groups,
        Err(e) => return Err(report_backend_error(&mut sink, e).await),
    };
    for group in groups {
        sink.write_line(&group.name).await?;
    }
    Ok(())
}

/// `streams`: one stream name per line.
pub async fn list_streams(
    config: &Config,
    group: &str,
    prefix: Option<&str>,
    order: StreamOrder,
    descending: bool,
) -> Result<()> {
    let source = connect(config)?;
    let mut sink = LineSink::stdout();

    let streams = match source.list_streams(group, prefix, order, descending).await {
        Ok(streams) => streams,
        Err(e) => return Err(report_backend_error(&mut sink, e).await),
    };
    for stream in streams {
        sink.write_line(&stream.name).await?;
    }
    Ok(())
}

async fn report_backend_error<W>(sink: &mut LineSink<W>, error: BackendError) -> anyhow::Error
where
    W: AsyncWrite + Unpin,
{
    tracing::error!(error = %error, "Backend request failed");
    let _ = sink.write_line(&format!("Error: {error}")).await;
    error.into()
}

/// Exit status for a failed command. Backend errors have already been written
/// to stdout; anything else is printed to stderr here.
pub fn exit_status(error: &anyhow::Error) -> u8 {
    if let Some(tail) = error.downcast_ref::<TailError>() {
        match tail {
            TailError::Backend(_) => return BACKEND_FAILURE_EXIT_CODE,
            TailError::Output(e) if e.kind() == ErrorKind::BrokenPipe => return 0,
            TailError::Output(_) => return LOCAL_FAILURE_EXIT_CODE,
        }
    }
    if error.downcast_ref::<BackendError>().is_some() {
        return BACKEND_FAILURE_EXIT_CODE;
    }
    if let Some(e) = error.downcast_ref::<std::io::Error>() {
        if e.kind() == ErrorKind::BrokenPipe {
            return 0;
        }
    }
    LOCAL_FAILURE_EXIT_CODE
}

pub fn report_failure(error: &anyhow::Error) -> ExitCode {
    let status = exit_status(error);
    if status == LOCAL_FAILURE_EXIT_CODE {
        eprintln!("Error: {error:#}");
    }
    tracing::debug!(exit_status = status, error = %error, "Command failed");
    ExitCode::from(status)
}
