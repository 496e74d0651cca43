// Local crates
use crate::{
    helpers::load_config::Config,
    instrumentation,
    render::render::Renderer,
    runtime::runtime::{self, QueryRequest},
    source::models::StreamOrder,
};

// External crates
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "ves-tail",
    long_about = "ves-tail searches remote VES log groups and follows them live, printing each event exactly once.",
    about = "Search and tail remote log groups",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        ves-tail groups --prefix /app
        ves-tail streams /app/web --order-by last-event-time --descending
        ves-tail get /app/web --start -2h --filter ERROR --pretty
        ves-tail watch /app/web --prefix web- --expand"
)]
struct Cli {
    /// Configuration file (TOML). Defaults to ~/.config/ves/tail.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List log groups
    Groups {
        /// Only groups whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List the streams of a log group
    Streams {
        group: String,

        /// Only streams whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, value_enum, default_value_t = StreamOrder::Name)]
        order_by: StreamOrder,

        #[arg(long)]
        descending: bool,
    },

    /// Print every event in a time range once
    Get(GetArgs),

    /// Continuously print new events as they arrive
    Watch(WatchArgs),

    /// Print the effective configuration
    Config,

    /// Display version information
    Version,
}

/// Selection shared by `get` and `watch`.
#[derive(Debug, Args)]
struct QueryArgs {
    /// Log group to read
    group: String,

    /// Backend filter pattern
    #[arg(long)]
    filter: Option<String>,

    /// Only streams whose name starts with this prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Only these streams (comma separated)
    #[arg(long, value_delimiter = ',')]
    streams: Vec<String>,

    /// Indent JSON messages across multiple lines
    #[arg(long)]
    expand: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Args)]
struct GetArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Start of the range: now, -5m, RFC 3339 or epoch milliseconds
    #[arg(long, default_value = "-1h", allow_hyphen_values = true)]
    start: String,

    /// End of the range, same formats as --start
    #[arg(long, default_value = "now", allow_hyphen_values = true)]
    stop: String,

    /// Prefix each message with its timestamp and stream
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Args)]
struct WatchArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Where to begin following: now, -5m, RFC 3339 or epoch milliseconds
    #[arg(long, default_value = "now", allow_hyphen_values = true)]
    start: String,

    /// Print bare messages only
    #[arg(long)]
    raw: bool,

    /// Milliseconds between polls (overrides tail.poll_interval_ms)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        show_version();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = instrumentation::tracing::init_tracing(&config.logging, cli.verbose)?;
    tracing::debug!(command = ?cli.command, "Dispatching ves-tail command");

    let terminal = std::io::stdout().is_terminal();
    match cli.command {
        Commands::Groups { prefix } => runtime::list_groups(&config, prefix.as_deref()).await?,
        Commands::Streams {
            group,
            prefix,
            order_by,
            descending,
        } => {
            runtime::list_streams(&config, &group, prefix.as_deref(), order_by, descending).await?
        }
        Commands::Get(args) => {
            let renderer = get_renderer(&args, &config, terminal);
            let request = query_request(args.query, args.start, Some(args.stop));
            runtime::run_get(&config, &request, renderer).await?
        }
        Commands::Watch(args) => {
            let renderer = watch_renderer(&args, &config, terminal);
            let poll_interval =
                Duration::from_millis(args.interval.unwrap_or(config.tail.poll_interval_ms));
            let request = query_request(args.query, args.start, None);
            runtime::run_watch(&config, &request, renderer, poll_interval).await?
        }
        Commands::Config => show_config(&config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

fn query_request(args: QueryArgs, start: String, stop: Option<String>) -> QueryRequest {
    QueryRequest {
        group: args.group,
        filter_pattern: args.filter,
        stream_prefix: args.prefix,
        stream_names: args.streams,
        start,
        stop,
    }
}

/// One-shot output is bare messages unless asked otherwise; `--expand` only
/// means something for the pretty form, so it turns it on.
fn get_renderer(args: &GetArgs, config: &Config, terminal: bool) -> Renderer {
    let expand = args.query.expand || config.output.expand;
    let pretty = args.pretty || config.output.pretty || args.query.expand;
    Renderer::select(pretty, expand, color(&args.query, config, terminal))
}

/// Follow output is pretty unless `--raw`, which always wins.
fn watch_renderer(args: &WatchArgs, config: &Config, terminal: bool) -> Renderer {
    let raw = args.raw || config.output.raw;
    let expand = args.query.expand || config.output.expand;
    Renderer::select(!raw, expand, color(&args.query, config, terminal))
}

/// Colour only reaches a terminal; piped or redirected output stays plain.
fn color(args: &QueryArgs, config: &Config, terminal: bool) -> bool {
    terminal && config.output.color && !args.no_color
}

fn show_config(config: &Config) -> Result<()> {
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to serialize configuration")?;
    print!("{rendered}");
    Ok(())
}

fn show_version() {
    println!("VES Tail {}", env!("CARGO_PKG_VERSION"));
}
