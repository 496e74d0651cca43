mod cli;
mod helpers;
mod instrumentation;
mod render;
mod runtime;
mod source;
mod tailer;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses user commands and then calls into the appropriate logic
    match cli::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => runtime::runtime::report_failure(&e),
    }
}
