//! Turning one event into one display line.
//!
//! Rendering never fails: a message that is not a JSON object, or is broken
//! JSON, is shown exactly as the backend returned it.

// Local crates
use crate::source::models::Event;

// External crates
use chrono::{DateTime, SecondsFormat, Utc};
use owo_colors::OwoColorize;
use serde_json::{Map, Value};

/// Produces the display text for a single event. Implementations are pure.
pub trait EventRenderer {
    fn render(&self, event: &Event) -> String;
}

/// Why a message could not be shown as structured data. Only used inside the
/// renderer to decide on the raw fallback.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("message is not a JSON object")]
    NotStructured,
    #[error("malformed JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Message text only, trailing newlines stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRenderer;

impl EventRenderer for RawRenderer {
    fn render(&self, event: &Event) -> String {
        trim_message(&event.message).to_string()
    }
}

/// `[timestamp] (stream) body`, where a JSON object body is re-serialized.
#[derive(Debug, Clone, Copy)]
pub struct PrettyRenderer {
    /// Indent JSON bodies over multiple lines.
    pub expand: bool,
    /// Colour the timestamp and stream name.
    pub color: bool,
}

impl PrettyRenderer {
    pub fn new(expand: bool, color: bool) -> Self {
        Self { expand, color }
    }

    fn body(&self, message: &str) -> String {
        match structured_body(message, self.expand) {
            Ok(body) => body,
            Err(e) => {
                tracing::trace!(error = %e, "Rendering message as raw text");
                message.to_string()
            }
        }
    }
}

impl EventRenderer for PrettyRenderer {
    fn render(&self, event: &Event) -> String {
        let timestamp = format_timestamp(event.timestamp_millis);
        let message = trim_message(&event.message);
        let body = self.body(message);

        if self.color {
            format!(
                "[{}] ({}) {}",
                timestamp.red(),
                event.stream_name.white(),
                body
            )
        } else {
            format!("[{}] ({}) {}", timestamp, event.stream_name, body)
        }
    }
}

/// The renderer picked for one invocation from flags and configuration.
#[derive(Debug, Clone, Copy)]
pub enum Renderer {
    Raw(RawRenderer),
    Pretty(PrettyRenderer),
}

impl Renderer {
    pub fn select(pretty: bool, expand: bool, color: bool) -> Self {
        if pretty {
            Renderer::Pretty(PrettyRenderer::new(expand, color))
        } else {
            Renderer::Raw(RawRenderer)
        }
    }
}

impl EventRenderer for Renderer {
    fn render(&self, event: &Event) -> String {
        match self {
            Renderer::Raw(raw) => raw.render(event),
            Renderer::Pretty(pretty) => pretty.render(event),
        }
    }
}

fn trim_message(message: &str) -> &str {
    message.trim_end_matches(['\n', '\r'])
}

fn structured_body(message: &str, expand: bool) -> Result<String, RenderError> {
    let value: Value = serde_json::from_str(message)?;
    let object: Map<String, Value> = match value {
        Value::Object(object) => object,
        _ => return Err(RenderError::NotStructured),
    };

    let rendered = if expand {
        serde_json::to_string_pretty(&object)?
    } else {
        serde_json::to_string(&object)?
    };
    Ok(rendered)
}

/// RFC 3339 in UTC with second precision. Timestamps outside chrono's range
/// fall back to the raw millisecond value.
pub fn format_timestamp(timestamp_millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => timestamp_millis.to_string(),
    }
}
