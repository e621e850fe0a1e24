//! Logging and observability
//!
//! Structured logging through `tracing`, rendered by `tracing-subscriber`
//! either as human-readable text or as JSON. All log output goes to stderr
//! so that stdout stays reserved for command output.
//!
//! ## Environment Variables
//!
//! * `SHELLPIPE_LOG_FORMAT` - `text` or `json`, used when no format is passed
//! * `SHELLPIPE_LOG` - Filter directives (falls back to `RUST_LOG`, then `info`)
//! * `SHELLPIPE_LOG_SPAN_EVENTS` - Comma separated span events to emit
//!   (`none`, `new`, `close`, `enter`, `exit`, `active`, `full`)

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FORMAT_ENV_VAR: &str = "SHELLPIPE_LOG_FORMAT";
const FILTER_ENV_VAR: &str = "SHELLPIPE_LOG";
const SPAN_EVENTS_ENV_VAR: &str = "SHELLPIPE_LOG_SPAN_EVENTS";
const DEFAULT_DIRECTIVES: &str = "info";

static INIT: Once = Once::new();

/// How log records are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse a format name; anything other than `json` is text
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    fn default_span_events(self) -> FmtSpan {
        match self {
            LogFormat::Json => FmtSpan::NEW | FmtSpan::CLOSE,
            LogFormat::Text => FmtSpan::NONE,
        }
    }
}

/// Install the global subscriber
///
/// `format` wins over `SHELLPIPE_LOG_FORMAT`. Only the first call has an
/// effect; later calls return `Ok(())` without touching the subscriber.
///
/// ```rust
/// use shellpipe_core::logging::{self, LogFormat};
///
/// logging::init(Some(LogFormat::Text)).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<LogFormat>) -> Result<()> {
    INIT.call_once(|| {
        let format = format
            .or_else(|| std::env::var(FORMAT_ENV_VAR).ok().map(|v| LogFormat::parse(&v)))
            .unwrap_or_default();
        let span_events = std::env::var(SPAN_EVENTS_ENV_VAR)
            .map(|raw| parse_span_events(&raw))
            .unwrap_or_else(|_| format.default_span_events());
        let layer = fmt::layer()
            .with_target(true)
            .with_span_events(span_events)
            .with_writer(io::stderr);

        let registry = tracing_subscriber::registry().with(build_filter());
        match format {
            LogFormat::Json => registry.with(layer.json()).init(),
            LogFormat::Text => registry.with(layer).init(),
        }

        tracing::debug!("Logging initialized with format {:?}", format);
    });

    Ok(())
}

/// Whether [`init`] has run
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

/// Filter from `SHELLPIPE_LOG`, then `RUST_LOG`, then `info`
fn build_filter() -> EnvFilter {
    let Ok(directives) = std::env::var(FILTER_ENV_VAR) else {
        return EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    };
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!(
            "Ignoring {}={:?} ({}), using '{}'",
            FILTER_ENV_VAR, directives, e, DEFAULT_DIRECTIVES
        );
        EnvFilter::new(DEFAULT_DIRECTIVES)
    })
}

fn parse_span_events(raw: &str) -> FmtSpan {
    raw.split([',', '|'])
        .map(|token| match token.trim().to_ascii_lowercase().as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        })
        .fold(FmtSpan::NONE, |acc, event| acc | event)
}
