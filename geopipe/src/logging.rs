//! Support for structured logging.

use anyhow::{format_err, Error, Result};
use std::{fmt, io::stderr, str::FromStr};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "geopipe=info";

/// What log format we should use.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub(crate) enum LogFormat {
    /// Single-line log entries with all fields on each line.
    #[default]
    Flat,
    /// Multi-line, human-friendly logs.
    Pretty,
    /// JSON records.
    Json,
}

impl LogFormat {
    /// Install a global `tracing` subscriber writing to standard error in
    /// this format.
    pub(crate) fn init_tracing(self) -> Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new(DEFAULT_FILTER),
        };
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(stderr);
        let result = match self {
            LogFormat::Flat => builder.try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|err| format_err!("could not install tracing subscriber: {}", err))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Flat => "flat".fmt(f),
            LogFormat::Pretty => "pretty".fmt(f),
            LogFormat::Json => "json".fmt(f),
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(LogFormat::Flat),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format_err!("unknown log format: {}", s)),
        }
    }
}

#[test]
fn parses_log_formats() {
    for format in [LogFormat::Flat, LogFormat::Pretty, LogFormat::Json] {
        assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
    }
    assert!("indented".parse::<LogFormat>().is_err());
}
