use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            // Unknown values fall back to human output
            _ => Ok(OutputFormat::Human),
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: &str) -> String {
    format!("s3tree={},tower=warn,axum=info", level)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` (default `info`) applies to
/// this crate only.
///
/// ```no_run
/// use s3tree::observability::tracing_setup::{init_tracing, OutputFormat};
///
/// init_tracing(OutputFormat::Json);
/// ```
pub fn init_tracing(format: OutputFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(default_directives(&log_level))
    });

    match format {
        OutputFormat::Human => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_level(true)
                        .with_ansi(true),
                )
                .init();
        }
        OutputFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_level(true),
                )
                .init();
        }
    }
    tracing::info!(?format, "tracing initialized");
}

/// Same as [`init_tracing`], format taken from `LOG_FORMAT` (`json` or `human`).
pub fn init_tracing_from_env() {
    let format_str = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "human".to_string());
    let format = OutputFormat::from_str(&format_str).unwrap_or(OutputFormat::Human);
    init_tracing(format);
}
