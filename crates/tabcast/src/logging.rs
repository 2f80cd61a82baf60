//! Logging setup shared by the tabcast binaries.

/// Logging arguments, kept consistent with our other service CLIs.
#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. Can be one of trace|debug|info|warn|error|off
    #[arg(long = "log.level", default_value = "info", global = true, env = "LOG_LEVEL")]
    pub level: String,

    #[arg(long = "log.format", value_enum, global = true)]
    pub format: Option<LogFormat>,
}

/// The format for logs.
#[derive(Debug, clap::ValueEnum, Clone, Copy)]
pub enum LogFormat {
    /// Logs are written to stderr in jsonl format, one structured event
    /// per line.
    Json,
    /// Plain text with no colors.
    Text,
    /// Same as plain text, but with fancy colors for interactive terminals.
    Color,
}

fn default_log_format() -> LogFormat {
    if atty::is(atty::Stream::Stderr) {
        LogFormat::Color
    } else {
        // Running non-interactively: default to JSON so programmatic
        // consumers keep the event structure.
        LogFormat::Json
    }
}

/// Initializes logging, using the given args. Panics if called twice.
pub fn init(args: &LogArgs) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.level.as_str())
        .with_target(false);

    match args.format.unwrap_or_else(default_log_format) {
        LogFormat::Json => {
            builder.json().flatten_event(true).init();
        }
        LogFormat::Text => {
            builder.compact().with_ansi(false).init();
        }
        LogFormat::Color => {
            builder.compact().with_ansi(true).init();
        }
    }
}
