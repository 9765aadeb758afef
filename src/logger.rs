//! Logging setup for applications and benchmarks driving the bundle adjuster.
//!
//! The library itself only emits `tracing` events. Call [`init_logger`] once at
//! startup to print them; set `verbosity` in the configuration to choose how much
//! the solver reports.

use tracing::Level;

/// Install a subscriber at INFO, overridable through `RUST_LOG`.
///
/// Lines look like `[LEVEL YYYY-MM-DD HH:MM:SS target] message`, with `file:line`
/// instead of the target at DEBUG and TRACE.
///
/// ```no_run
/// use bundle_adjust::init_logger;
///
/// init_logger();
/// tracing::info!("Bundle adjustment started");
/// ```
///
/// The per-iteration table needs DEBUG, e.g. `RUST_LOG=bundle_adjust=debug`.
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install a subscriber with `default_level`, still overridable through `RUST_LOG`.
///
/// ```no_run
/// use bundle_adjust::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// ```
pub fn init_logger_with_level(default_level: Level) {
    // A second call (tests, benches) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_level(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .event_format(BracketFormatter)
        .try_init();
}

/// `[LEVEL timestamp location] message`
struct BracketFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use chrono::Local;

        let metadata = event.metadata();
        let level = metadata.level();

        write!(writer, "[")?;
        match *level {
            Level::ERROR => write!(writer, "\x1b[31mERROR\x1b[0m ")?,
            Level::WARN => write!(writer, "\x1b[33mWARN\x1b[0m ")?,
            Level::INFO => write!(writer, "\x1b[32mINFO\x1b[0m ")?,
            Level::DEBUG => write!(writer, "\x1b[34mDEBUG\x1b[0m ")?,
            Level::TRACE => write!(writer, "\x1b[35mTRACE\x1b[0m ")?,
        }

        write!(writer, "{} ", Local::now().format("%Y-%m-%d %H:%M:%S"))?;

        let detailed = matches!(*level, Level::DEBUG | Level::TRACE);
        match (detailed, metadata.file()) {
            (true, Some(file)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{}:{}", filename, metadata.line().unwrap_or(0))?;
            }
            _ => write!(writer, "{}", metadata.target())?,
        }
        write!(writer, "] ")?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
