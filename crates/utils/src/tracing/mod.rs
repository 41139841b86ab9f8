use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

/// Initialize the tracing system
///
/// Honors `RUST_LOG`, falling back to `default_directive` (usually `info`).
/// Output goes to stderr so command output on stdout stays parseable.
pub fn init(default_directive: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directive))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Span covering one structural operation on a volume group
pub fn operation_span(operation: &str, vg: &str, volume: &str) -> Span {
    span!(Level::INFO, "lvop", op = %operation, vg = %vg, lv = %volume)
}

/// Emit a structured event for flush progress
pub fn flush_progress(volume: &str, dirty_blocks: u64, polls: u64) {
    info!(
        lv = %volume,
        dirty_blocks = dirty_blocks,
        polls = polls,
        "{dirty_blocks} blocks must still be flushed"
    );
}
