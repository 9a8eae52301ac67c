use tracing_subscriber::EnvFilter;

/// Initialize logging with a filter taken from the `TICTACTOE_LOG`
/// environment variable. Defaults to `info` if the variable is not set or
/// invalid. Logs go to stderr: stdout is reserved for descriptor blobs and
/// the board. Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_env("TICTACTOE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
