use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `log` records from the core are
/// bridged in; `RUST_LOG` overrides the level picked by `--debug`.
pub fn init(debug: bool) {
    let default = if debug {
        "info,upsync=debug,upsync_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
