use anyhow::Result;
use drumbeat::Config;
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = %config.midi_port,
        channel = config.channel + 1,
        "starting drumbeat"
    );

    // Optional pattern file to start playing right away
    let pattern_file = env::args().nth(1).map(PathBuf::from);
    drumbeat::repl::start(&config, pattern_file.as_deref())
}
