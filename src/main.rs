use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use course_aggregator::config::load_config;
use course_aggregator::shutdown::Shutdown;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a TOML configuration file. `AGG__*` environment variables
    /// override values from the file.
    #[arg(short, long, env = "AGG_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_tracing(config.verbose);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                "starting {}",
                env!("CARGO_PKG_NAME")
            );

            let shutdown = Shutdown::new();
            shutdown.spawn_signal_handler();

            course_aggregator::run(config, shutdown).await
        })?;

    info!("Program terminating normally");
    Ok(())
}

/// `RUST_LOG` wins over the `verbose` config key when set.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
