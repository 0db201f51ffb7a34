//! Command line entry point of the CMS stress test.
//!
//! Exits with a non-zero status if the configuration is invalid or the login fails.

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use cms_stresstest::Config;
use cms_stresstest::observability::initialize_tracing;

/// Stress tester for the hospital CMS
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    initialize_tracing(&config.logging);
    tracing::debug!(?config, "loaded configuration");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(cms_stresstest::run(config))?;

    Ok(())
}
