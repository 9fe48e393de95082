mod cli;
mod input;
mod logging;

use clap::Parser;
use eyre::{Context, Result};
use std::time::Duration;

use cli::Cli;
use upsync_core::config::{PartialConfig, UploaderConfig};
use upsync_core::remote::S3Store;
use upsync_core::{CandidateSource, SyncDriver};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let file_layer = match &cli.config {
        Some(path) => PartialConfig::load(path).await?,
        None => PartialConfig::default(),
    };
    let config = UploaderConfig::from_partial(file_layer.merge(cli.overrides()))?;

    logging::init(config.debug);

    if config.force {
        log::info!("will force upload every file due to --force");
    }
    if config.dry_run {
        log::info!("dry run: nothing will be uploaded");
    }

    log::info!("creating S3 client for bucket {}", config.bucket);
    let store = S3Store::new(&config.s3_settings())?;
    store.verify_credentials().await?;

    let listed = tokio::task::spawn_blocking(input::read_stdin_list)
        .await
        .wrap_err("stdin reader failed")??;
    let source = if listed.is_empty() {
        log::info!(
            "got no file list from stdin, starting to walk {:?}",
            config.src.display().to_string()
        );
        CandidateSource::Walk(config.src.clone())
    } else {
        log::info!("got {} files from stdin, starting to check them", listed.len());
        CandidateSource::List(listed)
    };

    let driver = SyncDriver::new(config.sync_options(), store);
    let stats = driver.run(source, shutdown_signal(config.timeout)).await?;

    println!("{stats}");
    Ok(())
}

/// Resolves on Ctrl-C or once `timeout` has elapsed.
async fn shutdown_signal(timeout: Option<Duration>) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::warn!("received Ctrl-C"),
            Err(err) => {
                log::warn!("failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    match timeout {
        Some(limit) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = tokio::time::sleep(limit) => log::warn!("timeout of {limit:?} reached"),
            }
        }
        None => ctrl_c.await,
    }
}
