use clap::Parser;
use std::path::PathBuf;
use upsync_core::config::PartialConfig;

#[derive(Parser, Debug)]
#[command(name = "upsync")]
#[command(about = "Upload new and changed files from a local folder to an S3 bucket")]
#[command(
    after_help = "A newline-separated list of files piped on stdin is checked instead of walking --src."
)]
pub struct Cli {
    /// Destination S3 bucket
    #[arg(long)]
    pub bucket: Option<String>,
    /// Region of the S3 bucket
    #[arg(long)]
    pub region: Option<String>,
    /// Local folder to back up
    #[arg(long, visible_alias = "folder", value_name = "DIR")]
    pub src: Option<PathBuf>,
    /// Remote prefix for S3 keys
    #[arg(long, value_name = "PREFIX")]
    pub dest: Option<String>,
    /// Skip hashing and upload all files
    #[arg(long)]
    pub force: bool,
    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
    /// Read options from a TOML file; command-line flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Use an S3-compatible endpoint instead of AWS
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
    /// Number of files checked and uploaded concurrently
    #[arg(long)]
    pub workers: Option<usize>,
    /// Report what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,
    /// Stop after this many seconds, still printing the totals so far
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    /// The command-line layer of the configuration. Boolean switches only
    /// override the config file when they are given.
    pub fn overrides(&self) -> PartialConfig {
        PartialConfig {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            src: self.src.clone(),
            dest: self.dest.clone(),
            force: self.force.then_some(true),
            debug: self.debug.then_some(true),
            endpoint: self.endpoint.clone(),
            workers: self.workers,
            dry_run: self.dry_run.then_some(true),
            timeout_secs: self.timeout,
        }
    }
}
