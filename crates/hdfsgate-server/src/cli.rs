//! Command-line interface of the `hdfsgate` binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hdfsgate_core::{
    BundleMessageSource, ConfigurationAssembler, FilesystemBinder, HdfsService, Locale,
};
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::server::BridgeServer;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "hdfsgate")]
#[command(about = "HDFS gateway bridge", long_about = None)]
pub struct Cli {
    /// Gateway configuration file (TOML or JSON)
    #[arg(short, long, env = "HDFSGATE_CONFIG", default_value = "/etc/hdfsgate/hdfsgate.toml")]
    pub config: PathBuf,

    /// Overrides `bridge.bind_addr`
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What the binary does after loading its configuration.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bind the filesystem and serve bridge requests (default)
    Serve,
    /// Assemble the cluster configuration and print it
    CheckConfig,
}

impl Cli {
    /// Loads the gateway configuration this invocation points at.
    pub fn load_config(&self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::load(&self.config, std::env::vars())
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(bind) = self.bind {
            config.bridge.bind_addr = bind;
        }
        Ok(config)
    }

    /// Runs the selected subcommand.
    pub async fn run(self, config: GatewayConfig) -> Result<()> {
        match self.command.clone().unwrap_or(Command::Serve) {
            Command::Serve => serve(config).await,
            Command::CheckConfig => check_config(&config),
        }
    }
}

fn check_config(config: &GatewayConfig) -> Result<()> {
    let hdfs = &config.hadoop.hdfs;
    println!("mode: {:?}", hdfs.mode());
    if hdfs.disable {
        println!("hdfs integration disabled");
        return Ok(());
    }
    let conf = ConfigurationAssembler::assemble(hdfs)?;
    for (key, value) in conf.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

/// Builds the message source from the builtin bundles plus `messages.bundle_dir`.
pub fn build_messages(config: &GatewayConfig) -> Result<BundleMessageSource> {
    let mut messages = BundleMessageSource::builtin()
        .with_default_locale(Locale::parse(&config.messages.default_locale));
    if let Some(dir) = &config.messages.bundle_dir {
        let loaded = messages
            .load_dir(dir)
            .with_context(|| format!("loading message bundles from {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), bundles = loaded, "loaded message bundles");
    }
    Ok(messages)
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let messages = build_messages(&config)?;
    let default_locale = messages.default_locale().clone();

    let mut binder = FilesystemBinder::with_defaults();
    let handle = binder
        .bootstrap(&config.hadoop.hdfs)
        .await
        .context("binding the cluster filesystem")?;
    let service = HdfsService::new(handle, Arc::new(messages));

    let listener = TcpListener::bind(config.bridge.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bridge.bind_addr))?;
    let server = BridgeServer::new(service, default_locale, config.bridge.max_frame_bytes);

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}
