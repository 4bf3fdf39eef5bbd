use anyhow::{Context, Result};
use clap::Parser;
use printhost::{
    encode_event, flash_config, gcode_fetcher, init_logging, session_timings, ChannelRelay,
    Flasher, GatewayConfig, GatewayServer, RelayDispatcher, SessionRegistry, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};

/// printhost bridges G-code printers on TCP to a relay speaking JSON lines
/// on stdin (commands) and stdout (events).
#[derive(Parser, Debug)]
#[command(name = "printhost", version)]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Override the listen address
    #[arg(long)]
    host: Option<String>,
    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,
    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides and re-check the result
    fn apply_overrides(&self, config: &mut GatewayConfig) -> Result<()> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;
    cli.apply_overrides(&mut config)?;

    if let Some(path) = cli.write_config {
        config.save_to_file(&path)?;
        return Ok(());
    }

    init_logging(&config.logging)?;
    tracing::info!("printhost {} (built {})", VERSION, BUILD_DATE);

    let registry = Arc::new(SessionRegistry::new());
    let (relay, mut events) = ChannelRelay::new();

    let mut server = GatewayServer::new(registry.clone(), Arc::new(relay), session_timings(&config));
    if let Some(flash) = flash_config(&config) {
        tracing::info!("Firmware flashing enabled with {}", flash.hex_file.display());
        server = server.with_flasher(Flasher::new(flash));
    }
    let server = Arc::new(server);
    let fetcher = gcode_fetcher(&config).context("configuring the file store")?;
    let dispatcher = Arc::new(RelayDispatcher::new(registry, fetcher));

    let host_id = config.relay.host_id.clone();
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events.recv().await {
            let line = match encode_event(&host_id, &event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Could not encode relay event: {}", e);
                    continue;
                }
            };
            if let Err(e) = stdout.write_all(format!("{}\n", line).as_bytes()).await {
                tracing::error!("Relay output closed: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    tokio::spawn(async move {
        if let Err(e) = dispatcher.serve_lines(BufReader::new(tokio::io::stdin())).await {
            tracing::error!("Relay input failed: {}", e);
        }
    });

    let listener = GatewayServer::bind(&config.server.bind_address()).await?;
    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
