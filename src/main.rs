//! Game host channel - command line entry point
//!
//! Connects a server process to its control plane and logs the traffic it
//! receives until interrupted.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use gamehost_channel::config::ChannelConfig;
use gamehost_channel::observability::{init_default_logging, metrics::metrics};
use gamehost_channel::protocol::{
    ClientMessage, GameSession, RefreshConnection, TerminateProcess, UpdateGameSession,
};
use gamehost_channel::{Channel, ServerMessageHandler};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "gamehost-channel")]
#[command(about = "Self-healing control plane channel for game server processes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "GAMEHOST_CHANNEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log inbound messages until Ctrl-C
    Run {
        /// Port reported when activating the server process
        #[arg(long, default_value_t = 7777)]
        port: u16,

        /// Seconds between heartbeats; 0 disables them
        #[arg(long, default_value_t = 60)]
        heartbeat_secs: u64,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting gamehost-channel v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            port,
            heartbeat_secs,
        } => run_channel(config, port, heartbeat_secs).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ChannelConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ChannelConfig::load_from_file(path)?);
    }

    for path_str in ["channel.toml", "config/channel.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ChannelConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create channel.toml".into())
}

/// Logs every inbound message; terminate requests end the run loop
struct LoggingHandler {
    terminate: tokio::sync::Notify,
}

#[async_trait]
impl ServerMessageHandler for LoggingHandler {
    async fn on_start_game_session(&self, game_session: GameSession) {
        info!(
            game_session_id = %game_session.game_session_id,
            max_players = game_session.maximum_player_session_count,
            port = game_session.port,
            "Game session requested"
        );
    }

    async fn on_update_game_session(&self, update: UpdateGameSession) {
        info!(
            game_session_id = %update.game_session.game_session_id,
            reason = ?update.update_reason,
            "Game session updated"
        );
    }

    async fn on_terminate_process(&self, terminate: TerminateProcess) {
        warn!(
            termination_time = terminate.termination_time,
            "Control plane requested termination"
        );
        self.terminate.notify_one();
    }

    async fn on_refresh_connection(&self, refresh: RefreshConnection) {
        info!(
            endpoint_changed = refresh.refresh_connection_endpoint.is_some(),
            "Connection credentials rotated"
        );
    }

    async fn on_error_response(&self, request_id: String, status_code: u16, error_message: String) {
        warn!(%request_id, status_code, %error_message, "Request failed");
    }
}

async fn run_channel(
    config: ChannelConfig,
    port: u16,
    heartbeat_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let handler = Arc::new(LoggingHandler {
        terminate: tokio::sync::Notify::new(),
    });
    let channel = Channel::websocket(&config, handler.clone());

    channel.connect(config.connection_parameters()?).await?;
    channel
        .send_message(&ClientMessage::activate_server_process(
            config.sdk.version.clone(),
            config.sdk.language.clone(),
            port,
            Vec::new(),
        ))
        .await?;

    info!("Channel is running, press Ctrl-C to stop");

    let heartbeats = {
        let channel = channel.clone();
        tokio::spawn(async move {
            if heartbeat_secs == 0 {
                return;
            }
            let mut ticker = interval(Duration::from_secs(heartbeat_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = channel.send_message(&ClientMessage::heartbeat(true)).await {
                    warn!(error = %e, "Heartbeat failed");
                }
            }
        })
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C, shutting down gracefully...");
        }
        _ = handler.terminate.notified() => {
            info!("Termination requested by control plane");
            if let Err(e) = channel.send_message(&ClientMessage::terminate_server_process()).await {
                warn!(error = %e, "Failed to report process termination");
            }
        }
    }

    heartbeats.abort();
    channel.disconnect().await?;

    let snapshot = metrics().get_metrics();
    info!(
        messages_sent = snapshot.messages.messages_sent,
        messages_received = snapshot.messages.messages_received,
        reconnects = snapshot.orchestration.reconnects_triggered,
        "Channel statistics"
    );
    Ok(())
}

fn handle_config_command(config: ChannelConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
