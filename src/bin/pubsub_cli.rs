//! Pub/sub command line client
//!
//! Connects with the settings file, subscribes to its channels and logs
//! every event until Ctrl+C.
//!
//! ```text
//! pubsub_cli                          # listen only
//! pubsub_cli publish <channel> <json> # publish once, then listen
//! pubsub_cli presence <channel>
//! pubsub_cli history <channel>
//! ```
//!
//! Settings come from `--config <path>`, else `PUBSUB_CONFIG_PATH`, else
//! `config/pubsub.yaml`.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use pubsub_client::bin_common::{init_tracing_with_level, load_config_from_env, parse_args, take_config_arg};
use pubsub_client::pubsockets::{
    ChannelObserver, ClientEvent, ClientSettings, ConnectionDelegate, DisconnectInfo,
    PubSubClient, PubSubError, ServerMessage,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Logs channel events and counts them per channel
#[derive(Default)]
struct LoggingObserver {
    counts: Mutex<HashMap<String, u64>>,
}

impl LoggingObserver {
    fn bump(&self, channel: &str) {
        *self.counts.lock().entry(channel.to_string()).or_default() += 1;
    }

    fn summary(&self) -> String {
        let counts = self.counts.lock();
        let mut channels: Vec<_> = counts.iter().collect();
        channels.sort();
        channels
            .iter()
            .map(|(channel, count)| format!("{}={}", channel, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ChannelObserver for LoggingObserver {
    fn on_message(&self, channel: &str, message: &ServerMessage) {
        self.bump(channel);
        info!("[{}] message: {}", channel, message.data().unwrap_or(&serde_json::Value::Null));
    }

    fn on_join(&self, channel: &str, message: &ServerMessage) {
        info!("[{}] join: {}", channel, message.data().unwrap_or(&serde_json::Value::Null));
    }

    fn on_leave(&self, channel: &str, message: &ServerMessage) {
        info!("[{}] leave: {}", channel, message.data().unwrap_or(&serde_json::Value::Null));
    }

    fn on_unsubscribe(&self, channel: &str, _message: &ServerMessage) {
        warn!("[{}] unsubscribed by server", channel);
    }
}

struct LoggingDelegate;

impl ConnectionDelegate for LoggingDelegate {
    fn on_error(&self, error: &PubSubError) {
        warn!("Connection error: {}", error);
    }

    fn on_forced_refresh(&self) {
        warn!("Server requested a credentials refresh; restart with a new token");
    }

    fn on_disconnect(&self, info: &DisconnectInfo) {
        info!("Disconnected: code={} reason='{}'", info.code, info.reason);
    }
}

enum Command {
    Listen,
    Publish { channel: String, data: Value },
    Presence(String),
    History(String),
}

fn parse_command(args: &[String]) -> Result<Command> {
    match args {
        [] => Ok(Command::Listen),
        [cmd, channel, data] if cmd == "publish" => {
            let data = serde_json::from_str(data)
                .with_context(|| format!("publish data is not valid JSON: {}", data))?;
            Ok(Command::Publish {
                channel: channel.clone(),
                data,
            })
        }
        [cmd, channel] if cmd == "presence" => Ok(Command::Presence(channel.clone())),
        [cmd, channel] if cmd == "history" => Ok(Command::History(channel.clone())),
        _ => bail!(
            "usage: pubsub_cli [--config <path>] [publish <channel> <json> | presence <channel> | history <channel>]"
        ),
    }
}

async fn run_command(client: &PubSubClient, command: Command) -> Result<()> {
    match command {
        Command::Listen => {}
        Command::Publish { channel, data } => {
            client.publish(&channel, data).await?;
            info!("Published to '{}'", channel);
        }
        Command::Presence(channel) => {
            let reply = client.presence(&channel).await?;
            info!("Presence of '{}': {}", channel, reply.data().unwrap_or(&serde_json::Value::Null));
        }
        Command::History(channel) => {
            let reply = client.history(&channel).await?;
            info!("History of '{}': {}", channel, reply.data().unwrap_or(&serde_json::Value::Null));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing_with_level("info");

    let (config_type, args) = take_config_arg(parse_args())?;
    let command = parse_command(&args)?;

    let config_path = load_config_from_env(config_type);
    let settings = ClientSettings::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let channels = settings.channels.clone();

    let client = settings
        .into_builder()
        .delegate(Arc::new(LoggingDelegate))
        .build()
        .await?;

    print_banner(&channels);

    let reply = client.connect().await?;
    info!("Connected: {}", reply.body_str("client").unwrap_or("-"));

    let observer = Arc::new(LoggingObserver::default());
    for channel in &channels {
        match client.subscribe(channel.as_str(), observer.clone()).await {
            Ok(_) => info!("Subscribed to '{}'", channel),
            Err(e) => error!("Subscribe to '{}' failed: {}", channel, e),
        }
    }

    run_command(&client, command).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
            _ = ticker.tick() => {
                while let Some(event) = client.try_recv_event() {
                    if let ClientEvent::Disconnected(info) = &event {
                        if !client.is_connected() {
                            error!("Connection lost ({}), exiting", info.reason);
                            print_shutdown(&client, &observer);
                            client.shutdown().await?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    print_shutdown(&client, &observer);
    client.shutdown().await?;
    Ok(())
}

fn print_banner(channels: &[String]) {
    info!("");
    info!("========================================");
    info!("Starting pub/sub client");
    info!("Channels: {}", channels.join(", "));
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(client: &PubSubClient, observer: &LoggingObserver) {
    let metrics = client.metrics();
    info!("");
    info!("========================================");
    info!("Pub/sub client stopped gracefully");
    info!(
        "Frames sent: {} | received: {} | violations: {}",
        metrics.frames_sent, metrics.frames_received, metrics.protocol_violations
    );
    info!("Messages per channel: {}", observer.summary());
    info!("========================================");
}
