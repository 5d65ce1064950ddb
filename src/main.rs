use anyhow::Result;
use clap::Parser;
use roomwatch::inbox::{ChannelInbox, InboxReceiver};
use roomwatch::integrations::gitter::GitterClient;
use roomwatch::integrations::stream::GitterStreamListener;
use roomwatch::supervisor::StreamSupervisor;
use roomwatch::{config, integrations, lifecycle};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "roomwatch")]
#[command(about = "Stream chat room messages into a local inbox")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    /// Rooms to monitor, comma separated (overrides the config file)
    #[arg(long, short, value_delimiter = ',')]
    rooms: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roomwatch=info".parse()?),
        )
        .init();

    if args.init {
        config::init_wizard().await?;
        return Ok(());
    }

    let mut config = config::load(args.config.as_deref())?;
    if let Some(rooms) = args.rooms {
        config.rooms.names = rooms;
    }

    let http = integrations::build_http_client(&config.http)?;
    let directory = GitterClient::new(http.clone(), &config.gitter);
    let listener = GitterStreamListener::new(http, &config.gitter);
    let (inbox, receiver) = ChannelInbox::new();

    let supervisor = StreamSupervisor::new(Arc::new(directory), Arc::new(listener), Arc::new(inbox))
        .with_room_filter(config.rooms.names.clone());

    let consumer = tokio::spawn(consume(receiver));

    let handle = lifecycle::start(supervisor);
    let stop = handle.cancellation_token();
    let join = handle.join();
    tokio::pin!(join);

    let result = tokio::select! {
        result = &mut join => result,
        _ = lifecycle::shutdown_signal() => {
            tracing::info!("Stop requested.");
            stop.cancel();
            join.await
        }
    };

    // The inbox closes once the supervisor is gone
    if let Err(e) = consumer.await {
        tracing::warn!("Inbox consumer ended abnormally: {}", e);
    }

    let report = result?;
    if report.faults() > 0 {
        tracing::warn!("{} listener(s) failed during the run.", report.faults());
    }

    Ok(())
}

/// Downstream processing: log every message that reaches the inbox
async fn consume(mut receiver: InboxReceiver) {
    while let Some(message) = receiver.recv().await {
        tracing::info!(
            room = %message.room,
            user = %message.from_user.username,
            "{}",
            message.text
        );
    }
}
