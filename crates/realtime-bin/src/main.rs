//! Tail a gym realtime channel and print every message as a JSON line.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gympulse_common::{Action, ChannelRoute, InboundMessage};
use realtime_lib::{ChannelScope, FlatFileStore, KeyValueStore, MemoryStore, Settings};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelKind {
    /// websocket_feed/posts
    Feed,
    /// websocket_live/sessions
    Sessions,
    /// websocket_live/live
    Live,
}

impl ChannelKind {
    fn route(self) -> ChannelRoute {
        match self {
            ChannelKind::Feed => ChannelRoute::feed_posts(),
            ChannelKind::Sessions => ChannelRoute::live_sessions(),
            ChannelKind::Live => ChannelRoute::live_count(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "realtime-bin", about = "Tail a gym realtime channel")]
struct Args {
    /// Config file (toml, yaml or json); defaults to ./config.*
    #[arg(long)]
    config: Option<PathBuf>,

    /// Which channel to follow
    #[arg(long, value_enum, default_value_t = ChannelKind::Live)]
    channel: ChannelKind,

    /// Override the primary path segment
    #[arg(long, requires = "secondary")]
    primary: Option<String>,

    /// Override the secondary path segment
    #[arg(long, requires = "primary")]
    secondary: Option<String>,

    /// Gym to follow; read from the session store when omitted
    #[arg(long)]
    gym_id: Option<String>,

    /// Only print messages with these actions (repeatable)
    #[arg(long = "action")]
    actions: Vec<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_message(msg: &InboundMessage, filter: &HashSet<Action>) {
    if !filter.is_empty() && !msg.action().is_some_and(|a| filter.contains(&a)) {
        return;
    }
    match serde_json::to_string(msg.payload()) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "could not render message"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading settings")?;

    init_tracing(&settings.log_level, args.json_logs);

    let route = match (args.primary, args.secondary) {
        (Some(primary), Some(secondary)) => ChannelRoute::new(primary, secondary),
        _ => args.channel.route(),
    };

    // an explicit gym id bypasses the persisted session
    let store: Arc<dyn KeyValueStore> = match &args.gym_id {
        Some(gym_id) => {
            Arc::new(MemoryStore::new().with_entry(&settings.gym_id_key, gym_id))
        },
        None => Arc::new(
            FlatFileStore::new(&settings.store_path).context("opening session store")?,
        ),
    };

    let filter: HashSet<Action> = args.actions.iter().map(|a| Action::from(a.as_str())).collect();

    let mut scope = ChannelScope::new(settings.channel_config(), route, store)
        .with_gym_id_key(settings.gym_id_key.clone());
    let channel = scope.activate().await.context("activating channel")?;

    let Some(url) = channel.url() else {
        warn!(key = %settings.gym_id_key, "no gym id available; pass --gym-id or seed the session store");
        scope.deactivate().await;
        return Ok(());
    };
    info!(%url, "following channel");

    let _subscription = channel.subscribe(move |msg| print_message(msg, &filter));

    let mut state = channel.watch_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(state = %current, "connection state changed");
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    scope.deactivate().await;
    Ok(())
}
