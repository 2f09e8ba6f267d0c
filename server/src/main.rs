use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use server::config::RaceConfig;
use server::engine::RaceEngine;
use server::memory::{FuelScoreProvider, MemoryTrackStore, StoreSettings, UserDirectory};
use server::network::Server;
use server::store::Collaborators;
use shared::DEFAULT_RACE_NAME;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, env = "RACE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "RACE_PORT", default_value = "8080")]
    port: u16,

    /// Players needed to start a race
    #[arg(long, env = "RACE_SIZE", default_value = "2")]
    race_size: usize,

    /// Race length in milliseconds
    #[arg(long, env = "RACE_DURATION_MS", default_value = "60000")]
    race_duration_ms: u64,

    /// Milliseconds between standings broadcasts
    #[arg(
        long,
        env = "RACE_TICK_MS",
        default_value = "3000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    tick_ms: u64,

    /// Minimum number of joinable tracks kept in the lobby
    #[arg(long, env = "RACE_MIN_AWAITING", default_value = "2")]
    min_awaiting: usize,

    /// Maximum number of tracks returned by a listing
    #[arg(long, env = "RACE_LIST_LIMIT", default_value = "50")]
    list_limit: usize,

    /// Prize paid to the winner
    #[arg(long, env = "RACE_PRIZE", default_value = "100")]
    prize: u64,

    /// Name given to newly created tracks
    #[arg(long, env = "RACE_NAME", default_value = DEFAULT_RACE_NAME)]
    race_name: String,

    /// Maximum concurrent connections
    #[arg(short, long, env = "RACE_MAX_CLIENTS", default_value = "1024")]
    max_clients: usize,

    /// JSON file of users and their tokens; demo users when omitted
    #[arg(short, long, env = "RACE_USERS")]
    users: Option<PathBuf>,
}

impl Args {
    fn race_config(&self) -> RaceConfig {
        RaceConfig {
            race_size: self.race_size,
            race_duration: Duration::from_millis(self.race_duration_ms),
            tick_interval: Duration::from_millis(self.tick_ms),
            min_awaiting: self.min_awaiting,
            list_limit: self.list_limit,
            prize: self.prize,
            race_name: self.race_name.clone(),
            max_clients: self.max_clients,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.race_config();

    let users = match &args.users {
        Some(path) => UserDirectory::from_json_file(path)?,
        None => {
            warn!("No user file given, accepting demo tokens only");
            UserDirectory::demo()
        }
    };
    info!("Loaded {} users", users.len());

    let tracks = Arc::new(MemoryTrackStore::new(StoreSettings::from(&config)));
    let users = Arc::new(users);
    let collaborators = Collaborators {
        tracks: tracks.clone(),
        scores: Arc::new(FuelScoreProvider::new(tracks)),
        auth: users.clone(),
        identities: users,
    };

    info!(
        "Races of {} players, {}ms long, ticking every {}ms",
        config.race_size,
        config.race_duration_ms(),
        config.tick_interval.as_millis()
    );
    let engine = Arc::new(RaceEngine::new(config, collaborators));

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, Arc::clone(&engine)).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    engine.shutdown().await;
    Ok(())
}
