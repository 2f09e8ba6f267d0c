//! # Race Coordinator Library
//!
//! Server side of a real-time multiplayer racing game. Clients connect over
//! WebSocket, browse open tracks, join one, and once the track is full a
//! server-side clock streams standings until the race ends and is settled.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Keeps a minimum number of AWAITING tracks in the lobby so a fresh player
//! always has somewhere to join.
//!
//! ### Admission
//! Seats players on a track. The track store serializes admissions, so the
//! join that fills a track is the only one that sees it become ACTIVE and the
//! only one that starts its clock.
//!
//! ### Race Clock
//! One task per ACTIVE track. It broadcasts `positionUpdate` on every tick and
//! settles the race exactly once when the end time passes.
//!
//! ### Rooms
//! Connections subscribe to `race:{track}` and `chat:{track}` rooms. All
//! fan-out goes through the room registry; failures are answered on the
//! requesting connection only.
//!
//! ## Module Organization
//!
//! - `network`: WebSocket listener, handshake and per-connection tasks
//! - `gate`: namespace and token checks before any event runs
//! - `engine`: process-wide state and event dispatch
//! - `join`, `matchmaking`, `race_clock`, `chat`: the event handlers
//! - `rooms`, `client_manager`: connection registry and room membership
//! - `store`: collaborator traits; `memory`: in-process implementations
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RaceConfig;
//! use server::engine::RaceEngine;
//! use server::memory::{FuelScoreProvider, MemoryTrackStore, StoreSettings, UserDirectory};
//! use server::network::Server;
//! use server::store::Collaborators;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RaceConfig::default();
//!     let tracks = Arc::new(MemoryTrackStore::new(StoreSettings::from(&config)));
//!     let users = Arc::new(UserDirectory::demo());
//!     let collaborators = Collaborators {
//!         tracks: tracks.clone(),
//!         scores: Arc::new(FuelScoreProvider::new(tracks)),
//!         auth: users.clone(),
//!         identities: users,
//!     };
//!
//!     let engine = Arc::new(RaceEngine::new(config, collaborators));
//!     Server::bind("127.0.0.1:8080", engine).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod client_manager;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod join;
pub mod matchmaking;
pub mod memory;
pub mod network;
pub mod race_clock;
pub mod rooms;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

pub use engine::RaceEngine;
pub use error::RaceError;
pub use network::Server;
