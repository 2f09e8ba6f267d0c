//! Error taxonomy shared by every race coordination component.

use shared::TrackStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RaceError {
    /// Invalid or expired handshake token. Terminal for the connection attempt.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown namespace {0}")]
    UnknownNamespace(String),

    #[error("Track not found")]
    TrackNotFound,

    #[error("Track is already {}", status_word(.0))]
    TrackNotJoinable(TrackStatus),

    #[error("Track is not active")]
    TrackNotActive,

    #[error("Join the track before sending race events")]
    NotInRoom,

    /// The store saw a competing admission for the same track.
    #[error("Admission conflict for player {0}")]
    AdmissionConflict(String),

    #[error("Service unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Malformed event: {0}")]
    Protocol(String),

    #[error("Event not supported on this namespace")]
    UnsupportedEvent,
}

fn status_word(status: &TrackStatus) -> &'static str {
    match status {
        TrackStatus::Awaiting => "awaiting players",
        TrackStatus::Active => "active",
        TrackStatus::Finished => "finished",
    }
}

impl RaceError {
    /// Validation errors go back to the requesting connection verbatim.
    /// Collaborator failures are logged and reported generically.
    pub fn is_client_facing(&self) -> bool {
        !matches!(
            self,
            RaceError::CollaboratorUnavailable(_) | RaceError::AdmissionConflict(_)
        )
    }

    pub fn client_message(&self) -> String {
        if self.is_client_facing() {
            self.to_string()
        } else {
            "Service unavailable".to_string()
        }
    }
}

impl From<serde_json::Error> for RaceError {
    fn from(e: serde_json::Error) -> Self {
        RaceError::Protocol(e.to_string())
    }
}
