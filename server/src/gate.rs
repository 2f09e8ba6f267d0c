//! Connection gate: resolves the caller's identity before any event handler runs.

use crate::error::RaceError;
use crate::store::{AuthVerifier, Identity};
use log::{info, warn};
use shared::Namespace;
use std::sync::Arc;

/// What the gate extracted from the upgrade request.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub namespace: Namespace,
    pub token: String,
}

impl Handshake {
    /// Parses the request path and `token` query parameter.
    pub fn parse(path: &str, query: Option<&str>) -> Result<Self, RaceError> {
        let namespace = Namespace::from_path(path)
            .ok_or_else(|| RaceError::UnknownNamespace(path.to_string()))?;

        let token = query
            .unwrap_or("")
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "token")
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RaceError::Authentication("missing token".to_string()))?;

        Ok(Self { namespace, token })
    }
}

#[derive(Clone)]
pub struct ConnectionGate {
    auth: Arc<dyn AuthVerifier>,
}

impl ConnectionGate {
    pub fn new(auth: Arc<dyn AuthVerifier>) -> Self {
        Self { auth }
    }

    /// No retries: a failed verification ends this connection attempt.
    pub async fn authenticate(&self, handshake: &Handshake) -> Result<Identity, RaceError> {
        match self.auth.verify(&handshake.token).await {
            Ok(identity) => {
                info!(
                    "Authenticated {} on {}",
                    identity.id,
                    handshake.namespace.path()
                );
                Ok(identity)
            }
            Err(RaceError::Authentication(reason)) => {
                warn!("Rejected handshake on {}: {}", handshake.namespace.path(), reason);
                Err(RaceError::Authentication(reason))
            }
            Err(other) => {
                warn!("Auth verifier failed: {}", other);
                Err(RaceError::Authentication(other.to_string()))
            }
        }
    }
}
