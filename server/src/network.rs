//! Server network layer: WebSocket listener and per-connection tasks

use crate::engine::RaceEngine;
use crate::error::RaceError;
use crate::gate::Handshake;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Accepts WebSocket connections and hands them to the engine
pub struct Server {
    listener: TcpListener,
    engine: Arc<RaceEngine>,
}

impl Server {
    pub async fn bind(addr: &str, engine: Arc<RaceEngine>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, engine })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Each connection runs on its own task.
    pub async fn run(self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(engine, stream, addr).await {
                            debug!("Connection {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Maps a failed handshake parse to the HTTP answer sent instead of the upgrade.
fn reject(err: &RaceError) -> ErrorResponse {
    let status = match err {
        RaceError::UnknownNamespace(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::UNAUTHORIZED,
    };
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = status;
    response
}

async fn close_with(
    ws: &mut WebSocketStream<TcpStream>,
    code: CloseCode,
    reason: String,
) -> Result<(), WsError> {
    ws.close(Some(CloseFrame {
        code,
        reason: Cow::Owned(reason),
    }))
    .await
}

async fn handle_connection(
    engine: Arc<RaceEngine>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), WsError> {
    let mut handshake = None;
    let mut ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        match Handshake::parse(request.uri().path(), request.uri().query()) {
            Ok(parsed) => {
                handshake = Some(parsed);
                Ok(response)
            }
            Err(e) => {
                warn!("Refusing upgrade from {}: {}", addr, e);
                Err(reject(&e))
            }
        }
    })
    .await?;
    let Some(handshake) = handshake else {
        return Ok(());
    };

    let identity = match engine.gate().authenticate(&handshake).await {
        Ok(identity) => identity,
        Err(e) => return close_with(&mut ws, CloseCode::Policy, e.to_string()).await,
    };

    let (outbox, mut frames) = mpsc::unbounded_channel::<String>();
    let Some(client_id) = engine
        .connect(identity, handshake.namespace, addr, outbox)
        .await
    else {
        warn!("Server full, refusing {}", addr);
        return close_with(&mut ws, CloseCode::Again, "Server full".to_string()).await;
    };

    let (mut sink, mut incoming) = ws.split();

    // Writer ends once the engine drops this client's outbox.
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!("Failed to send to client {}: {}", client_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = incoming.next().await {
        match message {
            Ok(Message::Text(text)) => engine.handle_text(client_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!("Client {} sent a binary frame, ignoring", client_id);
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Client {} read error: {}", client_id, e);
                break;
            }
        }
    }

    engine.disconnect(client_id).await;
    Ok(())
}
