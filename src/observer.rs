//! WebSocket endpoint for the single ground-station observer.
//!
//! Each accepted connection takes the relay's observer slot (closing and
//! draining any previous one), gets a writer task fed from the relay's outbound queue, and
//! runs a read loop that hands every inbound message to the relay.

use crate::relay::{ObserverLease, Relay};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:2078";
pub const DEFAULT_PATH: &str = "/ws";
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverSettings {
    pub bind_addr: String,
    pub path: String,
    /// Records buffered for a slow observer before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            path: DEFAULT_PATH.to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("failed to bind observer endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
}

pub async fn bind(settings: &ObserverSettings) -> Result<TcpListener, ObserverError> {
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .map_err(|source| ObserverError::Bind {
            addr: settings.bind_addr.clone(),
            source,
        })?;
    info!("🌐 Observer endpoint listening on ws://{}{}", settings.bind_addr, settings.path);
    Ok(listener)
}

/// Accept connections forever. Each one is upgraded and served on its own
/// task; a failed accept or handshake only affects that connection.
pub async fn serve(listener: TcpListener, relay: Arc<Relay>, settings: ObserverSettings) {
    let settings = Arc::new(settings);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Incoming observer connection from {}", addr);
                let relay = Arc::clone(&relay);
                let settings = Arc::clone(&settings);

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, relay, settings).await {
                        warn!("Observer {} error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    relay: Arc<Relay>,
    settings: Arc<ObserverSettings>,
) -> Result<(), ObserverError> {
    let expected_path = settings.path.clone();
    let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == expected_path {
            return Ok(response);
        }
        let mut rejection = ErrorResponse::new(Some(format!(
            "no observer endpoint at {}",
            request.uri().path()
        )));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    };

    let socket = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .map_err(ObserverError::Handshake)?;
    let (mut sink, mut incoming) = socket.split();

    let ObserverLease {
        id,
        mut outbound,
        mut closed,
        finished,
    } = relay.attach_observer(settings.queue_depth).await;
    info!("🔗 Observer {} connected from {}", id, addr);

    // Drains the queue and hangs up once the relay drops the sender.
    let writer = tokio::spawn(async move {
        while let Some(record) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(record)).await {
                warn!("Error sending data over WebSocket: {}", e);
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            biased;

            _ = &mut closed => {
                info!("Observer {} released", id);
                break;
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    relay.handle_message(text.as_bytes()).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    relay.handle_message(&bytes).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Observer {} closed connection: {:?}", id, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Error reading from WebSocket: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    // Nothing more is forwarded from this connection.
    let _ = finished.send(());
    relay.detach_observer(id).await;
    if let Err(e) = writer.await {
        error!("Observer {} writer task failed: {}", id, e);
    }
    info!("🔌 Observer {} disconnected", id);

    Ok(())
}
