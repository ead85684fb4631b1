//! Transport seam between the client and the WebSocket.
//!
//! A transport reports everything that happens on the socket as
//! [`TransportEvent`]s on a bounded channel. The client's inbound task is
//! the only reader, so a slow consumer pushes back on the socket reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The WebSocket upgrade succeeded.
    Connected,
    /// The WebSocket could not be opened.
    ConnectError(String),
    Text(String),
    Binary(Vec<u8>),
    /// The session ended; `Some` carries the error that ended it.
    Disconnected(Option<String>),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start opening a session. Returns once the attempt is under way; the
    /// outcome arrives on `events`.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), ClientError>;

    /// Send one text frame on the live session.
    async fn send_text(&self, text: String) -> Result<(), ClientError>;

    /// Close the live session, or abandon one still being opened.
    async fn close(&self);

    /// Returns `true` while a session is open.
    fn is_open(&self) -> bool;

    fn url(&self) -> &str;
}

/// Command sent from callers to the background socket task.
enum WsCommand {
    Send(String),
    Close,
}

/// Handle to the background task of one session.
struct Session {
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    open: Arc<AtomicBool>,
}

impl Session {
    fn close(self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

/// tokio-tungstenite transport. One background task owns each session.
pub struct WsTransport {
    url: String,
    authorization: Option<String>,
    session: Mutex<Option<Session>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, authorization: Option<String>) -> Self {
        Self {
            url: url.into(),
            authorization,
            session: Mutex::new(None),
        }
    }

    fn request(&self) -> Result<Request, ClientError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidAddress(e.to_string()))?;
        if let Some(auth) = &self.authorization {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| ClientError::InvalidAuthorization(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session.take() {
            session.close();
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), ClientError> {
        let request = self.request()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let session = Session {
            cmd_tx,
            open: Arc::clone(&open),
        };
        if let Some(old) = self.lock().replace(session) {
            old.close();
        }

        let url = self.url.clone();
        tokio::spawn(async move {
            ws_session(url, request, cmd_rx, events, open).await;
        });
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), ClientError> {
        let session = self.lock();
        match session.as_ref() {
            Some(s) if s.open.load(Ordering::Acquire) => s
                .cmd_tx
                .send(WsCommand::Send(text))
                .map_err(|_| ClientError::WebSocket("WS task closed".into())),
            _ => Err(ClientError::NotConnected),
        }
    }

    async fn close(&self) {
        let session = self.lock().take();
        if let Some(session) = session {
            session.close();
        }
    }

    fn is_open(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|s| s.open.load(Ordering::Acquire))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Background task that owns one WebSocket session.
async fn ws_session(
    url: String,
    request: Request,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
) {
    tracing::info!(url = %url, "connecting via WebSocket");

    // No sends are accepted before the upgrade, so any command here is a close.
    let ws_stream = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "WS connect failed");
                let _ = events.send(TransportEvent::ConnectError(e.to_string())).await;
                return;
            }
        },
        _ = cmd_rx.recv() => {
            tracing::debug!(url = %url, "WS connect cancelled");
            return;
        }
    };
    open.store(true, Ordering::Release);
    if events.send(TransportEvent::Connected).await.is_err() {
        open.store(false, Ordering::Release);
        return;
    }

    let (mut sink, mut stream) = ws_stream.split();
    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WsCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Some(e.to_string());
                    }
                }
                None | Some(WsCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                }
            },
            msg = stream.next() => {
                let event = match msg {
                    None | Some(Ok(Message::Close(_))) => break None,
                    Some(Err(e)) => break Some(e.to_string()),
                    Some(Ok(Message::Text(text))) => Some(TransportEvent::Text(text)),
                    Some(Ok(Message::Binary(data))) => Some(TransportEvent::Binary(data)),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                        None
                    }
                    Some(Ok(_)) => None,
                };
                if let Some(event) = event {
                    if events.send(event).await.is_err() {
                        break None;
                    }
                }
            }
        }
    };

    open.store(false, Ordering::Release);
    match &reason {
        Some(e) => tracing::warn!(url = %url, error = %e, "WS session ended with error"),
        None => tracing::info!(url = %url, "WS session closed"),
    }
    let _ = events.send(TransportEvent::Disconnected(reason)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_authorization() {
        let t = WsTransport::new("ws://localhost:9900/connect", Some("Bearer abc".into()));
        let req = t.request().unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer abc");
        assert_eq!(req.uri().path(), "/connect");
    }

    #[test]
    fn request_without_authorization() {
        let t = WsTransport::new("ws://localhost:9900/connect", None);
        assert!(t.request().unwrap().headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn bad_url_is_rejected() {
        let t = WsTransport::new("not a url", None);
        assert!(matches!(t.request(), Err(ClientError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn send_without_session_fails() {
        let t = WsTransport::new("ws://localhost:9900/connect", None);
        assert!(!t.is_open());
        assert!(matches!(
            t.send_text("{}".into()).await,
            Err(ClientError::NotConnected)
        ));
        t.close().await;
    }

    #[tokio::test]
    async fn close_abandons_pending_upgrade() {
        // Accepts the TCP connection but never answers the upgrade request.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(socket);
        });

        let t = WsTransport::new(format!("ws://{addr}/connect"), None);
        let (tx, mut rx) = mpsc::channel(4);
        t.connect(tx).await.unwrap();
        t.close().await;

        let next = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("session task should end");
        assert_eq!(next, None);
        assert!(!t.is_open());
        server.abort();
    }
}
