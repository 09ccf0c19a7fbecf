use crate::client::config::Config;
use crate::client::consts::{INBOUND_CAPACITY, OUTBOUND_CAPACITY};
use crate::client::utils;
use crate::error::SessionError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use voice_snake_types::{ClientMessage, ServerMessage, Setup};

/// What the remote end delivered, in delivery order.
#[derive(Debug, Clone)]
pub enum Inbound {
    Message(ServerMessage),
    Closed(Option<String>),
    Failed(String),
}

/// An open session: outbound messages are written in queue order by a
/// single writer; inbound messages are read by a single reader.
pub struct Connection {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<Inbound>,
    io_tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn new(outbound: mpsc::Sender<ClientMessage>, inbound: mpsc::Receiver<Inbound>) -> Self {
        Self {
            outbound,
            inbound,
            io_tasks: Vec::new(),
        }
    }

    fn with_io_tasks(mut self, tasks: Vec<JoinHandle<()>>) -> Self {
        self.io_tasks = tasks;
        self
    }

    /// Splits off the reader/writer tasks so they can be aborted with the session.
    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::Sender<ClientMessage>,
        mpsc::Receiver<Inbound>,
        Vec<JoinHandle<()>>,
    ) {
        (self.outbound, self.inbound, self.io_tasks)
    }
}

/// Opens bidirectional sessions with the remote speech service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects and sends `setup` as the first message.
    async fn open(&self, setup: Setup) -> Result<Connection, SessionError>;
}

/// Live API over a WebSocket.
pub struct WsTransport {
    config: Config,
}

impl WsTransport {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, setup: Setup) -> Result<Connection, SessionError> {
        let request = utils::build_request(&self.config)
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        tracing::info!(model = %setup.model(), "connected to Live API");

        let (mut write, mut read) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(setup))?;
        write
            .send(Message::Text(setup))
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        let (c_tx, mut c_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_CAPACITY);
        let (s_tx, s_rx) = mpsc::channel::<Inbound>(INBOUND_CAPACITY);

        let writer_failed = s_tx.clone();
        let send_handle = tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::error!("failed to send message: {}", e);
                    let _ = writer_failed.send(Inbound::Failed(e.to_string())).await;
                    break;
                }
            }
            let _ = write.close().await;
        });

        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = s_tx.send(Inbound::Failed(e.to_string())).await;
                        return;
                    }
                };
                // The Live API sends its JSON events in binary frames as well.
                let text = match message {
                    Message::Text(text) => text,
                    Message::Binary(bin) => match String::from_utf8(bin) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("non UTF-8 binary message: {}", e);
                            continue;
                        }
                    },
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        tracing::info!("connection closed: {:?}", reason);
                        let _ = s_tx.send(Inbound::Closed(reason)).await;
                        return;
                    }
                    _ => continue,
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(event) => {
                        if s_tx.send(Inbound::Message(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
                    }
                }
            }
            let _ = s_tx.send(Inbound::Closed(None)).await;
        });

        Ok(Connection::new(c_tx, s_rx).with_io_tasks(vec![send_handle, recv_handle]))
    }
}
