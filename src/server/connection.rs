//! Producer connection
//!
//! Pumps one producer's WebSocket. Text frames are control messages, binary
//! frames are audio chunks. Everything sent back to the producer, replies
//! and session notifications alike, goes through one channel so only this
//! loop writes to the socket.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::Result;
use crate::protocol::message::{ControlMessage, Notification};
use crate::registry::{RegistryError, SessionRegistry};
use crate::session::ProducerId;

/// One connected producer
pub(crate) struct ProducerConnection {
    producer: ProducerId,
    registry: Arc<SessionRegistry>,
    notify_tx: mpsc::UnboundedSender<Notification>,
    notify_rx: mpsc::UnboundedReceiver<Notification>,
    /// Set once a missing session has been reported, cleared on start
    no_session_reported: bool,
}

impl ProducerConnection {
    pub(crate) fn new(producer: ProducerId, registry: Arc<SessionRegistry>) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            producer,
            registry,
            notify_tx,
            notify_rx,
            no_session_reported: false,
        }
    }

    /// Serve the producer until it disconnects, then stop its session
    pub(crate) async fn run<S>(mut self, ws: WebSocketStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut sink, mut stream) = ws.split();

        let result = self.pump(&mut sink, &mut stream).await;

        if let Some(summary) = self.registry.stop(self.producer).await {
            tracing::info!(
                producer = self.producer,
                session_id = summary.session_id,
                phase = %summary.phase,
                "Producer disconnected, session stopped"
            );
        }
        let _ = sink.close().await;

        result
    }

    async fn pump<S>(
        &mut self,
        sink: &mut SplitSink<WebSocketStream<S>, Message>,
        stream: &mut SplitStream<WebSocketStream<S>>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        send(sink, &Notification::BridgeConnected).await?;

        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(message)) => {
                        if !self.handle_message(message).await {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
                Some(notification) = self.notify_rx.recv() => {
                    send(sink, &notification).await?;
                }
            }
        }
    }

    /// Returns false when the producer closed the socket
    async fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Text(text) => match ControlMessage::parse(&text) {
                Ok(control) => self.handle_control(control).await,
                Err(e) => {
                    tracing::debug!(producer = self.producer, error = %e, "Invalid control message");
                    self.reply(Notification::error("invalid-message", e.to_string()));
                }
            },
            Message::Binary(data) => self.handle_audio(Bytes::from(data)).await,
            Message::Close(_) => return false,
            _ => {}
        }
        true
    }

    async fn handle_control(&mut self, control: ControlMessage) {
        match control {
            ControlMessage::StartStream(start) => {
                let notifier = self.notify_tx.clone();
                match self.registry.start(self.producer, start, notifier).await {
                    Ok(session_id) => {
                        self.no_session_reported = false;
                        tracing::debug!(producer = self.producer, session_id = session_id, "Start accepted");
                    }
                    Err(e) => self.reply(Notification::error(e.code(), e.to_string())),
                }
            }
            ControlMessage::Metadata { title, artist } => {
                if let Err(e) = self
                    .registry
                    .update_metadata(self.producer, title, artist)
                    .await
                {
                    self.report_no_session(e);
                }
            }
            ControlMessage::StopStream => {
                if self.registry.stop(self.producer).await.is_none() {
                    tracing::debug!(producer = self.producer, "Stop without a session");
                }
            }
            ControlMessage::Ping => self.reply(Notification::Pong),
        }
    }

    async fn handle_audio(&mut self, chunk: Bytes) {
        if let Err(e) = self.registry.send_audio(self.producer, chunk).await {
            self.report_no_session(e);
        }
    }

    /// Report a missing session once, not once per chunk
    fn report_no_session(&mut self, err: RegistryError) {
        if !self.no_session_reported {
            self.no_session_reported = true;
            self.reply(Notification::error(err.code(), err.to_string()));
        }
    }

    fn reply(&self, notification: Notification) {
        // The receiver lives in `self`, so this cannot fail while we run.
        let _ = self.notify_tx.send(notification);
    }
}

async fn send<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    notification: &Notification,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = notification.to_json()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
