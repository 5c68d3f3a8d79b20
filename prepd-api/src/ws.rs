//! The chat WebSocket connection.
//!
//! The backend pushes chat events over a single socket at
//! `/student/ws?token=<bearer>`. Frames in both directions are JSON
//! envelopes tagged by `type`.
//!
//! There is deliberately no reconnection policy here: when the socket
//! closes, the event stream yields [`WsEvent::Closed`] and ends, and the
//! consumer (the chat sync task) falls back to REST polling.

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use prepd_api_core::types::{
    chat::{Message, MessageRequest},
    user::UserId,
};
use prepd_tokio::task::PdTask;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::warn;

const WS_CHANNEL_SIZE: usize = 64;

/// Events yielded to the consumer of a [`WsEvents`] stream.
#[derive(Clone, Debug, PartialEq)]
pub enum WsEvent {
    /// A chat message pushed by the server.
    Message(Message),
    /// A new message request pushed by the server.
    MessageRequest(MessageRequest),
    /// The connection closed. No more events will arrive; the consumer
    /// should fall back to polling.
    Closed,
}

/// Frames the server pushes to us.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Message { message: Message },
    MessageRequest { request: MessageRequest },
}

/// Frames we send to the server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Mark all messages from `peer` as read.
    MarkRead { peer: UserId },
}

impl From<ServerFrame> for WsEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Message { message } => Self::Message(message),
            ServerFrame::MessageRequest { request } =>
                Self::MessageRequest(request),
        }
    }
}

/// The sending half of the socket. Dropping the handle tears the connection
/// down.
pub struct WsHandle {
    frame_tx: mpsc::Sender<ClientFrame>,
    reader_task: PdTask<()>,
    _writer_task: PdTask<()>,
}

/// The receiving half of the socket.
pub struct WsEvents(mpsc::Receiver<WsEvent>);

/// Build a [`WsEvents`] from any event source, e.g. a stub in tests.
impl From<mpsc::Receiver<WsEvent>> for WsEvents {
    fn from(rx: mpsc::Receiver<WsEvent>) -> Self {
        Self(rx)
    }
}

impl WsHandle {
    /// Queue a frame for sending. Frames are dropped (with a warning) if the
    /// socket's send queue is full or the connection is gone.
    pub fn send(&self, frame: ClientFrame) {
        if let Err(err) = self.frame_tx.try_send(frame) {
            warn!("ws: dropping outbound frame: {err}");
        }
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        // The writer task ends on its own once `frame_tx` drops; the reader
        // is parked on the socket and must be aborted.
        self.reader_task.abort();
    }
}

impl WsEvents {
    /// Receive the next event. Returns `None` after [`WsEvent::Closed`] has
    /// been yielded (or the handle was dropped).
    pub async fn recv(&mut self) -> Option<WsEvent> {
        self.0.recv().await
    }
}

/// Connect to the chat socket, authenticating with a bearer token.
///
/// `ws_base_url` is the gateway base with a `ws`/`wss` scheme, e.g.
/// `wss://gateway.prepd.app`.
pub async fn connect(
    ws_base_url: &str,
    token: &str,
) -> anyhow::Result<(WsHandle, WsEvents)> {
    let url = format!("{ws_base_url}/student/ws?token={token}");
    let (stream, _resp) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .context("Failed to connect chat WebSocket")?;
    let (mut sink, mut stream) = stream.split();

    let (event_tx, event_rx) = mpsc::channel(WS_CHANNEL_SIZE);
    let (frame_tx, mut frame_rx) = mpsc::channel(WS_CHANNEL_SIZE);

    let reader_task = PdTask::spawn("ws_reader", async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(tungstenite::Message::Text(text)) =>
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if event_tx
                                .send(WsEvent::from(frame))
                                .await
                                .is_err()
                            {
                                // Consumer is gone.
                                return;
                            }
                        }
                        // Skip frames from newer servers we don't understand.
                        Err(err) =>
                            warn!("ws: unrecognized server frame: {err:#}"),
                    },
                Ok(tungstenite::Message::Close(_)) => break,
                // tungstenite answers pings internally.
                Ok(_) => (),
                Err(err) => {
                    warn!("ws: stream error: {err:#}");
                    break;
                }
            }
        }
        let _ = event_tx.send(WsEvent::Closed).await;
    });

    let writer_task = PdTask::spawn("ws_writer", async move {
        while let Some(frame) = frame_rx.recv().await {
            let text = serde_json::to_string(&frame)
                .expect("Failed to serialize ws frame");
            if let Err(err) =
                sink.send(tungstenite::Message::Text(text)).await
            {
                warn!("ws: failed to send frame: {err:#}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let handle = WsHandle {
        frame_tx,
        reader_task,
        _writer_task: writer_task,
    };
    Ok((handle, WsEvents(event_rx)))
}

#[cfg(test)]
mod test {
    use prepd_api_core::types::{chat::MessageKind, time::TimestampMs};

    use super::*;

    fn dummy_message(id: i64) -> Message {
        Message {
            id: prepd_api_core::types::chat::MessageId(id),
            kind: MessageKind::Text,
            content: format!("hello {id}"),
            read: false,
            sender: UserId(1),
            receiver: UserId(2),
            sent_at: TimestampMs::MIN,
        }
    }

    #[test]
    fn frame_wire_format() {
        let json = serde_json::to_string(&ServerFrame::Message {
            message: dummy_message(7),
        })
        .unwrap();
        assert!(json.starts_with(r#"{"type":"message""#), "{json}");

        let frame = serde_json::from_str::<ServerFrame>(&json).unwrap();
        assert!(matches!(frame, ServerFrame::Message { .. }));

        let json =
            serde_json::to_string(&ClientFrame::MarkRead { peer: UserId(3) })
                .unwrap();
        assert_eq!(json, r#"{"type":"mark_read","peer":3}"#);
    }

    /// Loopback test: a local server accepts the socket, pushes one message,
    /// then closes; the client should yield the message and then `Closed`.
    #[tokio::test]
    async fn loopback_push_then_close() {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = PdTask::spawn("test_ws_server", async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let frame = ServerFrame::Message {
                message: dummy_message(42),
            };
            let text = serde_json::to_string(&frame).unwrap();
            ws.send(tungstenite::Message::Text(text)).await.unwrap();

            // Expect the client's mark_read frame back.
            let frame = loop {
                match ws.next().await.unwrap().unwrap() {
                    tungstenite::Message::Text(text) => break text,
                    _ => continue,
                }
            };
            let frame = serde_json::from_str::<ClientFrame>(&frame).unwrap();
            assert!(matches!(
                frame,
                ClientFrame::MarkRead { peer: UserId(1) }
            ));

            ws.close(None).await.unwrap();
        });

        let (handle, mut events) =
            connect(&format!("ws://{addr}"), "test-token").await.unwrap();

        let event = events.recv().await.unwrap();
        match event {
            WsEvent::Message(message) => {
                assert_eq!(message.content, "hello 42")
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.send(ClientFrame::MarkRead { peer: UserId(1) });

        assert_eq!(events.recv().await, Some(WsEvent::Closed));

        server.await.unwrap();
    }
}
