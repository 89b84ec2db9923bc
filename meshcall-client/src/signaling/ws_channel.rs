use crate::error::{ClientError, Result};
use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcall_core::SignalMessage;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket connection to the relay.
///
/// Inbound messages are delivered on the receiver returned by `connect`;
/// that receiver yields `None` once the connection is gone.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<Message>,
    send_task: Mutex<Option<JoinHandle<()>>>,
    recv_task: JoinHandle<()>,
}

impl SignalingChannel {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<SignalMessage>)> {
        let (socket, _) = connect_async(url).await?;
        debug!("Signaling channel connected to {}", url);

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SignalMessage>();

        let send_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let recv_task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping unparseable signal: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    // Pings are answered by tungstenite while reading.
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Signaling channel error: {}", e);
                        break;
                    }
                }
            }
            debug!("Signaling channel closed");
        });

        Ok((
            Self {
                outbound: out_tx,
                send_task: Mutex::new(Some(send_task)),
                recv_task,
            },
            in_rx,
        ))
    }

    /// Sends a close frame and stops reading.
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        if let Some(mut task) = self.send_task.lock().await.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut task).await.is_err() {
                debug!("Close frame was not flushed in time");
                task.abort();
            }
        }
        self.recv_task.abort();
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.recv_task.abort();
        if let Some(task) = self.send_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingChannel {
    async fn send_signal(&self, msg: SignalMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.outbound
            .send(Message::Text(json))
            .map_err(|_| ClientError::ChannelDisconnected)
    }
}
