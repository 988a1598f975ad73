//! One live TCP connection and its codec-driven I/O loops.
//!
//! A started socket runs three tasks: the receive loop (frames in, bus
//! events out), the send loop (queued frames out), and a coordination task
//! that publishes connect/disconnect and runs the owner's close callback
//! once both loops are gone. The loops are restarted if they panic; a
//! deliberate exit (close, I/O error, bad frame) ends them for good.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use tessera_core::events::{payload, EventBus};
use tessera_core::routine;
use tessera_protocol::{decode_frame, decode_messages, encode, Message, ProtocolError};
use tessera_telemetry::MetricsRecorder;

use crate::events::{
    message_channel, socket_channel, SocketConnected, SocketDisconnected, SocketMessage,
    SocketMessageReceived, SocketPayload,
};
use crate::{SocketError, SocketIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Open,
    Closing,
    Closed,
}

/// Connection halves and the queue consumer, handed to the loops on start.
struct Io {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    queue: mpsc::Receiver<Bytes>,
}

pub struct Socket {
    index: SocketIndex,
    peer: SocketAddr,
    state: Mutex<SocketState>,
    /// Dropped on close so later sends fail fast.
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    cancel: watch::Sender<bool>,
    /// Set when the coordination task ends, however it ends.
    finished: watch::Sender<bool>,
    io: Mutex<Option<Io>>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsRecorder>,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("index", &self.index)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Socket {
    /// Wraps a connected stream. Nothing runs until [`start`](Self::start);
    /// sends issued before that are queued up to `queue_capacity`.
    pub fn new(
        index: SocketIndex,
        stream: TcpStream,
        peer: SocketAddr,
        queue_capacity: usize,
        events: Arc<EventBus>,
        metrics: Arc<MetricsRecorder>,
    ) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        let (sender, queue) = mpsc::channel(queue_capacity.max(1));
        let (cancel, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);

        metrics.socket_opened();

        Arc::new(Self {
            index,
            peer,
            state: Mutex::new(SocketState::Open),
            sender: Mutex::new(Some(sender)),
            cancel,
            finished,
            io: Mutex::new(Some(Io {
                reader,
                writer,
                queue,
            })),
            events,
            metrics,
        })
    }

    pub fn index(&self) -> SocketIndex {
        self.index
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SocketState {
        *self.state.lock()
    }

    /// Launches the loops. `on_closed` runs once both loops have exited,
    /// before the disconnected event is published.
    pub fn start<F>(self: &Arc<Self>, on_closed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(Io {
            reader,
            writer,
            queue,
        }) = self.io.lock().take()
        else {
            warn!(socket = self.index, "Socket already started");
            return;
        };

        let socket = self.clone();
        routine::spawn(format!("socket-{}", self.index), async move {
            let _finished = MarkFinished(socket.clone());
            let channel = socket_channel(socket.index);
            let socket_payload = [payload(SocketPayload {
                socket_index: socket.index,
            })];

            // Published before the loops exist so it precedes every message
            // event. Listeners run in their own task: a panic there is
            // reported and the socket carries on.
            let connected = {
                let events = socket.events.clone();
                let channel = channel.clone();
                let socket_payload = socket_payload.clone();
                routine::spawn(format!("socket-{}-connected", socket.index), async move {
                    events.invoke_channel::<SocketConnected>(&[channel.as_str()], &socket_payload);
                    Ok::<(), SocketError>(())
                })
            };
            let _ = connected.await;

            let receive = {
                let socket = socket.clone();
                let reader = Arc::new(AsyncMutex::new(reader));
                routine::spawn_with_restart(format!("socket-{}-receive", socket.index), move || {
                    socket.clone().receive_loop(reader.clone())
                })
            };
            let send = {
                let socket = socket.clone();
                let io = Arc::new(AsyncMutex::new((writer, queue)));
                routine::spawn_with_restart(format!("socket-{}-send", socket.index), move || {
                    socket.clone().send_loop(io.clone())
                })
            };

            let _ = receive.await;
            let _ = send.await;

            info!(socket = socket.index, peer = %socket.peer, "Socket end");
            on_closed();
            *socket.state.lock() = SocketState::Closed;
            socket.metrics.socket_closed();

            socket
                .events
                .invoke_channel::<SocketDisconnected>(&[channel.as_str()], &socket_payload);
            Ok::<(), SocketError>(())
        });
    }

    /// Resolves once the socket's loops are gone and its disconnected event
    /// has been published.
    pub async fn closed(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Queues one message with no correlation ids.
    pub async fn send(&self, message_id: i32, data: impl Into<Bytes>) -> Result<(), SocketError> {
        self.send_message(Message::new(message_id, data)).await
    }

    /// Encodes `message` into its own frame and queues it. Waits while the
    /// queue is full; fails with [`SocketError::Closed`] once the socket is
    /// closing.
    pub async fn send_message(&self, message: Message) -> Result<(), SocketError> {
        let frame = encode(std::slice::from_ref(&message))?;
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(SocketError::Closed(self.index))?;

        let size = frame.len();
        sender
            .send(frame)
            .await
            .map_err(|_| SocketError::Closed(self.index))?;

        debug!(
            socket = self.index,
            message_id = message.message_id,
            size,
            "Message queued"
        );
        Ok(())
    }

    /// Starts closing. Returns `false` if the socket was already closing.
    ///
    /// Both loops observe the cancellation and exit; a write already in
    /// flight finishes first.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != SocketState::Open {
                return false;
            }
            *state = SocketState::Closing;
        }
        self.sender.lock().take();
        self.cancel.send_replace(true);
        info!(socket = self.index, "Socket closing");
        true
    }

    async fn receive_loop(
        self: Arc<Self>,
        reader: Arc<AsyncMutex<OwnedReadHalf>>,
    ) -> Result<(), SocketError> {
        let mut reader = reader.lock().await;
        let mut cancel = self.cancel.subscribe();

        loop {
            let frame = tokio::select! {
                _ = cancelled(&mut cancel) => break,
                frame = decode_frame(&mut *reader) => frame,
            };

            match frame {
                Ok(frame) => {
                    self.metrics.frame_received(frame.len());
                    self.dispatch(frame);
                }
                Err(e) => {
                    if matches!(e, ProtocolError::InvalidFrameSize(_)) {
                        self.metrics.frames_rejected.inc();
                        warn!(socket = self.index, error = %e, "Rejecting frame");
                    } else if e.is_disconnect() {
                        debug!(socket = self.index, "Peer disconnected");
                    } else {
                        warn!(socket = self.index, error = %e, "Receive failed");
                    }
                    break;
                }
            }
        }

        self.close();
        Ok(())
    }

    /// Publishes every message in `frame`. A frame whose messages don't
    /// decode is skipped; the connection stays up.
    fn dispatch(&self, frame: Bytes) {
        let messages = match decode_messages(frame) {
            Ok(messages) => messages,
            Err(e) => {
                self.metrics.messages_skipped.inc();
                warn!(socket = self.index, error = %e, "Skipping malformed frame");
                return;
            }
        };

        let socket_channel = socket_channel(self.index);
        for message in messages {
            let id_channel = message_channel(message.message_id);
            let message_id = message.message_id;
            let event_payload = [payload(SocketMessage {
                socket_index: self.index,
                message,
            })];
            let notified = self.events.invoke_channel::<SocketMessageReceived>(
                &[socket_channel.as_str(), id_channel.as_str()],
                &event_payload,
            );
            self.metrics.messages_dispatched.inc();
            debug!(socket = self.index, message_id, notified, "Message dispatched");
        }
    }

    async fn send_loop(
        self: Arc<Self>,
        io: Arc<AsyncMutex<(OwnedWriteHalf, mpsc::Receiver<Bytes>)>>,
    ) -> Result<(), SocketError> {
        let mut io = io.lock().await;
        let (writer, queue) = &mut *io;
        let mut cancel = self.cancel.subscribe();

        loop {
            let frame = tokio::select! {
                _ = cancelled(&mut cancel) => break,
                frame = queue.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if let Err(e) = writer.write_all(&frame).await {
                warn!(socket = self.index, error = %e, "Send failed");
                break;
            }
            self.metrics.frames_sent.inc();
        }

        let _ = writer.shutdown().await;
        self.close();
        Ok(())
    }
}

struct MarkFinished(Arc<Socket>);

impl Drop for MarkFinished {
    fn drop(&mut self) {
        self.0.finished.send_replace(true);
    }
}

/// Resolves once the cancel flag is set or its sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let set = *cancel.borrow_and_update();
        if set || cancel.changed().await.is_err() {
            return;
        }
    }
}
