//! Control channel with the worker process.
//!
//! Each frame is a 32-bit little-endian length prefix followed by the UTF-8 body. Bodies
//! starting with `{` are JSON messages (responses and notifications); bodies starting with `D`,
//! `W`, `E` or `X` are worker log lines forwarded to the logger.

use crate::messages::Request;
use crate::worker::common::{EventHandlers, SubscriptionTarget};
use crate::worker::SubscriptionHandler;
use async_executor::Executor;
use async_fs::File;
use futures_lite::io::BufReader;
use futures_lite::{future, AsyncReadExt, AsyncWriteExt};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

const MESSAGE_MAX_LEN: usize = 4_194_304;
// Outgoing messages waiting for the writer task; senders await when the queue is full.
const SEND_QUEUE_CAPACITY: usize = 1000;
// Request deadline: 1s plus 0.1ms per pending request squared, bounded.
const REQUEST_TIMEOUT_BASE_MS: u64 = 1_000;
const REQUEST_TIMEOUT_MAX_MS: u64 = 60_000;

/// Error produced by a request to the worker.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RequestError {
    /// The channel (or the object the request belongs to) is already closed.
    #[error("Channel already closed")]
    ChannelClosed,
    /// The request did not complete within its deadline.
    #[error("Request timed out")]
    TimedOut,
    /// The worker rejected the request.
    #[error("Worker error [{error}]: {reason}")]
    Response { error: String, reason: String },
    /// The worker accepted the request but its response could not be parsed.
    #[error("Failed to parse response: {error}")]
    FailedToParse { error: String },
}

pub(crate) fn request_timeout(pending_requests: usize) -> Duration {
    let pending_requests = pending_requests as u64;
    let timeout_ms = REQUEST_TIMEOUT_BASE_MS + pending_requests * pending_requests / 10;

    Duration::from_millis(timeout_ms.min(REQUEST_TIMEOUT_MAX_MS))
}

struct ResponseError {
    error: String,
    reason: String,
}

type Response = Result<Option<Value>, ResponseError>;

#[derive(Default)]
struct RequestsContainer {
    next_id: u32,
    handlers: HashMap<u32, async_oneshot::Sender<Response>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonReceiveMessage {
    ResponseSuccess {
        id: u32,
        #[allow(dead_code)]
        accepted: bool,
        #[serde(default)]
        data: Option<Value>,
    },
    ResponseError {
        id: u32,
        error: Value,
        reason: String,
    },
    Notification(Value),
}

fn process_json_message(
    message: &[u8],
    requests_container: &Mutex<RequestsContainer>,
    event_handlers: &EventHandlers<Value>,
) {
    let message = match serde_json::from_slice::<JsonReceiveMessage>(message) {
        Ok(message) => message,
        Err(error) => {
            warn!("received unparseable message: {}", error);
            return;
        }
    };

    match message {
        JsonReceiveMessage::ResponseSuccess { id, data, .. } => {
            let sender = requests_container.lock().handlers.remove(&id);
            if let Some(mut sender) = sender {
                let _ = sender.send(Ok(data));
            } else {
                warn!(
                    "received success response does not match any sent request [id:{}]",
                    id,
                );
            }
        }
        JsonReceiveMessage::ResponseError { id, error, reason } => {
            let sender = requests_container.lock().handlers.remove(&id);
            if let Some(mut sender) = sender {
                let _ = sender.send(Err(ResponseError {
                    error: error.as_str().unwrap_or("Error").to_string(),
                    reason,
                }));
            } else {
                warn!(
                    "received error response does not match any sent request [id:{}]",
                    id,
                );
            }
        }
        JsonReceiveMessage::Notification(notification) => {
            let target_id = notification.get("targetId").and_then(|value| {
                value
                    .as_str()
                    .and_then(|id| id.parse().ok().map(SubscriptionTarget::Uuid))
                    .or_else(|| value.as_u64().map(SubscriptionTarget::Number))
            });

            match target_id {
                Some(target_id) => {
                    event_handlers.call_callbacks_with_value(&target_id, &notification);
                }
                None => {
                    warn!("received notification without target id: {}", notification);
                }
            }
        }
    }
}

fn fail_pending_requests(requests_container: &Mutex<RequestsContainer>) {
    // Dropping the senders resolves every waiter with a channel-closed error.
    let handlers = std::mem::take(&mut requests_container.lock().handlers);
    drop(handlers);
}

struct Inner {
    sender: async_channel::Sender<Vec<u8>>,
    requests_container: Arc<Mutex<RequestsContainer>>,
    event_handlers: EventHandlers<Value>,
    closed: Arc<AtomicBool>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.sender.close();
            fail_pending_requests(&self.requests_container);
        }
    }
}

#[derive(Clone)]
pub(crate) struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    pub(super) fn new(executor: &Arc<Executor<'static>>, reader: File, writer: File, pid: u32) -> Self {
        let requests_container = Arc::<Mutex<RequestsContainer>>::default();
        let event_handlers = EventHandlers::<Value>::new();
        let closed = Arc::new(AtomicBool::new(false));

        {
            let requests_container_weak = Arc::downgrade(&requests_container);
            let event_handlers = event_handlers.clone();
            let closed = Arc::clone(&closed);

            executor
                .spawn(async move {
                    let result = read_loop(reader, pid, &requests_container_weak, &event_handlers)
                        .await;

                    if let Err(error) = result {
                        if !closed.load(Ordering::SeqCst) {
                            error!("channel read failed [pid:{}]: {}", pid, error);
                        }
                    }

                    // Whatever ended the read loop, nothing will answer pending requests
                    // anymore.
                    if let Some(requests_container) = requests_container_weak.upgrade() {
                        fail_pending_requests(&requests_container);
                    }
                })
                .detach();
        }

        let sender = {
            let (sender, receiver) = async_channel::bounded::<Vec<u8>>(SEND_QUEUE_CAPACITY);

            executor
                .spawn(async move {
                    let mut writer = writer;
                    let mut frame = Vec::with_capacity(MESSAGE_MAX_LEN / 16);
                    while let Ok(message) = receiver.recv().await {
                        frame.clear();
                        frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
                        frame.extend_from_slice(&message);

                        if writer.write_all(&frame).await.is_err() {
                            break;
                        }
                    }

                    io::Result::Ok(())
                })
                .detach();

            sender
        };

        Self {
            inner: Arc::new(Inner {
                sender,
                requests_container,
                event_handlers,
                closed,
            }),
        }
    }

    pub(crate) async fn request<R>(&self, request: R) -> Result<R::Response, RequestError>
    where
        R: Request,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RequestError::ChannelClosed);
        }

        let method = request.as_method();
        let (result_sender, result_receiver) = async_oneshot::oneshot::<Response>();

        let id;
        let pending_requests;
        {
            let mut requests_container = self.inner.requests_container.lock();

            id = requests_container.next_id;
            pending_requests = requests_container.handlers.len();

            requests_container.next_id = requests_container.next_id.wrapping_add(1);
            requests_container.handlers.insert(id, result_sender);
        }

        debug!("request() [method:{}, id:{}]", method, id);

        #[derive(Debug, Serialize)]
        struct RequestMessagePrivate<'a, R> {
            id: u32,
            method: &'static str,
            #[serde(flatten)]
            request: &'a R,
        }

        let serialized_message = serde_json::to_vec(&RequestMessagePrivate {
            id,
            method,
            request: &request,
        })
        .unwrap();

        if self.inner.sender.send(serialized_message).await.is_err() {
            self.inner.requests_container.lock().handlers.remove(&id);
            return Err(RequestError::ChannelClosed);
        }

        let result = future::or(
            async {
                result_receiver
                    .await
                    .map_err(|_| RequestError::ChannelClosed)
            },
            async {
                async_io::Timer::after(request_timeout(pending_requests)).await;

                self.inner.requests_container.lock().handlers.remove(&id);

                Err(RequestError::TimedOut)
            },
        )
        .await?;

        let data = match result {
            Ok(data) => {
                debug!("request succeeded [method:{}, id:{}]", method, id);
                data
            }
            Err(ResponseError { error, reason }) => {
                debug!("request failed [method:{}, id:{}]: {}", method, id, reason);

                return Err(RequestError::Response { error, reason });
            }
        };

        // `()` responses arrive with no data at all.
        serde_json::from_value(data.unwrap_or_default()).map_err(|error| {
            RequestError::FailedToParse {
                error: error.to_string(),
            }
        })
    }

    /// Register a listener for notifications addressed to the given target. The previous
    /// listeners on the same target keep receiving notifications as well.
    pub(crate) fn subscribe_to_notifications<F>(
        &self,
        target_id: SubscriptionTarget,
        callback: F,
    ) -> SubscriptionHandler
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .event_handlers
            .add(target_id, Box::new(callback))
    }

    /// Close the channel, cancelling every pending request. Idempotent.
    pub(crate) fn close(&self) {
        self.inner.close();
    }
}

async fn read_loop(
    reader: File,
    pid: u32,
    requests_container_weak: &Weak<Mutex<RequestsContainer>>,
    event_handlers: &EventHandlers<Value>,
) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut len_bytes = [0_u8; 4];
    let mut bytes = vec![0_u8; MESSAGE_MAX_LEN];

    loop {
        if reader.read_exact(&mut len_bytes).await.is_err() {
            // EOF, the worker went away
            break;
        }
        let length = u32::from_le_bytes(len_bytes) as usize;
        if length == 0 || length > MESSAGE_MAX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid frame length {length}"),
            ));
        }
        reader.read_exact(&mut bytes[..length]).await?;

        let payload = &bytes[..length];
        match payload[0] {
            b'{' => match requests_container_weak.upgrade() {
                Some(requests_container) => {
                    process_json_message(payload, &requests_container, event_handlers);
                }
                None => break,
            },
            b'D' => debug!("[pid:{}] {}", pid, String::from_utf8_lossy(&payload[1..])),
            b'W' => warn!("[pid:{}] {}", pid, String::from_utf8_lossy(&payload[1..])),
            b'E' => error!("[pid:{}] {}", pid, String::from_utf8_lossy(&payload[1..])),
            b'X' => trace!("[pid:{}] {}", pid, String::from_utf8_lossy(&payload[1..])),
            _ => warn!(
                "[pid:{}] unexpected data received: {}",
                pid,
                String::from_utf8_lossy(payload)
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_grows_quadratically_and_is_clamped() {
        assert_eq!(request_timeout(0), Duration::from_millis(1_000));
        assert_eq!(request_timeout(100), Duration::from_millis(2_000));
        assert_eq!(request_timeout(1_000), Duration::from_millis(60_000));
        assert_eq!(request_timeout(1_000_000), Duration::from_millis(60_000));
    }

    #[test]
    fn response_messages_deserialize() {
        assert!(matches!(
            serde_json::from_str::<JsonReceiveMessage>(r#"{"id":4,"accepted":true}"#).unwrap(),
            JsonReceiveMessage::ResponseSuccess { id: 4, data: None, .. }
        ));
        assert!(matches!(
            serde_json::from_str::<JsonReceiveMessage>(
                r#"{"id":5,"error":"TypeError","reason":"wrong settings"}"#
            )
            .unwrap(),
            JsonReceiveMessage::ResponseError { id: 5, .. }
        ));
        assert!(matches!(
            serde_json::from_str::<JsonReceiveMessage>(
                r#"{"targetId":"73bac070-d4b3-4f4e-a66f-2513b30b4b21","event":"running"}"#
            )
            .unwrap(),
            JsonReceiveMessage::Notification(_)
        ));
    }
}
