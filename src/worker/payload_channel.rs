//! Payload channel with the worker process.
//!
//! Framing is the same 32-bit little-endian length prefix as the control channel, except every
//! message comprises two contiguous segments: a JSON header and an opaque binary payload
//! (possibly empty). Used for direct RTP/RTCP injection and SCTP data messages.

use crate::messages::{PayloadNotification, Request};
use crate::worker::channel::{request_timeout, RequestError};
use crate::worker::common::{EventHandlers, SubscriptionTarget};
use crate::worker::SubscriptionHandler;
use async_executor::Executor;
use async_fs::File;
use bytes::Bytes;
use futures_lite::io::BufReader;
use futures_lite::{future, AsyncReadExt, AsyncWriteExt};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

const PAYLOAD_MAX_LEN: usize = 4_194_304;
const SEND_QUEUE_CAPACITY: usize = 1000;

/// Error produced by a notification sent to the worker.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NotificationError {
    /// The channel is already closed.
    #[error("Channel already closed")]
    ChannelClosed,
    /// The payload exceeds the maximum frame size.
    #[error("Payload is too long")]
    PayloadTooLong,
}

/// A worker notification together with its binary payload.
#[derive(Debug, Clone)]
pub(crate) struct NotificationMessage {
    pub(crate) message: Value,
    pub(crate) payload: Bytes,
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
enum PayloadChannelReceiveMessage {
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

fn fail_pending_requests(requests_container: &Mutex<RequestsContainer>) {
    let handlers = std::mem::take(&mut requests_container.lock().handlers);
    drop(handlers);
}

struct Inner {
    sender: async_channel::Sender<(Vec<u8>, Vec<u8>)>,
    requests_container: Arc<Mutex<RequestsContainer>>,
    event_handlers: EventHandlers<NotificationMessage>,
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
pub(crate) struct PayloadChannel {
    inner: Arc<Inner>,
}

impl PayloadChannel {
    pub(super) fn new(
        executor: &Arc<Executor<'static>>,
        reader: File,
        writer: File,
        pid: u32,
    ) -> Self {
        let requests_container = Arc::<Mutex<RequestsContainer>>::default();
        let event_handlers = EventHandlers::<NotificationMessage>::new();
        let closed = Arc::new(AtomicBool::new(false));

        {
            let requests_container_weak = Arc::downgrade(&requests_container);
            let event_handlers = event_handlers.clone();
            let closed = Arc::clone(&closed);

            executor
                .spawn(async move {
                    let result =
                        read_loop(reader, &requests_container_weak, &event_handlers).await;

                    if let Err(error) = result {
                        if !closed.load(Ordering::SeqCst) {
                            warn!("payload channel read failed [pid:{}]: {}", pid, error);
                        }
                    }

                    if let Some(requests_container) = requests_container_weak.upgrade() {
                        fail_pending_requests(&requests_container);
                    }
                })
                .detach();
        }

        let sender = {
            let (sender, receiver) = async_channel::bounded::<(Vec<u8>, Vec<u8>)>(SEND_QUEUE_CAPACITY);

            executor
                .spawn(async move {
                    let mut writer = writer;
                    let mut frame = Vec::with_capacity(PAYLOAD_MAX_LEN / 16);
                    while let Ok((message, payload)) = receiver.recv().await {
                        frame.clear();
                        frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
                        frame.extend_from_slice(&message);
                        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                        frame.extend_from_slice(&payload);

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

    pub(crate) async fn request<R>(
        &self,
        request: R,
        payload: Bytes,
    ) -> Result<R::Response, RequestError>
    where
        R: Request,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RequestError::ChannelClosed);
        }
        if payload.len() > PAYLOAD_MAX_LEN {
            return Err(RequestError::FailedToParse {
                error: "payload is too long".to_string(),
            });
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

        if self
            .inner
            .sender
            .send((serialized_message, payload.to_vec()))
            .await
            .is_err()
        {
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
            Ok(data) => data,
            Err(ResponseError { error, reason }) => {
                return Err(RequestError::Response { error, reason });
            }
        };

        serde_json::from_value(data.unwrap_or_default()).map_err(|error| {
            RequestError::FailedToParse {
                error: error.to_string(),
            }
        })
    }

    /// Send a one-way message with a binary payload, expecting no response.
    pub(crate) async fn notify<N>(
        &self,
        notification: N,
        payload: Bytes,
    ) -> Result<(), NotificationError>
    where
        N: PayloadNotification,
    {
        debug!("notify() [event:{}]", notification.as_event());

        if payload.len() > PAYLOAD_MAX_LEN {
            return Err(NotificationError::PayloadTooLong);
        }

        #[derive(Debug, Serialize)]
        struct NotificationMessagePrivate<'a, N: Serialize> {
            event: &'static str,
            #[serde(flatten)]
            notification: &'a N,
        }

        let serialized_message = serde_json::to_vec(&NotificationMessagePrivate {
            event: notification.as_event(),
            notification: &notification,
        })
        .unwrap();

        self.inner
            .sender
            .send((serialized_message, payload.to_vec()))
            .await
            .map_err(|_| NotificationError::ChannelClosed)
    }

    pub(crate) fn subscribe_to_notifications<F>(
        &self,
        target_id: SubscriptionTarget,
        callback: F,
    ) -> SubscriptionHandler
    where
        F: Fn(&NotificationMessage) + Send + Sync + 'static,
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
    requests_container_weak: &Weak<Mutex<RequestsContainer>>,
    event_handlers: &EventHandlers<NotificationMessage>,
) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut len_bytes = [0_u8; 4];
    let mut message_bytes = vec![0_u8; PAYLOAD_MAX_LEN];
    let mut payload_bytes = vec![0_u8; PAYLOAD_MAX_LEN];

    loop {
        if reader.read_exact(&mut len_bytes).await.is_err() {
            break;
        }
        let message_len = u32::from_le_bytes(len_bytes) as usize;
        if message_len == 0 || message_len > PAYLOAD_MAX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid header length {message_len}"),
            ));
        }
        reader.read_exact(&mut message_bytes[..message_len]).await?;

        reader.read_exact(&mut len_bytes).await?;
        let payload_len = u32::from_le_bytes(len_bytes) as usize;
        if payload_len > PAYLOAD_MAX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid payload length {payload_len}"),
            ));
        }
        reader.read_exact(&mut payload_bytes[..payload_len]).await?;

        let message =
            match serde_json::from_slice::<PayloadChannelReceiveMessage>(
                &message_bytes[..message_len],
            ) {
                Ok(message) => message,
                Err(error) => {
                    warn!("received unparseable message: {}", error);
                    continue;
                }
            };

        match message {
            PayloadChannelReceiveMessage::ResponseSuccess { id, data, .. } => {
                let requests_container = match requests_container_weak.upgrade() {
                    Some(requests_container) => requests_container,
                    None => break,
                };
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
            PayloadChannelReceiveMessage::ResponseError { id, error, reason } => {
                let requests_container = match requests_container_weak.upgrade() {
                    Some(requests_container) => requests_container,
                    None => break,
                };
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
            PayloadChannelReceiveMessage::Notification(notification) => {
                let target_id = notification.get("targetId").and_then(|value| {
                    value
                        .as_str()
                        .and_then(|id| id.parse().ok().map(SubscriptionTarget::Uuid))
                        .or_else(|| value.as_u64().map(SubscriptionTarget::Number))
                });

                match target_id {
                    Some(target_id) => {
                        let notification_message = NotificationMessage {
                            message: notification,
                            payload: Bytes::copy_from_slice(&payload_bytes[..payload_len]),
                        };
                        event_handlers
                            .call_callbacks_with_value(&target_id, &notification_message);
                    }
                    None => {
                        warn!("received notification without target id: {}", notification);
                    }
                }
            }
        }
    }

    Ok(())
}
