//! A data consumer represents an endpoint receiving data messages from a router, either over
//! SCTP or directly into the application via a direct transport.

use crate::data_structures::{AppData, WebRtcMessage};
use crate::data_producer::DataProducerId;
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    DataConsumerCloseRequest, DataConsumerDumpRequest, DataConsumerGetBufferedAmountRequest,
    DataConsumerGetStatsRequest, DataConsumerInternal,
    DataConsumerSetBufferedAmountLowThresholdData,
    DataConsumerSetBufferedAmountLowThresholdRequest,
};
use crate::sctp_parameters::SctpStreamParameters;
use crate::transport::Transport;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// [`DataConsumer`] identifier.
    DataConsumerId
);

/// Data consumer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataConsumerType {
    /// Messages are delivered over an SCTP association.
    Sctp,
    /// Messages are delivered directly to the application over the payload channel.
    Direct,
}

/// [`DataConsumer`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataConsumerOptions {
    /// The id of the data producer to consume.
    pub(super) data_producer_id: DataProducerId,
    /// Override the reliability of the resulting SCTP stream.
    pub(super) ordered: Option<bool>,
    pub(super) max_packet_life_time: Option<u16>,
    pub(super) max_retransmits: Option<u16>,
    /// Custom application data.
    pub app_data: AppData,
}

impl DataConsumerOptions {
    /// Inherits the reliability settings of the data producer.
    #[must_use]
    pub fn new_sctp(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: None,
            max_packet_life_time: None,
            max_retransmits: None,
            app_data: AppData::default(),
        }
    }

    /// Messages will be delivered reliably in order.
    #[must_use]
    pub fn new_sctp_ordered(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: Some(true),
            max_packet_life_time: None,
            max_retransmits: None,
            app_data: AppData::default(),
        }
    }

    /// Messages will be delivered unreliably with a bounded packet lifetime (in milliseconds).
    #[must_use]
    pub fn new_sctp_unordered_with_life_time(
        data_producer_id: DataProducerId,
        max_packet_life_time: u16,
    ) -> Self {
        Self {
            data_producer_id,
            ordered: Some(false),
            max_packet_life_time: Some(max_packet_life_time),
            max_retransmits: None,
            app_data: AppData::default(),
        }
    }

    /// Messages will be delivered unreliably with a bounded number of retransmissions.
    #[must_use]
    pub fn new_sctp_unordered_with_retransmits(
        data_producer_id: DataProducerId,
        max_retransmits: u16,
    ) -> Self {
        Self {
            data_producer_id,
            ordered: Some(false),
            max_packet_life_time: None,
            max_retransmits: Some(max_retransmits),
            app_data: AppData::default(),
        }
    }

    /// For data consumers on direct transports where the application receives messages itself.
    #[must_use]
    pub fn new_direct(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: None,
            max_packet_life_time: None,
            max_retransmits: None,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct DataConsumerDump {
    pub id: DataConsumerId,
    pub data_producer_id: DataProducerId,
    pub r#type: DataConsumerType,
    pub label: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_stream_parameters: Option<SctpStreamParameters>,
    #[serde(default)]
    pub buffered_amount: u32,
    #[serde(default)]
    pub buffered_amount_low_threshold: u32,
}

/// RTC statistics of the data consumer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
#[allow(missing_docs)]
pub struct DataConsumerStat {
    pub r#type: String,
    pub timestamp: u64,
    pub label: String,
    pub protocol: String,
    pub messages_sent: usize,
    pub bytes_sent: usize,
    #[serde(default)]
    pub buffered_amount: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    DataProducerClose,
    SctpSendBufferFull,
    #[serde(rename_all = "camelCase")]
    BufferedAmountLow {
        buffered_amount: u32,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum PayloadNotification {
    #[serde(rename_all = "camelCase")]
    Message { ppid: u32 },
}

#[derive(Default)]
struct Handlers {
    message: Bag<dyn Fn(&WebRtcMessage) + Send + Sync>,
    sctp_send_buffer_full: Bag<dyn Fn() + Send + Sync>,
    buffered_amount_low: Bag<dyn Fn(u32) + Send + Sync>,
    data_producer_close: BagOnce<dyn FnOnce() + Send>,
    transport_close: BagOnce<dyn FnOnce() + Send>,
    close: BagOnce<dyn FnOnce() + Send>,
}

struct Inner {
    id: DataConsumerId,
    data_producer_id: DataProducerId,
    r#type: DataConsumerType,
    sctp_stream_parameters: Option<SctpStreamParameters>,
    label: String,
    protocol: String,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    handlers: Arc<Handlers>,
    app_data: AppData,
    transport: Arc<dyn Transport>,
    closed: Arc<AtomicBool>,
    _subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _payload_subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _on_transport_close_handler: Mutex<HandlerId>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close(true);
    }
}

impl Inner {
    fn close(&self, close_request: bool) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.handlers.close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = DataConsumerCloseRequest {
                    internal: DataConsumerInternal {
                        router_id: self.transport.router().id(),
                        transport_id: self.transport.id(),
                        data_producer_id: self.data_producer_id,
                        data_consumer_id: self.id,
                    },
                };

                self.executor
                    .spawn(async move {
                        if let Err(error) = channel.request(request).await {
                            error!("data consumer closing failed: {}", error);
                        }
                    })
                    .detach();
            }
        }
    }
}

/// The handle to a data stream forwarded by the router toward an endpoint.
#[derive(Clone)]
#[must_use = "Data consumer will be closed on drop, make sure to keep it around for as long as needed"]
pub struct DataConsumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConsumer")
            .field("id", &self.inner.id)
            .field("data_producer_id", &self.inner.data_producer_id)
            .field("type", &self.inner.r#type)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl DataConsumer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: DataConsumerId,
        r#type: DataConsumerType,
        sctp_stream_parameters: Option<SctpStreamParameters>,
        label: String,
        protocol: String,
        data_producer_id: DataProducerId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        transport: Arc<dyn Transport>,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let closed = Arc::new(AtomicBool::new(false));

        let subscription_handler = channel.subscribe_to_notifications(id.into(), {
            let handlers = Arc::clone(&handlers);
            let closed = Arc::clone(&closed);

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(notification) => match notification {
                        Notification::DataProducerClose => {
                            if !closed.swap(true, Ordering::SeqCst) {
                                handlers.data_producer_close.call_simple();
                                handlers.close.call_simple();
                            }
                        }
                        Notification::SctpSendBufferFull => {
                            handlers.sctp_send_buffer_full.call_simple();
                        }
                        Notification::BufferedAmountLow { buffered_amount } => {
                            handlers.buffered_amount_low.call(|callback| {
                                callback(buffered_amount);
                            });
                        }
                    },
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            }
        });

        let payload_subscription_handler = payload_channel.subscribe_to_notifications(id.into(), {
            let handlers = Arc::clone(&handlers);
            let closed = Arc::clone(&closed);

            move |notification_message| {
                match serde_json::from_value::<PayloadNotification>(
                    notification_message.message.clone(),
                ) {
                    Ok(PayloadNotification::Message { ppid }) => {
                        if closed.load(Ordering::SeqCst) {
                            return;
                        }
                        match WebRtcMessage::new(ppid, notification_message.payload.clone()) {
                            Ok(message) => {
                                handlers.message.call(|callback| {
                                    callback(&message);
                                });
                            }
                            Err(unsupported_ppid) => {
                                warn!("dropping data message: {}", unsupported_ppid);
                            }
                        }
                    }
                    Err(error) => {
                        error!("Failed to parse payload notification: {}", error);
                    }
                }
            }
        });

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();
        let on_transport_close_handler = transport.on_close({
            let inner_weak = Arc::clone(&inner_weak);

            Box::new(move || {
                let maybe_inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                if let Some(inner) = maybe_inner {
                    inner.handlers.transport_close.call_simple();
                    inner.close(false);
                }
            })
        });

        let inner = Arc::new(Inner {
            id,
            data_producer_id,
            r#type,
            sctp_stream_parameters,
            label,
            protocol,
            executor,
            channel,
            handlers,
            app_data,
            transport,
            closed,
            _subscription_handler: Mutex::new(Some(subscription_handler)),
            _payload_subscription_handler: Mutex::new(Some(payload_subscription_handler)),
            _on_transport_close_handler: Mutex::new(on_transport_close_handler),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Data consumer identifier.
    #[must_use]
    pub fn id(&self) -> DataConsumerId {
        self.inner.id
    }

    /// The id of the data producer being consumed.
    #[must_use]
    pub fn data_producer_id(&self) -> DataProducerId {
        self.inner.data_producer_id
    }

    /// Transport the data consumer belongs to.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Data consumer type.
    #[must_use]
    pub fn r#type(&self) -> DataConsumerType {
        self.inner.r#type
    }

    /// SCTP stream parameters; unset for data consumers on direct transports.
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> Option<SctpStreamParameters> {
        self.inner.sctp_stream_parameters
    }

    /// The label of the data channel.
    #[must_use]
    pub fn label(&self) -> &String {
        &self.inner.label
    }

    /// The sub-protocol of the data channel.
    #[must_use]
    pub fn protocol(&self) -> &String {
        &self.inner.protocol
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the data consumer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump the data consumer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<DataConsumerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(DataConsumerDumpRequest {
                internal: self.get_internal(),
            })
            .await
    }

    /// Returns current statistics of the data consumer.
    pub async fn get_stats(&self) -> Result<Vec<DataConsumerStat>, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(DataConsumerGetStatsRequest {
                internal: self.get_internal(),
            })
            .await
    }

    /// The number of bytes of data currently buffered to be sent over the underlying SCTP
    /// stream.
    pub async fn get_buffered_amount(&self) -> Result<u32, RequestError> {
        debug!("get_buffered_amount()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .channel
            .request(DataConsumerGetBufferedAmountRequest {
                internal: self.get_internal(),
            })
            .await?;

        Ok(response.buffered_amount)
    }

    /// Set the threshold at which a `bufferedamountlow` notification is emitted once the
    /// buffered amount drops to or below it.
    pub async fn set_buffered_amount_low_threshold(
        &self,
        threshold: u32,
    ) -> Result<(), RequestError> {
        debug!("set_buffered_amount_low_threshold() [threshold:{}]", threshold);

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(DataConsumerSetBufferedAmountLowThresholdRequest {
                internal: self.get_internal(),
                data: DataConsumerSetBufferedAmountLowThresholdData { threshold },
            })
            .await
    }

    /// Callback is called on data consumers of a direct transport when a message arrives.
    pub fn on_message<F: Fn(&WebRtcMessage) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.message.add(Arc::new(callback))
    }

    /// Callback is called when a message could not be sent because the SCTP send buffer was
    /// full.
    pub fn on_sctp_send_buffer_full<F: Fn() + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .sctp_send_buffer_full
            .add(Arc::new(callback))
    }

    /// Callback is called when the buffered amount drops to or below the configured threshold.
    pub fn on_buffered_amount_low<F: Fn(u32) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .buffered_amount_low
            .add(Arc::new(callback))
    }

    /// Callback is called when the associated data producer is closed for whatever reason. The
    /// data consumer itself is also closed.
    pub fn on_data_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner
            .handlers
            .data_producer_close
            .add(Box::new(callback))
    }

    /// Callback is called when the transport this data consumer belongs to is closed for
    /// whatever reason. The data consumer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Callback is called when the data consumer is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.close.add(Box::new(callback))
    }

    /// Close the data consumer. Idempotent.
    pub fn close(&self) {
        self.inner.close(true);
    }

    /// Downgrade to a [`WeakDataConsumer`] that does not prevent closing on drop.
    #[must_use]
    pub fn downgrade(&self) -> WeakDataConsumer {
        WeakDataConsumer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn get_internal(&self) -> DataConsumerInternal {
        DataConsumerInternal {
            router_id: self.inner.transport.router().id(),
            transport_id: self.inner.transport.id(),
            data_producer_id: self.inner.data_producer_id,
            data_consumer_id: self.inner.id,
        }
    }
}

/// [`WeakDataConsumer`] doesn't keep the data consumer alive on the worker and will not prevent
/// it from being closed once the last [`DataConsumer`] instance is dropped.
#[derive(Clone)]
pub struct WeakDataConsumer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakDataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDataConsumer").finish()
    }
}

impl WeakDataConsumer {
    /// Attempts to upgrade to a [`DataConsumer`] if the last instance was not dropped yet.
    #[must_use]
    pub fn upgrade(&self) -> Option<DataConsumer> {
        let inner = self.inner.upgrade()?;

        Some(DataConsumer { inner })
    }
}
