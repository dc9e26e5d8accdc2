//! A direct transport represents a connection between the router and the application itself:
//! RTP, RTCP and data messages flow through the payload channel instead of the network.

use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions, DataConsumerType};
use crate::data_producer::{DataProducer, DataProducerOptions, DataProducerType};
use crate::data_structures::AppData;
use crate::event_handlers::{Bag, HandlerId};
use crate::messages::TransportSendRtcpNotification;
use crate::producer::{Producer, ProducerOptions};
use crate::router::transport::{TransportBase, TransportImpl, TransportType};
use crate::router::Router;
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportDump,
    TransportId, TransportStat, TransportTraceEventData, TransportTraceEventType,
};
use crate::worker::{Channel, NotificationError, PayloadChannel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// [`DirectTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DirectTransportOptions {
    /// Maximum allowed size for direct messages sent from data producers. Default 262144.
    pub max_message_size: u32,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for DirectTransportOptions {
    fn default() -> Self {
        Self {
            max_message_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Trace(TransportTraceEventData),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum PayloadNotification {
    Rtcp,
}

#[derive(Default)]
struct Handlers {
    rtcp: Bag<dyn Fn(&Bytes) + Send + Sync>,
}

struct Inner {
    base: TransportBase,
    handlers: Arc<Handlers>,
    _subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _payload_subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _on_router_close_handler: Mutex<HandlerId>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.base.close(true);
    }
}

/// Transport for endpoints that live inside the application process itself.
#[derive(Clone)]
#[must_use = "Transport will be closed on drop, make sure to keep it around for as long as needed"]
pub struct DirectTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for DirectTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectTransport")
            .field("id", &self.inner.base.id)
            .field("closed", &self.inner.base.closed)
            .finish()
    }
}

impl DirectTransport {
    pub(super) fn new(
        id: TransportId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        router: Router,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();

        let base = TransportBase::new(
            id,
            router.clone(),
            channel.clone(),
            payload_channel.clone(),
            executor,
            app_data,
            0,
        );

        let subscription_handler = channel.subscribe_to_notifications(id.into(), {
            let trace_handlers = base.handlers.trace.clone();

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(Notification::Trace(trace_event_data)) => {
                        trace_handlers.call(|callback| {
                            callback(&trace_event_data);
                        });
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            }
        });

        let payload_subscription_handler = payload_channel.subscribe_to_notifications(id.into(), {
            let handlers = Arc::clone(&handlers);

            move |notification_message| {
                match serde_json::from_value::<PayloadNotification>(
                    notification_message.message.clone(),
                ) {
                    Ok(PayloadNotification::Rtcp) => {
                        handlers.rtcp.call(|callback| {
                            callback(&notification_message.payload);
                        });
                    }
                    Err(error) => {
                        error!("Failed to parse payload notification: {}", error);
                    }
                }
            }
        });

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();
        let on_router_close_handler = router.on_close({
            let inner_weak = Arc::clone(&inner_weak);

            move || {
                let maybe_inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                if let Some(inner) = maybe_inner {
                    inner.base.router_closed();
                }
            }
        });

        let inner = Arc::new(Inner {
            base,
            handlers,
            _subscription_handler: Mutex::new(Some(subscription_handler)),
            _payload_subscription_handler: Mutex::new(Some(payload_subscription_handler)),
            _on_router_close_handler: Mutex::new(on_router_close_handler),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Send an RTCP packet from the application to the worker.
    pub async fn send_rtcp(&self, rtcp_packet: Vec<u8>) -> Result<(), NotificationError> {
        if self.closed() {
            return Err(NotificationError::ChannelClosed);
        }

        self.inner
            .base
            .payload_channel
            .notify(
                TransportSendRtcpNotification {
                    internal: self.inner.base.internal(),
                },
                Bytes::from(rtcp_packet),
            )
            .await
    }

    /// Callback is called when the worker emits an RTCP packet for the application.
    pub fn on_rtcp<F: Fn(&Bytes) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.rtcp.add(Arc::new(callback))
    }
}

impl TransportImpl for DirectTransport {
    fn base(&self) -> &TransportBase {
        &self.inner.base
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Direct
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn id(&self) -> TransportId {
        self.inner.base.id
    }

    fn router(&self) -> &Router {
        &self.inner.base.router
    }

    fn app_data(&self) -> &AppData {
        &self.inner.base.app_data
    }

    fn closed(&self) -> bool {
        self.inner.base.closed.load(Ordering::SeqCst)
    }

    async fn produce(&self, producer_options: ProducerOptions) -> Result<Producer, ProduceError> {
        debug!("produce()");

        self.produce_impl(producer_options).await
    }

    async fn consume(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError> {
        debug!("consume()");

        self.consume_impl(consumer_options).await
    }

    async fn produce_data(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError> {
        debug!("produce_data()");

        self.produce_data_impl(DataProducerType::Direct, data_producer_options)
            .await
    }

    async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        debug!("consume_data()");

        self.consume_data_impl(DataConsumerType::Direct, data_consumer_options)
            .await
    }

    async fn dump(&self) -> Result<TransportDump, RequestError> {
        debug!("dump()");

        self.dump_impl().await
    }

    async fn get_stats(&self) -> Result<Vec<TransportStat>, RequestError> {
        debug!("get_stats()");

        self.get_stats_impl().await
    }

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), RequestError> {
        debug!("set_max_incoming_bitrate() [bitrate:{}]", bitrate);

        self.set_max_incoming_bitrate_impl(bitrate).await
    }

    async fn set_max_outgoing_bitrate(&self, bitrate: u32) -> Result<(), RequestError> {
        debug!("set_max_outgoing_bitrate() [bitrate:{}]", bitrate);

        self.set_max_outgoing_bitrate_impl(bitrate).await
    }

    async fn enable_trace_event(
        &self,
        types: Vec<TransportTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        self.enable_trace_event_impl(types).await
    }

    fn on_new_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId {
        self.inner
            .base
            .handlers
            .new_producer
            .add(Arc::from(callback))
    }

    fn on_new_consumer(&self, callback: Box<dyn Fn(&Consumer) + Send + Sync>) -> HandlerId {
        self.inner
            .base
            .handlers
            .new_consumer
            .add(Arc::from(callback))
    }

    fn on_new_data_producer(
        &self,
        callback: Box<dyn Fn(&DataProducer) + Send + Sync>,
    ) -> HandlerId {
        self.inner
            .base
            .handlers
            .new_data_producer
            .add(Arc::from(callback))
    }

    fn on_new_data_consumer(
        &self,
        callback: Box<dyn Fn(&DataConsumer) + Send + Sync>,
    ) -> HandlerId {
        self.inner
            .base
            .handlers
            .new_data_consumer
            .add(Arc::from(callback))
    }

    fn on_trace(&self, callback: Box<dyn Fn(&TransportTraceEventData) + Send + Sync>) -> HandlerId {
        self.inner.base.handlers.trace.add(Arc::from(callback))
    }

    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId {
        self.inner.base.handlers.router_close.add(callback)
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId {
        self.inner.base.handlers.close.add(callback)
    }

    fn close(&self) {
        self.inner.base.close(true);
    }
}
