//! A pipe transport represents a network path between two routers, typically hosted by
//! different worker processes. Consumers created on a pipe transport forward every RTP stream of
//! the producer verbatim.

use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions, DataConsumerType};
use crate::data_producer::{DataProducer, DataProducerOptions, DataProducerType};
use crate::data_structures::{AppData, SctpState, TransportListenIp, TransportTuple};
use crate::event_handlers::{Bag, HandlerId};
use crate::messages::{PipeTransportConnectData, PipeTransportConnectRequest};
use crate::producer::{Producer, ProducerOptions};
use crate::router::transport::{TransportBase, TransportImpl, TransportType};
use crate::router::Router;
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::srtp_parameters::SrtpParameters;
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportDump,
    TransportId, TransportStat, TransportTraceEventData, TransportTraceEventType,
};
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use async_trait::async_trait;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// [`PipeTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeTransportOptions {
    /// Listening IP address.
    pub listen_ip: TransportListenIp,
    /// Create an SCTP association. Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by data producers. Default 268435456.
    pub max_sctp_message_size: u32,
    /// Maximum SCTP send buffer used by data consumers. Default 268435456.
    pub sctp_send_buffer_size: u32,
    /// Enable RTX and NACK for RTP retransmission. Useful if both routers are located in
    /// different hosts and there is packet loss in the link. For this to work, both pipe
    /// transports must enable this setting. Default false.
    pub enable_rtx: bool,
    /// Enable SRTP. Useful to protect the RTP and RTCP traffic if both routers are located in
    /// different hosts. For this to work, `connect()` must be called with the remote SRTP
    /// parameters. Default false.
    pub enable_srtp: bool,
    /// Custom application data.
    pub app_data: AppData,
}

impl PipeTransportOptions {
    /// Create pipe transport options with the given listen IP.
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self {
            listen_ip,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 268_435_456,
            sctp_send_buffer_size: 268_435_456,
            enable_rtx: false,
            enable_srtp: false,
            app_data: AppData::default(),
        }
    }
}

/// Remote parameters for the pipe transport.
#[derive(Debug, Clone)]
pub struct PipeTransportRemoteParameters {
    /// The IP of the remote pipe transport.
    pub ip: IpAddr,
    /// The port of the remote pipe transport.
    pub port: u16,
    /// SRTP parameters used by the remote pipe transport to encrypt its RTP and RTCP.
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
pub struct PipeTransportData {
    tuple: Mutex<TransportTuple>,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Mutex<Option<SctpState>>,
    #[serde(default)]
    rtx: bool,
    srtp_parameters: Mutex<Option<SrtpParameters>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    SctpStateChange {
        sctp_state: SctpState,
    },
    Trace(TransportTraceEventData),
}

#[derive(Default)]
struct Handlers {
    sctp_state_change: Bag<dyn Fn(SctpState) + Send + Sync>,
}

struct Inner {
    base: TransportBase,
    data: Arc<PipeTransportData>,
    handlers: Arc<Handlers>,
    _subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _on_router_close_handler: Mutex<HandlerId>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        if self.data.sctp_state.lock().is_some() {
            self.data.sctp_state.lock().replace(SctpState::Closed);
        }
        self.base.close(true);
    }
}

/// Transport for piping streams between routers.
#[derive(Clone)]
#[must_use = "Transport will be closed on drop, make sure to keep it around for as long as needed"]
pub struct PipeTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("id", &self.inner.base.id)
            .field("tuple", &self.inner.data.tuple)
            .field("rtx", &self.inner.data.rtx)
            .field("sctp_state", &self.inner.data.sctp_state)
            .field("closed", &self.inner.base.closed)
            .finish()
    }
}

impl PipeTransport {
    pub(super) fn new(
        id: TransportId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        data: PipeTransportData,
        app_data: AppData,
        router: Router,
    ) -> Self {
        debug!("new()");

        let data = Arc::new(data);
        let handlers = Arc::<Handlers>::default();
        let outgoing_sctp_streams = data
            .sctp_parameters
            .map(|sctp_parameters| sctp_parameters.os)
            .unwrap_or(0);

        let base = TransportBase::new(
            id,
            router.clone(),
            channel.clone(),
            payload_channel,
            executor,
            app_data,
            outgoing_sctp_streams,
        );

        let subscription_handler = channel.subscribe_to_notifications(id.into(), {
            let data = Arc::clone(&data);
            let handlers = Arc::clone(&handlers);
            let trace_handlers = base.handlers.trace.clone();

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(notification) => match notification {
                        Notification::SctpStateChange { sctp_state } => {
                            data.sctp_state.lock().replace(sctp_state);
                            handlers.sctp_state_change.call(|callback| {
                                callback(sctp_state);
                            });
                        }
                        Notification::Trace(trace_event_data) => {
                            trace_handlers.call(|callback| {
                                callback(&trace_event_data);
                            });
                        }
                    },
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
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
                    if inner.data.sctp_state.lock().is_some() {
                        inner.data.sctp_state.lock().replace(SctpState::Closed);
                    }
                    inner.base.router_closed();
                }
            }
        });

        let inner = Arc::new(Inner {
            base,
            data,
            handlers,
            _subscription_handler: Mutex::new(Some(subscription_handler)),
            _on_router_close_handler: Mutex::new(on_router_close_handler),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Provide the pipe transport with the remote parameters.
    pub async fn connect(
        &self,
        remote_parameters: PipeTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .base
            .channel
            .request(PipeTransportConnectRequest {
                internal: self.inner.base.internal(),
                data: PipeTransportConnectData {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                    srtp_parameters: remote_parameters.srtp_parameters,
                },
            })
            .await?;

        *self.inner.data.tuple.lock() = response.tuple;

        Ok(())
    }

    /// The transport tuple.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        *self.inner.data.tuple.lock()
    }

    /// Local SCTP parameters, unset if SCTP was not enabled.
    #[must_use]
    pub fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.inner.data.sctp_parameters
    }

    /// Current SCTP state, unset if SCTP was not enabled.
    #[must_use]
    pub fn sctp_state(&self) -> Option<SctpState> {
        *self.inner.data.sctp_state.lock()
    }

    /// Whether RTX and NACK are enabled on this pipe.
    #[must_use]
    pub fn rtx(&self) -> bool {
        self.inner.data.rtx
    }

    /// Local SRTP parameters the remote pipe transport must use, when SRTP is enabled.
    #[must_use]
    pub fn srtp_parameters(&self) -> Option<SrtpParameters> {
        self.inner.data.srtp_parameters.lock().clone()
    }

    /// Callback is called when the transport SCTP state changes.
    pub fn on_sctp_state_change<F: Fn(SctpState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .sctp_state_change
            .add(Arc::new(callback))
    }
}

impl TransportImpl for PipeTransport {
    fn base(&self) -> &TransportBase {
        &self.inner.base
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Pipe
    }

    fn rtx_enabled(&self) -> bool {
        self.inner.data.rtx
    }

    fn on_closing(&self) {
        if self.inner.data.sctp_state.lock().is_some() {
            self.inner.data.sctp_state.lock().replace(SctpState::Closed);
        }
    }
}

#[async_trait]
impl Transport for PipeTransport {
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

        self.produce_data_impl(DataProducerType::Sctp, data_producer_options)
            .await
    }

    async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        debug!("consume_data()");

        self.consume_data_impl(DataConsumerType::Sctp, data_consumer_options)
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
        self.on_closing();
        self.inner.base.close(true);
    }
}
