//! A plain transport represents a network path through which plain RTP and RTCP (optionally
//! SRTP-protected) is transmitted.

use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions, DataConsumerType};
use crate::data_producer::{DataProducer, DataProducerOptions, DataProducerType};
use crate::data_structures::{AppData, SctpState, TransportListenIp, TransportTuple};
use crate::event_handlers::{Bag, HandlerId};
use crate::messages::{PlainTransportConnectData, PlainTransportConnectRequest};
use crate::producer::{Producer, ProducerOptions};
use crate::router::transport::{TransportBase, TransportImpl, TransportType};
use crate::router::Router;
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
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

/// [`PlainTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PlainTransportOptions {
    /// Listening IP address.
    pub listen_ip: TransportListenIp,
    /// Use RTCP-mux (RTP and RTCP in the same port). Default true.
    pub rtcp_mux: bool,
    /// Whether the remote IP:port should be auto-detected based on the first received RTP/RTCP
    /// packet. If enabled, `connect()` must not be called unless SRTP is enabled. Default false.
    pub comedia: bool,
    /// Create an SCTP association. Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by data producers. Default 262144.
    pub max_sctp_message_size: u32,
    /// Maximum SCTP send buffer used by data consumers. Default 262144.
    pub sctp_send_buffer_size: u32,
    /// Enable SRTP to protect the RTP and RTCP traffic. The remote SRTP parameters must then be
    /// given to `connect()`. Default false.
    pub enable_srtp: bool,
    /// The SRTP crypto suite to be used if SRTP is enabled.
    pub srtp_crypto_suite: SrtpCryptoSuite,
    /// Custom application data.
    pub app_data: AppData,
}

impl PlainTransportOptions {
    /// Create plain transport options with the given listen IP.
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self {
            listen_ip,
            rtcp_mux: true,
            comedia: false,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            sctp_send_buffer_size: 262_144,
            enable_srtp: false,
            srtp_crypto_suite: SrtpCryptoSuite::default(),
            app_data: AppData::default(),
        }
    }
}

/// Remote parameters for the plain transport.
#[derive(Debug, Default, Clone)]
pub struct PlainTransportRemoteParameters {
    /// The IP of the remote endpoint.
    pub ip: Option<IpAddr>,
    /// The port of the remote endpoint for RTP.
    pub port: Option<u16>,
    /// The port of the remote endpoint for RTCP (when RTCP-mux is not used).
    pub rtcp_port: Option<u16>,
    /// SRTP parameters used by the remote endpoint to encrypt its RTP and RTCP.
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
pub struct PlainTransportData {
    tuple: Mutex<TransportTuple>,
    rtcp_tuple: Mutex<Option<TransportTuple>>,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Mutex<Option<SctpState>>,
    srtp_parameters: Mutex<Option<SrtpParameters>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    Tuple {
        tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    RtcpTuple {
        rtcp_tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange {
        sctp_state: SctpState,
    },
    Trace(TransportTraceEventData),
}

#[derive(Default)]
struct Handlers {
    tuple: Bag<dyn Fn(&TransportTuple) + Send + Sync>,
    rtcp_tuple: Bag<dyn Fn(&TransportTuple) + Send + Sync>,
    sctp_state_change: Bag<dyn Fn(SctpState) + Send + Sync>,
}

struct Inner {
    base: TransportBase,
    data: Arc<PlainTransportData>,
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

/// Transport for plain RTP/RTCP endpoints such as gateways and recorders.
#[derive(Clone)]
#[must_use = "Transport will be closed on drop, make sure to keep it around for as long as needed"]
pub struct PlainTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for PlainTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTransport")
            .field("id", &self.inner.base.id)
            .field("tuple", &self.inner.data.tuple)
            .field("rtcp_tuple", &self.inner.data.rtcp_tuple)
            .field("sctp_state", &self.inner.data.sctp_state)
            .field("closed", &self.inner.base.closed)
            .finish()
    }
}

impl PlainTransport {
    pub(super) fn new(
        id: TransportId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        data: PlainTransportData,
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
                        Notification::Tuple { tuple } => {
                            *data.tuple.lock() = tuple;
                            handlers.tuple.call(|callback| {
                                callback(&tuple);
                            });
                        }
                        Notification::RtcpTuple { rtcp_tuple } => {
                            data.rtcp_tuple.lock().replace(rtcp_tuple);
                            handlers.rtcp_tuple.call(|callback| {
                                callback(&rtcp_tuple);
                            });
                        }
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

    /// Provide the plain transport with the endpoint parameters.
    pub async fn connect(
        &self,
        remote_parameters: PlainTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .base
            .channel
            .request(PlainTransportConnectRequest {
                internal: self.inner.base.internal(),
                data: PlainTransportConnectData {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                    rtcp_port: remote_parameters.rtcp_port,
                    srtp_parameters: remote_parameters.srtp_parameters,
                },
            })
            .await?;

        *self.inner.data.tuple.lock() = response.tuple;
        if let Some(rtcp_tuple) = response.rtcp_tuple {
            self.inner.data.rtcp_tuple.lock().replace(rtcp_tuple);
        }
        *self.inner.data.srtp_parameters.lock() = response.srtp_parameters;

        Ok(())
    }

    /// The transport tuple. If RTCP-mux is enabled, RTCP also flows through it.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        *self.inner.data.tuple.lock()
    }

    /// The transport tuple for RTCP, when RTCP-mux is disabled.
    #[must_use]
    pub fn rtcp_tuple(&self) -> Option<TransportTuple> {
        *self.inner.data.rtcp_tuple.lock()
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

    /// Local SRTP parameters the remote endpoint must use, when SRTP is enabled.
    #[must_use]
    pub fn srtp_parameters(&self) -> Option<SrtpParameters> {
        self.inner.data.srtp_parameters.lock().clone()
    }

    /// Callback is called after the remote RTP origin was discovered (comedia mode only).
    pub fn on_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.tuple.add(Arc::new(callback))
    }

    /// Callback is called after the remote RTCP origin was discovered (comedia mode without
    /// RTCP-mux only).
    pub fn on_rtcp_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.rtcp_tuple.add(Arc::new(callback))
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

impl TransportImpl for PlainTransport {
    fn base(&self) -> &TransportBase {
        &self.inner.base
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Plain
    }

    fn on_closing(&self) {
        if self.inner.data.sctp_state.lock().is_some() {
            self.inner.data.sctp_state.lock().replace(SctpState::Closed);
        }
    }
}

#[async_trait]
impl Transport for PlainTransport {
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
