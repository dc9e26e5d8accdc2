//! A WebRTC transport represents a network path negotiated by both, a WebRTC endpoint and the
//! router, via ICE and DTLS procedures.

use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions, DataConsumerType};
use crate::data_producer::{DataProducer, DataProducerOptions, DataProducerType};
use crate::data_structures::{
    AppData, DtlsParameters, DtlsState, IceCandidate, IceParameters, IceRole, IceState, SctpState,
    TransportListenIp, TransportTuple,
};
use crate::event_handlers::{Bag, HandlerId};
use crate::messages::{WebRtcTransportConnectData, WebRtcTransportConnectRequest, TransportRestartIceRequest};
use crate::producer::{Producer, ProducerOptions};
use crate::router::transport::{TransportBase, TransportImpl, TransportType};
use crate::router::Router;
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
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
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// [`WebRtcTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WebRtcTransportOptions {
    /// Listening IP address or addresses in order of preference (first one is the preferred
    /// one).
    pub listen_ips: Vec<TransportListenIp>,
    /// Listen in UDP. Default true.
    pub enable_udp: bool,
    /// Listen in TCP. Default false.
    pub enable_tcp: bool,
    /// Prefer UDP. Default false.
    pub prefer_udp: bool,
    /// Prefer TCP. Default false.
    pub prefer_tcp: bool,
    /// Initial available outgoing bitrate (in bps). Default 600000.
    pub initial_available_outgoing_bitrate: u32,
    /// Create an SCTP association. Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by data producers. Default 262144.
    pub max_sctp_message_size: u32,
    /// Maximum SCTP send buffer used by data consumers. Default 262144.
    pub sctp_send_buffer_size: u32,
    /// Custom application data.
    pub app_data: AppData,
}

impl WebRtcTransportOptions {
    /// Create WebRTC transport options with the given listen IP.
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self {
            listen_ips: vec![listen_ip],
            enable_udp: true,
            enable_tcp: false,
            prefer_udp: false,
            prefer_tcp: false,
            initial_available_outgoing_bitrate: 600_000,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            sctp_send_buffer_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

/// Remote parameters for the WebRTC transport.
#[derive(Debug, Clone)]
pub struct WebRtcTransportRemoteParameters {
    /// The remote DTLS parameters.
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
pub struct WebRtcTransportData {
    ice_role: IceRole,
    ice_parameters: Mutex<IceParameters>,
    ice_candidates: Vec<IceCandidate>,
    ice_state: Mutex<IceState>,
    ice_selected_tuple: Mutex<Option<TransportTuple>>,
    dtls_parameters: Mutex<DtlsParameters>,
    dtls_state: Mutex<DtlsState>,
    dtls_remote_cert: Mutex<Option<String>>,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Mutex<Option<SctpState>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    IceStateChange {
        ice_state: IceState,
    },
    #[serde(rename_all = "camelCase")]
    IceSelectedTupleChange {
        ice_selected_tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    DtlsStateChange {
        dtls_state: DtlsState,
        dtls_remote_cert: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange {
        sctp_state: SctpState,
    },
    Trace(TransportTraceEventData),
}

#[derive(Default)]
struct Handlers {
    ice_state_change: Bag<dyn Fn(IceState) + Send + Sync>,
    ice_selected_tuple_change: Bag<dyn Fn(&TransportTuple) + Send + Sync>,
    dtls_state_change: Bag<dyn Fn(DtlsState) + Send + Sync>,
    sctp_state_change: Bag<dyn Fn(SctpState) + Send + Sync>,
}

struct Inner {
    base: TransportBase,
    data: Arc<WebRtcTransportData>,
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

/// Transport negotiated with a WebRTC endpoint via ICE and DTLS.
#[derive(Clone)]
#[must_use = "Transport will be closed on drop, make sure to keep it around for as long as needed"]
pub struct WebRtcTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcTransport")
            .field("id", &self.inner.base.id)
            .field("ice_role", &self.inner.data.ice_role)
            .field("ice_state", &self.inner.data.ice_state)
            .field("dtls_state", &self.inner.data.dtls_state)
            .field("sctp_state", &self.inner.data.sctp_state)
            .field("closed", &self.inner.base.closed)
            .finish()
    }
}

impl WebRtcTransport {
    pub(super) fn new(
        id: TransportId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        data: WebRtcTransportData,
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
                        Notification::IceStateChange { ice_state } => {
                            *data.ice_state.lock() = ice_state;
                            handlers.ice_state_change.call(|callback| {
                                callback(ice_state);
                            });
                        }
                        Notification::IceSelectedTupleChange { ice_selected_tuple } => {
                            data.ice_selected_tuple.lock().replace(ice_selected_tuple);
                            handlers.ice_selected_tuple_change.call(|callback| {
                                callback(&ice_selected_tuple);
                            });
                        }
                        Notification::DtlsStateChange {
                            dtls_state,
                            dtls_remote_cert,
                        } => {
                            *data.dtls_state.lock() = dtls_state;
                            if let Some(dtls_remote_cert) = dtls_remote_cert {
                                data.dtls_remote_cert.lock().replace(dtls_remote_cert);
                            }
                            handlers.dtls_state_change.call(|callback| {
                                callback(dtls_state);
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

    /// Provide the WebRTC transport with the remote DTLS parameters.
    pub async fn connect(
        &self,
        remote_parameters: WebRtcTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .base
            .channel
            .request(WebRtcTransportConnectRequest {
                internal: self.inner.base.internal(),
                data: WebRtcTransportConnectData {
                    dtls_parameters: remote_parameters.dtls_parameters,
                },
            })
            .await?;

        self.inner.data.dtls_parameters.lock().role = response.dtls_local_role;

        Ok(())
    }

    /// Restart the ICE layer by generating new local ICE parameters that must be signaled to the
    /// remote endpoint.
    pub async fn restart_ice(&self) -> Result<IceParameters, RequestError> {
        debug!("restart_ice()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .base
            .channel
            .request(TransportRestartIceRequest {
                internal: self.inner.base.internal(),
            })
            .await?;

        *self.inner.data.ice_parameters.lock() = response.ice_parameters.clone();

        Ok(response.ice_parameters)
    }

    /// Local ICE role. Always `controlled`.
    #[must_use]
    pub fn ice_role(&self) -> IceRole {
        self.inner.data.ice_role
    }

    /// Local ICE parameters.
    #[must_use]
    pub fn ice_parameters(&self) -> IceParameters {
        self.inner.data.ice_parameters.lock().clone()
    }

    /// Local ICE candidates.
    #[must_use]
    pub fn ice_candidates(&self) -> &Vec<IceCandidate> {
        &self.inner.data.ice_candidates
    }

    /// Current ICE state.
    #[must_use]
    pub fn ice_state(&self) -> IceState {
        *self.inner.data.ice_state.lock()
    }

    /// The selected transport tuple if ICE is in `connected` or `completed` state.
    #[must_use]
    pub fn ice_selected_tuple(&self) -> Option<TransportTuple> {
        *self.inner.data.ice_selected_tuple.lock()
    }

    /// Local DTLS parameters.
    #[must_use]
    pub fn dtls_parameters(&self) -> DtlsParameters {
        self.inner.data.dtls_parameters.lock().clone()
    }

    /// Current DTLS state.
    #[must_use]
    pub fn dtls_state(&self) -> DtlsState {
        *self.inner.data.dtls_state.lock()
    }

    /// The remote certificate in PEM format, once the DTLS state is `connected`.
    #[must_use]
    pub fn dtls_remote_cert(&self) -> Option<String> {
        self.inner.data.dtls_remote_cert.lock().clone()
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

    /// Callback is called when the transport ICE state changes.
    pub fn on_ice_state_change<F: Fn(IceState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.ice_state_change.add(Arc::new(callback))
    }

    /// Callback is called after ICE state becomes `connected` or `completed` and when the
    /// selected tuple changes.
    pub fn on_ice_selected_tuple_change<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .ice_selected_tuple_change
            .add(Arc::new(callback))
    }

    /// Callback is called when the transport DTLS state changes.
    pub fn on_dtls_state_change<F: Fn(DtlsState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .dtls_state_change
            .add(Arc::new(callback))
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

impl TransportImpl for WebRtcTransport {
    fn base(&self) -> &TransportBase {
        &self.inner.base
    }

    fn transport_type(&self) -> TransportType {
        TransportType::WebRtc
    }

    fn on_closing(&self) {
        if self.inner.data.sctp_state.lock().is_some() {
            self.inner.data.sctp_state.lock().replace(SctpState::Closed);
        }
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
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
