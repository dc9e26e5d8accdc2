//! Shared contract of all transport variants.
//!
//! [`Transport`] is the object-safe surface every variant exposes. The private `TransportImpl`
//! trait carries the shared produce/consume/dump machinery on top of a [`TransportBase`] that
//! holds the fields common to all variants: the owned producer/consumer registries, the MID and
//! SCTP stream id allocators and the event handler bags.

use crate::consumer::{Consumer, ConsumerId, ConsumerOptions, WeakConsumer};
use crate::data_consumer::{
    DataConsumer, DataConsumerId, DataConsumerOptions, DataConsumerType, WeakDataConsumer,
};
use crate::data_producer::{
    DataProducer, DataProducerId, DataProducerOptions, DataProducerType, WeakDataProducer,
};
use crate::data_structures::{
    AppData, DtlsState, EventDirection, IceRole, IceState, SctpState, TransportTuple,
};
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    ConsumerInternal, DataConsumerInternal, DataProducerInternal, ProducerInternal,
    TransportCloseRequest, TransportConsumeData, TransportConsumeDataData,
    TransportConsumeDataRequest, TransportConsumeRequest, TransportDumpRequest,
    TransportEnableTraceEventData, TransportEnableTraceEventRequest, TransportGetStatsRequest,
    TransportInternal, TransportProduceData, TransportProduceDataData, TransportProduceDataRequest,
    TransportProduceRequest, TransportSetBitrateData, TransportSetMaxIncomingBitrateRequest,
    TransportSetMaxOutgoingBitrateRequest,
};
use crate::ortc::{
    ConsumerRtpParametersError, RtpCapabilitiesError, RtpParametersError, RtpParametersMappingError,
};
use crate::producer::{Producer, ProducerId, ProducerOptions, WeakProducer};
use crate::router::Router;
use crate::rtp_parameters::RtpEncodingParameters;
use crate::sctp_parameters::SctpParameters;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError};
use crate::{ortc, srtp_parameters::SrtpParameters};
use async_executor::Executor;
use async_lock::Mutex as AsyncMutex;
use async_trait::async_trait;
use hash_hasher::HashedMap;
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

uuid_based_wrapper_type!(
    /// [`Transport`] identifier.
    TransportId
);

/// Types of a transport 'trace' event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportTraceEventType {
    /// Probation packets.
    Probation,
    /// Bandwidth estimation changes.
    Bwe,
}

/// 'trace' event data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportTraceEventData {
    /// Trace type.
    pub r#type: TransportTraceEventType,
    /// Event timestamp.
    pub timestamp: u64,
    /// Event direction.
    pub direction: EventDirection,
    /// Per type information.
    pub info: Value,
}

/// Dump of a transport, shared across variants; variant-specific fields are optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct TransportDump {
    pub id: TransportId,
    #[serde(default)]
    pub direct: bool,
    #[serde(default)]
    pub producer_ids: Vec<ProducerId>,
    #[serde(default)]
    pub consumer_ids: Vec<ConsumerId>,
    #[serde(default)]
    pub data_producer_ids: Vec<DataProducerId>,
    #[serde(default)]
    pub data_consumer_ids: Vec<DataConsumerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<SctpParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_state: Option<SctpState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_state: Option<IceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_selected_tuple: Option<TransportTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtls_state: Option<DtlsState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple: Option<TransportTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtcp_tuple: Option<TransportTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtx: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srtp_parameters: Option<SrtpParameters>,
}

/// RTC statistics of a transport, shared across variants; variant-specific fields are optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
#[allow(missing_docs)]
pub struct TransportStat {
    pub r#type: String,
    pub transport_id: TransportId,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_state: Option<SctpState>,
    pub bytes_received: usize,
    pub recv_bitrate: u32,
    pub bytes_sent: usize,
    pub send_bitrate: u32,
    pub rtp_bytes_received: usize,
    pub rtp_recv_bitrate: u32,
    pub rtp_bytes_sent: usize,
    pub rtp_send_bitrate: u32,
    pub rtx_bytes_received: usize,
    pub rtx_recv_bitrate: u32,
    pub rtx_bytes_sent: usize,
    pub rtx_send_bitrate: u32,
    pub probation_bytes_sent: usize,
    pub probation_send_bitrate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_outgoing_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_incoming_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_incoming_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_role: Option<IceRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_state: Option<IceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_selected_tuple: Option<TransportTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtls_state: Option<DtlsState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple: Option<TransportTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtcp_tuple: Option<TransportTuple>,
}

/// Error that [`Transport::produce`] can produce.
#[derive(Debug, Error)]
pub enum ProduceError {
    /// The transport is closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// A producer with the same id already exists.
    #[error("Producer with the same id \"{0}\" already exists")]
    AlreadyExists(ProducerId),
    /// Incorrect RTP parameters.
    #[error("Incorrect RTP parameters: {0}")]
    IncorrectRtpParameters(RtpParametersError),
    /// RTP mapping error.
    #[error("RTP mapping error: {0}")]
    FailedRtpParametersMapping(RtpParametersMappingError),
    /// Request to the worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that [`Transport::consume`] can produce.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// The transport is closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// The producer is not known to the router.
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Invalid RTP capabilities.
    #[error("RTP capabilities error: {0}")]
    FailedRtpCapabilitiesValidation(RtpCapabilitiesError),
    /// The given RTP capabilities cannot consume the producer.
    #[error("Bad consumer RTP parameters: {0}")]
    BadConsumerRtpParameters(ConsumerRtpParametersError),
    /// Request to the worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that [`Transport::produce_data`] can produce.
#[derive(Debug, Error)]
pub enum ProduceDataError {
    /// The transport is closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// A data producer with the same id already exists.
    #[error("Data producer with the same id \"{0}\" already exists")]
    AlreadyExists(DataProducerId),
    /// SCTP stream parameters are required for this transport.
    #[error("SCTP stream parameters are required for this transport")]
    SctpStreamParametersRequired,
    /// Request to the worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that [`Transport::consume_data`] can produce.
#[derive(Debug, Error)]
pub enum ConsumeDataError {
    /// The transport is closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// The data producer is not known to the router.
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// All SCTP stream ids of the transport are in use.
    #[error("No free sctp_stream_id available in the transport")]
    NoSctpStreamId,
    /// Request to the worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// A transport connects an endpoint with the router and enables transmission of media in both
/// directions by means of producers, consumers, data producers and data consumers.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Transport id.
    fn id(&self) -> TransportId;

    /// Router the transport belongs to.
    fn router(&self) -> &Router;

    /// Custom application data.
    fn app_data(&self) -> &AppData;

    /// Whether the transport is closed.
    fn closed(&self) -> bool;

    /// Create a producer.
    ///
    /// Transport will be kept alive as long as at least one producer instance is alive.
    async fn produce(&self, producer_options: ProducerOptions) -> Result<Producer, ProduceError>;

    /// Create a consumer.
    ///
    /// Transport will be kept alive as long as at least one consumer instance is alive.
    async fn consume(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError>;

    /// Create a data producer.
    ///
    /// Transport will be kept alive as long as at least one data producer instance is alive.
    async fn produce_data(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError>;

    /// Create a data consumer.
    ///
    /// Transport will be kept alive as long as at least one data consumer instance is alive.
    async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError>;

    /// Dump the transport.
    #[doc(hidden)]
    async fn dump(&self) -> Result<TransportDump, RequestError>;

    /// Returns current RTC statistics of the transport.
    async fn get_stats(&self) -> Result<Vec<TransportStat>, RequestError>;

    /// Set maximum incoming bitrate for media streams sent by the remote endpoint over this
    /// transport.
    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), RequestError>;

    /// Set maximum outgoing bitrate for media streams sent by the worker over this transport.
    async fn set_max_outgoing_bitrate(&self, bitrate: u32) -> Result<(), RequestError>;

    /// Instructs the transport to emit 'trace' events. For monitoring purposes.
    async fn enable_trace_event(
        &self,
        types: Vec<TransportTraceEventType>,
    ) -> Result<(), RequestError>;

    /// Callback is called when a new producer is created.
    fn on_new_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId;

    /// Callback is called when a new consumer is created.
    fn on_new_consumer(&self, callback: Box<dyn Fn(&Consumer) + Send + Sync>) -> HandlerId;

    /// Callback is called when a new data producer is created.
    fn on_new_data_producer(&self, callback: Box<dyn Fn(&DataProducer) + Send + Sync>)
        -> HandlerId;

    /// Callback is called when a new data consumer is created.
    fn on_new_data_consumer(&self, callback: Box<dyn Fn(&DataConsumer) + Send + Sync>)
        -> HandlerId;

    /// See [`Transport::enable_trace_event`].
    fn on_trace(&self, callback: Box<dyn Fn(&TransportTraceEventData) + Send + Sync>) -> HandlerId;

    /// Callback is called when the router this transport belongs to is closed for whatever
    /// reason. The transport itself is also closed.
    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId;

    /// Callback is called when the transport is closed for whatever reason.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId;

    /// Close the transport, closing every producer and consumer that lives on it. Idempotent.
    fn close(&self);
}

pub(super) enum TransportType {
    Direct,
    Pipe,
    Plain,
    WebRtc,
}

#[derive(Default)]
pub(super) struct TransportHandlers {
    pub(super) new_producer: Bag<dyn Fn(&Producer) + Send + Sync>,
    pub(super) new_consumer: Bag<dyn Fn(&Consumer) + Send + Sync>,
    pub(super) new_data_producer: Bag<dyn Fn(&DataProducer) + Send + Sync>,
    pub(super) new_data_consumer: Bag<dyn Fn(&DataConsumer) + Send + Sync>,
    pub(super) trace: Bag<dyn Fn(&TransportTraceEventData) + Send + Sync>,
    pub(super) router_close: BagOnce<dyn FnOnce() + Send>,
    pub(super) close: BagOnce<dyn FnOnce() + Send>,
}

/// Fields common to every transport variant.
pub(super) struct TransportBase {
    pub(super) id: TransportId,
    pub(super) router: Router,
    pub(super) channel: Channel,
    pub(super) payload_channel: PayloadChannel,
    pub(super) executor: Arc<Executor<'static>>,
    pub(super) handlers: TransportHandlers,
    pub(super) app_data: AppData,
    pub(super) closed: AtomicBool,
    next_mid_for_consumers: AtomicUsize,
    // One slot per outgoing SCTP stream; `true` means in use.
    used_sctp_stream_ids: AsyncMutex<Vec<bool>>,
    cname_for_producers: AsyncMutex<Option<String>>,
    producers: Mutex<HashedMap<ProducerId, WeakProducer>>,
    consumers: Mutex<HashedMap<ConsumerId, WeakConsumer>>,
    data_producers: Mutex<HashedMap<DataProducerId, WeakDataProducer>>,
    data_consumers: Mutex<HashedMap<DataConsumerId, WeakDataConsumer>>,
}

impl TransportBase {
    pub(super) fn new(
        id: TransportId,
        router: Router,
        channel: Channel,
        payload_channel: PayloadChannel,
        executor: Arc<Executor<'static>>,
        app_data: AppData,
        outgoing_sctp_streams: u16,
    ) -> Self {
        Self {
            id,
            router,
            channel,
            payload_channel,
            executor,
            handlers: TransportHandlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            next_mid_for_consumers: AtomicUsize::new(0),
            used_sctp_stream_ids: AsyncMutex::new(vec![
                false;
                usize::from(outgoing_sctp_streams)
            ]),
            cname_for_producers: AsyncMutex::new(None),
            producers: Mutex::default(),
            consumers: Mutex::default(),
            data_producers: Mutex::default(),
            data_consumers: Mutex::default(),
        }
    }

    pub(super) fn internal(&self) -> TransportInternal {
        TransportInternal {
            router_id: self.router.id(),
            transport_id: self.id,
        }
    }

    /// Mark closed and fire close handlers; optionally tell the worker. Idempotent.
    pub(super) fn close(&self, send_request: bool) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.handlers.close.call_simple();

            if send_request {
                let channel = self.channel.clone();
                let request = TransportCloseRequest {
                    internal: self.internal(),
                };

                self.executor
                    .spawn(async move {
                        if let Err(error) = channel.request(request).await {
                            error!("transport closing failed: {}", error);
                        }
                    })
                    .detach();
            }
        }
    }

    pub(super) fn router_closed(&self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.handlers.router_close.call_simple();
            self.close(false);
        }
    }

    async fn allocate_sctp_stream_id(&self) -> Option<u16> {
        let mut used_sctp_stream_ids = self.used_sctp_stream_ids.lock().await;
        let stream_id = used_sctp_stream_ids.iter().position(|used| !used)?;
        used_sctp_stream_ids[stream_id] = true;
        Some(stream_id as u16)
    }

    async fn deallocate_sctp_stream_id(&self, sctp_stream_id: u16) {
        let mut used_sctp_stream_ids = self.used_sctp_stream_ids.lock().await;
        if let Some(used) = used_sctp_stream_ids.get_mut(usize::from(sctp_stream_id)) {
            *used = false;
        }
    }
}

#[async_trait]
pub(super) trait TransportImpl: Transport + Clone + Sized + 'static {
    fn base(&self) -> &TransportBase;

    fn transport_type(&self) -> TransportType;

    /// Hook invoked right before the closed flag is set, for variant state transitions.
    fn on_closing(&self) {}

    /// Whether RTX and NACK are enabled; only pipe transports may say yes.
    fn rtx_enabled(&self) -> bool {
        false
    }

    async fn dump_impl(&self) -> Result<TransportDump, RequestError> {
        self.base()
            .channel
            .request(TransportDumpRequest {
                internal: self.base().internal(),
            })
            .await
    }

    async fn get_stats_impl(&self) -> Result<Vec<TransportStat>, RequestError> {
        self.base()
            .channel
            .request(TransportGetStatsRequest {
                internal: self.base().internal(),
            })
            .await
    }

    async fn set_max_incoming_bitrate_impl(&self, bitrate: u32) -> Result<(), RequestError> {
        self.base()
            .channel
            .request(TransportSetMaxIncomingBitrateRequest {
                internal: self.base().internal(),
                data: TransportSetBitrateData { bitrate },
            })
            .await
    }

    async fn set_max_outgoing_bitrate_impl(&self, bitrate: u32) -> Result<(), RequestError> {
        self.base()
            .channel
            .request(TransportSetMaxOutgoingBitrateRequest {
                internal: self.base().internal(),
                data: TransportSetBitrateData { bitrate },
            })
            .await
    }

    async fn enable_trace_event_impl(
        &self,
        types: Vec<TransportTraceEventType>,
    ) -> Result<(), RequestError> {
        self.base()
            .channel
            .request(TransportEnableTraceEventRequest {
                internal: self.base().internal(),
                data: TransportEnableTraceEventData { types },
            })
            .await
    }

    async fn produce_impl(
        &self,
        producer_options: ProducerOptions,
    ) -> Result<Producer, ProduceError> {
        if self.base().closed.load(Ordering::SeqCst) {
            return Err(ProduceError::TransportClosed);
        }

        if let Some(id) = &producer_options.id {
            if self.base().router.has_producer(id) {
                return Err(ProduceError::AlreadyExists(*id));
            }
        }

        let ProducerOptions {
            id,
            kind,
            mut rtp_parameters,
            paused,
            key_frame_request_delay,
            app_data,
        } = producer_options;

        ortc::validate_rtp_parameters(&rtp_parameters)
            .map_err(ProduceError::IncorrectRtpParameters)?;

        if rtp_parameters.encodings.is_empty() {
            rtp_parameters
                .encodings
                .push(RtpEncodingParameters::default());
        }

        // Producers on the same transport share one CNAME, except on pipe transports where each
        // producer keeps the CNAME of its origin.
        if !matches!(self.transport_type(), TransportType::Pipe) {
            let mut cname_for_producers = self.base().cname_for_producers.lock().await;
            if let Some(cname) = cname_for_producers.clone() {
                rtp_parameters.rtcp.cname = Some(cname);
            } else if let Some(cname) = rtp_parameters.rtcp.cname.clone() {
                // First producer with a CNAME determines it for the whole transport.
                cname_for_producers.replace(cname);
            } else {
                let cname = Uuid::new_v4().to_string();
                cname_for_producers.replace(cname.clone());
                rtp_parameters.rtcp.cname = Some(cname);
            }
        }

        let router_rtp_capabilities = self.base().router.rtp_capabilities();

        let rtp_mapping =
            ortc::get_producer_rtp_parameters_mapping(&rtp_parameters, router_rtp_capabilities)
                .map_err(ProduceError::FailedRtpParametersMapping)?;

        let consumable_rtp_parameters = ortc::get_consumable_rtp_parameters(
            kind,
            &rtp_parameters,
            router_rtp_capabilities,
            &rtp_mapping,
        );

        let producer_id = id.unwrap_or_else(ProducerId::new);

        let response = self
            .base()
            .channel
            .request(TransportProduceRequest {
                internal: ProducerInternal {
                    router_id: self.base().router.id(),
                    transport_id: self.base().id,
                    producer_id,
                },
                data: TransportProduceData {
                    kind,
                    rtp_parameters: rtp_parameters.clone(),
                    rtp_mapping,
                    key_frame_request_delay,
                    paused,
                },
            })
            .await
            .map_err(ProduceError::Request)?;

        let producer = Producer::new(
            producer_id,
            kind,
            response.r#type,
            rtp_parameters,
            consumable_rtp_parameters,
            paused,
            Arc::clone(&self.base().executor),
            self.base().channel.clone(),
            self.base().payload_channel.clone(),
            app_data,
            Arc::new(self.clone()),
            matches!(self.transport_type(), TransportType::Direct),
        );

        self.base()
            .producers
            .lock()
            .insert(producer_id, producer.downgrade());
        producer
            .on_close({
                let transport = self.clone();
                move || {
                    transport.base().producers.lock().remove(&producer_id);
                }
            })
            .detach();

        self.base().handlers.new_producer.call(|callback| {
            callback(&producer);
        });

        Ok(producer)
    }

    async fn consume_impl(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError> {
        if self.base().closed.load(Ordering::SeqCst) {
            return Err(ConsumeError::TransportClosed);
        }

        let ConsumerOptions {
            producer_id,
            rtp_capabilities,
            paused,
            preferred_layers,
            app_data,
        } = consumer_options;

        ortc::validate_rtp_capabilities(&rtp_capabilities)
            .map_err(ConsumeError::FailedRtpCapabilitiesValidation)?;

        let producer = self
            .base()
            .router
            .get_producer(&producer_id)
            .ok_or(ConsumeError::ProducerNotFound(producer_id))?;

        let (rtp_parameters, r#type) = if matches!(self.transport_type(), TransportType::Pipe) {
            (
                ortc::get_pipe_consumer_rtp_parameters(
                    producer.consumable_rtp_parameters(),
                    self.rtx_enabled(),
                ),
                crate::consumer::ConsumerType::Pipe,
            )
        } else {
            let mut rtp_parameters = ortc::get_consumer_rtp_parameters(
                producer.consumable_rtp_parameters(),
                &rtp_capabilities,
            )
            .map_err(ConsumeError::BadConsumerRtpParameters)?;

            // We use up to 8 bytes for the MID (string).
            let mid = self
                .base()
                .next_mid_for_consumers
                .fetch_add(1, Ordering::AcqRel)
                % 100_000_000;
            rtp_parameters.mid = Some(mid.to_string());

            (rtp_parameters, producer.r#type().into())
        };

        let consumer_id = ConsumerId::new();

        let response = self
            .base()
            .channel
            .request(TransportConsumeRequest {
                internal: ConsumerInternal {
                    router_id: self.base().router.id(),
                    transport_id: self.base().id,
                    consumer_id,
                    producer_id,
                },
                data: TransportConsumeData {
                    kind: producer.kind(),
                    rtp_parameters: rtp_parameters.clone(),
                    r#type,
                    consumable_rtp_encodings: producer
                        .consumable_rtp_parameters()
                        .encodings
                        .clone(),
                    paused,
                    preferred_layers,
                },
            })
            .await
            .map_err(ConsumeError::Request)?;

        let consumer = Consumer::new(
            consumer_id,
            producer_id,
            producer.kind(),
            r#type,
            rtp_parameters,
            response.paused,
            response.producer_paused,
            response.score,
            response.preferred_layers,
            Arc::clone(&self.base().executor),
            self.base().channel.clone(),
            self.base().payload_channel.clone(),
            app_data,
            Arc::new(self.clone()),
        );

        self.base()
            .consumers
            .lock()
            .insert(consumer_id, consumer.downgrade());
        consumer
            .on_close({
                let transport = self.clone();
                move || {
                    transport.base().consumers.lock().remove(&consumer_id);
                }
            })
            .detach();

        self.base().handlers.new_consumer.call(|callback| {
            callback(&consumer);
        });

        Ok(consumer)
    }

    async fn produce_data_impl(
        &self,
        r#type: DataProducerType,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError> {
        if self.base().closed.load(Ordering::SeqCst) {
            return Err(ProduceDataError::TransportClosed);
        }

        if let Some(id) = &data_producer_options.id {
            if self.base().router.has_data_producer(id) {
                return Err(ProduceDataError::AlreadyExists(*id));
            }
        }

        match r#type {
            DataProducerType::Sctp => {
                if data_producer_options.sctp_stream_parameters.is_none() {
                    return Err(ProduceDataError::SctpStreamParametersRequired);
                }
            }
            DataProducerType::Direct => {
                if data_producer_options.sctp_stream_parameters.is_some() {
                    warn!(
                        "sctp_stream_parameters are ignored when producing data on a direct transport",
                    );
                }
            }
        }

        let DataProducerOptions {
            id,
            sctp_stream_parameters,
            label,
            protocol,
            app_data,
        } = data_producer_options;

        let data_producer_id = id.unwrap_or_else(DataProducerId::new);

        let response = self
            .base()
            .channel
            .request(TransportProduceDataRequest {
                internal: DataProducerInternal {
                    router_id: self.base().router.id(),
                    transport_id: self.base().id,
                    data_producer_id,
                },
                data: TransportProduceDataData {
                    r#type,
                    sctp_stream_parameters,
                    label,
                    protocol,
                },
            })
            .await
            .map_err(ProduceDataError::Request)?;

        let data_producer = DataProducer::new(
            data_producer_id,
            response.r#type,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            Arc::clone(&self.base().executor),
            self.base().channel.clone(),
            self.base().payload_channel.clone(),
            app_data,
            Arc::new(self.clone()),
            matches!(self.transport_type(), TransportType::Direct),
        );

        self.base()
            .data_producers
            .lock()
            .insert(data_producer_id, data_producer.downgrade());
        data_producer
            .on_close({
                let transport = self.clone();
                move || {
                    transport
                        .base()
                        .data_producers
                        .lock()
                        .remove(&data_producer_id);
                }
            })
            .detach();

        self.base().handlers.new_data_producer.call(|callback| {
            callback(&data_producer);
        });

        Ok(data_producer)
    }

    async fn consume_data_impl(
        &self,
        r#type: DataConsumerType,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        if self.base().closed.load(Ordering::SeqCst) {
            return Err(ConsumeDataError::TransportClosed);
        }

        let DataConsumerOptions {
            data_producer_id,
            ordered,
            max_packet_life_time,
            max_retransmits,
            app_data,
        } = data_consumer_options;

        let data_producer = self
            .base()
            .router
            .get_data_producer(&data_producer_id)
            .ok_or(ConsumeDataError::DataProducerNotFound(data_producer_id))?;

        let sctp_stream_parameters = match r#type {
            DataConsumerType::Sctp => {
                let mut sctp_stream_parameters = data_producer.sctp_stream_parameters();
                if let Some(sctp_stream_parameters) = &mut sctp_stream_parameters {
                    let stream_id = self
                        .base()
                        .allocate_sctp_stream_id()
                        .await
                        .ok_or(ConsumeDataError::NoSctpStreamId)?;
                    sctp_stream_parameters.stream_id = stream_id;
                    if let Some(ordered) = ordered {
                        sctp_stream_parameters.ordered = ordered;
                    }
                    if let Some(max_packet_life_time) = max_packet_life_time {
                        sctp_stream_parameters.max_packet_life_time = Some(max_packet_life_time);
                    }
                    if let Some(max_retransmits) = max_retransmits {
                        sctp_stream_parameters.max_retransmits = Some(max_retransmits);
                    }
                }
                sctp_stream_parameters
            }
            DataConsumerType::Direct => {
                if ordered.is_some() || max_packet_life_time.is_some() || max_retransmits.is_some()
                {
                    warn!(
                        "ordered, max_packet_life_time and max_retransmits are ignored when \
                         consuming data on a direct transport"
                    );
                }
                None
            }
        };

        let data_consumer_id = DataConsumerId::new();

        let response = self
            .base()
            .channel
            .request(TransportConsumeDataRequest {
                internal: DataConsumerInternal {
                    router_id: self.base().router.id(),
                    transport_id: self.base().id,
                    data_producer_id,
                    data_consumer_id,
                },
                data: TransportConsumeDataData {
                    r#type,
                    sctp_stream_parameters,
                    label: data_producer.label().clone(),
                    protocol: data_producer.protocol().clone(),
                },
            })
            .await
            .map_err(ConsumeDataError::Request)?;

        let data_consumer = DataConsumer::new(
            data_consumer_id,
            response.r#type,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            data_producer_id,
            Arc::clone(&self.base().executor),
            self.base().channel.clone(),
            self.base().payload_channel.clone(),
            app_data,
            Arc::new(self.clone()),
        );

        self.base()
            .data_consumers
            .lock()
            .insert(data_consumer_id, data_consumer.downgrade());
        {
            let transport = self.clone();
            let sctp_stream_id = data_consumer
                .sctp_stream_parameters()
                .map(|sctp_stream_parameters| sctp_stream_parameters.stream_id());
            data_consumer
                .on_close(move || {
                    transport
                        .base()
                        .data_consumers
                        .lock()
                        .remove(&data_consumer_id);
                    if let Some(sctp_stream_id) = sctp_stream_id {
                        let executor = Arc::clone(&transport.base().executor);
                        executor
                            .spawn(async move {
                                transport
                                    .base()
                                    .deallocate_sctp_stream_id(sctp_stream_id)
                                    .await;
                            })
                            .detach();
                    }
                })
                .detach();
        }

        self.base().handlers.new_data_consumer.call(|callback| {
            callback(&data_consumer);
        });

        Ok(data_consumer)
    }
}
