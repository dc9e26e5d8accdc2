//! A router is a media routing domain: producers and consumers that live on its transports can
//! be wired together, and streams can be piped to other routers on the same host.

pub mod active_speaker_observer;
pub mod audio_level_observer;
pub mod consumer;
pub mod data_consumer;
pub mod data_producer;
pub mod direct_transport;
pub mod pipe_transport;
pub mod plain_transport;
pub mod producer;
pub mod rtp_observer;
pub mod transport;
pub mod webrtc_transport;

use crate::active_speaker_observer::{ActiveSpeakerObserver, ActiveSpeakerObserverOptions};
use crate::audio_level_observer::{AudioLevelObserver, AudioLevelObserverOptions};
use crate::consumer::{Consumer, ConsumerId, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerId, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions, WeakDataProducer};
use crate::data_structures::{AppData, TransportListenIp};
use crate::direct_transport::{DirectTransport, DirectTransportOptions};
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    RouterCloseRequest, RouterCreateDirectTransportData, RouterCreateDirectTransportRequest,
    RouterCreatePipeTransportData, RouterCreatePipeTransportRequest,
    RouterCreatePlainTransportData, RouterCreatePlainTransportRequest,
    RouterCreateWebrtcTransportData, RouterCreateWebrtcTransportRequest, RouterDumpRequest,
    RouterInternal, TransportInternal,
};
use crate::ortc;
use crate::pipe_transport::{PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters};
use crate::plain_transport::{PlainTransport, PlainTransportOptions};
use crate::producer::{PipedProducer, Producer, ProducerId, ProducerOptions, WeakProducer};
use crate::rtp_observer::RtpObserverId;
use crate::rtp_parameters::{RtpCapabilities, RtpCapabilitiesFinalized, RtpCodecCapability};
use crate::sctp_parameters::NumSctpStreams;
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportId,
};
use crate::uuid_based_wrapper_type;
use crate::webrtc_transport::{WebRtcTransport, WebRtcTransportOptions};
use crate::worker::{Channel, PayloadChannel, RequestError, Worker};
use async_executor::Executor;
use async_lock::Mutex as AsyncMutex;
use futures_lite::future;
use hash_hasher::HashedMap;
use log::{debug, error};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

uuid_based_wrapper_type!(
    /// [`Router`] identifier.
    RouterId
);

/// [`Router`] options.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct RouterOptions {
    /// Media codecs the router will be able to route; their payload types are allocated
    /// automatically unless declared.
    pub media_codecs: Vec<RtpCodecCapability>,
    /// Custom application data.
    pub app_data: AppData,
}

impl RouterOptions {
    pub fn new(media_codecs: Vec<RtpCodecCapability>) -> Self {
        Self {
            media_codecs,
            app_data: AppData::default(),
        }
    }
}

/// Options for piping a producer or data producer to another router.
#[derive(Debug)]
#[non_exhaustive]
pub struct PipeToRouterOptions {
    /// Target router.
    pub router: Router,
    /// IP used in the pipe transport pair. Default `127.0.0.1`.
    pub listen_ip: TransportListenIp,
    /// Create an SCTP association. Default true.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Enable RTX and NACK for RTP retransmission. Default false.
    pub enable_rtx: bool,
    /// Enable SRTP. Default false.
    pub enable_srtp: bool,
}

impl PipeToRouterOptions {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            listen_ip: TransportListenIp {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                announced_ip: None,
            },
            enable_sctp: true,
            num_sctp_streams: NumSctpStreams::default(),
            enable_rtx: false,
            enable_srtp: false,
        }
    }
}

/// Value of a successful [`Router::pipe_producer_to_router`] call.
pub struct PipeProducerToRouterValue {
    /// The consumer created on the local pipe transport.
    pub pipe_consumer: Consumer,
    /// The producer created on the target router; its lifetime is tied to the pipe consumer
    /// unless [`PipedProducer::into_inner()`] is used.
    pub pipe_producer: PipedProducer,
}

/// Error of a [`Router::pipe_producer_to_router`] call.
#[derive(Debug, Error)]
pub enum PipeProducerToRouterError {
    /// The destination router must differ from the source.
    #[error("Destination router must be different")]
    SameRouter,
    /// The producer is not known to this router.
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Creating or connecting the pipe transport pair failed.
    #[error("Failed to create or connect pipe transport: \"{0}\"")]
    TransportFailed(RequestError),
    /// Consuming on the local pipe transport failed.
    #[error("Failed to consume: \"{0}\"")]
    ConsumeFailed(ConsumeError),
    /// Producing on the remote pipe transport failed.
    #[error("Failed to produce: \"{0}\"")]
    ProduceFailed(ProduceError),
}

impl From<RequestError> for PipeProducerToRouterError {
    fn from(error: RequestError) -> Self {
        PipeProducerToRouterError::TransportFailed(error)
    }
}

impl From<ConsumeError> for PipeProducerToRouterError {
    fn from(error: ConsumeError) -> Self {
        PipeProducerToRouterError::ConsumeFailed(error)
    }
}

impl From<ProduceError> for PipeProducerToRouterError {
    fn from(error: ProduceError) -> Self {
        PipeProducerToRouterError::ProduceFailed(error)
    }
}

/// Value of a successful [`Router::pipe_data_producer_to_router`] call.
pub struct PipeDataProducerToRouterValue {
    /// The data consumer created on the local pipe transport.
    pub pipe_data_consumer: DataConsumer,
    /// The data producer created on the target router.
    pub pipe_data_producer: DataProducer,
}

/// Error of a [`Router::pipe_data_producer_to_router`] call.
#[derive(Debug, Error)]
pub enum PipeDataProducerToRouterError {
    /// The destination router must differ from the source.
    #[error("Destination router must be different")]
    SameRouter,
    /// The data producer is not known to this router.
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// Creating or connecting the pipe transport pair failed.
    #[error("Failed to create or connect pipe transport: \"{0}\"")]
    TransportFailed(RequestError),
    /// Consuming on the local pipe transport failed.
    #[error("Failed to consume: \"{0}\"")]
    ConsumeFailed(ConsumeDataError),
    /// Producing on the remote pipe transport failed.
    #[error("Failed to produce: \"{0}\"")]
    ProduceFailed(ProduceDataError),
}

impl From<RequestError> for PipeDataProducerToRouterError {
    fn from(error: RequestError) -> Self {
        PipeDataProducerToRouterError::TransportFailed(error)
    }
}

impl From<ConsumeDataError> for PipeDataProducerToRouterError {
    fn from(error: ConsumeDataError) -> Self {
        PipeDataProducerToRouterError::ConsumeFailed(error)
    }
}

impl From<ProduceDataError> for PipeDataProducerToRouterError {
    fn from(error: ProduceDataError) -> Self {
        PipeDataProducerToRouterError::ProduceFailed(error)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct RouterDump {
    pub id: RouterId,
    #[serde(default)]
    pub transport_ids: HashSet<TransportId>,
    #[serde(default)]
    pub rtp_observer_ids: HashSet<RtpObserverId>,
    #[serde(default)]
    pub map_producer_id_consumer_ids: HashMap<ProducerId, HashSet<ConsumerId>>,
    #[serde(default)]
    pub map_consumer_id_producer_id: HashMap<ConsumerId, ProducerId>,
    #[serde(default)]
    pub map_producer_id_observer_ids: HashMap<ProducerId, HashSet<RtpObserverId>>,
    #[serde(default)]
    pub map_data_producer_id_data_consumer_ids: HashMap<DataProducerId, HashSet<DataConsumerId>>,
    #[serde(default)]
    pub map_data_consumer_id_data_producer_id: HashMap<DataConsumerId, DataProducerId>,
}

/// New transport notification for [`Router::on_new_transport`].
pub enum NewTransport<'a> {
    /// Direct transport.
    Direct(&'a DirectTransport),
    /// Pipe transport.
    Pipe(&'a PipeTransport),
    /// Plain transport.
    Plain(&'a PlainTransport),
    /// WebRTC transport.
    WebRtc(&'a WebRtcTransport),
}

/// New RTP observer notification for [`Router::on_new_rtp_observer`].
pub enum NewRtpObserver<'a> {
    /// Audio level observer.
    AudioLevel(&'a AudioLevelObserver),
    /// Active speaker observer.
    ActiveSpeaker(&'a ActiveSpeakerObserver),
}

struct PipeTransportPair {
    local: PipeTransport,
    remote: PipeTransport,
}

#[derive(Default)]
struct Handlers {
    new_transport: Bag<dyn Fn(NewTransport<'_>) + Send + Sync>,
    new_rtp_observer: Bag<dyn Fn(NewRtpObserver<'_>) + Send + Sync>,
    worker_close: BagOnce<dyn FnOnce() + Send>,
    close: BagOnce<dyn FnOnce() + Send>,
}

struct Inner {
    id: RouterId,
    executor: Arc<Executor<'static>>,
    rtp_capabilities: RtpCapabilitiesFinalized,
    channel: Channel,
    payload_channel: PayloadChannel,
    handlers: Handlers,
    app_data: AppData,
    producers: Arc<SyncMutex<HashedMap<ProducerId, WeakProducer>>>,
    data_producers: Arc<SyncMutex<HashedMap<DataProducerId, WeakDataProducer>>>,
    mapped_pipe_transports:
        Arc<SyncMutex<HashedMap<RouterId, Arc<AsyncMutex<Option<PipeTransportPair>>>>>>,
    closed: AtomicBool,
    // Worker is kept alive for as long as this router exists
    worker: SyncMutex<Option<Worker>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close(true);
    }
}

impl Inner {
    fn close(&self, send_request: bool) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.handlers.close.call_simple();

            let worker = self.worker.lock().take();
            if send_request {
                let channel = self.channel.clone();
                let request = RouterCloseRequest {
                    internal: RouterInternal { router_id: self.id },
                };

                self.executor
                    .spawn(async move {
                        if let Err(error) = channel.request(request).await {
                            error!("router closing failed: {}", error);
                        }

                        drop(worker);
                    })
                    .detach();
            }
        }
    }
}

/// A media routing domain within a worker.
#[derive(Clone)]
#[must_use = "Router will be closed on drop, make sure to keep it around for as long as needed"]
pub struct Router {
    inner: Arc<Inner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Router {
    pub(crate) fn new(
        id: RouterId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        rtp_capabilities: RtpCapabilitiesFinalized,
        app_data: AppData,
        worker: Worker,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            executor,
            rtp_capabilities,
            channel,
            payload_channel,
            handlers: Handlers::default(),
            app_data,
            producers: Arc::default(),
            data_producers: Arc::default(),
            mapped_pipe_transports: Arc::default(),
            closed: AtomicBool::new(false),
            worker: SyncMutex::new(Some(worker)),
        });

        Self { inner }
    }

    /// Router id.
    #[must_use]
    pub fn id(&self) -> RouterId {
        self.inner.id
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// RTP capabilities of the router; endpoints negotiate against these.
    #[must_use]
    pub fn rtp_capabilities(&self) -> &RtpCapabilitiesFinalized {
        &self.inner.rtp_capabilities
    }

    /// Whether the router is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump the router.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<RouterDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(RouterDumpRequest {
                internal: RouterInternal {
                    router_id: self.inner.id,
                },
            })
            .await
    }

    /// Create a direct transport.
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_direct_transport(
        &self,
        direct_transport_options: DirectTransportOptions,
    ) -> Result<DirectTransport, RequestError> {
        debug!("create_direct_transport()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let transport_id = TransportId::new();
        self.inner
            .channel
            .request(RouterCreateDirectTransportRequest {
                internal: TransportInternal {
                    router_id: self.inner.id,
                    transport_id,
                },
                data: RouterCreateDirectTransportData::from_options(&direct_transport_options),
            })
            .await?;

        let transport = DirectTransport::new(
            transport_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            direct_transport_options.app_data,
            self.clone(),
        );

        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Direct(&transport));
        });

        self.after_transport_creation(&transport);

        Ok(transport)
    }

    /// Create a WebRTC transport.
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_webrtc_transport(
        &self,
        webrtc_transport_options: WebRtcTransportOptions,
    ) -> Result<WebRtcTransport, RequestError> {
        debug!("create_webrtc_transport()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let transport_id = TransportId::new();
        let data = self
            .inner
            .channel
            .request(RouterCreateWebrtcTransportRequest {
                internal: TransportInternal {
                    router_id: self.inner.id,
                    transport_id,
                },
                data: RouterCreateWebrtcTransportData::from_options(&webrtc_transport_options),
            })
            .await?;

        let transport = WebRtcTransport::new(
            transport_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            data,
            webrtc_transport_options.app_data,
            self.clone(),
        );

        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::WebRtc(&transport));
        });

        self.after_transport_creation(&transport);

        Ok(transport)
    }

    /// Create a plain transport.
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_plain_transport(
        &self,
        plain_transport_options: PlainTransportOptions,
    ) -> Result<PlainTransport, RequestError> {
        debug!("create_plain_transport()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let transport_id = TransportId::new();
        let data = self
            .inner
            .channel
            .request(RouterCreatePlainTransportRequest {
                internal: TransportInternal {
                    router_id: self.inner.id,
                    transport_id,
                },
                data: RouterCreatePlainTransportData::from_options(&plain_transport_options),
            })
            .await?;

        let transport = PlainTransport::new(
            transport_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            data,
            plain_transport_options.app_data,
            self.clone(),
        );

        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Plain(&transport));
        });

        self.after_transport_creation(&transport);

        Ok(transport)
    }

    /// Create a pipe transport.
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_pipe_transport(
        &self,
        pipe_transport_options: PipeTransportOptions,
    ) -> Result<PipeTransport, RequestError> {
        debug!("create_pipe_transport()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let transport_id = TransportId::new();
        let data = self
            .inner
            .channel
            .request(RouterCreatePipeTransportRequest {
                internal: TransportInternal {
                    router_id: self.inner.id,
                    transport_id,
                },
                data: RouterCreatePipeTransportData::from_options(&pipe_transport_options),
            })
            .await?;

        let transport = PipeTransport::new(
            transport_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            data,
            pipe_transport_options.app_data,
            self.clone(),
        );

        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Pipe(&transport));
        });

        self.after_transport_creation(&transport);

        Ok(transport)
    }

    /// Create an audio level observer.
    pub async fn create_audio_level_observer(
        &self,
        audio_level_observer_options: AudioLevelObserverOptions,
    ) -> Result<AudioLevelObserver, RequestError> {
        debug!("create_audio_level_observer()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let audio_level_observer = AudioLevelObserver::new(
            audio_level_observer_options,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.clone(),
        )
        .await?;

        self.inner.handlers.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::AudioLevel(&audio_level_observer));
        });

        Ok(audio_level_observer)
    }

    /// Create an active speaker observer.
    pub async fn create_active_speaker_observer(
        &self,
        active_speaker_observer_options: ActiveSpeakerObserverOptions,
    ) -> Result<ActiveSpeakerObserver, RequestError> {
        debug!("create_active_speaker_observer()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let active_speaker_observer = ActiveSpeakerObserver::new(
            active_speaker_observer_options,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.clone(),
        )
        .await?;

        self.inner.handlers.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::ActiveSpeaker(&active_speaker_observer));
        });

        Ok(active_speaker_observer)
    }

    /// Check whether the given RTP capabilities can consume the given producer.
    #[must_use]
    pub fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> bool {
        match self.get_producer(producer_id) {
            Some(producer) => {
                match ortc::can_consume(producer.consumable_rtp_parameters(), rtp_capabilities) {
                    Ok(result) => result,
                    Err(error) => {
                        error!("can_consume() | unexpected error: {}", error);
                        false
                    }
                }
            }
            None => {
                error!(
                    "can_consume() | Producer with id \"{}\" not found",
                    producer_id
                );
                false
            }
        }
    }

    /// Pipe the producer with the given id into another router on the same host.
    ///
    /// A pipe transport pair between the two routers is created on demand and reused for
    /// subsequent calls.
    pub async fn pipe_producer_to_router(
        &self,
        producer_id: ProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeProducerToRouterValue, PipeProducerToRouterError> {
        debug!("pipe_producer_to_router()");

        let remote_router_id = pipe_to_router_options.router.id();

        if remote_router_id == self.id() {
            return Err(PipeProducerToRouterError::SameRouter);
        }

        let producer = self
            .get_producer(&producer_id)
            .ok_or(PipeProducerToRouterError::ProducerNotFound(producer_id))?;

        // Only one pipe transport pair per pair of routers: the pair is created under an async
        // mutex so concurrent calls piping to the same router share it.
        let pipe_transport_pair_mutex = self
            .inner
            .mapped_pipe_transports
            .lock()
            .entry(remote_router_id)
            .or_default()
            .clone();

        let mut pipe_transport_pair_guard = pipe_transport_pair_mutex.lock().await;

        let pipe_transport_pair = match pipe_transport_pair_guard.as_ref() {
            Some(pipe_transport_pair) => pipe_transport_pair,
            None => {
                let pair = self
                    .create_pipe_transport_pair(pipe_to_router_options)
                    .await?;
                pipe_transport_pair_guard.replace(pair);
                pipe_transport_pair_guard.as_ref().unwrap()
            }
        };

        let pipe_consumer = pipe_transport_pair
            .local
            .consume(ConsumerOptions::new(producer_id, RtpCapabilities::default()))
            .await?;

        let pipe_producer: Producer = pipe_transport_pair
            .remote
            .produce({
                let mut producer_options = ProducerOptions::new_pipe_transport(
                    producer_id,
                    pipe_consumer.kind(),
                    pipe_consumer.rtp_parameters().clone(),
                );
                producer_options.paused = pipe_consumer.producer_paused();
                producer_options.app_data = producer.app_data().clone();

                producer_options
            })
            .await?;

        // Pipe events from the pipe consumer to the pipe producer.
        pipe_consumer
            .on_pause({
                let executor = Arc::clone(&self.inner.executor);
                let pipe_producer_weak = pipe_producer.downgrade();

                move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                let _ = pipe_producer.pause().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();
        pipe_consumer
            .on_resume({
                let executor = Arc::clone(&self.inner.executor);
                let pipe_producer_weak = pipe_producer.downgrade();

                move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                let _ = pipe_producer.resume().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();

        // Make sure the consumer on the local router outlives the producer on the other router.
        pipe_producer
            .on_close({
                let pipe_consumer = pipe_consumer.clone();

                move || {
                    drop(pipe_consumer);
                }
            })
            .detach();

        // Unless the application extracts the producer, its lifetime follows the pipe consumer:
        // when the origin producer closes, the worker closes the pipe consumer, which drops the
        // remote producer here.
        let pipe_producer = PipedProducer::new(pipe_producer, {
            let pipe_consumer = pipe_consumer.clone();

            move |pipe_producer| {
                pipe_consumer
                    .on_close(move || {
                        drop(pipe_producer);
                    })
                    .detach();
            }
        });

        Ok(PipeProducerToRouterValue {
            pipe_consumer,
            pipe_producer,
        })
    }

    /// Pipe the data producer with the given id into another router on the same host.
    pub async fn pipe_data_producer_to_router(
        &self,
        data_producer_id: DataProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeDataProducerToRouterValue, PipeDataProducerToRouterError> {
        debug!("pipe_data_producer_to_router()");

        let remote_router_id = pipe_to_router_options.router.id();

        if remote_router_id == self.id() {
            return Err(PipeDataProducerToRouterError::SameRouter);
        }

        let data_producer = self.get_data_producer(&data_producer_id).ok_or(
            PipeDataProducerToRouterError::DataProducerNotFound(data_producer_id),
        )?;

        let pipe_transport_pair_mutex = self
            .inner
            .mapped_pipe_transports
            .lock()
            .entry(remote_router_id)
            .or_default()
            .clone();

        let mut pipe_transport_pair_guard = pipe_transport_pair_mutex.lock().await;

        let pipe_transport_pair = match pipe_transport_pair_guard.as_ref() {
            Some(pipe_transport_pair) => pipe_transport_pair,
            None => {
                let pair = self
                    .create_pipe_transport_pair(pipe_to_router_options)
                    .await?;
                pipe_transport_pair_guard.replace(pair);
                pipe_transport_pair_guard.as_ref().unwrap()
            }
        };

        let pipe_data_consumer = pipe_transport_pair
            .local
            .consume_data(DataConsumerOptions::new_sctp(data_producer_id))
            .await?;

        let pipe_data_producer = pipe_transport_pair
            .remote
            .produce_data({
                let mut producer_options = DataProducerOptions::new_pipe_transport(
                    data_producer_id,
                    pipe_data_consumer.sctp_stream_parameters().unwrap(),
                );
                producer_options.label = pipe_data_consumer.label().clone();
                producer_options.protocol = pipe_data_consumer.protocol().clone();
                producer_options.app_data = data_producer.app_data().clone();

                producer_options
            })
            .await?;

        // Make sure the data consumer on the local router outlives the data producer on the
        // other router.
        pipe_data_producer
            .on_close({
                let pipe_data_consumer = pipe_data_consumer.clone();

                move || {
                    drop(pipe_data_consumer);
                }
            })
            .detach();

        Ok(PipeDataProducerToRouterValue {
            pipe_data_consumer,
            pipe_data_producer,
        })
    }

    /// Callback is called when a new transport is created.
    pub fn on_new_transport<F: Fn(NewTransport<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_transport.add(Arc::new(callback))
    }

    /// Callback is called when a new RTP observer is created.
    pub fn on_new_rtp_observer<F: Fn(NewRtpObserver<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_rtp_observer.add(Arc::new(callback))
    }

    /// Callback is called when the worker this router belongs to is closed for whatever reason.
    /// The router itself is also closed.
    pub fn on_worker_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.worker_close.add(Box::new(callback))
    }

    /// Callback is called when the router is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.close.add(Box::new(callback))
    }

    /// Close the router, cascading the closure to every transport and RTP observer. Idempotent.
    pub fn close(&self) {
        self.inner.close(true);
    }

    /// Downgrade to a [`WeakRouter`] that does not prevent closing on drop.
    #[must_use]
    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn worker_closed(&self) {
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.worker_close.call_simple();
            self.inner.close(false);
        }
    }

    async fn create_pipe_transport_pair(
        &self,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeTransportPair, RequestError> {
        let PipeToRouterOptions {
            router,
            listen_ip,
            enable_sctp,
            num_sctp_streams,
            enable_rtx,
            enable_srtp,
        } = pipe_to_router_options;

        let remote_router_id = router.id();

        let transport_options = {
            let mut transport_options = PipeTransportOptions::new(listen_ip);
            transport_options.enable_sctp = enable_sctp;
            transport_options.num_sctp_streams = num_sctp_streams;
            transport_options.enable_rtx = enable_rtx;
            transport_options.enable_srtp = enable_srtp;
            transport_options
        };

        let local_pipe_transport_fut = self.create_pipe_transport(transport_options.clone());
        let remote_pipe_transport_fut = router.create_pipe_transport(transport_options);

        let (local_pipe_transport, remote_pipe_transport) =
            future::try_zip(local_pipe_transport_fut, remote_pipe_transport_fut).await?;

        let local_connect_fut = local_pipe_transport.connect({
            let tuple = remote_pipe_transport.tuple();

            PipeTransportRemoteParameters {
                ip: tuple.local_ip(),
                port: tuple.local_port(),
                srtp_parameters: remote_pipe_transport.srtp_parameters(),
            }
        });

        let remote_connect_fut = remote_pipe_transport.connect({
            let tuple = local_pipe_transport.tuple();

            PipeTransportRemoteParameters {
                ip: tuple.local_ip(),
                port: tuple.local_port(),
                srtp_parameters: local_pipe_transport.srtp_parameters(),
            }
        });

        future::try_zip(local_connect_fut, remote_connect_fut).await?;

        local_pipe_transport
            .on_close({
                let mapped_pipe_transports = Arc::clone(&self.inner.mapped_pipe_transports);

                Box::new(move || {
                    mapped_pipe_transports.lock().remove(&remote_router_id);
                })
            })
            .detach();

        remote_pipe_transport
            .on_close({
                let mapped_pipe_transports = Arc::clone(&self.inner.mapped_pipe_transports);

                Box::new(move || {
                    mapped_pipe_transports.lock().remove(&remote_router_id);
                })
            })
            .detach();

        Ok(PipeTransportPair {
            local: local_pipe_transport,
            remote: remote_pipe_transport,
        })
    }

    fn after_transport_creation<T: Transport>(&self, transport: &T) {
        {
            let producers_weak = Arc::downgrade(&self.inner.producers);
            transport
                .on_new_producer(Box::new(move |producer| {
                    let producer_id = producer.id();
                    if let Some(producers) = producers_weak.upgrade() {
                        producers.lock().insert(producer_id, producer.downgrade());
                    }
                    {
                        let producers_weak = producers_weak.clone();
                        producer
                            .on_close(move || {
                                if let Some(producers) = producers_weak.upgrade() {
                                    producers.lock().remove(&producer_id);
                                }
                            })
                            .detach();
                    }
                }))
                .detach();
        }
        {
            let data_producers_weak = Arc::downgrade(&self.inner.data_producers);
            transport
                .on_new_data_producer(Box::new(move |data_producer| {
                    let data_producer_id = data_producer.id();
                    if let Some(data_producers) = data_producers_weak.upgrade() {
                        data_producers
                            .lock()
                            .insert(data_producer_id, data_producer.downgrade());
                    }
                    {
                        let data_producers_weak = data_producers_weak.clone();
                        data_producer
                            .on_close(move || {
                                if let Some(data_producers) = data_producers_weak.upgrade() {
                                    data_producers.lock().remove(&data_producer_id);
                                }
                            })
                            .detach();
                    }
                }))
                .detach();
        }
    }

    pub(crate) fn has_producer(&self, producer_id: &ProducerId) -> bool {
        self.inner.producers.lock().contains_key(producer_id)
    }

    pub(crate) fn get_producer(&self, producer_id: &ProducerId) -> Option<Producer> {
        self.inner.producers.lock().get(producer_id)?.upgrade()
    }

    pub(crate) fn has_data_producer(&self, data_producer_id: &DataProducerId) -> bool {
        self.inner
            .data_producers
            .lock()
            .contains_key(data_producer_id)
    }

    pub(crate) fn get_data_producer(
        &self,
        data_producer_id: &DataProducerId,
    ) -> Option<DataProducer> {
        self.inner
            .data_producers
            .lock()
            .get(data_producer_id)?
            .upgrade()
    }
}

/// [`WeakRouter`] doesn't keep the router alive and will not prevent it from being closed once
/// the last [`Router`] instance is dropped.
#[derive(Clone)]
pub struct WeakRouter {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRouter").finish()
    }
}

impl WeakRouter {
    /// Attempts to upgrade to a [`Router`] if the last instance was not dropped yet.
    #[must_use]
    pub fn upgrade(&self) -> Option<Router> {
        let inner = self.inner.upgrade()?;

        Some(Router { inner })
    }
}
