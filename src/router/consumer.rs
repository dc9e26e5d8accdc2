//! A consumer represents an audio or video stream being forwarded from a producer to an
//! endpoint. It is created on top of a transport that defines how the media packets are carried.

use crate::data_structures::{AppData, EventDirection};
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    ConsumerCloseRequest, ConsumerDumpRequest, ConsumerEnableTraceEventData,
    ConsumerEnableTraceEventRequest, ConsumerGetStatsRequest, ConsumerInternal,
    ConsumerPauseRequest, ConsumerRequestKeyFrameRequest, ConsumerResumeRequest,
    ConsumerSetPriorityData, ConsumerSetPriorityRequest, ConsumerSetPreferredLayersRequest,
};
use crate::producer::{ProducerId, ProducerStat, ProducerType};
use crate::rtp_parameters::{MediaKind, RtpParameters};
use crate::transport::Transport;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use bytes::Bytes;
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// [`Consumer`] identifier.
    ConsumerId
);

/// Spatial/temporal layers of a simulcast or SVC consumer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    /// The spatial layer index (from 0 to N).
    pub spatial_layer: u8,
    /// The temporal layer index (from 0 to N).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_layer: Option<u8>,
}

/// Score of the consumer and its producer.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerScore {
    /// Score of the RTP stream of the consumer (from 0 to 10).
    pub score: u8,
    /// Score of the currently selected RTP stream of the producer.
    pub producer_score: u8,
    /// The scores of all RTP streams in the producer, ordered by encoding. Just useful when the
    /// producer uses simulcast.
    #[serde(default)]
    pub producer_scores: Vec<u8>,
}

/// [`Consumer`] options.
#[derive(Debug)]
#[non_exhaustive]
pub struct ConsumerOptions {
    /// The id of the producer to consume.
    pub producer_id: ProducerId,
    /// RTP capabilities of the consuming endpoint.
    pub rtp_capabilities: crate::rtp_parameters::RtpCapabilities,
    /// Whether the consumer must start in paused mode. Default false.
    ///
    /// When creating a video consumer it is recommended to set this to true, transmit the
    /// consumer parameters to the consuming endpoint and, once the endpoint created its local
    /// consumer, resume the server side one. Otherwise the first key frame may arrive before the
    /// endpoint is ready to render it.
    pub paused: bool,
    /// Preferred spatial and temporal layer for simulcast or SVC media sources. If unset, the
    /// highest ones are selected.
    pub preferred_layers: Option<ConsumerLayers>,
    /// Custom application data.
    pub app_data: AppData,
}

impl ConsumerOptions {
    pub fn new(
        producer_id: ProducerId,
        rtp_capabilities: crate::rtp_parameters::RtpCapabilities,
    ) -> Self {
        Self {
            producer_id,
            rtp_capabilities,
            paused: false,
            preferred_layers: None,
            app_data: AppData::default(),
        }
    }
}

/// Consumer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    /// A single RTP stream is forwarded with no spatial/temporal layers.
    Simple,
    /// The producer uses simulcast; layer selection is possible.
    Simulcast,
    /// The producer uses SVC; layer selection is possible.
    Svc,
    /// All RTP streams of the producer are forwarded verbatim (pipe transports only).
    Pipe,
}

impl From<ProducerType> for ConsumerType {
    fn from(producer_type: ProducerType) -> Self {
        match producer_type {
            ProducerType::Simple => ConsumerType::Simple,
            ProducerType::Simulcast => ConsumerType::Simulcast,
            ProducerType::Svc => ConsumerType::Svc,
        }
    }
}

/// Types of consumer 'trace' events.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerTraceEventType {
    /// RTP packet.
    Rtp,
    /// RTP video keyframe packet.
    KeyFrame,
    /// RTCP NACK packet.
    Nack,
    /// RTCP PLI packet.
    Pli,
    /// RTCP FIR packet.
    Fir,
}

/// 'trace' event data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerTraceEventData {
    /// Trace type.
    pub r#type: ConsumerTraceEventType,
    /// Event timestamp.
    pub timestamp: u64,
    /// Event direction.
    pub direction: EventDirection,
    /// Per type information.
    pub info: Value,
}

/// RTC statistics of the consumer; the worker may also include the stats of the associated
/// producer stream.
pub type ConsumerStat = ProducerStat;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct ConsumerDump {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub r#type: ConsumerType,
    pub paused: bool,
    pub producer_paused: bool,
    pub priority: u8,
    pub rtp_parameters: RtpParameters,
    #[serde(default)]
    pub supported_codec_payload_types: Vec<u8>,
    #[serde(default)]
    pub trace_event_types: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    ProducerClose,
    ProducerPause,
    ProducerResume,
    Score(ConsumerScore),
    LayersChange(Option<ConsumerLayers>),
    Trace(ConsumerTraceEventData),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum PayloadNotification {
    Rtp,
}

#[derive(Default)]
struct Handlers {
    rtp: Bag<dyn Fn(&Bytes) + Send + Sync>,
    pause: Bag<dyn Fn() + Send + Sync>,
    resume: Bag<dyn Fn() + Send + Sync>,
    producer_pause: Bag<dyn Fn() + Send + Sync>,
    producer_resume: Bag<dyn Fn() + Send + Sync>,
    score: Bag<dyn Fn(&ConsumerScore) + Send + Sync>,
    layers_change: Bag<dyn Fn(&Option<ConsumerLayers>) + Send + Sync>,
    trace: Bag<dyn Fn(&ConsumerTraceEventData) + Send + Sync>,
    producer_close: BagOnce<dyn FnOnce() + Send>,
    transport_close: BagOnce<dyn FnOnce() + Send>,
    close: BagOnce<dyn FnOnce() + Send>,
}

#[derive(Debug, Default)]
struct PausedState {
    paused: bool,
    producer_paused: bool,
}

impl PausedState {
    fn effective(&self) -> bool {
        self.paused || self.producer_paused
    }
}

struct Inner {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    r#type: ConsumerType,
    rtp_parameters: RtpParameters,
    paused_state: Mutex<PausedState>,
    priority: Mutex<u8>,
    score: Arc<Mutex<ConsumerScore>>,
    preferred_layers: Mutex<Option<ConsumerLayers>>,
    current_layers: Arc<Mutex<Option<ConsumerLayers>>>,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    handlers: Arc<Handlers>,
    app_data: AppData,
    transport: Arc<dyn Transport>,
    closed: Arc<AtomicBool>,
    // Drop subscriptions to consumer-specific notifications when the consumer is dropped
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
                let request = ConsumerCloseRequest {
                    internal: ConsumerInternal {
                        router_id: self.transport.router().id(),
                        transport_id: self.transport.id(),
                        consumer_id: self.id,
                        producer_id: self.producer_id,
                    },
                };

                self.executor
                    .spawn(async move {
                        if let Err(error) = channel.request(request).await {
                            error!("consumer closing failed: {}", error);
                        }
                    })
                    .detach();
            }
        }
    }
}

/// The handle to an outbound RTP stream toward an endpoint.
///
/// The effective paused state is `paused OR producer_paused`; [`Consumer::on_pause`] and
/// [`Consumer::on_resume`] fire only on transitions of the effective value.
#[derive(Clone)]
#[must_use = "Consumer will be closed on drop, make sure to keep it around for as long as needed"]
pub struct Consumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.inner.id)
            .field("producer_id", &self.inner.producer_id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("paused_state", &self.inner.paused_state)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        r#type: ConsumerType,
        rtp_parameters: RtpParameters,
        paused: bool,
        producer_paused: bool,
        score: ConsumerScore,
        preferred_layers: Option<ConsumerLayers>,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        transport: Arc<dyn Transport>,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let score = Arc::new(Mutex::new(score));
        let current_layers = Arc::<Mutex<Option<ConsumerLayers>>>::default();
        let closed = Arc::new(AtomicBool::new(false));
        let paused_state = Mutex::new(PausedState {
            paused,
            producer_paused,
        });

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        let subscription_handler = channel.subscribe_to_notifications(id.into(), {
            let handlers = Arc::clone(&handlers);
            let score = Arc::clone(&score);
            let current_layers = Arc::clone(&current_layers);
            let closed = Arc::clone(&closed);
            let inner_weak = Arc::clone(&inner_weak);

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(notification) => match notification {
                        Notification::ProducerClose => {
                            if !closed.swap(true, Ordering::SeqCst) {
                                handlers.producer_close.call_simple();
                                handlers.close.call_simple();
                            }
                        }
                        Notification::ProducerPause => {
                            let became_paused = {
                                let maybe_inner =
                                    inner_weak.lock().as_ref().and_then(Weak::upgrade);
                                match maybe_inner {
                                    Some(inner) => {
                                        let mut state = inner.paused_state.lock();
                                        if state.producer_paused {
                                            return;
                                        }
                                        let was_paused = state.effective();
                                        state.producer_paused = true;
                                        !was_paused
                                    }
                                    None => return,
                                }
                            };

                            handlers.producer_pause.call_simple();
                            if became_paused {
                                handlers.pause.call_simple();
                            }
                        }
                        Notification::ProducerResume => {
                            let became_resumed = {
                                let maybe_inner =
                                    inner_weak.lock().as_ref().and_then(Weak::upgrade);
                                match maybe_inner {
                                    Some(inner) => {
                                        let mut state = inner.paused_state.lock();
                                        if !state.producer_paused {
                                            return;
                                        }
                                        let was_paused = state.effective();
                                        state.producer_paused = false;
                                        was_paused && !state.effective()
                                    }
                                    None => return,
                                }
                            };

                            handlers.producer_resume.call_simple();
                            if became_resumed {
                                handlers.resume.call_simple();
                            }
                        }
                        Notification::Score(consumer_score) => {
                            *score.lock() = consumer_score.clone();
                            handlers.score.call(|callback| {
                                callback(&consumer_score);
                            });
                        }
                        Notification::LayersChange(layers) => {
                            *current_layers.lock() = layers;
                            handlers.layers_change.call(|callback| {
                                callback(&layers);
                            });
                        }
                        Notification::Trace(trace_event_data) => {
                            handlers.trace.call(|callback| {
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

        let payload_subscription_handler = payload_channel.subscribe_to_notifications(id.into(), {
            let handlers = Arc::clone(&handlers);
            let closed = Arc::clone(&closed);

            move |notification_message| {
                let message = &notification_message.message;
                match serde_json::from_value::<PayloadNotification>(message.clone()) {
                    Ok(PayloadNotification::Rtp) => {
                        if closed.load(Ordering::SeqCst) {
                            return;
                        }
                        handlers.rtp.call(|callback| {
                            callback(&notification_message.payload);
                        });
                    }
                    Err(error) => {
                        error!("Failed to parse payload notification: {}", error);
                    }
                }
            }
        });

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
            producer_id,
            kind,
            r#type,
            rtp_parameters,
            paused_state,
            priority: Mutex::new(1_u8),
            score,
            preferred_layers: Mutex::new(preferred_layers),
            current_layers,
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

    /// Consumer identifier.
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// The id of the producer being consumed.
    #[must_use]
    pub fn producer_id(&self) -> ProducerId {
        self.inner.producer_id
    }

    /// Transport the consumer belongs to.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Media kind.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Consumer RTP parameters.
    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    /// Consumer type.
    #[must_use]
    pub fn r#type(&self) -> ConsumerType {
        self.inner.r#type
    }

    /// Whether the consumer is paused by the application.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.paused_state.lock().paused
    }

    /// Whether the associated producer is paused.
    #[must_use]
    pub fn producer_paused(&self) -> bool {
        self.inner.paused_state.lock().producer_paused
    }

    /// Current priority.
    #[must_use]
    pub fn priority(&self) -> u8 {
        *self.inner.priority.lock()
    }

    /// Consumer score.
    #[must_use]
    pub fn score(&self) -> ConsumerScore {
        self.inner.score.lock().clone()
    }

    /// Preferred spatial/temporal layers.
    #[must_use]
    pub fn preferred_layers(&self) -> Option<ConsumerLayers> {
        *self.inner.preferred_layers.lock()
    }

    /// Currently selected spatial/temporal layers. Just for video with simulcast or SVC.
    #[must_use]
    pub fn current_layers(&self) -> Option<ConsumerLayers> {
        *self.inner.current_layers.lock()
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the consumer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump the consumer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<ConsumerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerDumpRequest {
                internal: self.get_internal(),
            })
            .await
    }

    /// Returns current RTC statistics of the consumer.
    pub async fn get_stats(&self) -> Result<Vec<ConsumerStat>, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerGetStatsRequest {
                internal: self.get_internal(),
            })
            .await
    }

    /// Pause the consumer (no RTP is sent to the consuming endpoint).
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerPauseRequest {
                internal: self.get_internal(),
            })
            .await?;

        let became_paused = {
            let mut state = self.inner.paused_state.lock();
            let was_paused = state.effective();
            state.paused = true;
            !was_paused
        };

        if became_paused {
            self.inner.handlers.pause.call_simple();
        }

        Ok(())
    }

    /// Resume the consumer. RTP resumes only if the associated producer is not paused as well.
    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerResumeRequest {
                internal: self.get_internal(),
            })
            .await?;

        let became_resumed = {
            let mut state = self.inner.paused_state.lock();
            let was_paused = state.effective();
            state.paused = false;
            was_paused && !state.effective()
        };

        if became_resumed {
            self.inner.handlers.resume.call_simple();
        }

        Ok(())
    }

    /// Set preferred spatial/temporal layers. Just for simulcast and SVC consumers.
    pub async fn set_preferred_layers(
        &self,
        consumer_layers: ConsumerLayers,
    ) -> Result<(), RequestError> {
        debug!("set_preferred_layers()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let preferred_layers = self
            .inner
            .channel
            .request(ConsumerSetPreferredLayersRequest {
                internal: self.get_internal(),
                data: consumer_layers,
            })
            .await?;

        *self.inner.preferred_layers.lock() = preferred_layers;

        Ok(())
    }

    /// Set the priority the worker uses to distribute available outgoing bitrate among
    /// consumers. 1 is the lowest.
    pub async fn set_priority(&self, priority: u8) -> Result<(), RequestError> {
        debug!("set_priority()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let response = self
            .inner
            .channel
            .request(ConsumerSetPriorityRequest {
                internal: self.get_internal(),
                data: ConsumerSetPriorityData { priority },
            })
            .await?;

        *self.inner.priority.lock() = response.priority;

        Ok(())
    }

    /// Reset the priority back to its default value.
    pub async fn unset_priority(&self) -> Result<(), RequestError> {
        debug!("unset_priority()");

        self.set_priority(1).await
    }

    /// Request a key frame from the producer's endpoint. Just for video consumers.
    pub async fn request_key_frame(&self) -> Result<(), RequestError> {
        debug!("request_key_frame()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerRequestKeyFrameRequest {
                internal: self.get_internal(),
            })
            .await
    }

    /// Instructs the consumer to emit 'trace' events. For monitoring purposes.
    pub async fn enable_trace_event(
        &self,
        types: Vec<ConsumerTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(ConsumerEnableTraceEventRequest {
                internal: self.get_internal(),
                data: ConsumerEnableTraceEventData { types },
            })
            .await
    }

    /// Callback is called on consumers of a direct transport when an RTP packet arrives.
    pub fn on_rtp<F: Fn(&Bytes) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.rtp.add(Arc::new(callback))
    }

    /// Callback is called when the effective paused state transitions to paused.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.pause.add(Arc::new(callback))
    }

    /// Callback is called when the effective paused state transitions to resumed.
    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.resume.add(Arc::new(callback))
    }

    /// Callback is called when the associated producer is paused.
    pub fn on_producer_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_pause.add(Arc::new(callback))
    }

    /// Callback is called when the associated producer is resumed.
    pub fn on_producer_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_resume.add(Arc::new(callback))
    }

    /// Callback is called when the consumer score changes.
    pub fn on_score<F: Fn(&ConsumerScore) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.score.add(Arc::new(callback))
    }

    /// Callback is called when the currently selected layers change. Just for video with
    /// simulcast or SVC.
    pub fn on_layers_change<F: Fn(&Option<ConsumerLayers>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.layers_change.add(Arc::new(callback))
    }

    /// See [`Consumer::enable_trace_event`].
    pub fn on_trace<F: Fn(&ConsumerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.trace.add(Arc::new(callback))
    }

    /// Callback is called when the associated producer is closed for whatever reason. The
    /// consumer itself is also closed.
    pub fn on_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_close.add(Box::new(callback))
    }

    /// Callback is called when the transport this consumer belongs to is closed for whatever
    /// reason. The consumer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Callback is called when the consumer is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.close.add(Box::new(callback))
    }

    /// Close the consumer. Idempotent.
    pub fn close(&self) {
        self.inner.close(true);
    }

    /// Downgrade to a [`WeakConsumer`] that does not prevent closing on drop.
    #[must_use]
    pub fn downgrade(&self) -> WeakConsumer {
        WeakConsumer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn get_internal(&self) -> ConsumerInternal {
        ConsumerInternal {
            router_id: self.inner.transport.router().id(),
            transport_id: self.inner.transport.id(),
            consumer_id: self.inner.id,
            producer_id: self.inner.producer_id,
        }
    }
}

/// [`WeakConsumer`] doesn't keep the consumer alive on the worker and will not prevent it from
/// being closed once the last [`Consumer`] instance is dropped.
#[derive(Clone)]
pub struct WeakConsumer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConsumer").finish()
    }
}

impl WeakConsumer {
    /// Attempts to upgrade to a [`Consumer`] if the last instance was not dropped yet.
    #[must_use]
    pub fn upgrade(&self) -> Option<Consumer> {
        let inner = self.inner.upgrade()?;

        Some(Consumer { inner })
    }
}
