//! Shared contract of RTP observers, which monitor the streams of the producers they are fed
//! with and emit events about them.

use crate::data_structures::AppData;
use crate::event_handlers::HandlerId;
use crate::producer::{Producer, ProducerId};
use crate::uuid_based_wrapper_type;
use crate::worker::RequestError;
use async_trait::async_trait;
use std::fmt::Debug;

uuid_based_wrapper_type!(
    /// [`RtpObserver`] identifier.
    RtpObserverId
);

/// Options for adding a producer to an RTP observer.
#[derive(Debug, Copy, Clone)]
pub struct RtpObserverAddProducerOptions {
    /// The id of the producer to be observed.
    pub producer_id: ProducerId,
}

impl RtpObserverAddProducerOptions {
    #[must_use]
    pub fn new(producer_id: ProducerId) -> Self {
        Self { producer_id }
    }
}

/// An RTP observer inspects the media received by a set of selected producers.
#[async_trait]
pub trait RtpObserver: Debug + Send + Sync {
    /// RTP observer id.
    fn id(&self) -> RtpObserverId;

    /// Whether the RTP observer is paused.
    fn paused(&self) -> bool;

    /// Custom application data.
    fn app_data(&self) -> &AppData;

    /// Whether the RTP observer is closed.
    fn closed(&self) -> bool;

    /// Pause the RTP observer. No events are emitted until `resume()` is called.
    async fn pause(&self) -> Result<(), RequestError>;

    /// Resume the RTP observer.
    async fn resume(&self) -> Result<(), RequestError>;

    /// Provide the RTP observer with a new producer to monitor.
    async fn add_producer(
        &self,
        rtp_observer_add_producer_options: RtpObserverAddProducerOptions,
    ) -> Result<(), RequestError>;

    /// Remove the given producer from the RTP observer.
    async fn remove_producer(&self, producer_id: ProducerId) -> Result<(), RequestError>;

    /// Callback is called when the RTP observer is paused.
    fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync>) -> HandlerId;

    /// Callback is called when the RTP observer is resumed.
    fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync>) -> HandlerId;

    /// Callback is called when a producer is added to the RTP observer.
    fn on_add_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId;

    /// Callback is called when a producer is removed from the RTP observer.
    fn on_remove_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId;

    /// Callback is called when the router this RTP observer belongs to is closed for whatever
    /// reason. The RTP observer itself is also closed.
    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId;

    /// Callback is called when the RTP observer is closed for whatever reason.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId;

    /// Close the RTP observer. Idempotent.
    fn close(&self);
}
