//! An active speaker observer monitors the selected audio producers and reports the dominant
//! speaker, following the dominant speaker identification algorithm of the worker.

use crate::data_structures::AppData;
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    RouterCreateActiveSpeakerObserverData, RouterCreateActiveSpeakerObserverRequest,
    RtpObserverAddProducerRequest, RtpObserverCloseRequest, RtpObserverInternal,
    RtpObserverPauseRequest, RtpObserverProducerInternal, RtpObserverRemoveProducerRequest,
    RtpObserverResumeRequest,
};
use crate::producer::{Producer, ProducerId};
use crate::router::Router;
use crate::rtp_observer::{RtpObserver, RtpObserverAddProducerOptions, RtpObserverId};
use crate::worker::{Channel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use async_trait::async_trait;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// [`ActiveSpeakerObserver`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ActiveSpeakerObserverOptions {
    /// Interval in ms for checking the audio volumes. Default 300.
    pub interval: u16,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for ActiveSpeakerObserverOptions {
    fn default() -> Self {
        Self {
            interval: 300,
            app_data: AppData::default(),
        }
    }
}

/// Payload of a `dominantspeaker` event.
#[derive(Debug, Clone)]
pub struct ActiveSpeakerObserverDominantSpeaker {
    /// The producer of the dominant audio stream.
    pub producer: Producer,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DominantSpeakerEntry {
    producer_id: ProducerId,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    DominantSpeaker(DominantSpeakerEntry),
}

#[derive(Default)]
struct Handlers {
    dominant_speaker: Bag<dyn Fn(&ActiveSpeakerObserverDominantSpeaker) + Send + Sync>,
    pause: Bag<dyn Fn() + Send + Sync>,
    resume: Bag<dyn Fn() + Send + Sync>,
    add_producer: Bag<dyn Fn(&Producer) + Send + Sync>,
    remove_producer: Bag<dyn Fn(&Producer) + Send + Sync>,
    router_close: BagOnce<dyn FnOnce() + Send>,
    close: BagOnce<dyn FnOnce() + Send>,
}

struct Inner {
    id: RtpObserverId,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    handlers: Arc<Handlers>,
    app_data: AppData,
    router: Router,
    paused: AtomicBool,
    closed: AtomicBool,
    _subscription_handler: Mutex<Option<SubscriptionHandler>>,
    _on_router_close_handler: Mutex<HandlerId>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close(true);
    }
}

impl Inner {
    fn internal(&self) -> RtpObserverInternal {
        RtpObserverInternal {
            router_id: self.router.id(),
            rtp_observer_id: self.id,
        }
    }

    fn close(&self, close_request: bool) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.handlers.close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = RtpObserverCloseRequest {
                    internal: self.internal(),
                };

                self.executor
                    .spawn(async move {
                        if let Err(error) = channel.request(request).await {
                            error!("active speaker observer closing failed: {}", error);
                        }
                    })
                    .detach();
            }
        }
    }
}

/// RTP observer that reports the dominant speaker among the monitored audio producers.
#[derive(Clone)]
#[must_use = "Active speaker observer will be closed on drop, make sure to keep it around for as long as needed"]
pub struct ActiveSpeakerObserver {
    inner: Arc<Inner>,
}

impl fmt::Debug for ActiveSpeakerObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpeakerObserver")
            .field("id", &self.inner.id)
            .field("paused", &self.inner.paused)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl ActiveSpeakerObserver {
    pub(super) async fn new(
        active_speaker_observer_options: ActiveSpeakerObserverOptions,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        router: Router,
    ) -> Result<Self, RequestError> {
        debug!("new()");

        let ActiveSpeakerObserverOptions { interval, app_data } = active_speaker_observer_options;

        let rtp_observer_id = RtpObserverId::new();

        channel
            .request(RouterCreateActiveSpeakerObserverRequest {
                internal: RtpObserverInternal {
                    router_id: router.id(),
                    rtp_observer_id,
                },
                data: RouterCreateActiveSpeakerObserverData { interval },
            })
            .await?;

        let handlers = Arc::<Handlers>::default();

        let subscription_handler = channel.subscribe_to_notifications(rtp_observer_id.into(), {
            let handlers = Arc::clone(&handlers);
            let router = router.clone();

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(Notification::DominantSpeaker(entry)) => {
                        if let Some(producer) = router.get_producer(&entry.producer_id) {
                            let dominant_speaker =
                                ActiveSpeakerObserverDominantSpeaker { producer };
                            handlers.dominant_speaker.call(|callback| {
                                callback(&dominant_speaker);
                            });
                        }
                    }
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
                    inner.handlers.router_close.call_simple();
                    inner.close(false);
                }
            }
        });

        let inner = Arc::new(Inner {
            id: rtp_observer_id,
            executor,
            channel,
            handlers,
            app_data,
            router,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            _subscription_handler: Mutex::new(Some(subscription_handler)),
            _on_router_close_handler: Mutex::new(on_router_close_handler),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Ok(Self { inner })
    }

    /// Router the RTP observer belongs to.
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Callback is called when the dominant speaker changes.
    pub fn on_dominant_speaker<
        F: Fn(&ActiveSpeakerObserverDominantSpeaker) + Send + Sync + 'static,
    >(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.dominant_speaker.add(Arc::new(callback))
    }
}

#[async_trait]
impl RtpObserver for ActiveSpeakerObserver {
    fn id(&self) -> RtpObserverId {
        self.inner.id
    }

    fn paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(RtpObserverPauseRequest {
                internal: self.inner.internal(),
            })
            .await?;

        let was_paused = self.inner.paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.inner.handlers.pause.call_simple();
        }

        Ok(())
    }

    async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(RtpObserverResumeRequest {
                internal: self.inner.internal(),
            })
            .await?;

        let was_paused = self.inner.paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.inner.handlers.resume.call_simple();
        }

        Ok(())
    }

    async fn add_producer(
        &self,
        rtp_observer_add_producer_options: RtpObserverAddProducerOptions,
    ) -> Result<(), RequestError> {
        debug!("add_producer()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let producer_id = rtp_observer_add_producer_options.producer_id;

        self.inner
            .channel
            .request(RtpObserverAddProducerRequest {
                internal: RtpObserverProducerInternal {
                    router_id: self.inner.router.id(),
                    rtp_observer_id: self.inner.id,
                    producer_id,
                },
            })
            .await?;

        if let Some(producer) = self.inner.router.get_producer(&producer_id) {
            self.inner.handlers.add_producer.call(|callback| {
                callback(&producer);
            });
        }

        Ok(())
    }

    async fn remove_producer(&self, producer_id: ProducerId) -> Result<(), RequestError> {
        debug!("remove_producer()");

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        self.inner
            .channel
            .request(RtpObserverRemoveProducerRequest {
                internal: RtpObserverProducerInternal {
                    router_id: self.inner.router.id(),
                    rtp_observer_id: self.inner.id,
                    producer_id,
                },
            })
            .await?;

        if let Some(producer) = self.inner.router.get_producer(&producer_id) {
            self.inner.handlers.remove_producer.call(|callback| {
                callback(&producer);
            });
        }

        Ok(())
    }

    fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync>) -> HandlerId {
        self.inner.handlers.pause.add(Arc::from(callback))
    }

    fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync>) -> HandlerId {
        self.inner.handlers.resume.add(Arc::from(callback))
    }

    fn on_add_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId {
        self.inner.handlers.add_producer.add(Arc::from(callback))
    }

    fn on_remove_producer(&self, callback: Box<dyn Fn(&Producer) + Send + Sync>) -> HandlerId {
        self.inner.handlers.remove_producer.add(Arc::from(callback))
    }

    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId {
        self.inner.handlers.router_close.add(callback)
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) -> HandlerId {
        self.inner.handlers.close.add(callback)
    }

    fn close(&self) {
        self.inner.close(true);
    }
}
