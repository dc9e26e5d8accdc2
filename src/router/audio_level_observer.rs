//! An audio level observer monitors the volume of the selected audio producers.

use crate::data_structures::AppData;
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    RouterCreateAudioLevelObserverData, RouterCreateAudioLevelObserverRequest, RtpObserverCloseRequest,
    RtpObserverAddProducerRequest, RtpObserverInternal, RtpObserverPauseRequest,
    RtpObserverProducerInternal, RtpObserverRemoveProducerRequest, RtpObserverResumeRequest,
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

/// [`AudioLevelObserver`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AudioLevelObserverOptions {
    /// Maximum number of entries in the `volumes` event. Default 1.
    pub max_entries: u16,
    /// Minimum average volume (in dBvo from -127 to 0) for entries in the `volumes` event.
    /// Default -80.
    pub threshold: i8,
    /// Interval in ms for checking audio volumes. Default 1000.
    pub interval: u16,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for AudioLevelObserverOptions {
    fn default() -> Self {
        Self {
            max_entries: 1,
            threshold: -80,
            interval: 1000,
            app_data: AppData::default(),
        }
    }
}

/// One entry of a `volumes` event.
#[derive(Debug, Clone)]
pub struct AudioLevelObserverVolume {
    /// The producer of the audio stream.
    pub producer: Producer,
    /// The average volume (in dBvo from -127 to 0) of the stream in the last interval.
    pub volume: i8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeEntry {
    producer_id: ProducerId,
    volume: i8,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Volumes(Vec<VolumeEntry>),
    Silence,
}

#[derive(Default)]
struct Handlers {
    volumes: Bag<dyn Fn(&[AudioLevelObserverVolume]) + Send + Sync>,
    silence: Bag<dyn Fn() + Send + Sync>,
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
                            error!("audio level observer closing failed: {}", error);
                        }
                    })
                    .detach();
            }
        }
    }
}

/// RTP observer that periodically reports the loudest audio producers.
#[derive(Clone)]
#[must_use = "Audio level observer will be closed on drop, make sure to keep it around for as long as needed"]
pub struct AudioLevelObserver {
    inner: Arc<Inner>,
}

impl fmt::Debug for AudioLevelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioLevelObserver")
            .field("id", &self.inner.id)
            .field("paused", &self.inner.paused)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl AudioLevelObserver {
    pub(super) async fn new(
        audio_level_observer_options: AudioLevelObserverOptions,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        router: Router,
    ) -> Result<Self, RequestError> {
        debug!("new()");

        let AudioLevelObserverOptions {
            max_entries,
            threshold,
            interval,
            app_data,
        } = audio_level_observer_options;

        let rtp_observer_id = RtpObserverId::new();

        channel
            .request(RouterCreateAudioLevelObserverRequest {
                internal: RtpObserverInternal {
                    router_id: router.id(),
                    rtp_observer_id,
                },
                data: RouterCreateAudioLevelObserverData {
                    max_entries,
                    threshold,
                    interval,
                },
            })
            .await?;

        let handlers = Arc::<Handlers>::default();

        let subscription_handler = channel.subscribe_to_notifications(rtp_observer_id.into(), {
            let handlers = Arc::clone(&handlers);
            let router = router.clone();

            move |notification| {
                match serde_json::from_value::<Notification>(notification.clone()) {
                    Ok(notification) => match notification {
                        Notification::Volumes(volume_entries) => {
                            let volumes: Vec<AudioLevelObserverVolume> = volume_entries
                                .into_iter()
                                .filter_map(|entry| {
                                    Some(AudioLevelObserverVolume {
                                        producer: router.get_producer(&entry.producer_id)?,
                                        volume: entry.volume,
                                    })
                                })
                                .collect();

                            handlers.volumes.call(|callback| {
                                callback(&volumes);
                            });
                        }
                        Notification::Silence => {
                            handlers.silence.call_simple();
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

    /// Callback is called at most every interval with the audio producers whose volume crossed
    /// the threshold, ordered by volume.
    pub fn on_volumes<F: Fn(&[AudioLevelObserverVolume]) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.volumes.add(Arc::new(callback))
    }

    /// Callback is called when no one of the monitored producers crossed the threshold during
    /// the whole interval.
    pub fn on_silence<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.silence.add(Arc::new(callback))
    }
}

#[async_trait]
impl RtpObserver for AudioLevelObserver {
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
