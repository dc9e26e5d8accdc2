//! The most commonly used types, re-exported for convenience.
//!
//! ```rust
//! use sfu_control::prelude::*;
//! ```

pub use crate::active_speaker_observer::{
    ActiveSpeakerObserver, ActiveSpeakerObserverDominantSpeaker, ActiveSpeakerObserverOptions,
};
pub use crate::audio_level_observer::{
    AudioLevelObserver, AudioLevelObserverOptions, AudioLevelObserverVolume,
};
pub use crate::consumer::{
    Consumer, ConsumerId, ConsumerLayers, ConsumerOptions, ConsumerScore, ConsumerType,
};
pub use crate::data_consumer::{
    DataConsumer, DataConsumerId, DataConsumerOptions, DataConsumerType,
};
pub use crate::data_producer::{
    DataProducer, DataProducerId, DataProducerOptions, DataProducerType,
};
pub use crate::data_structures::{
    AppData, DtlsParameters, DtlsState, IceParameters, IceState, SctpState, TransportListenIp,
    TransportTuple, WebRtcMessage,
};
pub use crate::direct_transport::{DirectTransport, DirectTransportOptions};
pub use crate::pipe_transport::{
    PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters,
};
pub use crate::plain_transport::{
    PlainTransport, PlainTransportOptions, PlainTransportRemoteParameters,
};
pub use crate::producer::{
    Producer, ProducerId, ProducerOptions, ProducerScore, ProducerType, WeakProducer,
};
pub use crate::router::{
    NewRtpObserver, NewTransport, PipeToRouterOptions, Router, RouterId, RouterOptions,
};
pub use crate::rtp_observer::{RtpObserver, RtpObserverAddProducerOptions, RtpObserverId};
pub use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtcpParameters,
    RtpCapabilities, RtpCapabilitiesFinalized, RtpCodecCapability, RtpCodecParameters,
    RtpCodecParametersParameters, RtpEncodingParameters, RtpHeaderExtension, RtpParameters,
};
pub use crate::sctp_parameters::{NumSctpStreams, SctpParameters, SctpStreamParameters};
pub use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
pub use crate::transport::{Transport, TransportId};
pub use crate::webrtc_transport::{
    WebRtcTransport, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};
pub use crate::worker::{
    RequestError, Worker, WorkerDtlsFiles, WorkerId, WorkerLogLevel, WorkerLogTag, WorkerSettings,
};
pub use crate::worker_manager::WorkerManager;
pub use crate::HandlerId;
