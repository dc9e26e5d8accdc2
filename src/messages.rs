//! Typed registry of every request and notification exchanged with the worker.

use crate::consumer::{ConsumerDump, ConsumerId, ConsumerLayers, ConsumerScore, ConsumerStat, ConsumerType};
use crate::data_consumer::{DataConsumerDump, DataConsumerId, DataConsumerStat, DataConsumerType};
use crate::data_producer::{DataProducerDump, DataProducerId, DataProducerStat, DataProducerType};
use crate::data_structures::{DtlsParameters, DtlsRole, TransportListenIp, TransportTuple};
use crate::direct_transport::DirectTransportOptions;
use crate::ortc::RtpMapping;
use crate::pipe_transport::PipeTransportOptions;
use crate::plain_transport::PlainTransportOptions;
use crate::producer::{ProducerDump, ProducerId, ProducerStat, ProducerTraceEventType, ProducerType};
use crate::router::{RouterDump, RouterId};
use crate::rtp_observer::RtpObserverId;
use crate::rtp_parameters::{MediaKind, RtpEncodingParameters, RtpParameters};
use crate::sctp_parameters::{NumSctpStreams, SctpStreamParameters};
use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
use crate::transport::{TransportDump, TransportId, TransportStat, TransportTraceEventType};
use crate::webrtc_transport::WebRtcTransportOptions;
use crate::worker::{WorkerDump, WorkerResourceUsage, WorkerUpdateSettings};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub(crate) trait Request: Debug + Serialize {
    type Response: DeserializeOwned;

    fn as_method(&self) -> &'static str;
}

/// A one-way message on the payload channel, carrying a binary payload and expecting no
/// response.
pub(crate) trait PayloadNotification: Debug + Serialize {
    fn as_event(&self) -> &'static str;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterInternal {
    pub(crate) router_id: RouterId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportInternal {
    pub(crate) router_id: RouterId,
    pub(crate) transport_id: TransportId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProducerInternal {
    pub(crate) router_id: RouterId,
    pub(crate) transport_id: TransportId,
    pub(crate) producer_id: ProducerId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumerInternal {
    pub(crate) router_id: RouterId,
    pub(crate) transport_id: TransportId,
    pub(crate) consumer_id: ConsumerId,
    pub(crate) producer_id: ProducerId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataProducerInternal {
    pub(crate) router_id: RouterId,
    pub(crate) transport_id: TransportId,
    pub(crate) data_producer_id: DataProducerId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataConsumerInternal {
    pub(crate) router_id: RouterId,
    pub(crate) transport_id: TransportId,
    pub(crate) data_producer_id: DataProducerId,
    pub(crate) data_consumer_id: DataConsumerId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpObserverInternal {
    pub(crate) router_id: RouterId,
    pub(crate) rtp_observer_id: RtpObserverId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpObserverProducerInternal {
    pub(crate) router_id: RouterId,
    pub(crate) rtp_observer_id: RtpObserverId,
    pub(crate) producer_id: ProducerId,
}

macro_rules! request_response {
    (
        $method: literal,
        $request_struct_name: ident $request_struct_impl: tt,
        $existing_response_type: ty $(,)?
    ) => {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $request_struct_name $request_struct_impl

        impl Request for $request_struct_name {
            type Response = $existing_response_type;

            fn as_method(&self) -> &'static str {
                $method
            }
        }
    };
    (
        $method: literal,
        $request_struct_name: ident $request_struct_impl: tt $(,)?
    ) => {
        // Call above macro with unit type as expected response
        request_response!($method, $request_struct_name $request_struct_impl, ());
    };
    (
        $method: literal,
        $request_struct_name: ident $request_struct_impl: tt,
        $response_struct_name: ident $response_struct_impl: tt $(,)?
    ) => {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $request_struct_name $request_struct_impl

        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $response_struct_name $response_struct_impl

        impl Request for $request_struct_name {
            type Response = $response_struct_name;

            fn as_method(&self) -> &'static str {
                $method
            }
        }
    };
}

macro_rules! payload_notification {
    (
        $event: literal,
        $notification_struct_name: ident $notification_struct_impl: tt $(,)?
    ) => {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $notification_struct_name $notification_struct_impl

        impl PayloadNotification for $notification_struct_name {
            fn as_event(&self) -> &'static str {
                $event
            }
        }
    };
}

request_response!("worker.dump", WorkerDumpRequest {}, WorkerDump);

request_response!(
    "worker.getResourceUsage",
    WorkerGetResourceUsageRequest {},
    WorkerResourceUsage,
);

request_response!(
    "worker.updateSettings",
    WorkerUpdateSettingsRequest {
        pub(crate) data: WorkerUpdateSettings,
    },
);

request_response!(
    "worker.createRouter",
    WorkerCreateRouterRequest {
        pub(crate) internal: RouterInternal,
    },
);

request_response!(
    "router.close",
    RouterCloseRequest {
        pub(crate) internal: RouterInternal,
    },
);

request_response!(
    "router.dump",
    RouterDumpRequest {
        pub(crate) internal: RouterInternal,
    },
    RouterDump,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreateWebrtcTransportData {
    listen_ips: Vec<TransportListenIp>,
    enable_udp: bool,
    enable_tcp: bool,
    prefer_udp: bool,
    prefer_tcp: bool,
    initial_available_outgoing_bitrate: u32,
    enable_sctp: bool,
    num_sctp_streams: NumSctpStreams,
    max_sctp_message_size: u32,
    sctp_send_buffer_size: u32,
    is_data_channel: bool,
}

impl RouterCreateWebrtcTransportData {
    pub(crate) fn from_options(options: &WebRtcTransportOptions) -> Self {
        Self {
            listen_ips: options.listen_ips.clone(),
            enable_udp: options.enable_udp,
            enable_tcp: options.enable_tcp,
            prefer_udp: options.prefer_udp,
            prefer_tcp: options.prefer_tcp,
            initial_available_outgoing_bitrate: options.initial_available_outgoing_bitrate,
            enable_sctp: options.enable_sctp,
            num_sctp_streams: options.num_sctp_streams,
            max_sctp_message_size: options.max_sctp_message_size,
            sctp_send_buffer_size: options.sctp_send_buffer_size,
            is_data_channel: true,
        }
    }
}

request_response!(
    "router.createWebRtcTransport",
    RouterCreateWebrtcTransportRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: RouterCreateWebrtcTransportData,
    },
    crate::webrtc_transport::WebRtcTransportData,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreatePlainTransportData {
    listen_ip: TransportListenIp,
    rtcp_mux: bool,
    comedia: bool,
    enable_sctp: bool,
    num_sctp_streams: NumSctpStreams,
    max_sctp_message_size: u32,
    sctp_send_buffer_size: u32,
    enable_srtp: bool,
    srtp_crypto_suite: SrtpCryptoSuite,
    is_data_channel: bool,
}

impl RouterCreatePlainTransportData {
    pub(crate) fn from_options(options: &PlainTransportOptions) -> Self {
        Self {
            listen_ip: options.listen_ip,
            rtcp_mux: options.rtcp_mux,
            comedia: options.comedia,
            enable_sctp: options.enable_sctp,
            num_sctp_streams: options.num_sctp_streams,
            max_sctp_message_size: options.max_sctp_message_size,
            sctp_send_buffer_size: options.sctp_send_buffer_size,
            enable_srtp: options.enable_srtp,
            srtp_crypto_suite: options.srtp_crypto_suite,
            is_data_channel: false,
        }
    }
}

request_response!(
    "router.createPlainTransport",
    RouterCreatePlainTransportRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: RouterCreatePlainTransportData,
    },
    crate::plain_transport::PlainTransportData,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreatePipeTransportData {
    listen_ip: TransportListenIp,
    enable_sctp: bool,
    num_sctp_streams: NumSctpStreams,
    max_sctp_message_size: u32,
    sctp_send_buffer_size: u32,
    enable_rtx: bool,
    enable_srtp: bool,
    is_data_channel: bool,
}

impl RouterCreatePipeTransportData {
    pub(crate) fn from_options(options: &PipeTransportOptions) -> Self {
        Self {
            listen_ip: options.listen_ip,
            enable_sctp: options.enable_sctp,
            num_sctp_streams: options.num_sctp_streams,
            max_sctp_message_size: options.max_sctp_message_size,
            sctp_send_buffer_size: options.sctp_send_buffer_size,
            enable_rtx: options.enable_rtx,
            enable_srtp: options.enable_srtp,
            is_data_channel: false,
        }
    }
}

request_response!(
    "router.createPipeTransport",
    RouterCreatePipeTransportRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: RouterCreatePipeTransportData,
    },
    crate::pipe_transport::PipeTransportData,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreateDirectTransportData {
    direct: bool,
    max_message_size: u32,
}

impl RouterCreateDirectTransportData {
    pub(crate) fn from_options(options: &DirectTransportOptions) -> Self {
        Self {
            direct: true,
            max_message_size: options.max_message_size,
        }
    }
}

request_response!(
    "router.createDirectTransport",
    RouterCreateDirectTransportRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: RouterCreateDirectTransportData,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreateAudioLevelObserverData {
    pub(crate) max_entries: u16,
    pub(crate) threshold: i8,
    pub(crate) interval: u16,
}

request_response!(
    "router.createAudioLevelObserver",
    RouterCreateAudioLevelObserverRequest {
        pub(crate) internal: RtpObserverInternal,
        pub(crate) data: RouterCreateAudioLevelObserverData,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouterCreateActiveSpeakerObserverData {
    pub(crate) interval: u16,
}

request_response!(
    "router.createActiveSpeakerObserver",
    RouterCreateActiveSpeakerObserverRequest {
        pub(crate) internal: RtpObserverInternal,
        pub(crate) data: RouterCreateActiveSpeakerObserverData,
    },
);

request_response!(
    "transport.close",
    TransportCloseRequest {
        pub(crate) internal: TransportInternal,
    },
);

request_response!(
    "transport.dump",
    TransportDumpRequest {
        pub(crate) internal: TransportInternal,
    },
    TransportDump,
);

request_response!(
    "transport.getStats",
    TransportGetStatsRequest {
        pub(crate) internal: TransportInternal,
    },
    Vec<TransportStat>,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebRtcTransportConnectData {
    pub(crate) dtls_parameters: DtlsParameters,
}

request_response!(
    "transport.connect",
    WebRtcTransportConnectRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: WebRtcTransportConnectData,
    },
    WebRtcTransportConnectResponse {
        pub(crate) dtls_local_role: DtlsRole,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlainTransportConnectData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ip: Option<std::net::IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rtcp_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) srtp_parameters: Option<SrtpParameters>,
}

request_response!(
    "transport.connect",
    PlainTransportConnectRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: PlainTransportConnectData,
    },
    PlainTransportConnectResponse {
        pub(crate) tuple: TransportTuple,
        pub(crate) rtcp_tuple: Option<TransportTuple>,
        pub(crate) srtp_parameters: Option<SrtpParameters>,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipeTransportConnectData {
    pub(crate) ip: std::net::IpAddr,
    pub(crate) port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) srtp_parameters: Option<SrtpParameters>,
}

request_response!(
    "transport.connect",
    PipeTransportConnectRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: PipeTransportConnectData,
    },
    PipeTransportConnectResponse {
        pub(crate) tuple: TransportTuple,
    },
);

request_response!(
    "transport.setMaxIncomingBitrate",
    TransportSetMaxIncomingBitrateRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: TransportSetBitrateData,
    },
);

request_response!(
    "transport.setMaxOutgoingBitrate",
    TransportSetMaxOutgoingBitrateRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: TransportSetBitrateData,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportSetBitrateData {
    pub(crate) bitrate: u32,
}

request_response!(
    "transport.restartIce",
    TransportRestartIceRequest {
        pub(crate) internal: TransportInternal,
    },
    TransportRestartIceResponse {
        pub(crate) ice_parameters: crate::data_structures::IceParameters,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportProduceData {
    pub(crate) kind: MediaKind,
    pub(crate) rtp_parameters: RtpParameters,
    pub(crate) rtp_mapping: RtpMapping,
    pub(crate) key_frame_request_delay: u32,
    pub(crate) paused: bool,
}

request_response!(
    "transport.produce",
    TransportProduceRequest {
        pub(crate) internal: ProducerInternal,
        pub(crate) data: TransportProduceData,
    },
    TransportProduceResponse {
        pub(crate) r#type: ProducerType,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportConsumeData {
    pub(crate) kind: MediaKind,
    pub(crate) rtp_parameters: RtpParameters,
    pub(crate) r#type: ConsumerType,
    pub(crate) consumable_rtp_encodings: Vec<RtpEncodingParameters>,
    pub(crate) paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) preferred_layers: Option<ConsumerLayers>,
}

request_response!(
    "transport.consume",
    TransportConsumeRequest {
        pub(crate) internal: ConsumerInternal,
        pub(crate) data: TransportConsumeData,
    },
    TransportConsumeResponse {
        pub(crate) paused: bool,
        pub(crate) producer_paused: bool,
        pub(crate) score: ConsumerScore,
        pub(crate) preferred_layers: Option<ConsumerLayers>,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportProduceDataData {
    pub(crate) r#type: DataProducerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
    pub(crate) label: String,
    pub(crate) protocol: String,
}

request_response!(
    "transport.produceData",
    TransportProduceDataRequest {
        pub(crate) internal: DataProducerInternal,
        pub(crate) data: TransportProduceDataData,
    },
    TransportProduceDataResponse {
        pub(crate) r#type: DataProducerType,
        pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
        pub(crate) label: String,
        pub(crate) protocol: String,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportConsumeDataData {
    pub(crate) r#type: DataConsumerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
    pub(crate) label: String,
    pub(crate) protocol: String,
}

request_response!(
    "transport.consumeData",
    TransportConsumeDataRequest {
        pub(crate) internal: DataConsumerInternal,
        pub(crate) data: TransportConsumeDataData,
    },
    TransportConsumeDataResponse {
        pub(crate) r#type: DataConsumerType,
        pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
        pub(crate) label: String,
        pub(crate) protocol: String,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportEnableTraceEventData {
    pub(crate) types: Vec<TransportTraceEventType>,
}

request_response!(
    "transport.enableTraceEvent",
    TransportEnableTraceEventRequest {
        pub(crate) internal: TransportInternal,
        pub(crate) data: TransportEnableTraceEventData,
    },
);

request_response!(
    "producer.close",
    ProducerCloseRequest {
        pub(crate) internal: ProducerInternal,
    },
);

request_response!(
    "producer.dump",
    ProducerDumpRequest {
        pub(crate) internal: ProducerInternal,
    },
    ProducerDump,
);

request_response!(
    "producer.getStats",
    ProducerGetStatsRequest {
        pub(crate) internal: ProducerInternal,
    },
    Vec<ProducerStat>,
);

request_response!(
    "producer.pause",
    ProducerPauseRequest {
        pub(crate) internal: ProducerInternal,
    },
);

request_response!(
    "producer.resume",
    ProducerResumeRequest {
        pub(crate) internal: ProducerInternal,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProducerEnableTraceEventData {
    pub(crate) types: Vec<ProducerTraceEventType>,
}

request_response!(
    "producer.enableTraceEvent",
    ProducerEnableTraceEventRequest {
        pub(crate) internal: ProducerInternal,
        pub(crate) data: ProducerEnableTraceEventData,
    },
);

request_response!(
    "consumer.close",
    ConsumerCloseRequest {
        pub(crate) internal: ConsumerInternal,
    },
);

request_response!(
    "consumer.dump",
    ConsumerDumpRequest {
        pub(crate) internal: ConsumerInternal,
    },
    ConsumerDump,
);

request_response!(
    "consumer.getStats",
    ConsumerGetStatsRequest {
        pub(crate) internal: ConsumerInternal,
    },
    Vec<ConsumerStat>,
);

request_response!(
    "consumer.pause",
    ConsumerPauseRequest {
        pub(crate) internal: ConsumerInternal,
    },
);

request_response!(
    "consumer.resume",
    ConsumerResumeRequest {
        pub(crate) internal: ConsumerInternal,
    },
);

request_response!(
    "consumer.setPreferredLayers",
    ConsumerSetPreferredLayersRequest {
        pub(crate) internal: ConsumerInternal,
        pub(crate) data: ConsumerLayers,
    },
    Option<ConsumerLayers>,
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumerSetPriorityData {
    pub(crate) priority: u8,
}

request_response!(
    "consumer.setPriority",
    ConsumerSetPriorityRequest {
        pub(crate) internal: ConsumerInternal,
        pub(crate) data: ConsumerSetPriorityData,
    },
    ConsumerSetPriorityResponse {
        pub(crate) priority: u8,
    },
);

request_response!(
    "consumer.requestKeyFrame",
    ConsumerRequestKeyFrameRequest {
        pub(crate) internal: ConsumerInternal,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumerEnableTraceEventData {
    pub(crate) types: Vec<crate::consumer::ConsumerTraceEventType>,
}

request_response!(
    "consumer.enableTraceEvent",
    ConsumerEnableTraceEventRequest {
        pub(crate) internal: ConsumerInternal,
        pub(crate) data: ConsumerEnableTraceEventData,
    },
);

request_response!(
    "dataProducer.close",
    DataProducerCloseRequest {
        pub(crate) internal: DataProducerInternal,
    },
);

request_response!(
    "dataProducer.dump",
    DataProducerDumpRequest {
        pub(crate) internal: DataProducerInternal,
    },
    DataProducerDump,
);

request_response!(
    "dataProducer.getStats",
    DataProducerGetStatsRequest {
        pub(crate) internal: DataProducerInternal,
    },
    Vec<DataProducerStat>,
);

request_response!(
    "dataConsumer.close",
    DataConsumerCloseRequest {
        pub(crate) internal: DataConsumerInternal,
    },
);

request_response!(
    "dataConsumer.dump",
    DataConsumerDumpRequest {
        pub(crate) internal: DataConsumerInternal,
    },
    DataConsumerDump,
);

request_response!(
    "dataConsumer.getStats",
    DataConsumerGetStatsRequest {
        pub(crate) internal: DataConsumerInternal,
    },
    Vec<DataConsumerStat>,
);

request_response!(
    "dataConsumer.getBufferedAmount",
    DataConsumerGetBufferedAmountRequest {
        pub(crate) internal: DataConsumerInternal,
    },
    DataConsumerGetBufferedAmountResponse {
        pub(crate) buffered_amount: u32,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataConsumerSetBufferedAmountLowThresholdData {
    pub(crate) threshold: u32,
}

request_response!(
    "dataConsumer.setBufferedAmountLowThreshold",
    DataConsumerSetBufferedAmountLowThresholdRequest {
        pub(crate) internal: DataConsumerInternal,
        pub(crate) data: DataConsumerSetBufferedAmountLowThresholdData,
    },
);

request_response!(
    "rtpObserver.close",
    RtpObserverCloseRequest {
        pub(crate) internal: RtpObserverInternal,
    },
);

request_response!(
    "rtpObserver.pause",
    RtpObserverPauseRequest {
        pub(crate) internal: RtpObserverInternal,
    },
);

request_response!(
    "rtpObserver.resume",
    RtpObserverResumeRequest {
        pub(crate) internal: RtpObserverInternal,
    },
);

request_response!(
    "rtpObserver.addProducer",
    RtpObserverAddProducerRequest {
        pub(crate) internal: RtpObserverProducerInternal,
    },
);

request_response!(
    "rtpObserver.removeProducer",
    RtpObserverRemoveProducerRequest {
        pub(crate) internal: RtpObserverProducerInternal,
    },
);

payload_notification!(
    "producer.send",
    ProducerSendNotification {
        pub(crate) internal: ProducerInternal,
    },
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataProducerSendData {
    pub(crate) ppid: u32,
}

payload_notification!(
    "dataProducer.send",
    DataProducerSendNotification {
        pub(crate) internal: DataProducerInternal,
        pub(crate) data: DataProducerSendData,
    },
);

payload_notification!(
    "transport.sendRtcp",
    TransportSendRtcpNotification {
        pub(crate) internal: TransportInternal,
    },
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape_carries_internal_tuple() {
        let router_id = RouterId::new();
        let request = RouterCloseRequest {
            internal: RouterInternal { router_id },
        };

        assert_eq!(request.as_method(), "router.close");

        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(
            serialized,
            json!({"internal": {"routerId": router_id.to_string()}})
        );
    }

    #[test]
    fn set_bitrate_data_shape() {
        let serialized = serde_json::to_value(TransportSetBitrateData { bitrate: 3000000 }).unwrap();
        assert_eq!(serialized, json!({"bitrate": 3000000}));
    }
}
