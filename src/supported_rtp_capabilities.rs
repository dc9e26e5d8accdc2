//! RTP capabilities supported by the media worker.

use crate::rtp_parameters::{
    MediaKind, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCapabilities, RtpCodecCapability,
    RtpCodecParametersParameters, RtpHeaderExtension, RtpHeaderExtensionDirection,
    RtpHeaderExtensionUri,
};
use std::num::{NonZeroU32, NonZeroU8};

fn audio_codec(
    mime_type: MimeTypeAudio,
    preferred_payload_type: Option<u8>,
    clock_rate: u32,
    channels: u8,
) -> RtpCodecCapability {
    RtpCodecCapability {
        kind: MediaKind::Audio,
        mime_type: mime_type.into(),
        preferred_payload_type,
        clock_rate: NonZeroU32::new(clock_rate).unwrap(),
        channels: Some(NonZeroU8::new(channels).unwrap()),
        parameters: RtpCodecParametersParameters::default(),
        rtcp_feedback: vec![],
    }
}

fn video_codec(
    mime_type: MimeTypeVideo,
    parameters: RtpCodecParametersParameters,
) -> RtpCodecCapability {
    RtpCodecCapability {
        kind: MediaKind::Video,
        mime_type: mime_type.into(),
        preferred_payload_type: None,
        clock_rate: NonZeroU32::new(90000).unwrap(),
        channels: None,
        parameters,
        rtcp_feedback: vec![
            RtcpFeedback::Nack,
            RtcpFeedback::NackPli,
            RtcpFeedback::CcmFir,
            RtcpFeedback::GoogRemb,
        ],
    }
}

/// Get the RTP capabilities supported by the media worker.
///
/// # Notes on usage
/// These are NOT the RTP capabilities endpoints negotiate against. For that use
/// [`Router::rtp_capabilities`](crate::router::Router::rtp_capabilities), which holds definite
/// payload types for the codecs the router was configured with.
#[must_use]
pub fn get_supported_rtp_capabilities() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![
            audio_codec(MimeTypeAudio::Opus, None, 48000, 2),
            audio_codec(MimeTypeAudio::Pcmu, Some(0), 8000, 1),
            audio_codec(MimeTypeAudio::Pcma, Some(8), 8000, 1),
            audio_codec(MimeTypeAudio::Isac, None, 32000, 1),
            audio_codec(MimeTypeAudio::Isac, None, 16000, 1),
            audio_codec(MimeTypeAudio::G722, Some(9), 8000, 1),
            audio_codec(MimeTypeAudio::Ilbc, None, 8000, 1),
            audio_codec(MimeTypeAudio::Silk, None, 24000, 1),
            audio_codec(MimeTypeAudio::Silk, None, 16000, 1),
            audio_codec(MimeTypeAudio::Silk, None, 12000, 1),
            audio_codec(MimeTypeAudio::Silk, None, 8000, 1),
            audio_codec(MimeTypeAudio::Cn, Some(13), 32000, 1),
            audio_codec(MimeTypeAudio::Cn, Some(13), 16000, 1),
            audio_codec(MimeTypeAudio::Cn, Some(13), 8000, 1),
            audio_codec(MimeTypeAudio::TelephoneEvent, None, 48000, 1),
            audio_codec(MimeTypeAudio::TelephoneEvent, None, 32000, 1),
            audio_codec(MimeTypeAudio::TelephoneEvent, None, 16000, 1),
            audio_codec(MimeTypeAudio::TelephoneEvent, None, 8000, 1),
            video_codec(MimeTypeVideo::Vp8, RtpCodecParametersParameters::default()),
            video_codec(MimeTypeVideo::Vp9, RtpCodecParametersParameters::default()),
            video_codec(
                MimeTypeVideo::H264,
                RtpCodecParametersParameters::from([
                    ("packetization-mode", 1_u32.into()),
                    ("level-asymmetry-allowed", 1_u32.into()),
                ]),
            ),
            video_codec(
                MimeTypeVideo::H264,
                RtpCodecParametersParameters::from([
                    ("packetization-mode", 0_u32.into()),
                    ("level-asymmetry-allowed", 1_u32.into()),
                ]),
            ),
            // H265 reuses the H264 packetization/profile parameter names, matching what the
            // worker accepts
            video_codec(
                MimeTypeVideo::H265,
                RtpCodecParametersParameters::from([
                    ("packetization-mode", 1_u32.into()),
                    ("level-asymmetry-allowed", 1_u32.into()),
                ]),
            ),
            video_codec(
                MimeTypeVideo::H265,
                RtpCodecParametersParameters::from([
                    ("packetization-mode", 0_u32.into()),
                    ("level-asymmetry-allowed", 1_u32.into()),
                ]),
            ),
        ],
        header_extensions: vec![
            RtpHeaderExtension {
                kind: MediaKind::Audio,
                uri: RtpHeaderExtensionUri::AudioLevel,
                preferred_id: 1,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::TimeOffset,
                preferred_id: 2,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Audio,
                uri: RtpHeaderExtensionUri::AbsSendTime,
                preferred_id: 3,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::AbsSendTime,
                preferred_id: 3,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::VideoOrientation,
                preferred_id: 4,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Audio,
                uri: RtpHeaderExtensionUri::Mid,
                preferred_id: 5,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::Mid,
                preferred_id: 5,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::RtpStreamId,
                preferred_id: 6,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::RecvOnly,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::RepairRtpStreamId,
                preferred_id: 7,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::RecvOnly,
            },
        ],
        fec_mechanisms: vec![],
    }
}
