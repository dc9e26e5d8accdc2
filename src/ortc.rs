//! Capability negotiation and RTP parameter mapping.
//!
//! This module computes router capabilities from configured media codecs, validates producer and
//! consumer parameters against them, and derives the consumable/consumer/pipe views of a
//! producer's streams.

mod h264_profile;
#[cfg(test)]
mod tests;

use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeVideo, RtcpFeedback, RtcpParameters, RtpCapabilities,
    RtpCapabilitiesFinalized, RtpCodecCapability, RtpCodecCapabilityFinalized, RtpCodecParameters,
    RtpCodecParametersParameters, RtpCodecParametersParametersValue, RtpEncodingParameters,
    RtpEncodingParametersRtx, RtpHeaderExtensionDirection, RtpHeaderExtensionParameters,
    RtpHeaderExtensionUri, RtpParameters,
};
use crate::scalability_modes;
use crate::supported_rtp_capabilities;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::{NonZeroU32, NonZeroU8};
use thiserror::Error;

// Dynamic payload types are allocated from these ranges, in order, skipping used values.
const DYNAMIC_PAYLOAD_TYPE_RANGES: [std::ops::RangeInclusive<u8>; 3] = [96..=127, 35..=65, 66..=95];

/// Codec payload type pair of a producer-to-router mapping.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpMappingCodec {
    pub payload_type: u8,
    pub mapped_payload_type: u8,
}

/// Encoding SSRC pair of a producer-to-router mapping.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpMappingEncoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,
    pub mapped_ssrc: u32,
}

/// How a producer's payload types and SSRCs translate into router-scoped values.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RtpMapping {
    pub codecs: Vec<RtpMappingCodec>,
    pub encodings: Vec<RtpMappingEncoding>,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersError {
    #[error("invalid codec apt parameter {0}")]
    InvalidAptParameter(String),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpCapabilitiesError {
    #[error("media codec not supported [mime_type:{mime_type:?}]")]
    UnsupportedCodec { mime_type: MimeType },
    #[error("cannot allocate more dynamic codec payload types")]
    CannotAllocate,
    #[error("invalid codec apt parameter {0}")]
    InvalidAptParameter(String),
    #[error("duplicated preferred payload type {0}")]
    DuplicatedPreferredPayloadType(u8),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersMappingError {
    #[error("unsupported codec [mime_type:{mime_type:?}, payloadType:{payload_type}]")]
    UnsupportedCodec {
        mime_type: MimeType,
        payload_type: u8,
    },
    #[error("no RTX codec for capability codec PT {preferred_payload_type}")]
    UnsupportedRtxCodec { preferred_payload_type: u8 },
    #[error("no media codec found for RTX PT {payload_type}")]
    MissingMediaCodecForRtx { payload_type: u8 },
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsumerRtpParametersError {
    #[error("invalid capabilities: {0}")]
    InvalidCapabilities(RtpCapabilitiesError),
    #[error("no compatible media codecs")]
    NoCompatibleMediaCodecs,
}

fn generate_ssrc() -> u32 {
    fastrand::u32(100_000_000..999_999_999)
}

/// Validates RtpParameters.
pub(crate) fn validate_rtp_parameters(
    rtp_parameters: &RtpParameters,
) -> Result<(), RtpParametersError> {
    for codec in &rtp_parameters.codecs {
        if let Some(RtpCodecParametersParametersValue::String(string)) =
            codec.parameters.get("apt")
        {
            return Err(RtpParametersError::InvalidAptParameter(string.to_string()));
        }
    }

    Ok(())
}

fn validate_rtp_codec_capability(codec: &RtpCodecCapability) -> Result<(), RtpCapabilitiesError> {
    if let Some(RtpCodecParametersParametersValue::String(string)) = codec.parameters.get("apt") {
        return Err(RtpCapabilitiesError::InvalidAptParameter(string.to_string()));
    }

    Ok(())
}

/// Validates RtpCapabilities.
pub(crate) fn validate_rtp_capabilities(
    caps: &RtpCapabilities,
) -> Result<(), RtpCapabilitiesError> {
    for codec in &caps.codecs {
        validate_rtp_codec_capability(codec)?;
    }

    Ok(())
}

struct PayloadTypeAllocator {
    used: HashSet<u8>,
}

impl PayloadTypeAllocator {
    fn new() -> Self {
        Self {
            used: HashSet::new(),
        }
    }

    fn claim(&mut self, payload_type: u8) -> Result<u8, RtpCapabilitiesError> {
        if !self.used.insert(payload_type) {
            return Err(RtpCapabilitiesError::DuplicatedPreferredPayloadType(
                payload_type,
            ));
        }
        Ok(payload_type)
    }

    fn allocate(&mut self) -> Result<u8, RtpCapabilitiesError> {
        for range in DYNAMIC_PAYLOAD_TYPE_RANGES {
            for payload_type in range {
                if self.used.insert(payload_type) {
                    return Ok(payload_type);
                }
            }
        }

        Err(RtpCapabilitiesError::CannotAllocate)
    }
}

/// Generate the RTP capabilities of a router based on the given media codecs and the supported
/// RTP capabilities table.
pub(crate) fn generate_router_rtp_capabilities(
    media_codecs: Vec<RtpCodecCapability>,
) -> Result<RtpCapabilitiesFinalized, RtpCapabilitiesError> {
    let supported_rtp_capabilities = supported_rtp_capabilities::get_supported_rtp_capabilities();

    validate_rtp_capabilities(&supported_rtp_capabilities)?;

    let mut allocator = PayloadTypeAllocator::new();
    let mut caps = RtpCapabilitiesFinalized {
        codecs: vec![],
        header_extensions: vec![],
        fec_mechanisms: vec![],
    };

    for media_codec in media_codecs.iter() {
        validate_rtp_codec_capability(media_codec)?;

        let supported_codec = supported_rtp_capabilities
            .codecs
            .iter()
            .find(|supported_codec| {
                media_codec.kind == supported_codec.kind
                    && match_codecs(media_codec.into(), (*supported_codec).into(), false)
            })
            .ok_or(RtpCapabilitiesError::UnsupportedCodec {
                mime_type: media_codec.mime_type,
            })?;

        // Keep a declared preferred payload type, otherwise the supported table's static value,
        // otherwise allocate a dynamic one.
        let preferred_payload_type = match media_codec
            .preferred_payload_type
            .or(supported_codec.preferred_payload_type)
        {
            Some(preferred_payload_type) => allocator.claim(preferred_payload_type)?,
            None => allocator.allocate()?,
        };

        let codec = RtpCodecCapabilityFinalized {
            kind: supported_codec.kind,
            mime_type: supported_codec.mime_type,
            preferred_payload_type,
            clock_rate: supported_codec.clock_rate,
            channels: media_codec.channels.or(supported_codec.channels),
            parameters: {
                // Merge the media codec parameters over the supported ones.
                let mut parameters = supported_codec.parameters.clone();
                for (key, value) in media_codec.parameters.iter() {
                    parameters.insert(key.clone(), value.clone());
                }
                parameters
            },
            rtcp_feedback: {
                // Union of supported and configured feedback, deduplicated.
                let mut rtcp_feedback = supported_codec.rtcp_feedback.clone();
                for fb in &media_codec.rtcp_feedback {
                    if !rtcp_feedback.contains(fb) {
                        rtcp_feedback.push(*fb);
                    }
                }
                rtcp_feedback
            },
        };

        let rtx_codec = if codec.kind == MediaKind::Video {
            Some(RtpCodecCapabilityFinalized {
                kind: MediaKind::Video,
                mime_type: MimeType::Video(MimeTypeVideo::Rtx),
                preferred_payload_type: allocator.allocate()?,
                clock_rate: codec.clock_rate,
                channels: None,
                parameters: RtpCodecParametersParameters::from([(
                    "apt",
                    u32::from(codec.preferred_payload_type).into(),
                )]),
                rtcp_feedback: vec![],
            })
        } else {
            None
        };

        caps.codecs.push(codec);
        caps.codecs.extend(rtx_codec);
    }

    let used_kinds: HashSet<MediaKind> = media_codecs
        .iter()
        .map(|media_codec| media_codec.kind)
        .collect();
    caps.header_extensions = supported_rtp_capabilities
        .header_extensions
        .into_iter()
        .filter(|ext| used_kinds.contains(&ext.kind))
        .collect();

    Ok(caps)
}

/// Get a mapping of codec payload types and encodings of the given producer RTP parameters as
/// values expected by the router.
pub(crate) fn get_producer_rtp_parameters_mapping(
    rtp_parameters: &RtpParameters,
    rtp_capabilities: &RtpCapabilitiesFinalized,
) -> Result<RtpMapping, RtpParametersMappingError> {
    let mut rtp_mapping = RtpMapping::default();

    // Match parameters media codecs to capabilities media codecs.
    let mut codec_to_cap_codec =
        BTreeMap::<&RtpCodecParameters, &RtpCodecCapabilityFinalized>::new();

    for codec in &rtp_parameters.codecs {
        if codec.is_rtx() {
            continue;
        }

        let matched_codec_capability = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| match_codecs(codec.into(), (*cap_codec).into(), true))
            .ok_or(RtpParametersMappingError::UnsupportedCodec {
                mime_type: codec.mime_type,
                payload_type: codec.payload_type,
            })?;

        codec_to_cap_codec.insert(codec, matched_codec_capability);
    }

    // Match parameters RTX codecs to capabilities RTX codecs.
    for codec in &rtp_parameters.codecs {
        if !codec.is_rtx() {
            continue;
        }

        // Search for the media codec the RTX codec points at.
        let associated_media_codec = rtp_parameters
            .codecs
            .iter()
            .find(|media_codec| match codec.parameters.get("apt") {
                Some(RtpCodecParametersParametersValue::Number(apt)) => {
                    u32::from(media_codec.payload_type) == *apt
                }
                _ => false,
            })
            .ok_or(RtpParametersMappingError::MissingMediaCodecForRtx {
                payload_type: codec.payload_type,
            })?;

        let cap_media_codec = codec_to_cap_codec
            .get(associated_media_codec)
            .copied()
            .ok_or(RtpParametersMappingError::MissingMediaCodecForRtx {
                payload_type: codec.payload_type,
            })?;

        // The capabilities media codec must have an RTX codec of its own.
        let associated_cap_rtx_codec = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| {
                cap_codec.is_rtx()
                    && match cap_codec.parameters.get("apt") {
                        Some(RtpCodecParametersParametersValue::Number(apt)) => {
                            u32::from(cap_media_codec.preferred_payload_type) == *apt
                        }
                        _ => false,
                    }
            })
            .ok_or(RtpParametersMappingError::UnsupportedRtxCodec {
                preferred_payload_type: cap_media_codec.preferred_payload_type,
            })?;

        codec_to_cap_codec.insert(codec, associated_cap_rtx_codec);
    }

    for (codec, cap_codec) in codec_to_cap_codec {
        rtp_mapping.codecs.push(RtpMappingCodec {
            payload_type: codec.payload_type,
            mapped_payload_type: cap_codec.preferred_payload_type,
        });
    }

    let mut mapped_ssrc = generate_ssrc();

    for encoding in &rtp_parameters.encodings {
        rtp_mapping.encodings.push(RtpMappingEncoding {
            ssrc: encoding.ssrc,
            rid: encoding.rid.clone(),
            scalability_mode: encoding.scalability_mode.clone(),
            mapped_ssrc,
        });

        mapped_ssrc += 1;
    }

    Ok(rtp_mapping)
}

/// Generate the RTP parameters internally used by consumers, given the RTP parameters of a
/// producer and the RTP capabilities of the router.
pub(crate) fn get_consumable_rtp_parameters(
    kind: MediaKind,
    params: &RtpParameters,
    caps: &RtpCapabilitiesFinalized,
    rtp_mapping: &RtpMapping,
) -> RtpParameters {
    let mut consumable_params = RtpParameters::default();

    for codec in &params.codecs {
        if codec.is_rtx() {
            continue;
        }

        // Both unwraps are guaranteed by get_producer_rtp_parameters_mapping having succeeded.
        let consumable_codec_pt = rtp_mapping
            .codecs
            .iter()
            .find(|entry| entry.payload_type == codec.payload_type)
            .unwrap()
            .mapped_payload_type;

        let matched_cap_codec = caps
            .codecs
            .iter()
            .find(|cap_codec| cap_codec.preferred_payload_type == consumable_codec_pt)
            .unwrap();

        let consumable_codec = RtpCodecParameters {
            mime_type: matched_cap_codec.mime_type,
            payload_type: matched_cap_codec.preferred_payload_type,
            clock_rate: matched_cap_codec.clock_rate,
            channels: matched_cap_codec.channels,
            // Keep the producer codec parameters.
            parameters: codec.parameters.clone(),
            rtcp_feedback: matched_cap_codec.rtcp_feedback.clone(),
        };

        let consumable_cap_rtx_codec = caps.codecs.iter().find(|cap_rtx_codec| {
            cap_rtx_codec.is_rtx()
                && match cap_rtx_codec.parameters.get("apt") {
                    Some(RtpCodecParametersParametersValue::Number(apt)) => {
                        u32::from(consumable_codec.payload_type) == *apt
                    }
                    _ => false,
                }
        });

        consumable_params.codecs.push(consumable_codec);

        if let Some(cap_rtx_codec) = consumable_cap_rtx_codec {
            consumable_params.codecs.push(RtpCodecParameters {
                mime_type: cap_rtx_codec.mime_type,
                payload_type: cap_rtx_codec.preferred_payload_type,
                clock_rate: cap_rtx_codec.clock_rate,
                channels: cap_rtx_codec.channels,
                parameters: cap_rtx_codec.parameters.clone(),
                rtcp_feedback: cap_rtx_codec.rtcp_feedback.clone(),
            });
        }
    }

    for cap_ext in &caps.header_extensions {
        // Just take RTP header extensions that can be used in consumers.
        if cap_ext.kind != kind
            || !matches!(
                cap_ext.direction,
                RtpHeaderExtensionDirection::SendRecv | RtpHeaderExtensionDirection::SendOnly
            )
        {
            continue;
        }

        consumable_params
            .header_extensions
            .push(RtpHeaderExtensionParameters {
                uri: cap_ext.uri,
                id: cap_ext.preferred_id,
                encrypt: cap_ext.preferred_encrypt,
            });
    }

    for (encoding, mapped_ssrc) in params.encodings.iter().zip(
        rtp_mapping
            .encodings
            .iter()
            .map(|encoding| encoding.mapped_ssrc),
    ) {
        let mut consumable_encoding = encoding.clone();
        // Strip client-specific fields.
        consumable_encoding.rid.take();
        consumable_encoding.rtx.take();
        consumable_encoding.codec_payload_type.take();

        consumable_encoding.ssrc = Some(mapped_ssrc);

        consumable_params.encodings.push(consumable_encoding);
    }

    consumable_params.rtcp = RtcpParameters {
        cname: params.rtcp.cname.clone(),
        reduced_size: true,
        mux: Some(true),
    };

    consumable_params
}

/// Check whether the given RTP capabilities can consume the given consumable parameters.
pub(crate) fn can_consume(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
) -> Result<bool, RtpCapabilitiesError> {
    validate_rtp_capabilities(caps)?;

    let first_matched_codec = consumable_params.codecs.iter().find(|codec| {
        caps.codecs
            .iter()
            .any(|cap_codec| match_codecs(cap_codec.into(), (*codec).into(), true))
    });

    // There must be at least one matching codec, and it must be a media codec.
    Ok(first_matched_codec
        .map(|codec| !codec.is_rtx())
        .unwrap_or_default())
}

/// Generate the RTP parameters for a specific consumer.
///
/// Reduces the encodings to exactly one, reduces codecs and header extensions to what the given
/// capabilities support, renumbers payload types to the endpoint's preferred values and enables
/// or disables RTX.
pub(crate) fn get_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
) -> Result<RtpParameters, ConsumerRtpParametersError> {
    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for cap_codec in &caps.codecs {
        validate_rtp_codec_capability(cap_codec)
            .map_err(ConsumerRtpParametersError::InvalidCapabilities)?;
    }

    // Payload type renumbering: consumable (router-mapped) payload type to the endpoint's
    // preferred payload type where the endpoint declares one.
    let mut pt_mapping = HashMap::<u8, u8>::new();
    let mut rtx_supported = false;

    for codec in &consumable_params.codecs {
        if codec.is_rtx() {
            continue;
        }

        let matched_cap_codec = match caps
            .codecs
            .iter()
            .find(|cap_codec| match_codecs((*cap_codec).into(), codec.into(), true))
        {
            Some(cap_codec) => cap_codec,
            None => continue,
        };

        let mut codec = codec.clone();
        codec.rtcp_feedback = matched_cap_codec.rtcp_feedback.clone();
        if let Some(preferred_payload_type) = matched_cap_codec.preferred_payload_type {
            pt_mapping.insert(codec.payload_type, preferred_payload_type);
            codec.payload_type = preferred_payload_type;
        }
        consumer_params.codecs.push(codec);
    }

    // Keep RTX codecs whose media codec survived, rewriting apt and payload type to follow the
    // renumbering above.
    for codec in &consumable_params.codecs {
        if !codec.is_rtx() {
            continue;
        }

        let apt = match codec.parameters.get("apt") {
            Some(RtpCodecParametersParametersValue::Number(apt)) => *apt,
            _ => continue,
        };
        let mapped_apt = pt_mapping
            .get(&(apt as u8))
            .copied()
            .unwrap_or(apt as u8);

        let associated_media_codec = consumer_params
            .codecs
            .iter()
            .find(|media_codec| media_codec.payload_type == mapped_apt);
        if associated_media_codec.is_none() {
            continue;
        }

        let mut rtx_codec = codec.clone();
        rtx_codec
            .parameters
            .insert("apt", u32::from(mapped_apt));

        // The endpoint may declare its own RTX payload type for this media codec.
        let cap_rtx_payload_type = caps
            .codecs
            .iter()
            .find(|cap_codec| {
                cap_codec.is_rtx()
                    && match cap_codec.parameters.get("apt") {
                        Some(RtpCodecParametersParametersValue::Number(cap_apt)) => {
                            *cap_apt == u32::from(mapped_apt)
                        }
                        _ => false,
                    }
            })
            .and_then(|cap_codec| cap_codec.preferred_payload_type);
        if let Some(payload_type) = cap_rtx_payload_type {
            rtx_codec.payload_type = payload_type;
        }

        rtx_supported = true;
        consumer_params.codecs.push(rtx_codec);
    }

    // Ensure there is at least one media codec.
    if consumer_params.codecs.is_empty() || consumer_params.codecs[0].is_rtx() {
        return Err(ConsumerRtpParametersError::NoCompatibleMediaCodecs);
    }

    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|ext| {
            caps.header_extensions
                .iter()
                .any(|cap_ext| cap_ext.preferred_id == ext.id && cap_ext.uri == ext.uri)
        })
        .copied()
        .collect();

    // Reduce codecs' RTCP feedback. Use Transport-CC if available, REMB otherwise.
    let has_twcc = consumer_params
        .header_extensions
        .iter()
        .any(|ext| ext.uri == RtpHeaderExtensionUri::TransportWideCcDraft01);
    let has_abs_send_time = consumer_params
        .header_extensions
        .iter()
        .any(|ext| ext.uri == RtpHeaderExtensionUri::AbsSendTime);
    for codec in &mut consumer_params.codecs {
        codec.rtcp_feedback.retain(|fb| match fb {
            RtcpFeedback::GoogRemb => !has_twcc && has_abs_send_time,
            RtcpFeedback::TransportCc => has_twcc,
            _ => true,
        });
    }

    let mut consumer_encoding = RtpEncodingParameters {
        ssrc: Some(generate_ssrc()),
        codec_payload_type: Some(consumer_params.codecs[0].payload_type),
        ..RtpEncodingParameters::default()
    };

    if rtx_supported {
        consumer_encoding.rtx = Some(RtpEncodingParametersRtx {
            ssrc: generate_ssrc(),
        });
    }

    // If any of the consumable encodings has a scalability mode, process it (assuming all
    // encodings have the same value).
    let mut scalability_mode = consumable_params
        .encodings
        .iter()
        .find_map(|encoding| encoding.scalability_mode.clone());

    // With simulcast the consumer sees the spatial layer count as the encoding count.
    if consumable_params.encodings.len() > 1 {
        scalability_mode = Some(format!(
            "S{}T{}",
            consumable_params.encodings.len(),
            scalability_mode
                .as_deref()
                .map(scalability_modes::parse)
                .unwrap_or_default()
                .temporal_layers
        ));
    }

    consumer_encoding.scalability_mode = scalability_mode;

    // Honor the maximum max_bitrate of any encoding.
    consumer_encoding.max_bitrate = consumable_params
        .encodings
        .iter()
        .filter_map(|encoding| encoding.max_bitrate)
        .max();

    consumer_params.encodings.push(consumer_encoding);

    Ok(consumer_params)
}

/// Generate the RTP parameters for a pipe consumer.
///
/// All encodings of the producer are forwarded verbatim, each keeping its router-mapped SSRC.
/// RTX SSRCs are allocated when `enable_rtx` is set; retransmission-related feedback is only
/// kept in that case.
pub(crate) fn get_pipe_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    enable_rtx: bool,
) -> RtpParameters {
    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for codec in &consumable_params.codecs {
        if !enable_rtx && codec.is_rtx() {
            continue;
        }

        let mut codec = codec.clone();
        codec.rtcp_feedback.retain(|fb| {
            matches!(fb, RtcpFeedback::NackPli | RtcpFeedback::CcmFir)
                || (enable_rtx && matches!(fb, RtcpFeedback::Nack))
        });

        consumer_params.codecs.push(codec);
    }

    // Reduce RTP extensions by disabling transport MID and BWE related ones.
    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|ext| {
            !matches!(
                ext.uri,
                RtpHeaderExtensionUri::Mid
                    | RtpHeaderExtensionUri::AbsSendTime
                    | RtpHeaderExtensionUri::TransportWideCcDraft01
            )
        })
        .copied()
        .collect();

    for encoding in &consumable_params.encodings {
        let mut encoding = encoding.clone();
        if enable_rtx {
            encoding.rtx = Some(RtpEncodingParametersRtx {
                ssrc: generate_ssrc(),
            });
        } else {
            encoding.rtx.take();
        }

        consumer_params.encodings.push(encoding);
    }

    consumer_params
}

struct CodecToMatch<'a> {
    mime_type: MimeType,
    clock_rate: NonZeroU32,
    channels: Option<NonZeroU8>,
    parameters: &'a RtpCodecParametersParameters,
}

impl<'a> From<&'a RtpCodecCapability> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecCapability) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

impl<'a> From<&'a RtpCodecCapabilityFinalized> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecCapabilityFinalized) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

impl<'a> From<&'a RtpCodecParameters> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecParameters) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

fn parameter_u32(
    parameters: &RtpCodecParametersParameters,
    key: &str,
    default: u32,
) -> Option<u32> {
    match parameters.get(key) {
        Some(RtpCodecParametersParametersValue::Number(value)) => Some(*value),
        Some(RtpCodecParametersParametersValue::Bool(value)) => Some(u32::from(*value)),
        Some(RtpCodecParametersParametersValue::String(_)) => None,
        None => Some(default),
    }
}

fn match_codecs(codec_a: CodecToMatch<'_>, codec_b: CodecToMatch<'_>, strict: bool) -> bool {
    if codec_a.mime_type != codec_b.mime_type {
        return false;
    }

    if codec_a.clock_rate != codec_b.clock_rate {
        return false;
    }

    if codec_a.mime_type.kind() == MediaKind::Audio {
        let channels_a = codec_a.channels.map(NonZeroU8::get).unwrap_or(1);
        let channels_b = codec_b.channels.map(NonZeroU8::get).unwrap_or(1);
        if channels_a != channels_b {
            return false;
        }
    }

    // Per codec special checks.
    match codec_a.mime_type {
        MimeType::Video(MimeTypeVideo::H264) | MimeType::Video(MimeTypeVideo::H265) => {
            let packetization_mode_a =
                parameter_u32(codec_a.parameters, "packetization-mode", 0);
            let packetization_mode_b =
                parameter_u32(codec_b.parameters, "packetization-mode", 0);

            if packetization_mode_a != packetization_mode_b {
                return false;
            }

            // Strict matching requires an equivalent profile-level-id; only H264 profiles have
            // well-defined equivalence.
            if strict && codec_a.mime_type == MimeType::Video(MimeTypeVideo::H264) {
                if !h264_profile::is_same_profile(codec_a.parameters, codec_b.parameters) {
                    return false;
                }

                if h264_profile::generate_profile_level_id_for_answer(
                    codec_a.parameters,
                    codec_b.parameters,
                )
                .is_err()
                {
                    return false;
                }
            }
        }

        MimeType::Video(MimeTypeVideo::Vp9) => {
            if strict {
                let profile_id_a = parameter_u32(codec_a.parameters, "profile-id", 0);
                let profile_id_b = parameter_u32(codec_b.parameters, "profile-id", 0);

                if profile_id_a != profile_id_b {
                    return false;
                }
            }
        }

        _ => {}
    }

    // Audio-specific optional parameters must agree when both sides declare them.
    if strict && codec_a.mime_type.kind() == MediaKind::Audio {
        for key in ["useinbandfec", "usedtx", "maxplaybackrate", "maxaveragebitrate"] {
            if let (Some(value_a), Some(value_b)) =
                (codec_a.parameters.get(key), codec_b.parameters.get(key))
            {
                if value_a != value_b {
                    return false;
                }
            }
        }
    }

    true
}
