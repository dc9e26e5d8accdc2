//! Collection of RTP-related data structures that are used to specify codec parameters and
//! capabilities of various endpoints.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::FromIterator;
use std::num::{NonZeroU32, NonZeroU8};

/// Media kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Known audio MIME types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MimeTypeAudio {
    /// Opus
    #[serde(rename = "audio/opus")]
    Opus,
    /// PCMU
    #[serde(rename = "audio/PCMU")]
    Pcmu,
    /// PCMA
    #[serde(rename = "audio/PCMA")]
    Pcma,
    /// ISAC
    #[serde(rename = "audio/ISAC")]
    Isac,
    /// G722
    #[serde(rename = "audio/G722")]
    G722,
    /// iLBC
    #[serde(rename = "audio/iLBC")]
    Ilbc,
    /// SILK
    #[serde(rename = "audio/SILK")]
    Silk,
    /// CN (comfort noise)
    #[serde(rename = "audio/CN")]
    Cn,
    /// DTMF events
    #[serde(rename = "audio/telephone-event")]
    TelephoneEvent,
    /// RTX retransmission stream
    #[serde(rename = "audio/rtx")]
    Rtx,
}

/// Known video MIME types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MimeTypeVideo {
    /// VP8
    #[serde(rename = "video/VP8")]
    Vp8,
    /// VP9
    #[serde(rename = "video/VP9")]
    Vp9,
    /// H264
    #[serde(rename = "video/H264")]
    H264,
    /// H265
    #[serde(rename = "video/H265")]
    H265,
    /// RTX retransmission stream
    #[serde(rename = "video/rtx")]
    Rtx,
}

/// Known audio or video MIME type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MimeType {
    Audio(MimeTypeAudio),
    Video(MimeTypeVideo),
}

impl MimeType {
    /// Media kind this MIME type belongs to.
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }

    pub(crate) fn is_rtx(self) -> bool {
        matches!(
            self,
            Self::Audio(MimeTypeAudio::Rtx) | Self::Video(MimeTypeVideo::Rtx)
        )
    }
}

impl From<MimeTypeAudio> for MimeType {
    fn from(mime_type: MimeTypeAudio) -> Self {
        Self::Audio(mime_type)
    }
}

impl From<MimeTypeVideo> for MimeType {
    fn from(mime_type: MimeTypeVideo) -> Self {
        Self::Video(mime_type)
    }
}

/// Single value used in RTP codec parameters.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RtpCodecParametersParametersValue {
    /// Boolean value
    Bool(bool),
    /// Numerical value
    Number(u32),
    /// String value
    String(Cow<'static, str>),
}

impl From<bool> for RtpCodecParametersParametersValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u8> for RtpCodecParametersParametersValue {
    fn from(n: u8) -> Self {
        Self::Number(u32::from(n))
    }
}

impl From<u16> for RtpCodecParametersParametersValue {
    fn from(n: u16) -> Self {
        Self::Number(u32::from(n))
    }
}

impl From<u32> for RtpCodecParametersParametersValue {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl From<&'static str> for RtpCodecParametersParametersValue {
    fn from(s: &'static str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for RtpCodecParametersParametersValue {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

/// Codec specific parameters. Some parameters (such as `packetization-mode` and `profile-level-id`
/// in H264) are critical for codec matching.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpCodecParametersParameters(
    BTreeMap<Cow<'static, str>, RtpCodecParametersParametersValue>,
);

impl RtpCodecParametersParameters {
    /// Insert another parameter into the collection.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<RtpCodecParametersParametersValue>,
    {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Iterate over parameters in the collection.
    pub fn iter(
        &self,
    ) -> std::collections::btree_map::Iter<'_, Cow<'static, str>, RtpCodecParametersParametersValue>
    {
        self.0.iter()
    }

    /// Get a specific parameter from the collection.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RtpCodecParametersParametersValue> {
        self.0.get(key)
    }

    /// Remove a specific parameter from the collection.
    pub fn remove(&mut self, key: &str) -> Option<RtpCodecParametersParametersValue> {
        self.0.remove(key)
    }
}

impl<K, const N: usize> From<[(K, RtpCodecParametersParametersValue); N]>
    for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
{
    fn from(array: [(K, RtpCodecParametersParametersValue); N]) -> Self {
        IntoIterator::into_iter(array).collect()
    }
}

impl<K> Extend<(K, RtpCodecParametersParametersValue)> for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
{
    fn extend<T: IntoIterator<Item = (K, RtpCodecParametersParametersValue)>>(&mut self, iter: T) {
        iter.into_iter().for_each(|(k, v)| {
            self.insert(k, v);
        });
    }
}

impl<K> FromIterator<(K, RtpCodecParametersParametersValue)> for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
{
    fn from_iter<T: IntoIterator<Item = (K, RtpCodecParametersParametersValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Provides information on RTCP feedback messages for a specific codec. Those messages can be
/// transport layer feedback messages or codec-specific feedback messages. The list of RTCP
/// feedbacks supported by this crate is defined in `supported_rtp_capabilities.rs`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RtcpFeedback {
    /// NACK
    Nack,
    /// NACK PLI
    NackPli,
    /// CCM FIR
    CcmFir,
    /// goog-remb
    GoogRemb,
    /// transport-cc
    TransportCc,
    #[doc(hidden)]
    Unsupported,
}

impl Serialize for RtcpFeedback {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (r#type, parameter) = match self {
            RtcpFeedback::Nack => ("nack", ""),
            RtcpFeedback::NackPli => ("nack", "pli"),
            RtcpFeedback::CcmFir => ("ccm", "fir"),
            RtcpFeedback::GoogRemb => ("goog-remb", ""),
            RtcpFeedback::TransportCc => ("transport-cc", ""),
            RtcpFeedback::Unsupported => ("unknown", ""),
        };
        let mut rtcp_feedback = serializer.serialize_struct("RtcpFeedback", 2)?;
        rtcp_feedback.serialize_field("type", r#type)?;
        rtcp_feedback.serialize_field("parameter", parameter)?;
        rtcp_feedback.end()
    }
}

impl<'de> Deserialize<'de> for RtcpFeedback {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(field_identifier, rename_all = "lowercase")]
        enum Field {
            Type,
            Parameter,
        }

        struct RtcpFeedbackVisitor;

        impl<'de> Visitor<'de> for RtcpFeedbackVisitor {
            type Value = RtcpFeedback;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(
                    r#"RTCP feedback type and parameter like {"type": "nack", "parameter": ""}"#,
                )
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut r#type = None::<Cow<'_, str>>;
                let mut parameter = Cow::Borrowed("");
                while let Some(key) = map.next_key()? {
                    match key {
                        Field::Type => {
                            if r#type.is_some() {
                                return Err(de::Error::duplicate_field("type"));
                            }
                            r#type = Some(map.next_value()?);
                        }
                        Field::Parameter => {
                            if !parameter.is_empty() {
                                return Err(de::Error::duplicate_field("parameter"));
                            }
                            parameter = map.next_value()?;
                        }
                    }
                }
                let r#type = r#type.ok_or_else(|| de::Error::missing_field("type"))?;

                Ok(match (r#type.as_ref(), parameter.as_ref()) {
                    ("nack", "") => RtcpFeedback::Nack,
                    ("nack", "pli") => RtcpFeedback::NackPli,
                    ("ccm", "fir") => RtcpFeedback::CcmFir,
                    ("goog-remb", "") => RtcpFeedback::GoogRemb,
                    ("transport-cc", "") => RtcpFeedback::TransportCc,
                    _ => RtcpFeedback::Unsupported,
                })
            }
        }

        const FIELDS: &[&str] = &["type", "parameter"];
        deserializer.deserialize_struct("RtcpFeedback", FIELDS, RtcpFeedbackVisitor)
    }
}

/// Provides information on the capabilities of a codec within the RTP capabilities.
///
/// Entries in the `media_codecs` vector of [`RouterOptions`](crate::router::RouterOptions) do not
/// require `preferred_payload_type` (if unset, one is allocated automatically).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    /// Media kind.
    pub kind: MediaKind,
    /// The codec MIME media type/subtype (e.g. `audio/opus`).
    pub mime_type: MimeType,
    /// The preferred RTP payload type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// The number of channels supported (e.g. two for stereo). Just for audio. Default 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    /// Codec specific parameters. Some parameters (such as `packetization-mode` and
    /// `profile-level-id` in H264) are critical for codec matching.
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    pub(crate) fn is_rtx(&self) -> bool {
        self.mime_type.is_rtx()
    }
}

/// Same as [`RtpCodecCapability`], but with a definite payload type, as found in a router's
/// finalized capabilities.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapabilityFinalized {
    /// Media kind.
    pub kind: MediaKind,
    /// The codec MIME media type/subtype (e.g. `audio/opus`).
    pub mime_type: MimeType,
    /// The RTP payload type assigned by the router.
    pub preferred_payload_type: u8,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// The number of channels supported (e.g. two for stereo). Just for audio. Default 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    /// Codec specific parameters.
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapabilityFinalized {
    pub(crate) fn is_rtx(&self) -> bool {
        self.mime_type.is_rtx()
    }
}

/// Direction of an RTP header extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpHeaderExtensionDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Default for RtpHeaderExtensionDirection {
    fn default() -> Self {
        Self::SendRecv
    }
}

/// URI of a supported RTP header extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum RtpHeaderExtensionUri {
    /// urn:ietf:params:rtp-hdrext:sdes:mid
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:mid")]
    Mid,
    /// urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id")]
    RtpStreamId,
    /// urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id")]
    RepairRtpStreamId,
    /// urn:ietf:params:rtp-hdrext:ssrc-audio-level
    #[serde(rename = "urn:ietf:params:rtp-hdrext:ssrc-audio-level")]
    AudioLevel,
    /// urn:3gpp:video-orientation
    #[serde(rename = "urn:3gpp:video-orientation")]
    VideoOrientation,
    /// urn:ietf:params:rtp-hdrext:toffset
    #[serde(rename = "urn:ietf:params:rtp-hdrext:toffset")]
    TimeOffset,
    /// <http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01>
    #[serde(rename = "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01")]
    TransportWideCcDraft01,
    /// <http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time>
    #[serde(rename = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time")]
    AbsSendTime,
    #[doc(hidden)]
    #[serde(other, rename = "unsupported")]
    Unsupported,
}

/// Provides information relating to supported header extensions.
///
/// Encrypted RTP header extensions are not currently supported. The direction field is only
/// meaningful in the router's capabilities; it is ignored if present in endpoints' capabilities.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    /// Media kind.
    pub kind: MediaKind,
    /// The URI of the RTP header extension, as defined in RFC 5285.
    pub uri: RtpHeaderExtensionUri,
    /// The preferred numeric identifier that goes in the RTP packet. Must be unique.
    pub preferred_id: u8,
    /// If true, it is preferred that the value in the header be encrypted as per RFC 6904.
    /// Default false.
    #[serde(default)]
    pub preferred_encrypt: bool,
    /// `SendRecv` means the router can both send and receive the extension; `SendOnly` and
    /// `RecvOnly` restrict it to one direction.
    #[serde(default)]
    pub direction: RtpHeaderExtensionDirection,
}

/// The RTP capabilities define what an endpoint (or the router) can receive at media level.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    /// Supported media and RTX codecs.
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    /// Supported RTP header extensions.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
    /// Supported FEC mechanisms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fec_mechanisms: Vec<String>,
}

/// The finalized RTP capabilities of a router, with definite payload types.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilitiesFinalized {
    /// Supported media and RTX codecs.
    pub codecs: Vec<RtpCodecCapabilityFinalized>,
    /// Supported RTP header extensions.
    pub header_extensions: Vec<RtpHeaderExtension>,
    /// Supported FEC mechanisms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fec_mechanisms: Vec<String>,
}

/// Provides information on codec settings within the RTP parameters.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    /// The codec MIME media type/subtype (e.g. `audio/opus`).
    pub mime_type: MimeType,
    /// The value that goes in the RTP Payload Type Field. Must be unique.
    pub payload_type: u8,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// The number of channels supported (e.g. two for stereo). Just for audio. Default 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    /// Codec-specific parameters available for signaling.
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecParameters {
    pub(crate) fn is_rtx(&self) -> bool {
        self.mime_type.is_rtx()
    }
}

/// RTX stream information. It must contain a numeric ssrc field indicating the RTX SSRC.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpEncodingParametersRtx {
    /// RTX stream SSRC.
    pub ssrc: u32,
}

/// Provides information relating to an encoding, which represents a media RTP stream and its
/// associated RTX stream (if any).
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    /// The media SSRC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    /// The RID RTP extension value. Must be unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Codec payload type this encoding affects. If unset, first media codec is chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_payload_type: Option<u8>,
    /// RTX stream information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtx: Option<RtpEncodingParametersRtx>,
    /// Whether discontinuous RTP transmission is used. Default false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtx: Option<bool>,
    /// Number of spatial and temporal layers in the RTP stream (e.g. `L1T3`, `S3T3`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,
    /// Factor by which to reduce the size of a video track during encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<f64>,
    /// Maximum number of bits per second the encoding is allowed to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
}

/// Defines an RTP header extension within the RTP parameters.
///
/// Encrypted RTP header extensions are not currently supported and no parameters are currently
/// considered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtensionParameters {
    /// The URI of the RTP header extension, as defined in RFC 5285.
    pub uri: RtpHeaderExtensionUri,
    /// The numeric identifier that goes in the RTP packet. Must be unique.
    pub id: u8,
    /// If true, the value in the header is encrypted as per RFC 6904. Default false.
    #[serde(default)]
    pub encrypt: bool,
}

/// Provides information on RTCP settings within the RTP parameters.
///
/// If no cname is given in a producer's RTP parameters, the transport chooses a random one that is
/// used in the RTCP SDES messages sent to all its associated consumers.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    /// The Canonical Name (CNAME) used by RTCP (e.g. in SDES messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Whether reduced size RTCP (RFC 5506) is configured. Default true.
    pub reduced_size: bool,
    /// Whether RTCP-mux is used. Default true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<bool>,
}

impl Default for RtcpParameters {
    fn default() -> Self {
        Self {
            cname: None,
            reduced_size: true,
            mux: None,
        }
    }
}

/// The RTP parameters describe a media stream as sent by an endpoint to the router (through a
/// producer) or as sent by the router to an endpoint (through a consumer).
///
/// Producer parameters may hold multiple encodings (simulcast); each entry must then include an
/// `ssrc` or a `rid`. Consumer parameters always hold exactly one encoding with freshly generated
/// SSRC values, except for consumers on pipe transports where all streams of the producer are
/// forwarded verbatim.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    /// The MID RTP extension value as defined in the BUNDLE specification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Media and RTX codecs in use.
    pub codecs: Vec<RtpCodecParameters>,
    /// RTP header extensions in use.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    /// Transmitted RTP streams and their settings.
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    /// Parameters used for RTCP.
    #[serde(default)]
    pub rtcp: RtcpParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_serde() {
        assert_eq!(
            serde_json::to_string(&MimeType::Audio(MimeTypeAudio::Opus)).unwrap(),
            r#""audio/opus""#
        );
        assert_eq!(
            serde_json::from_str::<MimeType>(r#""video/rtx""#).unwrap(),
            MimeType::Video(MimeTypeVideo::Rtx)
        );
        assert_eq!(MimeType::Video(MimeTypeVideo::Vp8).kind(), MediaKind::Video);
        assert!(MimeType::Audio(MimeTypeAudio::Rtx).is_rtx());
    }

    #[test]
    fn rtcp_feedback_serde() {
        let serialized = serde_json::to_string(&RtcpFeedback::NackPli).unwrap();
        assert_eq!(serialized, r#"{"type":"nack","parameter":"pli"}"#);

        assert_eq!(
            serde_json::from_str::<RtcpFeedback>(r#"{"type":"goog-remb"}"#).unwrap(),
            RtcpFeedback::GoogRemb
        );
        assert_eq!(
            serde_json::from_str::<RtcpFeedback>(r#"{"type":"whatever","parameter":"x"}"#).unwrap(),
            RtcpFeedback::Unsupported
        );
    }

    #[test]
    fn codec_parameters_values() {
        let mut parameters = RtpCodecParametersParameters::from([
            ("apt", 96_u32.into()),
            ("profile-level-id", "42e01f".into()),
        ]);
        parameters.insert("usedtx", true);

        assert_eq!(
            parameters.get("apt"),
            Some(&RtpCodecParametersParametersValue::Number(96))
        );
        assert_eq!(
            serde_json::to_string(&parameters).unwrap(),
            r#"{"apt":96,"profile-level-id":"42e01f","usedtx":true}"#
        );
    }

    #[test]
    fn rtp_parameters_wire_shape() {
        let params: RtpParameters = serde_json::from_str(
            r#"{
                "mid": "0",
                "codecs": [{
                    "mimeType": "video/VP8",
                    "payloadType": 101,
                    "clockRate": 90000,
                    "rtcpFeedback": [{"type": "nack", "parameter": ""}]
                }],
                "encodings": [{"ssrc": 11111}],
                "rtcp": {"cname": "qwerty", "reducedSize": true}
            }"#,
        )
        .unwrap();

        assert_eq!(params.mid.as_deref(), Some("0"));
        assert_eq!(params.codecs.len(), 1);
        assert_eq!(params.codecs[0].payload_type, 101);
        assert_eq!(params.encodings[0].ssrc, Some(11111));
        assert_eq!(params.rtcp.cname.as_deref(), Some("qwerty"));
    }
}
