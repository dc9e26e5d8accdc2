use super::*;
use crate::rtp_parameters::{MimeTypeAudio, RtcpFeedback, RtpHeaderExtension};

fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(MimeTypeAudio::Opus),
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: Some(NonZeroU8::new(2).unwrap()),
            parameters: RtpCodecParametersParameters::from([
                ("useinbandfec", 1_u32.into()),
                ("foo", "bar".into()),
            ]),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: MimeType::Video(MimeTypeVideo::Vp8),
            preferred_payload_type: Some(125),
            clock_rate: NonZeroU32::new(90000).unwrap(),
            channels: None,
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: MimeType::Video(MimeTypeVideo::H264),
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            channels: None,
            parameters: RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32.into()),
                ("level-asymmetry-allowed", 1_u32.into()),
                ("profile-level-id", "42e01f".into()),
            ]),
            rtcp_feedback: vec![],
        },
    ]
}

fn vp8_producer_rtp_parameters() -> RtpParameters {
    RtpParameters {
        mid: Some("0".to_string()),
        codecs: vec![
            RtpCodecParameters {
                mime_type: MimeType::Video(MimeTypeVideo::Vp8),
                payload_type: 101,
                clock_rate: NonZeroU32::new(90000).unwrap(),
                channels: None,
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![RtcpFeedback::Nack, RtcpFeedback::NackPli],
            },
            RtpCodecParameters {
                mime_type: MimeType::Video(MimeTypeVideo::Rtx),
                payload_type: 102,
                clock_rate: NonZeroU32::new(90000).unwrap(),
                channels: None,
                parameters: RtpCodecParametersParameters::from([("apt", 101_u32.into())]),
                rtcp_feedback: vec![],
            },
        ],
        header_extensions: vec![],
        encodings: vec![
            RtpEncodingParameters {
                ssrc: Some(11111),
                rtx: Some(RtpEncodingParametersRtx { ssrc: 11112 }),
                ..RtpEncodingParameters::default()
            },
            RtpEncodingParameters {
                ssrc: Some(22222),
                rtx: Some(RtpEncodingParametersRtx { ssrc: 22223 }),
                ..RtpEncodingParameters::default()
            },
        ],
        rtcp: RtcpParameters {
            cname: Some("qwerty".to_string()),
            ..RtcpParameters::default()
        },
    }
}

fn consumer_device_capabilities() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: MimeType::Video(MimeTypeVideo::Vp8),
                preferred_payload_type: Some(102),
                clock_rate: NonZeroU32::new(90000).unwrap(),
                channels: None,
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![
                    RtcpFeedback::Nack,
                    RtcpFeedback::NackPli,
                    RtcpFeedback::CcmFir,
                    RtcpFeedback::GoogRemb,
                ],
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: MimeType::Video(MimeTypeVideo::Rtx),
                preferred_payload_type: Some(103),
                clock_rate: NonZeroU32::new(90000).unwrap(),
                channels: None,
                parameters: RtpCodecParametersParameters::from([("apt", 102_u32.into())]),
                rtcp_feedback: vec![],
            },
        ],
        header_extensions: vec![
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: RtpHeaderExtensionUri::TimeOffset,
                preferred_id: 2,
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
        ],
        fec_mechanisms: vec![],
    }
}

#[test]
fn generate_router_rtp_capabilities_succeeds() {
    let caps = generate_router_rtp_capabilities(media_codecs())
        .expect("Failed to generate router RTP capabilities");

    // Opus, VP8, VP8 RTX, H264, H264 RTX.
    assert_eq!(caps.codecs.len(), 5);

    let opus = &caps.codecs[0];
    assert_eq!(opus.mime_type, MimeType::Audio(MimeTypeAudio::Opus));
    // 96 is the first available dynamic payload type.
    assert_eq!(opus.preferred_payload_type, 96);
    assert_eq!(
        opus.parameters.get("useinbandfec"),
        Some(&RtpCodecParametersParametersValue::Number(1))
    );
    assert_eq!(
        opus.parameters.get("foo"),
        Some(&RtpCodecParametersParametersValue::String("bar".into()))
    );

    let vp8 = &caps.codecs[1];
    assert_eq!(vp8.mime_type, MimeType::Video(MimeTypeVideo::Vp8));
    // The declared preferred payload type is kept.
    assert_eq!(vp8.preferred_payload_type, 125);
    assert_eq!(
        vp8.rtcp_feedback,
        vec![
            RtcpFeedback::Nack,
            RtcpFeedback::NackPli,
            RtcpFeedback::CcmFir,
            RtcpFeedback::GoogRemb,
        ]
    );

    let vp8_rtx = &caps.codecs[2];
    assert_eq!(vp8_rtx.mime_type, MimeType::Video(MimeTypeVideo::Rtx));
    assert_eq!(vp8_rtx.preferred_payload_type, 97);
    assert_eq!(
        vp8_rtx.parameters.get("apt"),
        Some(&RtpCodecParametersParametersValue::Number(125))
    );

    let h264 = &caps.codecs[3];
    assert_eq!(h264.mime_type, MimeType::Video(MimeTypeVideo::H264));
    assert_eq!(h264.preferred_payload_type, 98);

    let h264_rtx = &caps.codecs[4];
    assert_eq!(h264_rtx.mime_type, MimeType::Video(MimeTypeVideo::Rtx));
    assert_eq!(h264_rtx.preferred_payload_type, 99);
    assert_eq!(
        h264_rtx.parameters.get("apt"),
        Some(&RtpCodecParametersParametersValue::Number(98))
    );

    // Audio and video codecs were configured, so all supported header extensions survive.
    assert_eq!(caps.header_extensions.len(), 9);
}

#[test]
fn generate_router_rtp_capabilities_is_deterministic() {
    let first = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let second = generate_router_rtp_capabilities(media_codecs()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn generated_payload_types_stay_in_allowed_ranges() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();

    for codec in &caps.codecs {
        let pt = codec.preferred_payload_type;
        let declared = media_codecs()
            .iter()
            .any(|media_codec| media_codec.preferred_payload_type == Some(pt));
        assert!(
            declared
                || (96..=127).contains(&pt)
                || (35..=65).contains(&pt)
                || (66..=95).contains(&pt),
            "payload type {pt} outside allowed ranges"
        );
    }
}

#[test]
fn every_rtx_codec_points_at_an_existing_codec() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();

    for codec in caps.codecs.iter().filter(|codec| codec.is_rtx()) {
        let apt = match codec.parameters.get("apt") {
            Some(RtpCodecParametersParametersValue::Number(apt)) => *apt,
            other => panic!("rtx codec without numeric apt: {other:?}"),
        };
        assert!(caps
            .codecs
            .iter()
            .any(|media_codec| u32::from(media_codec.preferred_payload_type) == apt));
    }
}

#[test]
fn generate_router_rtp_capabilities_unsupported() {
    // Opus with a single channel does not exist in the supported table.
    assert!(matches!(
        generate_router_rtp_capabilities(vec![RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(MimeTypeAudio::Opus),
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: Some(NonZeroU8::new(1).unwrap()),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        }]),
        Err(RtpCapabilitiesError::UnsupportedCodec { .. })
    ));

    // ISAC at 48kHz does not exist either.
    assert!(matches!(
        generate_router_rtp_capabilities(vec![RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(MimeTypeAudio::Isac),
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: Some(NonZeroU8::new(1).unwrap()),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        }]),
        Err(RtpCapabilitiesError::UnsupportedCodec { .. })
    ));
}

#[test]
fn generate_router_rtp_capabilities_duplicated_payload_type() {
    let mut codecs = media_codecs();
    // Second video codec claiming the same preferred payload type as VP8.
    codecs[2].preferred_payload_type = Some(125);

    assert_eq!(
        generate_router_rtp_capabilities(codecs),
        Err(RtpCapabilitiesError::DuplicatedPreferredPayloadType(125))
    );
}

#[test]
fn producer_rtp_parameters_mapping() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let rtp_parameters = vp8_producer_rtp_parameters();

    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();

    assert_eq!(mapping.codecs.len(), 2);
    assert_eq!(mapping.codecs[0].payload_type, 101);
    assert_eq!(mapping.codecs[0].mapped_payload_type, 125);
    assert_eq!(mapping.codecs[1].payload_type, 102);
    assert_eq!(mapping.codecs[1].mapped_payload_type, 97);

    assert_eq!(mapping.encodings.len(), 2);
    assert_eq!(mapping.encodings[0].ssrc, Some(11111));
    assert_eq!(mapping.encodings[1].ssrc, Some(22222));
    // Mapped SSRCs are router-local and consecutive.
    assert_eq!(
        mapping.encodings[1].mapped_ssrc,
        mapping.encodings[0].mapped_ssrc + 1
    );
}

#[test]
fn producer_rtp_parameters_mapping_unsupported_codec() {
    let caps = generate_router_rtp_capabilities(vec![media_codecs().remove(0)]).unwrap();

    assert!(matches!(
        get_producer_rtp_parameters_mapping(&vp8_producer_rtp_parameters(), &caps),
        Err(RtpParametersMappingError::UnsupportedCodec { .. })
    ));
}

#[test]
fn consumable_rtp_parameters() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let rtp_parameters = vp8_producer_rtp_parameters();
    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();

    let consumable =
        get_consumable_rtp_parameters(MediaKind::Video, &rtp_parameters, &caps, &mapping);

    assert_eq!(consumable.codecs.len(), 2);
    assert_eq!(consumable.codecs[0].payload_type, 125);
    assert_eq!(consumable.codecs[1].payload_type, 97);

    assert_eq!(consumable.encodings.len(), 2);
    for (encoding, mapped) in consumable.encodings.iter().zip(&mapping.encodings) {
        assert_eq!(encoding.ssrc, Some(mapped.mapped_ssrc));
        assert_eq!(encoding.rid, None);
        assert_eq!(encoding.rtx, None);
        assert_eq!(encoding.codec_payload_type, None);
    }

    // Only send-capable video extensions survive.
    assert!(consumable
        .header_extensions
        .iter()
        .all(|ext| !matches!(
            ext.uri,
            RtpHeaderExtensionUri::RtpStreamId | RtpHeaderExtensionUri::RepairRtpStreamId
        )));

    assert_eq!(consumable.rtcp.cname.as_deref(), Some("qwerty"));
    assert!(consumable.rtcp.reduced_size);
    assert_eq!(consumable.rtcp.mux, Some(true));
}

#[test]
fn can_consume_matches_consumer_rtp_parameters() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let rtp_parameters = vp8_producer_rtp_parameters();
    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();
    let consumable =
        get_consumable_rtp_parameters(MediaKind::Video, &rtp_parameters, &caps, &mapping);

    let device_caps = consumer_device_capabilities();
    assert_eq!(can_consume(&consumable, &device_caps), Ok(true));
    assert!(get_consumer_rtp_parameters(&consumable, &device_caps).is_ok());

    // An audio-only endpoint can consume nothing of this producer.
    let audio_only_caps = RtpCapabilities {
        codecs: vec![RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(MimeTypeAudio::Opus),
            preferred_payload_type: Some(100),
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: Some(NonZeroU8::new(2).unwrap()),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![],
        fec_mechanisms: vec![],
    };
    assert_eq!(can_consume(&consumable, &audio_only_caps), Ok(false));
    assert_eq!(
        get_consumer_rtp_parameters(&consumable, &audio_only_caps),
        Err(ConsumerRtpParametersError::NoCompatibleMediaCodecs)
    );
}

#[test]
fn consumer_rtp_parameters() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let rtp_parameters = vp8_producer_rtp_parameters();
    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();
    let consumable =
        get_consumable_rtp_parameters(MediaKind::Video, &rtp_parameters, &caps, &mapping);

    let consumer_params =
        get_consumer_rtp_parameters(&consumable, &consumer_device_capabilities()).unwrap();

    // Payload types renumbered to the endpoint's preferred values.
    assert_eq!(consumer_params.codecs.len(), 2);
    assert_eq!(consumer_params.codecs[0].payload_type, 102);
    assert_eq!(consumer_params.codecs[1].payload_type, 103);
    assert_eq!(
        consumer_params.codecs[1].parameters.get("apt"),
        Some(&RtpCodecParametersParametersValue::Number(102))
    );

    // Exactly one encoding with a fresh SSRC, RTX enabled, pointing at a listed codec.
    assert_eq!(consumer_params.encodings.len(), 1);
    let encoding = &consumer_params.encodings[0];
    let ssrc = encoding.ssrc.unwrap();
    assert!(consumable
        .encodings
        .iter()
        .all(|consumable_encoding| consumable_encoding.ssrc != Some(ssrc)));
    assert!(encoding.rtx.is_some());
    let codec_payload_type = encoding.codec_payload_type.unwrap();
    assert!(consumer_params
        .codecs
        .iter()
        .any(|codec| codec.payload_type == codec_payload_type));

    // Simulcast with two encodings collapses into S2Tx scalability.
    assert_eq!(encoding.scalability_mode.as_deref(), Some("S2T1"));

    // abs-send-time negotiated and no transport-cc, so goog-remb survives.
    assert!(consumer_params.codecs[0]
        .rtcp_feedback
        .contains(&RtcpFeedback::GoogRemb));
    assert!(!consumer_params.codecs[0]
        .rtcp_feedback
        .contains(&RtcpFeedback::TransportCc));
}

#[test]
fn consumer_rtp_parameters_preserves_temporal_layers() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let mut rtp_parameters = vp8_producer_rtp_parameters();
    rtp_parameters.encodings = vec![
        RtpEncodingParameters {
            ssrc: Some(11111),
            scalability_mode: Some("L1T3".to_string()),
            ..RtpEncodingParameters::default()
        },
        RtpEncodingParameters {
            ssrc: Some(22222),
            scalability_mode: Some("L1T3".to_string()),
            ..RtpEncodingParameters::default()
        },
        RtpEncodingParameters {
            ssrc: Some(33333),
            scalability_mode: Some("L1T3".to_string()),
            ..RtpEncodingParameters::default()
        },
    ];
    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();
    let consumable =
        get_consumable_rtp_parameters(MediaKind::Video, &rtp_parameters, &caps, &mapping);

    let consumer_params =
        get_consumer_rtp_parameters(&consumable, &consumer_device_capabilities()).unwrap();

    assert_eq!(
        consumer_params.encodings[0].scalability_mode.as_deref(),
        Some("S3T3")
    );
}

#[test]
fn pipe_consumer_rtp_parameters() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();
    let rtp_parameters = vp8_producer_rtp_parameters();
    let mapping = get_producer_rtp_parameters_mapping(&rtp_parameters, &caps).unwrap();
    let consumable =
        get_consumable_rtp_parameters(MediaKind::Video, &rtp_parameters, &caps, &mapping);

    let without_rtx = get_pipe_consumer_rtp_parameters(&consumable, false);

    // Law: encoding count is preserved.
    assert_eq!(without_rtx.encodings.len(), consumable.encodings.len());
    assert!(without_rtx.codecs.iter().all(|codec| !codec.is_rtx()));
    for (encoding, consumable_encoding) in without_rtx.encodings.iter().zip(&consumable.encodings)
    {
        assert_eq!(encoding.ssrc, consumable_encoding.ssrc);
        assert!(encoding.rtx.is_none());
    }
    // Without RTX only key frame related feedback survives.
    assert_eq!(
        without_rtx.codecs[0].rtcp_feedback,
        vec![RtcpFeedback::NackPli, RtcpFeedback::CcmFir]
    );

    let with_rtx = get_pipe_consumer_rtp_parameters(&consumable, true);

    assert_eq!(with_rtx.encodings.len(), consumable.encodings.len());
    assert!(with_rtx.codecs.iter().any(|codec| codec.is_rtx()));
    assert!(with_rtx
        .encodings
        .iter()
        .all(|encoding| encoding.rtx.is_some()));
    assert!(with_rtx.codecs[0]
        .rtcp_feedback
        .contains(&RtcpFeedback::Nack));

    // MID and BWE related extensions are dropped on pipes.
    assert!(with_rtx.header_extensions.iter().all(|ext| {
        !matches!(
            ext.uri,
            RtpHeaderExtensionUri::Mid
                | RtpHeaderExtensionUri::AbsSendTime
                | RtpHeaderExtensionUri::TransportWideCcDraft01
        )
    }));
}

#[test]
fn h264_codecs_match_on_profile() {
    let caps = generate_router_rtp_capabilities(media_codecs()).unwrap();

    let h264_params = |profile_level_id: &str| RtpParameters {
        codecs: vec![RtpCodecParameters {
            mime_type: MimeType::Video(MimeTypeVideo::H264),
            payload_type: 107,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            channels: None,
            parameters: RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32.into()),
                ("profile-level-id", profile_level_id.to_string().into()),
            ]),
            rtcp_feedback: vec![],
        }],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(44444),
            ..RtpEncodingParameters::default()
        }],
        ..RtpParameters::default()
    };

    // Same constrained baseline profile, different level: matches.
    assert!(get_producer_rtp_parameters_mapping(&h264_params("42e028"), &caps).is_ok());

    // High profile: no match.
    assert!(matches!(
        get_producer_rtp_parameters_mapping(&h264_params("640028"), &caps),
        Err(RtpParametersMappingError::UnsupportedCodec { .. })
    ));
}
