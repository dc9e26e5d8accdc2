//! H264 `profile-level-id` handling following the rules of RFC 6184 and the WebRTC
//! profile-level-id negotiation: two codecs are compatible when they share the same profile, and
//! the answer carries the minimum of both levels unless both sides allow level asymmetry.

use crate::rtp_parameters::{RtpCodecParametersParameters, RtpCodecParametersParametersValue};
use thiserror::Error;

// Default when no profile-level-id is present in SDP: Constrained Baseline 3.1.
const DEFAULT_PROFILE_LEVEL_ID: &str = "42e01f";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Profile {
    ConstrainedBaseline,
    Baseline,
    Main,
    Extended,
    High,
    ConstrainedHigh,
}

/// H264 levels ordered from lowest to highest. Level 1b sits between 1 and 1.1 and is signaled
/// via the constraint set 3 flag.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Level {
    L1,
    L1B,
    L11,
    L12,
    L13,
    L2,
    L21,
    L22,
    L3,
    L31,
    L32,
    L4,
    L41,
    L42,
    L5,
    L51,
    L52,
}

impl Level {
    fn from_idc(level_idc: u8, constraint_set3: bool) -> Option<Self> {
        Some(match level_idc {
            10 => Self::L1,
            11 => {
                if constraint_set3 {
                    Self::L1B
                } else {
                    Self::L11
                }
            }
            12 => Self::L12,
            13 => Self::L13,
            20 => Self::L2,
            21 => Self::L21,
            22 => Self::L22,
            30 => Self::L3,
            31 => Self::L31,
            32 => Self::L32,
            40 => Self::L4,
            41 => Self::L41,
            42 => Self::L42,
            50 => Self::L5,
            51 => Self::L51,
            52 => Self::L52,
            _ => return None,
        })
    }

    fn to_idc(self) -> (u8, bool) {
        match self {
            Self::L1 => (10, false),
            Self::L1B => (11, true),
            Self::L11 => (11, false),
            Self::L12 => (12, false),
            Self::L13 => (13, false),
            Self::L2 => (20, false),
            Self::L21 => (21, false),
            Self::L22 => (22, false),
            Self::L3 => (30, false),
            Self::L31 => (31, false),
            Self::L32 => (32, false),
            Self::L4 => (40, false),
            Self::L41 => (41, false),
            Self::L42 => (42, false),
            Self::L5 => (50, false),
            Self::L51 => (51, false),
            Self::L52 => (52, false),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct ProfileLevelId {
    pub(crate) profile: Profile,
    pub(crate) level: Level,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub(crate) enum ProfileLevelIdError {
    #[error("invalid profile-level-id {0:?}")]
    Invalid(String),
    #[error("incompatible H264 profiles")]
    IncompatibleProfiles,
}

// A constraint-flags byte matched against a bit pattern where every position is '0', '1' or 'x'
// (don't care).
fn matches_pattern(byte: u8, mask: u8, masked_value: u8) -> bool {
    (byte & mask) == masked_value
}

fn profile_from_idc_iop(profile_idc: u8, profile_iop: u8) -> Option<Profile> {
    struct Pattern {
        profile_idc: u8,
        mask: u8,
        masked_value: u8,
        profile: Profile,
    }

    // Table 5 of https://tools.ietf.org/html/rfc6184#section-8.1, most specific first.
    const PATTERNS: &[Pattern] = &[
        Pattern {
            profile_idc: 0x42,
            mask: 0b0100_1111,
            masked_value: 0b0100_0000,
            profile: Profile::ConstrainedBaseline,
        },
        Pattern {
            profile_idc: 0x4d,
            mask: 0b1000_1111,
            masked_value: 0b1000_0000,
            profile: Profile::ConstrainedBaseline,
        },
        Pattern {
            profile_idc: 0x58,
            mask: 0b1100_1111,
            masked_value: 0b1100_0000,
            profile: Profile::ConstrainedBaseline,
        },
        Pattern {
            profile_idc: 0x42,
            mask: 0b0100_1111,
            masked_value: 0b0000_0000,
            profile: Profile::Baseline,
        },
        Pattern {
            profile_idc: 0x58,
            mask: 0b1100_1111,
            masked_value: 0b1000_0000,
            profile: Profile::Baseline,
        },
        Pattern {
            profile_idc: 0x4d,
            mask: 0b1000_1111,
            masked_value: 0b0000_0000,
            profile: Profile::Main,
        },
        Pattern {
            profile_idc: 0x58,
            mask: 0b1100_1111,
            masked_value: 0b0000_0000,
            profile: Profile::Extended,
        },
        Pattern {
            profile_idc: 0x64,
            mask: 0b1111_1111,
            masked_value: 0b0000_0000,
            profile: Profile::High,
        },
        Pattern {
            profile_idc: 0x64,
            mask: 0b1111_1111,
            masked_value: 0b0000_1100,
            profile: Profile::ConstrainedHigh,
        },
    ];

    PATTERNS
        .iter()
        .find(|pattern| {
            pattern.profile_idc == profile_idc
                && matches_pattern(profile_iop, pattern.mask, pattern.masked_value)
        })
        .map(|pattern| pattern.profile)
}

/// Parse a 6-hex-digit `profile-level-id` string.
pub(crate) fn parse_profile_level_id(s: &str) -> Result<ProfileLevelId, ProfileLevelIdError> {
    if s.len() != 6 {
        return Err(ProfileLevelIdError::Invalid(s.to_string()));
    }
    let value =
        u32::from_str_radix(s, 16).map_err(|_| ProfileLevelIdError::Invalid(s.to_string()))?;

    let profile_idc = (value >> 16) as u8;
    let profile_iop = (value >> 8) as u8;
    let level_idc = value as u8;

    let profile = profile_from_idc_iop(profile_idc, profile_iop)
        .ok_or_else(|| ProfileLevelIdError::Invalid(s.to_string()))?;
    let constraint_set3 = (profile_iop & 0b0001_0000) != 0;
    let level = Level::from_idc(level_idc, constraint_set3)
        .ok_or_else(|| ProfileLevelIdError::Invalid(s.to_string()))?;

    Ok(ProfileLevelId { profile, level })
}

fn profile_level_id_to_string(profile_level_id: ProfileLevelId) -> String {
    let (profile_idc, mut profile_iop) = match profile_level_id.profile {
        Profile::ConstrainedBaseline => (0x42_u8, 0xe0_u8),
        Profile::Baseline => (0x42, 0x00),
        Profile::Main => (0x4d, 0x00),
        Profile::Extended => (0x58, 0x00),
        Profile::High => (0x64, 0x00),
        Profile::ConstrainedHigh => (0x64, 0x0c),
    };
    let (level_idc, constraint_set3) = profile_level_id.level.to_idc();
    if constraint_set3 {
        profile_iop |= 0b0001_0000;
    }

    format!("{:02x}{:02x}{:02x}", profile_idc, profile_iop, level_idc)
}

fn profile_level_id_from_parameters(
    parameters: &RtpCodecParametersParameters,
) -> Result<ProfileLevelId, ProfileLevelIdError> {
    match parameters.get("profile-level-id") {
        Some(RtpCodecParametersParametersValue::String(s)) => parse_profile_level_id(s),
        Some(value) => Err(ProfileLevelIdError::Invalid(format!("{value:?}"))),
        None => parse_profile_level_id(DEFAULT_PROFILE_LEVEL_ID),
    }
}

fn level_asymmetry_allowed(parameters: &RtpCodecParametersParameters) -> bool {
    matches!(
        parameters.get("level-asymmetry-allowed"),
        Some(RtpCodecParametersParametersValue::Number(1))
            | Some(RtpCodecParametersParametersValue::Bool(true))
    )
}

/// Whether two sets of H264 codec parameters name the same profile (levels may differ).
pub(crate) fn is_same_profile(
    params_a: &RtpCodecParametersParameters,
    params_b: &RtpCodecParametersParameters,
) -> bool {
    match (
        profile_level_id_from_parameters(params_a),
        profile_level_id_from_parameters(params_b),
    ) {
        (Ok(a), Ok(b)) => a.profile == b.profile,
        _ => false,
    }
}

/// Generate the `profile-level-id` for an answer between local and remote H264 parameters.
///
/// Fails when the profiles differ. The answer level is the local level when both sides allow
/// level asymmetry, the minimum of both levels otherwise.
pub(crate) fn generate_profile_level_id_for_answer(
    local_params: &RtpCodecParametersParameters,
    remote_params: &RtpCodecParametersParameters,
) -> Result<String, ProfileLevelIdError> {
    let local = profile_level_id_from_parameters(local_params)?;
    let remote = profile_level_id_from_parameters(remote_params)?;

    if local.profile != remote.profile {
        return Err(ProfileLevelIdError::IncompatibleProfiles);
    }

    let asymmetry = level_asymmetry_allowed(local_params) && level_asymmetry_allowed(remote_params);
    let answer_level = if asymmetry {
        local.level
    } else {
        local.level.min(remote.level)
    };

    Ok(profile_level_id_to_string(ProfileLevelId {
        profile: local.profile,
        level: answer_level,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_known_ids() {
        assert_eq!(
            parse_profile_level_id("42e01f").unwrap(),
            ProfileLevelId {
                profile: Profile::ConstrainedBaseline,
                level: Level::L31,
            }
        );
        assert_eq!(
            parse_profile_level_id("4d0032").unwrap(),
            ProfileLevelId {
                profile: Profile::Main,
                level: Level::L32,
            }
        );
        assert_eq!(
            parse_profile_level_id("640c28").unwrap(),
            ProfileLevelId {
                profile: Profile::ConstrainedHigh,
                level: Level::L4,
            }
        );
        assert!(parse_profile_level_id("42e0").is_err());
        assert!(parse_profile_level_id("zzzzzz").is_err());
    }

    #[test]
    fn level_1b_needs_constraint_set3() {
        assert_eq!(
            parse_profile_level_id("42f00b").unwrap().level,
            Level::L1B
        );
        assert_eq!(parse_profile_level_id("42e00b").unwrap().level, Level::L11);
        assert!(Level::L1 < Level::L1B && Level::L1B < Level::L11);
    }

    #[test]
    fn same_profile_ignores_level() {
        let a = RtpCodecParametersParameters::from([("profile-level-id", "42e01f".into())]);
        let b = RtpCodecParametersParameters::from([("profile-level-id", "42e028".into())]);
        assert!(is_same_profile(&a, &b));

        let high = RtpCodecParametersParameters::from([("profile-level-id", "640028".into())]);
        assert!(!is_same_profile(&a, &high));

        // Both defaulting to 42e01f
        assert!(is_same_profile(
            &RtpCodecParametersParameters::default(),
            &RtpCodecParametersParameters::default()
        ));
    }

    #[test]
    fn answer_uses_minimum_level_without_asymmetry() {
        let local = RtpCodecParametersParameters::from([("profile-level-id", "42e028".into())]);
        let remote = RtpCodecParametersParameters::from([("profile-level-id", "42e01f".into())]);
        assert_eq!(
            generate_profile_level_id_for_answer(&local, &remote).unwrap(),
            "42e01f"
        );
    }

    #[test]
    fn answer_keeps_local_level_with_asymmetry() {
        let local = RtpCodecParametersParameters::from([
            ("profile-level-id", "42e028".into()),
            ("level-asymmetry-allowed", 1_u32.into()),
        ]);
        let remote = RtpCodecParametersParameters::from([
            ("profile-level-id", "42e01f".into()),
            ("level-asymmetry-allowed", 1_u32.into()),
        ]);
        assert_eq!(
            generate_profile_level_id_for_answer(&local, &remote).unwrap(),
            "42e028"
        );
    }

    #[test]
    fn answer_rejects_profile_mismatch() {
        let local = RtpCodecParametersParameters::from([("profile-level-id", "42e01f".into())]);
        let remote = RtpCodecParametersParameters::from([("profile-level-id", "640028".into())]);
        assert_eq!(
            generate_profile_level_id_for_answer(&local, &remote),
            Err(ProfileLevelIdError::IncompatibleProfiles)
        );
    }
}
