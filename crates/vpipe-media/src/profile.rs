//! Transcode profiles.
//!
//! A profile maps an opaque resolution name to concrete encoder settings.
//! The table is intentionally small; new profiles are added here.

use crate::error::{MediaError, MediaResult};

/// Encoder settings for one output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Profile name, e.g. `480p`
    pub name: &'static str,
    /// FFmpeg scale filter, width derived from aspect: `-2:480`
    pub scale: &'static str,
    /// Video codec
    pub video_codec: &'static str,
    /// Audio codec
    pub audio_codec: &'static str,
    /// Encoder preset
    pub preset: &'static str,
}

const PROFILES: &[Profile] = &[
    Profile {
        name: "480p",
        scale: "-2:480",
        video_codec: "libx264",
        audio_codec: "aac",
        preset: "fast",
    },
    Profile {
        name: "720p",
        scale: "-2:720",
        video_codec: "libx264",
        audio_codec: "aac",
        preset: "fast",
    },
    Profile {
        name: "1080p",
        scale: "-2:1080",
        video_codec: "libx264",
        audio_codec: "aac",
        preset: "fast",
    },
];

/// Look up the profile for a resolution name.
pub fn profile_for(resolution: &str) -> MediaResult<Profile> {
    PROFILES
        .iter()
        .find(|p| p.name == resolution)
        .copied()
        .ok_or_else(|| MediaError::UnknownProfile(resolution.to_string()))
}
