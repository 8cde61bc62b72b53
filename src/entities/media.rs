//! Media descriptors and the small value types exchanged with bridges.

use serde::{Deserialize, Serialize};

/// DRM requirements of a media item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaDrm {
    /// DRM scheme ("widevine", "playready", ...)
    pub scheme: String,
    pub license_url: String,
    pub multi_session: bool,
}

/// Immutable media descriptor. Equality is by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Media {
    /// Source locator (URL, file path, content id)
    pub uri: String,
    /// Optional container/mime hint
    pub mime_type: Option<String>,
    pub drm: Option<MediaDrm>,
}

impl Media {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            drm: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_drm(mut self, drm: MediaDrm) -> Self {
        self.drm = Some(drm);
        self
    }

    /// Compatibility key for player reuse: players configured for one DRM
    /// scheme cannot serve another.
    pub fn player_key(&self) -> PlayerKey {
        match &self.drm {
            None => PlayerKey::Clear,
            Some(drm) => PlayerKey::Drm {
                scheme: drm.scheme.clone(),
                multi_session: drm.multi_session,
            },
        }
    }
}

/// Pool key for backend players.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerKey {
    Clear,
    Drm { scheme: String, multi_session: bool },
}

/// Playback state reported by the media engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

/// Volume of a playback. `volume` in 0.0..=1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub muted: bool,
    pub volume: f32,
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self { muted: false, volume: 1.0 }
    }
}

impl VolumeInfo {
    pub fn new(muted: bool, volume: f32) -> Self {
        Self {
            muted,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn muted() -> Self {
        Self { muted: true, volume: 1.0 }
    }
}

/// Resume state kept in memory between releases of a Playable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackInfo {
    pub resume_position_ms: u64,
    pub volume: VolumeInfo,
}
