//! Core types for the streaming engine

use crate::abr::EstimatorConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media track categories the engine selects representations for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Video,
    Audio,
    Text,
    Image,
}

impl TrackType {
    pub const ALL: [TrackType; 4] =
        [TrackType::Video, TrackType::Audio, TrackType::Text, TrackType::Image];
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Video => write!(f, "video"),
            TrackType::Audio => write!(f, "audio"),
            TrackType::Text => write!(f, "text"),
            TrackType::Image => write!(f, "image"),
        }
    }
}

/// One encoding of a track, immutable after manifest load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Representation {
    /// Stable identifier within the content
    pub id: String,
    /// Bitrate in bits per second
    pub bitrate: u64,
    /// Frame width in pixels (video only)
    pub width: Option<u32>,
    /// Frame height in pixels (video only)
    pub height: Option<u32>,
    /// Codec string, e.g. "avc1.640028"
    pub codec: Option<String>,
    /// URI of the initialization segment, if the format needs one
    pub init_uri: Option<Url>,
}

impl Representation {
    pub fn new(id: impl Into<String>, bitrate: u64) -> Self {
        Self {
            id: id.into(),
            bitrate,
            width: None,
            height: None,
            codec: None,
            init_uri: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_init_uri(mut self, uri: Url) -> Self {
        self.init_uri = Some(uri);
        self
    }
}

/// An ordered collection of interchangeable representations for one
/// `(track type, language)` pair.
///
/// Bitrates are strictly ascending and unique; the constructor sorts and
/// rejects duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adaptation {
    pub track_type: TrackType,
    pub language: Option<String>,
    representations: Vec<Representation>,
}

impl Adaptation {
    pub fn new(
        track_type: TrackType,
        language: Option<String>,
        mut representations: Vec<Representation>,
    ) -> Result<Self> {
        if representations.is_empty() {
            return Err(Error::NoPlayableRepresentation);
        }
        representations.sort_by_key(|r| r.bitrate);
        if representations.windows(2).any(|w| w[0].bitrate == w[1].bitrate) {
            return Err(Error::InvalidManifest(format!(
                "duplicate bitrate in {} adaptation",
                track_type
            )));
        }
        Ok(Self { track_type, language, representations })
    }

    /// Representations in ascending bitrate order
    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// The lowest-bitrate representation
    pub fn lowest(&self) -> &Representation {
        &self.representations[0]
    }

    /// The highest-bitrate representation
    pub fn highest(&self) -> &Representation {
        self.representations.last().unwrap()
    }

    /// Highest representation with `bitrate <= cap`, if any
    pub fn highest_under(&self, cap: f64) -> Option<&Representation> {
        self.representations
            .iter()
            .rev()
            .find(|r| (r.bitrate as f64) <= cap)
    }

    /// All available bitrates, ascending
    pub fn bitrates(&self) -> Vec<u64> {
        self.representations.iter().map(|r| r.bitrate).collect()
    }
}

/// Byte range for partial segment requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.start + self.length - 1
    }
}

/// Whether a segment carries initialization data or media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Init,
    Media,
}

/// Locator for one segment of one representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub kind: SegmentKind,
    /// Segment index; initialization segments use 0
    pub number: u64,
    pub uri: Url,
    /// Media duration covered by this segment
    pub duration: Option<Duration>,
    pub byte_range: Option<ByteRange>,
}

impl SegmentDescriptor {
    pub fn init(uri: Url) -> Self {
        Self { kind: SegmentKind::Init, number: 0, uri, duration: None, byte_range: None }
    }

    pub fn media(number: u64, uri: Url, duration: Duration) -> Self {
        Self {
            kind: SegmentKind::Media,
            number,
            uri,
            duration: Some(duration),
            byte_range: None,
        }
    }
}

/// Player state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No content loaded, or content torn down
    Stopped,
    /// Manifest requested, nothing decoded yet
    Loading,
    /// First media frame decoded
    Loaded,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Stalled waiting for data
    Buffering,
    /// Stalled because of a seek
    Seeking,
    /// Playback reached the end of the content
    Ended,
}

impl PlayerState {
    /// Check if a transition to `target` is valid
    pub fn can_transition_to(&self, target: PlayerState) -> bool {
        use PlayerState::*;
        if *self == target {
            return false;
        }
        match target {
            // stop and fatal errors land here from anywhere
            Stopped => true,
            Loading => matches!(self, Stopped),
            Loaded => matches!(self, Loading),
            Playing => matches!(self, Loaded | Paused | Buffering | Seeking | Ended),
            Paused => matches!(self, Loaded | Playing | Buffering | Seeking),
            Buffering => matches!(self, Loaded | Playing | Paused | Seeking),
            Seeking => !matches!(self, Stopped | Loading),
            Ended => !matches!(self, Stopped | Loading),
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Loaded => write!(f, "loaded"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Seeking => write!(f, "seeking"),
            PlayerState::Ended => write!(f, "ended"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Cap used in place of `estimate * safety` before any sample exists
    pub initial_bitrate: f64,
    /// Seconds of media to keep buffered ahead of the position
    pub wanted_buffer_ahead: f64,
    /// Hard ceiling on buffered seconds ahead (infinite = unbounded)
    pub max_buffer_ahead: f64,
    /// Buffered seconds kept behind the position before eviction
    pub max_buffer_behind: f64,
    /// Bitrate ceiling applied to video while the document is hidden
    pub throttle_bitrate_when_hidden: f64,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Retry budget for video/audio/text segment requests
    pub max_retry: u32,
    /// Retry budget for optional image tracks
    pub image_max_retry: u32,
    /// Bandwidth estimator tuning
    pub estimator: EstimatorConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_bitrate: 500_000.0,
            wanted_buffer_ahead: 30.0,
            max_buffer_ahead: f64::INFINITY,
            max_buffer_behind: f64::INFINITY,
            throttle_bitrate_when_hidden: 0.0,
            request_timeout: Duration::from_secs(30),
            max_retry: 3,
            image_max_retry: 0,
            estimator: EstimatorConfig::default(),
        }
    }
}

/// Streaming protocol of the loaded content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    Dash,
    Smooth,
}

/// One seek target; exactly one interpretation per variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekTarget {
    /// Absolute position in seconds
    Position(f64),
    /// Offset in seconds from the current position
    Relative(f64),
    /// Wall-clock time, resolved against the manifest availability start
    WallClockTime(chrono::DateTime<chrono::Utc>),
}

/// DRM key system requested by the embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySystemConfig {
    /// Key system name, e.g. "com.widevine.alpha"
    pub key_system: String,
    /// License server endpoint
    pub license_url: Option<Url>,
}

/// Out-of-manifest track supplied by the embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementaryTrack {
    pub url: Url,
    pub language: Option<String>,
    pub mime_type: String,
}

/// Options for loading one content
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: Url,
    pub transport: TransportProtocol,
    pub key_systems: Vec<KeySystemConfig>,
    pub start_at: Option<SeekTarget>,
    pub auto_play: bool,
    pub default_audio_track: Option<String>,
    pub default_text_track: Option<String>,
    pub supplementary_text_tracks: Vec<SupplementaryTrack>,
    pub supplementary_image_tracks: Vec<SupplementaryTrack>,
    pub low_latency_mode: bool,
}

impl LoadRequest {
    pub fn new(url: Url, transport: TransportProtocol) -> Self {
        Self {
            url,
            transport,
            key_systems: Vec::new(),
            start_at: None,
            auto_play: false,
            default_audio_track: None,
            default_text_track: None,
            supplementary_text_tracks: Vec::new(),
            supplementary_image_tracks: Vec::new(),
            low_latency_mode: false,
        }
    }
}

/// Events reported by the platform media element adapter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Play,
    Pause,
    Seeking,
    Waiting,
    Playing,
    Ended,
    TimeUpdate { position: f64 },
    RateChange { rate: f64 },
}

/// Events emitted to the embedding API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    PlayerStateChange {
        from: PlayerState,
        to: PlayerState,
    },
    VideoBitrateChange {
        bitrate: u64,
    },
    AudioBitrateChange {
        bitrate: u64,
    },
    PositionUpdate {
        position: f64,
        buffer_gap: f64,
    },
    Warning {
        code: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    ManifestChange {
        is_live: bool,
    },
    RepresentationChange {
        track: TrackType,
        id: String,
        bitrate: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<Representation> {
        vec![
            Representation::new("2m", 2_000_000),
            Representation::new("500k", 500_000),
            Representation::new("1m", 1_000_000),
        ]
    }

    #[test]
    fn test_adaptation_sorts_bitrates() {
        let adaptation = Adaptation::new(TrackType::Video, None, ladder()).unwrap();
        assert_eq!(adaptation.bitrates(), vec![500_000, 1_000_000, 2_000_000]);
        assert_eq!(adaptation.lowest().id, "500k");
        assert_eq!(adaptation.highest().id, "2m");
    }

    #[test]
    fn test_adaptation_rejects_duplicates() {
        let mut reps = ladder();
        reps.push(Representation::new("1m-dup", 1_000_000));
        assert!(Adaptation::new(TrackType::Video, None, reps).is_err());
    }

    #[test]
    fn test_adaptation_rejects_empty() {
        assert!(Adaptation::new(TrackType::Audio, None, Vec::new()).is_err());
    }

    #[test]
    fn test_highest_under() {
        let adaptation = Adaptation::new(TrackType::Video, None, ladder()).unwrap();
        assert_eq!(adaptation.highest_under(1_500_000.0).unwrap().id, "1m");
        assert_eq!(adaptation.highest_under(2_000_000.0).unwrap().id, "2m");
        assert!(adaptation.highest_under(100_000.0).is_none());
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = PlayerEvent::VideoBitrateChange { bitrate: 2_000_000 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "video_bitrate_change");
        assert_eq!(json["bitrate"], 2_000_000);

        let event = PlayerEvent::RepresentationChange {
            track: TrackType::Video,
            id: "720p".into(),
            bitrate: 2_800_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "representation_change");
        assert_eq!(json["track"], "video");
    }

    #[test]
    fn test_state_transitions() {
        assert!(PlayerState::Stopped.can_transition_to(PlayerState::Loading));
        assert!(PlayerState::Loading.can_transition_to(PlayerState::Loaded));
        assert!(PlayerState::Playing.can_transition_to(PlayerState::Buffering));
        assert!(PlayerState::Buffering.can_transition_to(PlayerState::Playing));
        assert!(PlayerState::Playing.can_transition_to(PlayerState::Stopped));

        assert!(!PlayerState::Stopped.can_transition_to(PlayerState::Playing));
        assert!(!PlayerState::Loading.can_transition_to(PlayerState::Seeking));
        assert!(!PlayerState::Stopped.can_transition_to(PlayerState::Stopped));
    }
}
