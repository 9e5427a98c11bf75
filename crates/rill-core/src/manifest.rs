//! Manifest interface
//!
//! Parsing lives outside the engine; the controller only needs the
//! parsed shape and a provider seam to obtain it from.

use crate::error::Result;
use crate::types::{Adaptation, TrackType, TransportProtocol};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Parsed content descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub is_live: bool,
    pub adaptations: Vec<Adaptation>,
    /// Earliest seekable position in seconds
    pub min_position: f64,
    /// Latest seekable position in seconds
    pub max_position: f64,
    /// Wall-clock time of media position zero, when the content carries one
    pub availability_start: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn adaptations_for(&self, track: TrackType) -> impl Iterator<Item = &Adaptation> {
        self.adaptations.iter().filter(move |a| a.track_type == track)
    }

    /// Adaptation the content starts on for `track`: the preferred
    /// language when present, otherwise the first one declared.
    pub fn default_adaptation(
        &self,
        track: TrackType,
        preferred_language: Option<&str>,
    ) -> Option<&Adaptation> {
        if let Some(language) = preferred_language {
            if let Some(matched) = self
                .adaptations_for(track)
                .find(|a| a.language.as_deref() == Some(language))
            {
                return Some(matched);
            }
        }
        self.adaptations_for(track).next()
    }

    pub fn clamp_position(&self, position: f64) -> f64 {
        position.clamp(self.min_position, self.max_position)
    }
}

/// Seam to the external manifest parser
#[async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn load(&self, url: &Url, protocol: TransportProtocol) -> Result<Manifest>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Representation;

    fn manifest() -> Manifest {
        Manifest {
            is_live: false,
            adaptations: vec![
                Adaptation::new(
                    TrackType::Audio,
                    Some("en".into()),
                    vec![Representation::new("audio-en", 96_000)],
                )
                .unwrap(),
                Adaptation::new(
                    TrackType::Audio,
                    Some("fr".into()),
                    vec![Representation::new("audio-fr", 96_000)],
                )
                .unwrap(),
            ],
            min_position: 0.0,
            max_position: 600.0,
            availability_start: None,
        }
    }

    #[test]
    fn test_default_adaptation_prefers_language() {
        let manifest = manifest();
        let adaptation = manifest.default_adaptation(TrackType::Audio, Some("fr")).unwrap();
        assert_eq!(adaptation.language.as_deref(), Some("fr"));
    }

    #[test]
    fn test_default_adaptation_falls_back_to_first() {
        let manifest = manifest();
        let adaptation = manifest.default_adaptation(TrackType::Audio, Some("de")).unwrap();
        assert_eq!(adaptation.language.as_deref(), Some("en"));
        assert!(manifest.default_adaptation(TrackType::Video, None).is_none());
    }

    #[test]
    fn test_clamp_position() {
        let manifest = manifest();
        assert_eq!(manifest.clamp_position(-5.0), 0.0);
        assert_eq!(manifest.clamp_position(700.0), 600.0);
        assert_eq!(manifest.clamp_position(42.0), 42.0);
    }
}
