//! Rill Core - Adaptive Bitrate Streaming Engine
//!
//! This crate provides the decision core of a segmented media player:
//! - Bandwidth estimation from observed segment downloads
//! - Per-track representation selection with hysteresis
//! - Segment pipeline with retry, backoff and init-segment caching
//! - Buffer health monitoring and stall detection
//! - Playback state machine and embedding API surface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Rill Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Segment    │─▶│   Metrics    │─▶│  Bandwidth   │          │
//! │  │   Pipeline   │  │     Bus      │  │  Estimator   │          │
//! │  └──────▲───────┘  └──────────────┘  └──────┬───────┘          │
//! │         │                                   │                   │
//! │         │          ┌──────────────┐  ┌──────▼───────┐          │
//! │         └──────────│    Player    │◀─│    Chooser   │          │
//! │                    │  Controller  │  └──────▲───────┘          │
//! │                    └──────┬───────┘         │                   │
//! │                           │          ┌──────┴───────┐          │
//! │  ┌──────────────┐  ┌──────▼──────┐  │ Device state │          │
//! │  │     DRM      │  │   Buffer    │──│ Buffer health│          │
//! │  │   Session    │  │   Monitor   │  └──────────────┘          │
//! │  └──────────────┘  └─────────────┘                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Manifest parsing, the platform media element and DRM license
//! exchange stay outside; the engine reaches them through the
//! [`manifest::ManifestProvider`], [`player::SourceBufferSink`] and
//! [`pipeline::SegmentTransport`] seams.

pub mod abr;
pub mod buffer;
pub mod device;
pub mod drm;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod player;
pub mod types;

pub use abr::{BandwidthEstimator, EstimatorConfig, Ewma};
pub use buffer::{BufferHealth, BufferHealthMonitor, BufferPolicy, BufferedRanges, StallReason};
pub use device::DeviceMonitor;
pub use drm::{DrmSession, KeyStatus};
pub use error::{Error, Result, StoredError};
pub use manifest::{Manifest, ManifestProvider};
pub use metrics::{MetricsBus, Sample, SampleReporter};
pub use pipeline::{
    FetchedSegment, HttpTransport, InitSegmentCache, ParsedSegment, PassthroughParser,
    PipelineConfig, PipelineEvent, ProgressSender, RetryPolicy, SegmentParser, SegmentPipeline,
    SegmentRequest, SegmentTransport, TransferProgress,
};
pub use player::{DiscardSink, Player, PlayerDeps, SourceBufferSink};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Rill Core initialized");
}
