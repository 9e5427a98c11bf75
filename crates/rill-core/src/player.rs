//! Player controller
//!
//! Wires the engine together for one content at a time: manifest load,
//! per-track choosers and pipelines, metrics pump, buffer health and the
//! playback state machine. Owns every component; components receive
//! their peers' interfaces through constructor injection, never the
//! other way around.

use crate::abr::{ChooserStreams, EstimatorConfig, TrackChooser};
use crate::buffer::{BufferHealthMonitor, BufferPolicy, StallReason};
use crate::device::DeviceMonitor;
use crate::drm::DrmSession;
use crate::error::{Error, Result, StoredError};
use crate::manifest::{Manifest, ManifestProvider};
use crate::metrics::MetricsBus;
use crate::pipeline::{
    HttpTransport, InitSegmentCache, ParsedSegment, PassthroughParser, PipelineConfig,
    PipelineEvent, RetryPolicy, SegmentParser, SegmentPipeline, SegmentTransport,
};
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Capacity of the player event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Seam to the platform source buffer feeder
#[async_trait]
pub trait SourceBufferSink: Send + Sync {
    async fn append(&self, segment: &ParsedSegment) -> Result<()>;
    async fn remove(&self, start: f64, end: f64) -> Result<()>;
}

/// Sink that accepts and drops everything; default for headless use
pub struct DiscardSink;

#[async_trait]
impl SourceBufferSink for DiscardSink {
    async fn append(&self, _segment: &ParsedSegment) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _start: f64, _end: f64) -> Result<()> {
        Ok(())
    }
}

/// External collaborators injected into the player
pub struct PlayerDeps {
    pub manifest_provider: Arc<dyn ManifestProvider>,
    pub transport: Arc<dyn SegmentTransport>,
    pub parser: Arc<dyn SegmentParser>,
    pub sink: Arc<dyn SourceBufferSink>,
}

impl PlayerDeps {
    pub fn new(manifest_provider: Arc<dyn ManifestProvider>) -> Self {
        Self {
            manifest_provider,
            transport: Arc::new(HttpTransport::new()),
            parser: Arc::new(PassthroughParser),
            sink: Arc::new(DiscardSink),
        }
    }
}

/// Everything owned for the currently loaded content
struct ActiveContent {
    token: CancellationToken,
    manifest: Manifest,
    metrics: Arc<MetricsBus>,
    init_cache: Arc<InitSegmentCache>,
    health: Arc<Mutex<BufferHealthMonitor>>,
    pipelines: HashMap<TrackType, SegmentPipeline>,
    selections: HashMap<TrackType, watch::Receiver<Option<Representation>>>,
    adaptations: HashMap<TrackType, watch::Sender<Option<Adaptation>>>,
    drm: Option<DrmSession>,
    tasks: Vec<JoinHandle<()>>,
    auto_play: bool,
}

/// Engine controller managing one content at a time
pub struct Player {
    id: SessionId,
    config: PlayerConfig,
    deps: PlayerDeps,
    state_tx: watch::Sender<PlayerState>,
    events_tx: broadcast::Sender<PlayerEvent>,
    device: DeviceMonitor,
    manual_bitrate: HashMap<TrackType, watch::Sender<u64>>,
    max_bitrate: HashMap<TrackType, watch::Sender<f64>>,
    buffer_policy: RwLock<BufferPolicy>,
    content: RwLock<Option<ActiveContent>>,
    last_error: RwLock<Option<StoredError>>,
    disposed: AtomicBool,
}

impl Player {
    pub fn new(config: PlayerConfig, deps: PlayerDeps) -> Self {
        let (state_tx, _) = watch::channel(PlayerState::Stopped);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut manual_bitrate = HashMap::new();
        let mut max_bitrate = HashMap::new();
        for track in TrackType::ALL {
            manual_bitrate.insert(track, watch::channel(0u64).0);
            max_bitrate.insert(track, watch::channel(f64::INFINITY).0);
        }

        let buffer_policy = BufferPolicy {
            wanted_buffer_ahead: config.wanted_buffer_ahead,
            max_buffer_ahead: config.max_buffer_ahead,
            max_buffer_behind: config.max_buffer_behind,
        };

        Self {
            id: SessionId::new(),
            config,
            deps,
            state_tx,
            events_tx,
            device: DeviceMonitor::new(),
            manual_bitrate,
            max_bitrate,
            buffer_policy: RwLock::new(buffer_policy),
            content: RwLock::new(None),
            last_error: RwLock::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> PlayerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events_tx.subscribe()
    }

    pub fn device(&self) -> &DeviceMonitor {
        &self.device
    }

    /// Last fatal error, kept until the next load
    pub async fn error(&self) -> Option<StoredError> {
        self.last_error.read().await.clone()
    }

    /// Current bandwidth estimate in bits per second
    pub async fn estimate(&self) -> Option<f64> {
        self.content
            .read()
            .await
            .as_ref()
            .and_then(|content| content.metrics.current_estimate())
    }

    pub async fn position(&self) -> f64 {
        match self.content.read().await.as_ref() {
            Some(content) => content.health.lock().await.position(),
            None => 0.0,
        }
    }

    pub async fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        match self.content.read().await.as_ref() {
            Some(content) => content.health.lock().await.ranges().as_slice().to_vec(),
            None => Vec::new(),
        }
    }

    /// Representation currently selected for `track`
    pub async fn current_representation(&self, track: TrackType) -> Option<Representation> {
        let guard = self.content.read().await;
        let content = guard.as_ref()?;
        let selection = content.selections.get(&track)?;
        let result = selection.borrow().clone();
        result
    }

    /// Load a new content, cancelling whatever was loaded before
    #[instrument(skip(self, request), fields(session_id = %self.id, url = %request.url))]
    pub async fn load_content(&self, request: LoadRequest) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        self.stop().await;
        *self.last_error.write().await = None;
        self.set_state(PlayerState::Loading)?;

        match self.try_load(request).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.enter_fatal(&error).await;
                Err(error)
            }
        }
    }

    async fn try_load(&self, request: LoadRequest) -> Result<()> {
        let mut manifest = self
            .deps
            .manifest_provider
            .load(&request.url, request.transport)
            .await?;
        attach_supplementary(
            &mut manifest,
            TrackType::Text,
            &request.supplementary_text_tracks,
        );
        attach_supplementary(
            &mut manifest,
            TrackType::Image,
            &request.supplementary_image_tracks,
        );

        let drm = if request.key_systems.is_empty() {
            None
        } else {
            Some(DrmSession::initialize(&request.key_systems)?)
        };

        let token = CancellationToken::new();
        let estimator_config = EstimatorConfig {
            low_latency_mode: request.low_latency_mode,
            ..self.config.estimator.clone()
        };
        let metrics = Arc::new(MetricsBus::new(estimator_config));
        let mut tasks = vec![metrics.spawn_pump(token.clone())];

        let init_cache = Arc::new(InitSegmentCache::new());
        let policy = *self.buffer_policy.read().await;
        let health = Arc::new(Mutex::new(BufferHealthMonitor::new(policy)));
        let health_rx = health.lock().await.health_watch();

        let mut pipelines = HashMap::new();
        let mut selections = HashMap::new();
        let mut adaptations = HashMap::new();

        for track in TrackType::ALL {
            let preferred = match track {
                TrackType::Audio => request.default_audio_track.as_deref(),
                TrackType::Text => request.default_text_track.as_deref(),
                _ => None,
            };
            let Some(adaptation) = manifest.default_adaptation(track, preferred) else {
                continue;
            };

            let (adaptation_tx, adaptation_rx) = watch::channel(Some(adaptation.clone()));
            let (chooser, selection_rx) = TrackChooser::new(
                track,
                self.config.initial_bitrate,
                self.config.throttle_bitrate_when_hidden,
                self.events_tx.clone(),
            );
            tasks.push(chooser.spawn(
                ChooserStreams {
                    adaptation: adaptation_rx,
                    estimate: metrics.estimate_watch(),
                    manual_bitrate: self.manual_bitrate[&track].subscribe(),
                    max_bitrate: self.max_bitrate[&track].subscribe(),
                    viewport_width: self.device.width_watch(),
                    visible: self.device.visibility_watch(),
                    health: health_rx.clone(),
                },
                token.clone(),
            ));

            let retry_budget = if track == TrackType::Image {
                self.config.image_max_retry
            } else {
                self.config.max_retry
            };
            pipelines.insert(
                track,
                SegmentPipeline::new(
                    track,
                    Arc::clone(&self.deps.transport),
                    Arc::clone(&self.deps.parser),
                    PipelineConfig {
                        retry: RetryPolicy::with_budget(retry_budget),
                        request_timeout: self.config.request_timeout,
                        low_latency: request.low_latency_mode,
                    },
                    Arc::clone(&init_cache),
                    metrics.reporter(),
                    self.events_tx.clone(),
                    token.clone(),
                ),
            );
            selections.insert(track, selection_rx);
            adaptations.insert(track, adaptation_tx);
        }

        let _ = self
            .events_tx
            .send(PlayerEvent::ManifestChange { is_live: manifest.is_live });

        if let Some(target) = request.start_at {
            let position = resolve_seek_target(&manifest, 0.0, target)?;
            health
                .lock()
                .await
                .handle_playback_event(PlaybackEvent::TimeUpdate { position });
        }

        info!(
            adaptations = manifest.adaptations.len(),
            is_live = manifest.is_live,
            low_latency = request.low_latency_mode,
            "Content loaded"
        );

        *self.content.write().await = Some(ActiveContent {
            token,
            manifest,
            metrics,
            init_cache,
            health,
            pipelines,
            selections,
            adaptations,
            drm,
            tasks,
            auto_play: request.auto_play,
        });
        Ok(())
    }

    /// Stop playback and tear the content down. No-op when already
    /// stopped.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn stop(&self) {
        self.teardown().await;
        let _ = self.set_state(PlayerState::Stopped);
    }

    /// Final cleanup; the player is unusable afterwards
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop().await;
        info!(session_id = %self.id, "Player disposed");
    }

    /// Load one segment of the currently selected representation.
    ///
    /// The returned stream is the pipeline's: progress and warnings,
    /// then one terminal event, or silence if the content is stopped.
    pub async fn load_segment(
        &self,
        track: TrackType,
        descriptor: &SegmentDescriptor,
    ) -> Result<mpsc::UnboundedReceiver<PipelineEvent>> {
        let guard = self.content.read().await;
        let content = guard.as_ref().ok_or_else(no_content)?;
        let pipeline = content
            .pipelines
            .get(&track)
            .ok_or(Error::NoPlayableRepresentation)?;
        let selection = content
            .selections
            .get(&track)
            .and_then(|rx| rx.borrow().clone())
            .ok_or(Error::NoPlayableRepresentation)?;
        Ok(pipeline.load_segment(&selection, descriptor))
    }

    /// Push a parsed segment to the platform buffer and record its range
    pub async fn push_segment(
        &self,
        segment: &ParsedSegment,
        start: f64,
        end: f64,
    ) -> Result<()> {
        let guard = self.content.read().await;
        let content = guard.as_ref().ok_or_else(no_content)?;
        self.deps.sink.append(segment).await?;
        content.health.lock().await.on_appended(start, end);
        Ok(())
    }

    /// Track switch from the external track manager
    pub async fn set_adaptation(&self, adaptation: Adaptation) -> Result<()> {
        let guard = self.content.read().await;
        let content = guard.as_ref().ok_or_else(no_content)?;
        let tx = content
            .adaptations
            .get(&adaptation.track_type)
            .ok_or(Error::NoPlayableRepresentation)?;
        debug!(track = %adaptation.track_type, "Adaptation switched");
        tx.send_replace(Some(adaptation));
        Ok(())
    }

    /// Seek to the resolved target, clamped into the seekable window
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn seek_to(&self, target: SeekTarget) -> Result<f64> {
        let guard = self.content.read().await;
        let content = guard.as_ref().ok_or_else(no_content)?;
        let (position, gap) = {
            let mut monitor = content.health.lock().await;
            let position = resolve_seek_target(&content.manifest, monitor.position(), target)?;
            monitor.handle_playback_event(PlaybackEvent::Seeking);
            monitor.handle_playback_event(PlaybackEvent::TimeUpdate { position });
            (position, monitor.health().gap)
        };
        self.set_state(PlayerState::Seeking)?;
        let _ = self
            .events_tx
            .send(PlayerEvent::PositionUpdate { position, buffer_gap: gap });
        Ok(position)
    }

    /// Fold in one platform media element event
    pub async fn handle_playback_event(&self, event: PlaybackEvent) {
        let guard = self.content.read().await;
        let Some(content) = guard.as_ref() else {
            return;
        };

        let (health, position, intends_to_play) = {
            let mut monitor = content.health.lock().await;
            monitor.handle_playback_event(event);
            (monitor.health(), monitor.position(), monitor.intends_to_play())
        };

        match event {
            PlaybackEvent::TimeUpdate { .. } => {
                if self.state() == PlayerState::Loading {
                    // first decoded frame
                    let _ = self.set_state(PlayerState::Loaded);
                    if content.auto_play {
                        let _ = self.set_state(PlayerState::Playing);
                    }
                }
                self.enforce_retention(content).await;
                let _ = self.events_tx.send(PlayerEvent::PositionUpdate {
                    position,
                    buffer_gap: health.gap,
                });
            }
            PlaybackEvent::Play => {
                if matches!(
                    self.state(),
                    PlayerState::Loaded | PlayerState::Paused | PlayerState::Ended
                ) {
                    let _ = self.set_state(PlayerState::Playing);
                }
            }
            PlaybackEvent::Pause => {
                if self.state() == PlayerState::Playing {
                    let _ = self.set_state(PlayerState::Paused);
                }
            }
            PlaybackEvent::Playing => {
                if matches!(
                    self.state(),
                    PlayerState::Loaded | PlayerState::Buffering | PlayerState::Seeking
                ) {
                    let _ = self.set_state(PlayerState::Playing);
                }
            }
            PlaybackEvent::Ended => {
                let _ = self.set_state(PlayerState::Ended);
            }
            _ => {}
        }

        // stall-driven transitions
        let state = self.state();
        if health.stalled
            && matches!(
                state,
                PlayerState::Loaded | PlayerState::Playing | PlayerState::Paused
            )
        {
            let target = if health.reason == Some(StallReason::Seeking) {
                PlayerState::Seeking
            } else {
                PlayerState::Buffering
            };
            let _ = self.set_state(target);
        } else if !health.stalled
            && matches!(state, PlayerState::Buffering | PlayerState::Seeking)
        {
            let target = if intends_to_play {
                PlayerState::Playing
            } else {
                PlayerState::Paused
            };
            let _ = self.set_state(target);
        }
    }

    /// A collaborator deemed an error unrecoverable for this content
    pub async fn report_fatal(&self, error: Error) {
        self.enter_fatal(&error).await;
    }

    // Setters; applied live, stored across stop/load cycles.

    /// Manual video pin; 0 returns to automatic selection
    pub fn set_video_bitrate(&self, bitrate: u64) {
        self.manual_bitrate[&TrackType::Video].send_replace(bitrate);
    }

    /// Manual audio pin; 0 returns to automatic selection
    pub fn set_audio_bitrate(&self, bitrate: u64) {
        self.manual_bitrate[&TrackType::Audio].send_replace(bitrate);
    }

    /// Video ceiling; `f64::INFINITY` uncaps
    pub fn set_max_video_bitrate(&self, bitrate: f64) {
        self.max_bitrate[&TrackType::Video].send_replace(bitrate);
    }

    /// Audio ceiling; `f64::INFINITY` uncaps
    pub fn set_max_audio_bitrate(&self, bitrate: f64) {
        self.max_bitrate[&TrackType::Audio].send_replace(bitrate);
    }

    pub async fn set_wanted_buffer_ahead(&self, seconds: f64) {
        self.update_policy(|policy| policy.wanted_buffer_ahead = seconds).await;
    }

    pub async fn set_max_buffer_ahead(&self, seconds: f64) {
        self.update_policy(|policy| policy.max_buffer_ahead = seconds).await;
    }

    pub async fn set_max_buffer_behind(&self, seconds: f64) {
        self.update_policy(|policy| policy.max_buffer_behind = seconds).await;
    }

    pub fn video_bitrate_pin(&self) -> u64 {
        *self.manual_bitrate[&TrackType::Video].borrow()
    }

    pub fn audio_bitrate_pin(&self) -> u64 {
        *self.manual_bitrate[&TrackType::Audio].borrow()
    }

    async fn update_policy<F: FnOnce(&mut BufferPolicy)>(&self, apply: F) {
        let policy = {
            let mut guard = self.buffer_policy.write().await;
            apply(&mut guard);
            *guard
        };
        if let Some(content) = self.content.read().await.as_ref() {
            content.health.lock().await.set_policy(policy);
        }
    }

    async fn enforce_retention(&self, content: &ActiveContent) {
        let evictable = content.health.lock().await.evictable();
        for (start, end) in evictable {
            match self.deps.sink.remove(start, end).await {
                Ok(()) => content.health.lock().await.on_removed(start, end),
                Err(error) => warn!(%error, start, end, "Buffer eviction failed"),
            }
        }
    }

    async fn teardown(&self) {
        let content = self.content.write().await.take();
        let Some(content) = content else {
            return;
        };
        debug!(session_id = %self.id, "Tearing down content");
        content.token.cancel();
        if let Some(drm) = &content.drm {
            drm.close();
        }
        content.init_cache.evict_all().await;
        content.metrics.reset().await;
        for task in &content.tasks {
            task.abort();
        }
    }

    async fn enter_fatal(&self, error: &Error) {
        warn!(session_id = %self.id, %error, "Fatal error, stopping");
        *self.last_error.write().await = Some(StoredError::from(error));
        let _ = self.events_tx.send(PlayerEvent::Error {
            code: error.error_code().to_string(),
            message: error.to_string(),
        });
        self.teardown().await;
        let _ = self.set_state(PlayerState::Stopped);
    }

    fn set_state(&self, new_state: PlayerState) -> Result<()> {
        let current = *self.state_tx.borrow();
        if current == new_state {
            return Ok(());
        }
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }
        self.state_tx.send_replace(new_state);
        let _ = self
            .events_tx
            .send(PlayerEvent::PlayerStateChange { from: current, to: new_state });
        info!(from = %current, to = %new_state, "State transition");
        Ok(())
    }
}

fn no_content() -> Error {
    Error::InvalidConfig("no content loaded".to_string())
}

fn resolve_seek_target(manifest: &Manifest, current: f64, target: SeekTarget) -> Result<f64> {
    let raw = match target {
        SeekTarget::Position(position) => position,
        SeekTarget::Relative(delta) => current + delta,
        SeekTarget::WallClockTime(time) => {
            let start = manifest.availability_start.ok_or_else(|| {
                Error::InvalidConfig("content has no wall-clock reference".to_string())
            })?;
            (time - start).num_milliseconds() as f64 / 1000.0
        }
    };
    Ok(manifest.clamp_position(raw))
}

/// Out-of-manifest tracks become single-representation adaptations; the
/// nominal 1 bps bitrate keeps the strictly-positive ladder invariant.
fn attach_supplementary(
    manifest: &mut Manifest,
    track: TrackType,
    supplementary: &[SupplementaryTrack],
) {
    for (index, entry) in supplementary.iter().enumerate() {
        let id = format!("{track}-supplementary-{index}");
        let representation = Representation::new(id, 1).with_init_uri(entry.url.clone());
        match Adaptation::new(track, entry.language.clone(), vec![representation]) {
            Ok(adaptation) => manifest.adaptations.push(adaptation),
            Err(error) => warn!(%error, %track, "Skipping supplementary track"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    struct StaticManifest(Manifest);

    #[async_trait]
    impl ManifestProvider for StaticManifest {
        async fn load(&self, _url: &Url, _protocol: TransportProtocol) -> Result<Manifest> {
            Ok(self.0.clone())
        }
    }

    struct FailingManifest;

    #[async_trait]
    impl ManifestProvider for FailingManifest {
        async fn load(&self, url: &Url, _protocol: TransportProtocol) -> Result<Manifest> {
            Err(Error::ManifestFetch(url.to_string()))
        }
    }

    fn test_manifest() -> Manifest {
        Manifest {
            is_live: false,
            adaptations: vec![Adaptation::new(
                TrackType::Video,
                None,
                vec![
                    Representation::new("500k", 500_000),
                    Representation::new("2m", 2_000_000),
                ],
            )
            .unwrap()],
            min_position: 0.0,
            max_position: 120.0,
            availability_start: None,
        }
    }

    fn test_player(provider: Arc<dyn ManifestProvider>) -> Player {
        Player::new(PlayerConfig::default(), PlayerDeps::new(provider))
    }

    fn test_request() -> LoadRequest {
        LoadRequest::new(
            Url::parse("https://example.com/content.mpd").unwrap(),
            TransportProtocol::Dash,
        )
    }

    #[tokio::test]
    async fn test_player_starts_stopped() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.error().await.is_none());
        assert!(player.estimate().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_from_stopped_is_noop() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        let mut events = player.events();
        player.stop().await;
        player.stop().await;
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_dispose_twice_is_harmless() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        player.dispose().await;
        player.dispose().await;
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(matches!(
            player.load_content(test_request()).await,
            Err(Error::Disposed)
        ));
    }

    #[tokio::test]
    async fn test_load_reaches_loading_then_selection_appears() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        player.load_content(test_request()).await.unwrap();
        assert_eq!(player.state(), PlayerState::Loading);

        // the chooser runs on its own task; give it a beat
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let selected = player.current_representation(TrackType::Video).await.unwrap();
        assert_eq!(selected.id, "500k");
    }

    #[tokio::test]
    async fn test_manifest_failure_stores_error() {
        let player = test_player(Arc::new(FailingManifest));
        let result = player.load_content(test_request()).await;
        assert!(result.is_err());
        assert_eq!(player.state(), PlayerState::Stopped);
        let stored = player.error().await.unwrap();
        assert_eq!(stored.code, "MANIFEST_FETCH");
    }

    #[tokio::test]
    async fn test_error_cleared_on_next_load() {
        let player = test_player(Arc::new(FailingManifest));
        let _ = player.load_content(test_request()).await;
        assert!(player.error().await.is_some());

        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        player.load_content(test_request()).await.unwrap();
        assert!(player.error().await.is_none());
    }

    #[tokio::test]
    async fn test_seek_requires_content() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        assert!(player.seek_to(SeekTarget::Position(10.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_seek_clamps_to_window() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        player.load_content(test_request()).await.unwrap();
        player
            .handle_playback_event(PlaybackEvent::TimeUpdate { position: 0.0 })
            .await;
        let landed = player.seek_to(SeekTarget::Position(500.0)).await.unwrap();
        assert_eq!(landed, 120.0);
        assert_eq!(player.state(), PlayerState::Seeking);
    }

    #[tokio::test]
    async fn test_wall_clock_seek_without_reference_fails() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        player.load_content(test_request()).await.unwrap();
        let result = player
            .seek_to(SeekTarget::WallClockTime(chrono::Utc::now()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_first_time_update_reaches_loaded() {
        let player = test_player(Arc::new(StaticManifest(test_manifest())));
        let mut request = test_request();
        request.auto_play = true;
        player.load_content(request).await.unwrap();
        player.push_segment_range(0.0, 10.0).await;
        player
            .handle_playback_event(PlaybackEvent::TimeUpdate { position: 0.0 })
            .await;
        assert_eq!(player.state(), PlayerState::Playing);
    }

    impl Player {
        /// Test helper: record a buffered range without a real sink append
        async fn push_segment_range(&self, start: f64, end: f64) {
            if let Some(content) = self.content.read().await.as_ref() {
                content.health.lock().await.on_appended(start, end);
            }
        }
    }
}
