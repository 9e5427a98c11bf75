//! Segment pipeline: fetch, parse, retry, cache, report
//!
//! One pipeline per track type wraps transport fetches with a bounded
//! retry budget and truncated exponential backoff, caches initialization
//! segments, throttles chunked-progress reporting and feeds every
//! completed media transfer back into the metrics bus.

mod init_cache;
mod parser;
mod retry;
mod transport;

pub use init_cache::InitSegmentCache;
pub use parser::{ParsedSegment, PassthroughParser, SegmentParser};
pub use retry::RetryPolicy;
pub use transport::{
    FetchedSegment, HttpTransport, ProgressSender, SegmentRequest, SegmentTransport,
    TransferProgress,
};

use crate::error::{Error, Result};
use crate::metrics::SampleReporter;
use crate::types::{PlayerEvent, Representation, SegmentDescriptor, SegmentKind, TrackType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum spacing between intermediate progress emissions
const PROGRESS_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Events observed by one `load_segment` consumer
#[derive(Debug)]
pub enum PipelineEvent {
    /// Intermediate chunked-transfer delivery
    Progress { bytes_so_far: u64, elapsed: Duration },
    /// A retryable failure was consumed; the pipeline goes on
    Warning { error: Error, attempt: u32 },
    /// Terminal success
    Parsed { segment: ParsedSegment },
    /// Terminal failure: budget exhausted or fatal error
    Failed { error: Error },
}

/// Per-pipeline tuning
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub low_latency: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            low_latency: false,
        }
    }
}

/// Fetch-and-parse pipeline for one track type
#[derive(Clone)]
pub struct SegmentPipeline {
    track: TrackType,
    transport: Arc<dyn SegmentTransport>,
    parser: Arc<dyn SegmentParser>,
    config: PipelineConfig,
    init_cache: Arc<InitSegmentCache>,
    reporter: SampleReporter,
    events: broadcast::Sender<PlayerEvent>,
    token: CancellationToken,
}

impl SegmentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track: TrackType,
        transport: Arc<dyn SegmentTransport>,
        parser: Arc<dyn SegmentParser>,
        config: PipelineConfig,
        init_cache: Arc<InitSegmentCache>,
        reporter: SampleReporter,
        events: broadcast::Sender<PlayerEvent>,
        token: CancellationToken,
    ) -> Self {
        Self { track, transport, parser, config, init_cache, reporter, events, token }
    }

    pub fn track(&self) -> TrackType {
        self.track
    }

    /// Load one segment of `representation`.
    ///
    /// The returned stream carries zero or more `Progress` and `Warning`
    /// events and exactly one terminal `Parsed` or `Failed` — unless the
    /// pipeline is cancelled, in which case nothing terminal is emitted
    /// and the channel simply closes.
    pub fn load_segment(
        &self,
        representation: &Representation,
        descriptor: &SegmentDescriptor,
    ) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = self.clone();
        let representation = representation.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move {
            let token = pipeline.token.clone();
            tokio::select! {
                _ = token.cancelled() => {}
                _ = pipeline.run(representation, descriptor, tx) => {}
            }
        });
        rx
    }

    async fn run(
        &self,
        representation: Representation,
        descriptor: SegmentDescriptor,
        tx: mpsc::UnboundedSender<PipelineEvent>,
    ) {
        match descriptor.kind {
            SegmentKind::Init => {
                let result = self
                    .init_cache
                    .get_or_fetch(&representation.id, || async {
                        self.fetch_with_retries(&descriptor, &tx)
                            .await
                            .map(|(segment, _, _)| segment)
                    })
                    .await;
                match result {
                    Ok(segment) => {
                        let _ = tx.send(PipelineEvent::Parsed { segment });
                    }
                    Err(error) => {
                        let _ = tx.send(PipelineEvent::Failed { error });
                    }
                }
            }
            SegmentKind::Media => match self.fetch_with_retries(&descriptor, &tx).await {
                Ok((segment, bytes, elapsed)) => {
                    self.reporter.report(elapsed, bytes, false);
                    let _ = tx.send(PipelineEvent::Parsed { segment });
                }
                Err(error) => {
                    let _ = tx.send(PipelineEvent::Failed { error });
                }
            },
        }
    }

    async fn fetch_with_retries(
        &self,
        descriptor: &SegmentDescriptor,
        tx: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<(ParsedSegment, u64, Duration)> {
        let request = SegmentRequest {
            url: descriptor.uri.clone(),
            byte_range: descriptor.byte_range,
            timeout: self.config.request_timeout,
        };
        let mut attempt: u32 = 0;
        let mut parse_retried = false;

        loop {
            match self.attempt_once(&request, descriptor.kind, tx).await {
                Ok(done) => return Ok(done),
                Err(error) => {
                    let is_parse = matches!(error, Error::SegmentParse(_));
                    let may_retry = if is_parse {
                        // one fresh fetch, bypassing whatever was cached
                        !parse_retried
                    } else {
                        error.is_retryable() && attempt < self.config.retry.max_retry
                    };
                    if !may_retry {
                        return Err(error);
                    }

                    warn!(
                        track = %self.track,
                        url = %request.url,
                        attempt,
                        %error,
                        "Segment request failed, retrying"
                    );
                    let _ = self.events.send(PlayerEvent::Warning {
                        code: error.error_code().to_string(),
                        message: error.to_string(),
                    });
                    let _ = tx.send(PipelineEvent::Warning { error, attempt });

                    if is_parse {
                        parse_retried = true;
                        continue;
                    }
                    let delay = self.config.retry.backoff(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        request: &SegmentRequest,
        kind: SegmentKind,
        tx: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<(ParsedSegment, u64, Duration)> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let fetch = self.transport.fetch(request, progress_tx);
        tokio::pin!(fetch);

        let mut last_emit: Option<Instant> = None;
        let fetched = loop {
            tokio::select! {
                result = &mut fetch => break result?,
                Some(progress) = progress_rx.recv() => {
                    let now = Instant::now();
                    let due = last_emit
                        .map_or(true, |at| now.duration_since(at) >= PROGRESS_SAMPLE_INTERVAL);
                    if !due {
                        continue;
                    }
                    last_emit = Some(now);
                    let _ = tx.send(PipelineEvent::Progress {
                        bytes_so_far: progress.bytes_so_far,
                        elapsed: progress.elapsed,
                    });
                    if self.config.low_latency && kind == SegmentKind::Media {
                        self.reporter
                            .report(progress.elapsed, progress.bytes_so_far, true);
                    }
                }
            }
        };

        let bytes = fetched.data.len() as u64;
        let parsed = self.parser.parse(kind, fetched.data)?;
        debug!(track = %self.track, url = %request.url, bytes, "Segment ready");
        Ok((parsed, bytes, fetched.elapsed))
    }
}
