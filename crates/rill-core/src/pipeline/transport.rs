//! Transport seam for segment requests
//!
//! The engine talks to the network through [`SegmentTransport`];
//! [`HttpTransport`] is the production implementation, tests plug in
//! mocks to script failures and delivery pacing.

use crate::error::{Error, Result};
use crate::types::ByteRange;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// One transport request
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    /// Deadline for the whole transfer
    pub timeout: Duration,
}

/// Intermediate delivery notification during a chunked transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    pub bytes_so_far: u64,
    pub elapsed: Duration,
}

/// Completed transfer
#[derive(Debug)]
pub struct FetchedSegment {
    pub data: Bytes,
    pub elapsed: Duration,
}

pub type ProgressSender = mpsc::UnboundedSender<TransferProgress>;

#[async_trait]
pub trait SegmentTransport: Send + Sync {
    /// Fetch one segment, reporting chunked delivery on `progress`.
    /// Deadline expiry maps to [`Error::Timeout`].
    async fn fetch(
        &self,
        request: &SegmentRequest,
        progress: ProgressSender,
    ) -> Result<FetchedSegment>;
}

/// reqwest-backed transport streaming response bodies chunk by chunk
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_inner(
        &self,
        request: &SegmentRequest,
        progress: &ProgressSender,
        started: Instant,
    ) -> Result<FetchedSegment> {
        let mut builder = self.client.get(request.url.clone());
        if let Some(range) = request.byte_range {
            builder = builder.header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.start, range.end()),
            );
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, &request.url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(e, &request.url))?;
            buffer.extend_from_slice(&chunk);
            let _ = progress.send(TransferProgress {
                bytes_so_far: buffer.len() as u64,
                elapsed: started.elapsed(),
            });
        }

        let elapsed = started.elapsed();
        debug!(
            url = %request.url,
            bytes = buffer.len(),
            duration_ms = elapsed.as_millis(),
            "Segment fetched"
        );
        Ok(FetchedSegment { data: buffer.freeze(), elapsed })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentTransport for HttpTransport {
    async fn fetch(
        &self,
        request: &SegmentRequest,
        progress: ProgressSender,
    ) -> Result<FetchedSegment> {
        let started = Instant::now();
        match tokio::time::timeout(
            request.timeout,
            self.fetch_inner(request, &progress, started),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { url: request.url.to_string() }),
        }
    }
}

fn classify(error: reqwest::Error, url: &Url) -> Error {
    if error.is_timeout() {
        Error::Timeout { url: url.to_string() }
    } else {
        Error::Network { url: url.to_string(), source: error }
    }
}
