//! Capability-gated download

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use futures::Stream;
use securestore_access::{CapabilityKey, UsageReport};
use securestore_storage::ObjectReader;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::objects::object_response;
use crate::error::{ServerError, ServerResult};
use crate::ident;
use crate::state::AppState;

/// Header carrying the secret for keys that don't resolve it from the URL
pub const UNLOCK_KEY_HEADER: &str = "unlockkey";

#[derive(Deserialize)]
pub struct DownloadParams {
    #[serde(rename = "urlKey", default)]
    pub url_key: String,
    #[serde(rename = "unlockKey")]
    pub unlock_key: Option<String>,
}

/// Object body that settles the usage report
///
/// Counts the access once the last byte has been handed to the connection.
/// An error or an early drop reports it as aborted.
struct ReportingStream {
    inner: ReaderStream<ObjectReader>,
    remaining: u64,
    report: Option<UsageReport>,
    deadline: Option<Deadline>,
}

impl ReportingStream {
    fn new(reader: ObjectReader, length: u64, report: UsageReport, deadline: Deadline) -> Self {
        let mut stream = Self {
            inner: ReaderStream::new(reader),
            remaining: length,
            report: Some(report),
            deadline: Some(deadline),
        };
        // hyper never polls an empty body
        if length == 0 {
            stream.settle(true);
        }
        stream
    }

    fn settle(&mut self, consumed: bool) {
        if let Some(report) = self.report.take() {
            report.report(consumed);
        }
        self.deadline = None;
    }
}

impl Stream for ReportingStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &item {
            Some(Ok(chunk)) => {
                this.remaining = this.remaining.saturating_sub(chunk.len() as u64);
                // With a known length the body is dropped right after the
                // final chunk, without being polled to the end
                if this.remaining == 0 {
                    this.settle(true);
                }
            }
            Some(Err(_)) => this.settle(false),
            None => this.settle(true),
        }
        Poll::Ready(item)
    }
}

impl Drop for ReportingStream {
    fn drop(&mut self) {
        self.settle(false);
    }
}

/// Cancels its token once the access round trip runs past a limit
///
/// Dropping it stops the timer without firing.
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn start(after: Duration) -> Self {
        let token = CancellationToken::new();
        let fire = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

fn check_secret(key: &CapabilityKey, params: &DownloadParams, headers: &HeaderMap) -> ServerResult<()> {
    if !key.needs_secret() {
        return Ok(());
    }

    let (encoded, source) = if key.resolve_secret_from_url {
        (params.unlock_key.as_deref().unwrap_or_default(), "query")
    } else {
        let header = headers
            .get(UNLOCK_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        (header, "header")
    };
    let presented = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| ServerError::BadRequest(format!("key in {source} could not be base64 decoded")))?;

    match key.validate(&presented) {
        Ok(true) => Ok(()),
        _ => Err(ServerError::Forbidden("key is invalid".into())),
    }
}

/// GET /api/download?urlKey=...
pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let hardened = state.config.hardened;
    let deny = |err: ServerError| {
        if hardened {
            tracing::debug!(error = %err, "download denied");
            ServerError::access_forbidden()
        } else {
            err
        }
    };

    if !ident::is_valid(&params.url_key) {
        return Err(deny(ServerError::BadRequest(
            "url key doesn't match the required pattern".into(),
        )));
    }

    let deadline = Deadline::start(state.config.access_deadline());
    let (report, key) = state
        .keys
        .access(deadline.token(), &params.url_key)
        .await
        .map_err(|e| deny(e.into()))?;

    if let Err(err) = check_secret(&key, &params, &headers) {
        report.aborted();
        return Err(deny(err));
    }

    match state.objects.read(&key.bucket_id, &key.object_id).await {
        Ok((metadata, reader)) => {
            let body = ReportingStream::new(reader, metadata.length, report, deadline);
            object_response(&metadata, Body::from_stream(body))
        }
        Err(e) => {
            report.aborted();
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use securestore_access::{InMemoryCapabilityStore, CapabilityStore, KeyOptions};

    async fn limited_access(store: &InMemoryCapabilityStore) -> UsageReport {
        let options = KeyOptions::new(None, Some(1), None, false).unwrap();
        store
            .add_key(CapabilityKey::new("bucket", "object", "link", options))
            .await
            .unwrap();
        let (report, _) = store.access(CancellationToken::new(), "link").await.unwrap();
        report
    }

    async fn wait_until_gone(store: &InMemoryCapabilityStore) {
        for _ in 0..200 {
            if store.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("key was not revoked");
    }

    #[tokio::test]
    async fn test_full_read_counts() {
        let store = InMemoryCapabilityStore::new();
        let report = limited_access(&store).await;

        let reader: ObjectReader = Box::new(&b"twelve bytes"[..]);
        let mut stream = ReportingStream::new(reader, 12, report, Deadline::start(Duration::from_secs(100)));
        while let Some(chunk) = stream.next().await {
            chunk.unwrap();
        }
        assert!(stream.deadline.is_none());

        wait_until_gone(&store).await;
    }

    #[tokio::test]
    async fn test_early_drop_does_not_count() {
        let store = InMemoryCapabilityStore::new();
        let report = limited_access(&store).await;

        let reader: ObjectReader = Box::new(&b"twelve bytes"[..]);
        drop(ReportingStream::new(reader, 12, report, Deadline::start(Duration::from_secs(100))));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_fires() {
        let deadline = Deadline::start(Duration::from_millis(10));
        let token = deadline.token();
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_deadline_stops_timer() {
        let deadline = Deadline::start(Duration::from_millis(20));
        let token = deadline.token();
        let timer = deadline.timer.abort_handle();
        drop(deadline);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(timer.is_finished());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_settled_stream_releases_deadline() {
        let store = InMemoryCapabilityStore::new();
        let report = limited_access(&store).await;

        let deadline = Deadline::start(Duration::from_millis(20));
        let token = deadline.token();
        let reader: ObjectReader = Box::new(&b""[..]);
        let stream = ReportingStream::new(reader, 0, report, deadline);
        assert!(stream.deadline.is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!token.is_cancelled());
        drop(stream);
    }
}
