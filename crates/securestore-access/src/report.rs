//! Deferred usage reports for `CapabilityStore::access`

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// One-shot sink through which a caller reports whether an access counted
///
/// Dropping it without reporting leaves the usage count untouched.
#[derive(Debug)]
pub struct UsageReport {
    tx: oneshot::Sender<bool>,
    done: oneshot::Receiver<()>,
}

/// Resolves once the backend has finished with a report
#[derive(Debug)]
pub struct ReportHandle {
    done: oneshot::Receiver<()>,
}

/// Backend half of a usage report, owned by the completion task
#[derive(Debug)]
pub(crate) struct PendingReport {
    rx: oneshot::Receiver<bool>,
    // Dropped when the completion task ends, which settles the handle
    _done: oneshot::Sender<()>,
}

impl UsageReport {
    pub(crate) fn channel() -> (UsageReport, PendingReport) {
        let (tx, rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            UsageReport { tx, done: done_rx },
            PendingReport { rx, _done: done_tx },
        )
    }

    /// The object was delivered; count this access
    pub fn consumed(self) -> ReportHandle {
        self.report(true)
    }

    /// The access was abandoned before delivery
    pub fn aborted(self) -> ReportHandle {
        self.report(false)
    }

    pub fn report(self, consumed: bool) -> ReportHandle {
        // The completion task may already have gone (cancelled context)
        let _ = self.tx.send(consumed);
        ReportHandle { done: self.done }
    }
}

impl ReportHandle {
    /// Wait until the backend has applied (or given up on) the report
    pub async fn settled(self) {
        let _ = self.done.await;
    }
}

impl PendingReport {
    /// Wait for the caller's report, or `None` if cancellation wins or the
    /// sink is dropped unused
    pub(crate) async fn wait(&mut self, cancel: &CancellationToken) -> Option<bool> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            resp = &mut self.rx => resp.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_delivered() {
        let (report, mut pending) = UsageReport::channel();
        let cancel = CancellationToken::new();

        let handle = report.consumed();
        assert_eq!(pending.wait(&cancel).await, Some(true));

        drop(pending);
        handle.settled().await;
    }

    #[tokio::test]
    async fn test_cancel_before_report() {
        let (report, mut pending) = UsageReport::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(pending.wait(&cancel).await, None);
        drop(pending);

        // Late report is accepted silently
        report.aborted().settled().await;
    }

    #[tokio::test]
    async fn test_dropped_sink_counts_nothing() {
        let (report, mut pending) = UsageReport::channel();
        drop(report);

        assert_eq!(pending.wait(&CancellationToken::new()).await, None);
    }
}
