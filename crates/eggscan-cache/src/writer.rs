//! Single-writer queue for disk-tier mutation.
//!
//! Every write, deletion, reset and sweep of one cache directory goes through
//! one tokio task that runs the operations strictly in submission order, each
//! to completion on the blocking pool before the next starts. Reads never go
//! through the queue.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::cleanup::{self, CleanupPolicy, CleanupStats};
use crate::key::Fingerprint;
use crate::storage::CacheStorage;
use crate::ImageBytes;

enum DiskOp {
    Write {
        fingerprint: Fingerprint,
        bytes: ImageBytes,
    },
    /// Delete the file if it is still stale or corrupt when the op runs
    Evict { fingerprint: Fingerprint },
    Reset { epoch: u64 },
    Sweep {
        reply: Option<oneshot::Sender<CleanupStats>>,
    },
    Flush { reply: oneshot::Sender<()> },
}

impl DiskOp {
    fn run(self, storage: &CacheStorage, policy: &CleanupPolicy, resets: &ResetEpochs) {
        match self {
            DiskOp::Write { fingerprint, bytes } => {
                if let Err(e) = storage.write(&fingerprint, &bytes) {
                    log::warn!("Cache write skipped for {}: {:#}", fingerprint.short(), e);
                }
            }
            DiskOp::Evict { fingerprint } => {
                if let Err(e) = storage.remove_if_unusable(&fingerprint, policy.max_age) {
                    log::warn!("Cache eviction failed for {}: {:#}", fingerprint.short(), e);
                }
            }
            DiskOp::Reset { epoch } => {
                if let Err(e) = storage.reset() {
                    log::warn!("Cache reset failed: {:#}", e);
                }
                resets.complete(epoch);
            }
            DiskOp::Sweep { reply } => {
                let stats = cleanup::sweep(storage, policy);
                if let Some(reply) = reply {
                    let _ = reply.send(stats);
                }
            }
            DiskOp::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

/// Disk resets requested by `clear` versus those the writer has finished.
///
/// While a reset is outstanding the disk tier still holds files from before
/// the clear, so readers must not trust it.
#[derive(Debug, Default)]
pub(crate) struct ResetEpochs {
    requested: AtomicU64,
    completed: AtomicU64,
}

impl ResetEpochs {
    fn request(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn complete(&self, epoch: u64) {
        self.completed.fetch_max(epoch, Ordering::SeqCst);
    }

    /// Number of resets requested so far
    pub fn current(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.completed.load(Ordering::SeqCst) < self.requested.load(Ordering::SeqCst)
    }
}

pub(crate) struct DiskWriter {
    tx: mpsc::UnboundedSender<DiskOp>,
    resets: Arc<ResetEpochs>,
}

impl DiskWriter {
    /// Start the writer task on the current tokio runtime
    pub fn spawn(storage: Arc<CacheStorage>, policy: CleanupPolicy) -> Result<Self> {
        let handle = Handle::try_current()
            .context("The content cache must be created inside a tokio runtime")?;
        let (tx, mut rx) = mpsc::unbounded_channel::<DiskOp>();
        let resets = Arc::new(ResetEpochs::default());
        let task_resets = Arc::clone(&resets);

        handle.spawn(async move {
            while let Some(op) = rx.recv().await {
                let storage = Arc::clone(&storage);
                let resets = Arc::clone(&task_resets);
                let outcome =
                    tokio::task::spawn_blocking(move || op.run(&storage, &policy, &resets)).await;
                if let Err(e) = outcome {
                    log::warn!("Cache disk operation aborted: {}", e);
                }
            }
            log::debug!("Cache writer stopped");
        });

        Ok(Self { tx, resets })
    }

    pub fn write(&self, fingerprint: Fingerprint, bytes: ImageBytes) {
        self.submit(DiskOp::Write { fingerprint, bytes });
    }

    pub fn evict(&self, fingerprint: Fingerprint) {
        self.submit(DiskOp::Evict { fingerprint });
    }

    pub fn reset(&self) {
        let epoch = self.resets.request();
        self.submit(DiskOp::Reset { epoch });
    }

    pub fn resets(&self) -> &ResetEpochs {
        &self.resets
    }

    pub fn schedule_sweep(&self) {
        self.submit(DiskOp::Sweep { reply: None });
    }

    pub async fn sweep(&self) -> CleanupStats {
        let (reply, rx) = oneshot::channel();
        self.submit(DiskOp::Sweep { reply: Some(reply) });
        rx.await.unwrap_or_default()
    }

    /// Wait until every operation submitted so far has completed
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        self.submit(DiskOp::Flush { reply });
        let _ = rx.await;
    }

    fn submit(&self, op: DiskOp) {
        if self.tx.send(op).is_err() {
            log::warn!("Cache writer is gone; disk operation dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::jpeg;
    use tempfile::TempDir;

    #[test]
    fn test_reset_epochs() {
        let resets = ResetEpochs::default();
        assert!(!resets.is_pending());

        let first = resets.request();
        let second = resets.request();
        assert_eq!(resets.current(), 2);
        assert!(resets.is_pending());

        resets.complete(first);
        assert!(resets.is_pending());

        resets.complete(second);
        assert!(!resets.is_pending());

        // A late completion never moves the mark backwards
        resets.complete(first);
        assert!(!resets.is_pending());
    }

    #[tokio::test]
    async fn test_reset_is_pending_until_the_writer_runs_it() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(CacheStorage::new(temp_dir.path()));
        let writer = DiskWriter::spawn(Arc::clone(&storage), CleanupPolicy::default()).unwrap();

        writer.write(Fingerprint::of("a"), ImageBytes::from(jpeg(b"a")));
        writer.reset();
        assert!(writer.resets().is_pending());

        writer.flush().await;

        assert!(!writer.resets().is_pending());
        assert_eq!(storage.entry_count(), 0);
    }
}
