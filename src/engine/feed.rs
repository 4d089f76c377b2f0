use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::engine::store::{OverlayEntry, ToastEntry};

/// Point-in-time view of both UI projections. UI consumers read the latest
/// snapshot (or watch for changes) without touching dispatcher state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub seq: u64,
    pub toasts: Vec<ToastEntry>,
    pub overlays: Vec<OverlayEntry>,
    pub counts: DeliveryCounts,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeliveryCounts {
    pub delivered: u64,
    pub suppressed_duplicates: u64,
    pub overlays_admitted: u64,
    pub toasts_shown: u64,
}

impl FeedSnapshot {
    pub fn empty() -> Self {
        Self {
            seq: 0,
            toasts: Vec::new(),
            overlays: Vec::new(),
            counts: DeliveryCounts::default(),
        }
    }
}

pub struct FeedBus {
    seq: AtomicU64,
    snapshot_tx: watch::Sender<Arc<FeedSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<FeedSnapshot>>,
}

impl FeedBus {
    pub fn new() -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(FeedSnapshot::empty()));
        Self {
            seq: AtomicU64::new(0),
            snapshot_tx,
            snapshot_rx,
        }
    }

    pub fn publish(
        &self,
        toasts: Vec<ToastEntry>,
        overlays: Vec<OverlayEntry>,
        counts: DeliveryCounts,
    ) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let snap = FeedSnapshot {
            seq,
            toasts,
            overlays,
            counts,
        };
        let _ = self.snapshot_tx.send(Arc::new(snap));
    }

    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.snapshot_rx.clone()
    }
}

impl Default for FeedBus {
    fn default() -> Self {
        Self::new()
    }
}
