use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::engine::classify::{Category, Severity};
use crate::engine::error::NotifyError;
use crate::engine::events::SourceChannel;
use crate::util::logging::{debug, error, info};
use crate::util::threading::{ThreadHandle, ThreadRegistry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastEntry {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// Zero or negative means the toast never auto-expires.
    pub ttl_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl ToastEntry {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl_ms > 0 {
            Some(self.created_at + Duration::milliseconds(self.ttl_ms))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlayEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub appointment_id: Option<i64>,
    pub appointment_uuid: Option<String>,
    pub origin: SourceChannel,
    pub received_at: DateTime<Utc>,
}

impl OverlayEntry {
    fn same_content(&self, other: &OverlayEntry) -> bool {
        self.appointment_uuid.is_some()
            && self.appointment_uuid == other.appointment_uuid
            && self.category == other.category
            && self.title == other.title
    }
}

/// Outcome of an overlay admission attempt. Only `Admitted` should surface a
/// toast: a replacement is content the user already saw via push, and the
/// two duplicate outcomes are suppressed repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Poll entry superseded an equivalent push-origin entry.
    AdmittedReplacingPush,
    DuplicateId,
    DuplicateContent,
}

impl Admission {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    pub fn changed_feed(&self) -> bool {
        matches!(self, Admission::Admitted | Admission::AdmittedReplacingPush)
    }
}

#[derive(Debug)]
pub enum AckCommand {
    Ack(String),
    Shutdown,
}

/// Dismiss-acknowledgement collaborator. Idempotent on the server side;
/// errors are logged and never undo the local removal.
pub trait Acknowledger: Send + Sync {
    fn ack(&self, id: &str) -> Result<(), NotifyError>;
}

pub struct NotificationStore {
    toasts: Vec<ToastEntry>,
    overlays: VecDeque<OverlayEntry>,
    overlay_cap: usize,
    ack_tx: Sender<AckCommand>,
}

impl NotificationStore {
    pub fn new(overlay_cap: usize, ack_tx: Sender<AckCommand>) -> Self {
        Self {
            toasts: Vec::new(),
            overlays: VecDeque::new(),
            overlay_cap: overlay_cap.max(1),
            ack_tx,
        }
    }

    pub fn toasts(&self) -> &[ToastEntry] {
        &self.toasts
    }

    pub fn overlays(&self) -> impl Iterator<Item = &OverlayEntry> {
        self.overlays.iter()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn add_toast(&mut self, entry: ToastEntry) {
        debug!("Toast queued: {} ({:?})", entry.id, entry.severity);
        self.toasts.push(entry);
    }

    /// Idempotent manual close.
    pub fn remove_toast(&mut self, id: &str) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        before != self.toasts.len()
    }

    /// Drops every toast whose deadline passed. Expiry is tick-driven so a
    /// simulated clock exercises it deterministically.
    pub fn expire_toasts(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.toasts.len();
        self.toasts
            .retain(|t| t.expires_at().map(|at| at > now).unwrap_or(true));
        before != self.toasts.len()
    }

    /// Admission applies, in order: the poll-wins rule (a poll-origin entry
    /// supersedes an equivalent push-origin one), the id guard, and the
    /// fuzzy content guard for cross-channel races where ids differ. New
    /// entries are prepended; overflow evicts the oldest without acking.
    pub fn add_overlay(&mut self, entry: OverlayEntry) -> Admission {
        let mut replaced_push = false;
        if entry.origin == SourceChannel::Poll {
            let before = self.overlays.len();
            self.overlays
                .retain(|e| !(e.origin == SourceChannel::Push && e.same_content(&entry)));
            replaced_push = before != self.overlays.len();
        }

        if self.overlays.iter().any(|e| e.id == entry.id) {
            debug!("Overlay rejected, id already present: {}", entry.id);
            return Admission::DuplicateId;
        }
        if self.overlays.iter().any(|e| e.same_content(&entry)) {
            debug!("Overlay rejected, equivalent content present: {}", entry.id);
            return Admission::DuplicateContent;
        }

        self.overlays.push_front(entry);
        self.overlays.truncate(self.overlay_cap);

        if replaced_push {
            Admission::AdmittedReplacingPush
        } else {
            Admission::Admitted
        }
    }

    /// Optimistic removal: local state mutates first, the acknowledgement is
    /// fire-and-forget through the worker queue.
    pub fn dismiss_overlay(&mut self, id: &str) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|e| e.id != id);
        if before == self.overlays.len() {
            return false;
        }
        if let Err(e) = self.ack_tx.send(AckCommand::Ack(id.to_string())) {
            error!("Failed to enqueue ack for '{}': {}", id, e);
        }
        true
    }

    /// Bulk clear, no per-item acknowledgement.
    pub fn clear_overlays(&mut self) -> bool {
        let had_entries = !self.overlays.is_empty();
        self.overlays.clear();
        had_entries
    }
}

pub fn spawn_ack_worker(
    threads: &ThreadRegistry,
    ack_rx: Receiver<AckCommand>,
    acknowledger: Arc<dyn Acknowledger>,
) -> anyhow::Result<ThreadHandle> {
    threads.spawn("notify-ack", move || {
        info!("Ack worker thread started");
        while let Ok(cmd) = ack_rx.recv() {
            match cmd {
                AckCommand::Ack(id) => {
                    if let Err(e) = acknowledger.ack(&id) {
                        // Local removal already happened; nothing to roll back.
                        error!("Dismiss acknowledgement failed: {}", e);
                    }
                }
                AckCommand::Shutdown => {
                    info!("Ack worker shutdown received");
                    break;
                }
            }
        }
        info!("Ack worker thread exiting");
    })
}
