use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::dispatch::EngineCommand;
use crate::engine::error::NotifyError;
use crate::engine::events::{
    AppointmentPayload, EventShape, NotificationEnvelope, SourceChannel,
};
use crate::util::logging::{debug, info};
use crate::util::threading::{ThreadHandle, ThreadRegistry};

/// Persisted-notification fetch collaborator. Safe to call repeatedly.
pub trait NotificationFetcher: Send + Sync {
    fn fetch_latest(&self, limit: usize) -> Result<FetchResponse, NotifyError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub notifications: Vec<PersistedNotification>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistedNotification {
    pub id: String,
    pub data: NotificationData,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub appointment: Option<AppointmentPayload>,
}

/// Diffing state for the poll channel. The seen set absorbs *all* ids each
/// response, not only new ones, so the poll channel converges with whatever
/// the push channel already admitted.
#[derive(Default)]
pub struct PollState {
    seen: HashSet<String>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns unseen items oldest-first. Responses arrive newest-first and
    /// the feed prepends on admission, so forwarding in reverse keeps the
    /// feed newest-first without reordering survivors.
    pub fn take_new(&mut self, response: &FetchResponse) -> Vec<PersistedNotification> {
        let mut fresh: Vec<PersistedNotification> = response
            .notifications
            .iter()
            .filter(|n| !self.seen.contains(&n.id))
            .cloned()
            .collect();
        for n in &response.notifications {
            self.seen.insert(n.id.clone());
        }
        fresh.reverse();
        fresh
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

pub fn envelope_from_persisted(item: &PersistedNotification) -> NotificationEnvelope {
    let mut env = NotificationEnvelope::new(
        SourceChannel::Poll,
        EventShape::from_wire(&item.data.kind),
        item.created_at,
    );
    env.raw_id = Some(item.id.clone());
    env.appointment = item.data.appointment.clone();
    env.title_override = non_empty(&item.data.title);
    env.message_override = non_empty(&item.data.message);
    env
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Fetches once at start and then on every interval until stopped. Fetch
/// failures are swallowed; the next interval retries naturally.
pub fn spawn_poll_loop(
    threads: &ThreadRegistry,
    fetcher: Arc<dyn NotificationFetcher>,
    limit: usize,
    interval: Duration,
    command_tx: Sender<EngineCommand>,
    stop_rx: Receiver<()>,
) -> anyhow::Result<ThreadHandle> {
    threads.spawn("notify-poll", move || {
        info!("Poll loop started (interval {:?})", interval);
        let mut state = PollState::new();
        let ticker = crossbeam_channel::tick(interval);

        if !poll_once(&mut state, fetcher.as_ref(), limit, &command_tx) {
            info!("Dispatcher gone; poll loop stopping");
            return;
        }

        loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => {
                    info!("Poll loop stop received");
                    break;
                }
                recv(ticker) -> _ => {
                    if !poll_once(&mut state, fetcher.as_ref(), limit, &command_tx) {
                        info!("Dispatcher gone; poll loop stopping");
                        break;
                    }
                }
            }
        }
        info!("Poll loop exiting");
    })
}

fn poll_once(
    state: &mut PollState,
    fetcher: &dyn NotificationFetcher,
    limit: usize,
    command_tx: &Sender<EngineCommand>,
) -> bool {
    let response = match fetcher.fetch_latest(limit) {
        Ok(response) => response,
        Err(e) => {
            // Transient by definition; the next interval retries.
            debug!("Notification fetch failed: {}", e);
            return true;
        }
    };
    if !response.success {
        debug!("Notification fetch reported failure");
        return true;
    }

    for item in state.take_new(&response) {
        let envelope = envelope_from_persisted(&item);
        if command_tx
            .send(EngineCommand::Deliver(envelope))
            .is_err()
        {
            return false;
        }
    }
    true
}
