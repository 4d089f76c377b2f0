use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::classify::{self, Localizer, ToastDurations};
use crate::engine::events::{EventShape, NotificationEnvelope};
use crate::engine::fanout::{FanoutBus, FanoutEvent};
use crate::engine::feed::{DeliveryCounts, FeedBus};
use crate::engine::identity::{self, BoundedKeySet};
use crate::engine::store::{AckCommand, NotificationStore, OverlayEntry, ToastEntry};
use crate::util::config::EngineConfig;
use crate::util::logging::{debug, info, trace};
use crate::util::threading::{ThreadHandle, ThreadRegistry};

#[derive(Debug)]
pub enum EngineCommand {
    Deliver(NotificationEnvelope),
    DismissOverlay(String),
    RemoveToast(String),
    ClearOverlays,
    /// Identity switched or signed out. Either way the dedup sets reset and
    /// the overlay feed clears; toasts are left to expire naturally. The
    /// coordinator handles channel teardown separately.
    IdentityChanged(Option<String>),
    Tick(DateTime<Utc>),
    Shutdown,
}

/// All mutable engine state, owned by the dispatcher thread. Every dedup
/// check-and-insert happens inside one `handle` call, so rapid repeat events
/// cannot slip through a deferred-commit window.
pub struct Engine {
    localizer: Arc<dyn Localizer>,
    store: NotificationStore,
    feed: Arc<FeedBus>,
    fanout: Arc<FanoutBus>,
    materialized: BoundedKeySet,
    fingerprints: BoundedKeySet,
    durations: ToastDurations,
    counts: DeliveryCounts,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        localizer: Arc<dyn Localizer>,
        feed: Arc<FeedBus>,
        fanout: Arc<FanoutBus>,
        ack_tx: Sender<AckCommand>,
    ) -> Self {
        Self {
            localizer,
            store: NotificationStore::new(config.overlay_feed_cap, ack_tx),
            feed,
            fanout,
            materialized: BoundedKeySet::new(config.materialized_key_cap),
            fingerprints: BoundedKeySet::new(config.fingerprint_cap),
            durations: ToastDurations {
                default_ms: config.toast_ttl_ms,
                reminder_ms: config.reminder_toast_ttl_ms,
            },
            counts: DeliveryCounts::default(),
        }
    }

    pub fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Deliver(envelope) => {
                self.deliver(envelope);
                self.publish();
            }
            EngineCommand::DismissOverlay(id) => {
                if self.store.dismiss_overlay(&id) {
                    self.publish();
                }
            }
            EngineCommand::RemoveToast(id) => {
                if self.store.remove_toast(&id) {
                    self.publish();
                }
            }
            EngineCommand::ClearOverlays => {
                if self.store.clear_overlays() {
                    self.publish();
                }
            }
            EngineCommand::IdentityChanged(user) => {
                match &user {
                    Some(user) => info!("Identity changed to {}; resetting session state", user),
                    None => info!("Signed out; clearing overlay feed"),
                }
                self.materialized.reset();
                self.fingerprints.reset();
                self.store.clear_overlays();
                self.publish();
            }
            EngineCommand::Tick(now) => {
                if self.store.expire_toasts(now) {
                    self.publish();
                }
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn deliver(&mut self, envelope: NotificationEnvelope) {
        self.counts.delivered += 1;

        // Fan-out is unconditional: the appointment data may be fresh even
        // when the notification itself is a suppressed duplicate.
        if let Some(appointment) = &envelope.appointment {
            self.fanout.emit(FanoutEvent {
                appointment: appointment.clone(),
                source: envelope.channel.into(),
            });
        }

        if let Some(change) = envelope.status_transition() {
            let reference = envelope
                .appointment_reference()
                .unwrap_or_else(|| "unknown".to_string());
            let fingerprint = identity::fingerprint(&reference, change);
            if !self.fingerprints.insert(&fingerprint) {
                debug!("Status churn suppressed: {}", fingerprint);
                self.counts.suppressed_duplicates += 1;
                return;
            }
        }

        let class = classify::classify(&envelope, self.durations);
        let texts = classify::resolve_texts(self.localizer.as_ref(), &envelope, &class);

        // A plain update with nothing to show is a silent no-op.
        if texts.is_blank()
            && envelope.shape == EventShape::Updated
            && envelope.status_transition().is_none()
        {
            trace!("Plain appointment update with no resolvable text; skipping");
            return;
        }

        let key = identity::resolve_key(&envelope);
        if !self.materialized.insert(key.as_str()) {
            debug!("Duplicate notification suppressed: {}", key);
            self.counts.suppressed_duplicates += 1;
            return;
        }

        let overlay = OverlayEntry {
            id: key.as_str().to_string(),
            title: texts
                .title
                .clone()
                .unwrap_or_else(|| fallback_overlay_title(&envelope)),
            description: texts.message.clone().unwrap_or_default(),
            category: class.category,
            appointment_id: envelope.appointment.as_ref().and_then(|a| a.id),
            appointment_uuid: envelope.appointment.as_ref().and_then(|a| a.uuid.clone()),
            origin: envelope.channel,
            received_at: envelope.received_at,
        };
        let admission = self.store.add_overlay(overlay);
        if admission.changed_feed() {
            self.counts.overlays_admitted += 1;
        }

        // Replacements and duplicates were already visible once; only a
        // genuinely fresh admission gets a toast.
        if admission.is_fresh() && !texts.is_blank() {
            self.store.add_toast(ToastEntry {
                id: key.into_string(),
                severity: class.severity,
                title: texts.title.unwrap_or_default(),
                message: texts.message.unwrap_or_default(),
                ttl_ms: class.toast_ttl_ms,
                created_at: envelope.received_at,
            });
            self.counts.toasts_shown += 1;
        }
    }

    fn publish(&self) {
        self.feed.publish(
            self.store.toasts().to_vec(),
            self.store.overlays().cloned().collect(),
            self.counts.clone(),
        );
    }
}

fn fallback_overlay_title(envelope: &NotificationEnvelope) -> String {
    match &envelope.shape {
        EventShape::Generic(kind) => kind.clone(),
        _ => "Notification".to_string(),
    }
}

pub fn spawn_dispatcher(
    threads: &ThreadRegistry,
    command_rx: Receiver<EngineCommand>,
    mut engine: Engine,
    tick_ms: u64,
) -> anyhow::Result<ThreadHandle> {
    threads.spawn("notify-dispatch", move || {
        info!("Dispatcher started");
        let ticker = crossbeam_channel::tick(Duration::from_millis(tick_ms.max(10)));
        loop {
            crossbeam_channel::select! {
                recv(command_rx) -> msg => {
                    match msg {
                        Ok(EngineCommand::Shutdown) => {
                            info!("Dispatcher received shutdown");
                            break;
                        }
                        Ok(command) => engine.handle(command),
                        Err(_) => {
                            info!("Command channel disconnected; dispatcher stopping");
                            break;
                        }
                    }
                }
                recv(ticker) -> _ => {
                    engine.handle(EngineCommand::Tick(Utc::now()));
                }
            }
        }
        info!("Dispatcher exiting");
    })
}
