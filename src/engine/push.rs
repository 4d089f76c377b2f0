use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

use crate::engine::dispatch::EngineCommand;
use crate::engine::events::{
    AppointmentPayload, EventShape, NotificationEnvelope, SourceChannel, StatusChange,
};
use crate::util::logging::{info, trace};
use crate::util::threading::{ThreadHandle, ThreadRegistry};

/// Per-user private topic the live channel binds to. Subscription lifetime
/// equals identity lifetime; the coordinator rebinds on identity change.
pub fn user_topic(user_id: &str) -> String {
    format!("user.{}", user_id)
}

/// Broadcast transport collaborator. At-least-once, unordered, no redelivery
/// across reconnect gaps; the poll channel recovers whatever this one drops.
pub trait PushTransport: Send + Sync {
    fn subscribe(&self, topic: &str) -> anyhow::Result<Receiver<PushMessage>>;
    fn unsubscribe(&self, topic: &str);
}

/// The four event shapes the per-user topic carries.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum PushMessage {
    #[serde(rename = "appointment.created")]
    AppointmentCreated { appointment: AppointmentPayload },
    #[serde(rename = "appointment.updated")]
    AppointmentUpdated {
        appointment: AppointmentPayload,
        #[serde(default)]
        changes: Option<ChangeSet>,
    },
    #[serde(rename = "appointment.reminder")]
    AppointmentReminder { appointment: AppointmentPayload },
    #[serde(rename = "notification")]
    Notification {
        #[serde(default)]
        id: Option<String>,
        data: GenericNotification,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub status: Option<StatusChange>,
}

/// Generic wrapper the server uses for bespoke notification types. It may
/// wrap any appointment event under its own type string and can carry
/// pre-resolved text, translation keys, or both.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericNotification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub title_key: Option<String>,
    #[serde(default)]
    pub message_key: Option<String>,
    #[serde(default)]
    pub appointment: Option<AppointmentPayload>,
    #[serde(default)]
    pub changes: Option<ChangeSet>,
}

pub fn envelope_from_push(message: PushMessage, now: DateTime<Utc>) -> NotificationEnvelope {
    match message {
        PushMessage::AppointmentCreated { appointment } => {
            let mut env = NotificationEnvelope::new(SourceChannel::Push, EventShape::Created, now);
            env.appointment = Some(appointment);
            env
        }
        PushMessage::AppointmentUpdated {
            appointment,
            changes,
        } => {
            let mut env = NotificationEnvelope::new(SourceChannel::Push, EventShape::Updated, now);
            env.appointment = Some(appointment);
            env.status_change = changes.and_then(|c| c.status);
            env
        }
        PushMessage::AppointmentReminder { appointment } => {
            let mut env = NotificationEnvelope::new(SourceChannel::Push, EventShape::Reminder, now);
            env.appointment = Some(appointment);
            env
        }
        PushMessage::Notification { id, data } => {
            let mut env = NotificationEnvelope::new(
                SourceChannel::Push,
                EventShape::from_wire(&data.kind),
                now,
            );
            env.raw_id = id;
            env.appointment = data.appointment;
            env.status_change = data.changes.and_then(|c| c.status);
            env.title_override = data.title.filter(|t| !t.is_empty());
            env.message_override = data.message.filter(|m| !m.is_empty());
            env.title_key = data.title_key;
            env.message_key = data.message_key;
            env
        }
    }
}

/// Drains the transport receiver into the dispatcher queue. Exits when the
/// transport unsubscribes (sender dropped) or the dispatcher goes away.
pub fn spawn_push_forwarder(
    threads: &ThreadRegistry,
    messages: Receiver<PushMessage>,
    command_tx: Sender<EngineCommand>,
) -> anyhow::Result<ThreadHandle> {
    threads.spawn("notify-push", move || {
        info!("Push forwarder started");
        while let Ok(message) = messages.recv() {
            trace!("Push message received: {:?}", message);
            let envelope = envelope_from_push(message, Utc::now());
            if command_tx.send(EngineCommand::Deliver(envelope)).is_err() {
                info!("Dispatcher gone; push forwarder stopping");
                break;
            }
        }
        info!("Push forwarder exiting");
    })
}
