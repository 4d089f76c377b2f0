use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Which delivery path carried an event into the engine. Poll reflects
// durable server state and wins conflicts against the live push channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    Push,
    Poll,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyRef {
    #[serde(default)]
    pub name: Option<String>,
}

/// Appointment payload as both channels embed it. Every field is optional;
/// the wire shapes are heterogeneous and missing fields degrade to literal
/// fallbacks downstream, never to an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentPayload {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub pet: Option<PartyRef>,
    #[serde(default)]
    pub veterinarian: Option<PartyRef>,
}

impl AppointmentPayload {
    /// Stable reference for dedup keys: uuid when present, else the numeric
    /// id. Events with neither still get a key, just a degenerate one.
    pub fn reference(&self) -> Option<String> {
        self.uuid
            .clone()
            .or_else(|| self.id.map(|id| id.to_string()))
    }

    pub fn pet_name(&self) -> Option<&str> {
        self.pet.as_ref().and_then(|p| p.name.as_deref())
    }

    pub fn vet_name(&self) -> Option<&str> {
        self.veterinarian.as_ref().and_then(|v| v.name.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    #[serde(default)]
    pub old: Option<String>,
    #[serde(default)]
    pub new: Option<String>,
}

impl StatusChange {
    pub fn is_transition(&self) -> bool {
        self.new.is_some()
    }
}

/// The event vocabulary both channels speak, after wire-type strings are
/// normalized. Bespoke strings the server mints inside generic notification
/// wrappers stay as `Generic` and are matched again at classification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventShape {
    Created,
    Updated,
    Reminder,
    Generic(String),
}

impl EventShape {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "appointment.created" | "appointment_created" => Self::Created,
            "appointment.updated" | "appointment_updated" => Self::Updated,
            "appointment.reminder" | "appointment_reminder" | "reminder" => Self::Reminder,
            other => Self::Generic(other.to_string()),
        }
    }
}

/// Raw inbound notification, normalized from either channel but not yet
/// deduplicated or classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEnvelope {
    pub channel: SourceChannel,
    /// Server-assigned notification id, when the channel carries one.
    pub raw_id: Option<String>,
    pub shape: EventShape,
    pub appointment: Option<AppointmentPayload>,
    pub status_change: Option<StatusChange>,
    /// Server-resolved display text (the poll channel persists these).
    pub title_override: Option<String>,
    pub message_override: Option<String>,
    /// Server-supplied translation keys (generic push wrappers may set them).
    pub title_key: Option<String>,
    pub message_key: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl NotificationEnvelope {
    pub fn new(channel: SourceChannel, shape: EventShape, received_at: DateTime<Utc>) -> Self {
        Self {
            channel,
            raw_id: None,
            shape,
            appointment: None,
            status_change: None,
            title_override: None,
            message_override: None,
            title_key: None,
            message_key: None,
            received_at,
        }
    }

    pub fn appointment_reference(&self) -> Option<String> {
        self.appointment.as_ref().and_then(|a| a.reference())
    }

    /// A status transition only counts when the update names the new status.
    pub fn status_transition(&self) -> Option<&StatusChange> {
        self.status_change.as_ref().filter(|c| c.is_transition())
    }
}
