use serde::{Deserialize, Serialize};

use crate::engine::events::{EventShape, NotificationEnvelope};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Task,
    Security,
    Message,
}

/// Translation lookup collaborator. An unresolved key comes back verbatim;
/// the resolver treats that echo as a miss and falls through to literal
/// defaults so the UI never renders a blank or a bare key.
pub trait Localizer: Send + Sync {
    fn translate(&self, key: &str, params: &[(&str, String)]) -> String;
}

/// Localizer that resolves nothing. Useful when no catalog is wired up;
/// every notification then renders from its literal defaults.
pub struct NullLocalizer;

impl Localizer for NullLocalizer {
    fn translate(&self, key: &str, _params: &[(&str, String)]) -> String {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ToastDurations {
    pub default_ms: i64,
    pub reminder_ms: i64,
}

impl Default for ToastDurations {
    fn default() -> Self {
        Self {
            default_ms: 5_000,
            reminder_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub severity: Severity,
    pub category: Category,
    pub title_key: Option<&'static str>,
    pub message_key: Option<&'static str>,
    pub toast_ttl_ms: i64,
    default_title: Option<&'static str>,
    default_message: Option<&'static str>,
}

struct Row {
    severity: Severity,
    category: Category,
    title_key: Option<&'static str>,
    message_key: Option<&'static str>,
    default_title: Option<&'static str>,
    default_message: Option<&'static str>,
}

static CONFIRMED: Row = Row {
    severity: Severity::Success,
    category: Category::Task,
    title_key: Some("notifications.appointment_confirmed.title"),
    message_key: Some("notifications.appointment_confirmed.message"),
    default_title: Some("Appointment confirmed"),
    default_message: Some(
        "Your appointment for {petName} with {vetName} on {date} has been confirmed.",
    ),
};

static CANCELLED: Row = Row {
    severity: Severity::Warning,
    category: Category::Security,
    title_key: Some("notifications.appointment_cancelled.title"),
    message_key: Some("notifications.appointment_cancelled.message"),
    default_title: Some("Appointment cancelled"),
    default_message: Some("The appointment for {petName} on {date} has been cancelled."),
};

static COMPLETED: Row = Row {
    severity: Severity::Success,
    category: Category::Task,
    title_key: Some("notifications.appointment_completed.title"),
    message_key: Some("notifications.appointment_completed.message"),
    default_title: Some("Appointment completed"),
    default_message: Some("The visit for {petName} with {vetName} is complete."),
};

static RESCHEDULED: Row = Row {
    severity: Severity::Info,
    category: Category::Task,
    title_key: Some("notifications.appointment_rescheduled.title"),
    message_key: Some("notifications.appointment_rescheduled.message"),
    default_title: Some("Appointment rescheduled"),
    default_message: Some("The appointment for {petName} has been moved to {date} at {time}."),
};

static STATUS_OTHER: Row = Row {
    severity: Severity::Info,
    category: Category::Task,
    title_key: Some("notifications.appointment_status_changed.title"),
    message_key: Some("notifications.appointment_status_changed.message"),
    default_title: Some("Appointment updated"),
    default_message: Some("The appointment for {petName} has a new status."),
};

static REMINDER: Row = Row {
    severity: Severity::Info,
    category: Category::Task,
    title_key: Some("notifications.appointment_reminder.title"),
    message_key: Some("notifications.appointment_reminder.message"),
    default_title: Some("Appointment reminder"),
    default_message: Some("{petName} has an appointment with {vetName} on {date} at {time}."),
};

static CREATED: Row = Row {
    severity: Severity::Success,
    category: Category::Task,
    title_key: Some("notifications.appointment_created.title"),
    message_key: Some("notifications.appointment_created.message"),
    default_title: Some("Appointment booked"),
    default_message: Some(
        "Your appointment for {petName} with {vetName} on {date} has been booked.",
    ),
};

// No literal defaults: a plain update with nothing resolvable is a no-op.
static UPDATED: Row = Row {
    severity: Severity::Info,
    category: Category::Task,
    title_key: Some("notifications.appointment_updated.title"),
    message_key: Some("notifications.appointment_updated.message"),
    default_title: None,
    default_message: None,
};

static GENERIC: Row = Row {
    severity: Severity::Info,
    category: Category::Task,
    title_key: None,
    message_key: None,
    default_title: None,
    default_message: None,
};

/// First-match-wins mapping from (event shape, status transition) to the
/// presentation tuple. Bespoke type strings minted by the server inside
/// generic wrappers are matched against the same status rows.
pub fn classify(envelope: &NotificationEnvelope, durations: ToastDurations) -> Classification {
    let (row, ttl) = if let Some(change) = envelope.status_transition() {
        (status_row(change.new.as_deref()), durations.default_ms)
    } else {
        match &envelope.shape {
            EventShape::Reminder => (&REMINDER, durations.reminder_ms),
            EventShape::Created => (&CREATED, durations.default_ms),
            EventShape::Updated => (&UPDATED, durations.default_ms),
            EventShape::Generic(kind) => match generic_status(kind) {
                Some(row) => (row, durations.default_ms),
                None if kind_is_reminder(kind) => (&REMINDER, durations.reminder_ms),
                None => (&GENERIC, durations.default_ms),
            },
        }
    };

    Classification {
        severity: row.severity,
        category: row.category,
        title_key: row.title_key,
        message_key: row.message_key,
        toast_ttl_ms: ttl,
        default_title: row.default_title,
        default_message: row.default_message,
    }
}

fn status_row(new_status: Option<&str>) -> &'static Row {
    match new_status {
        Some("confirmed") => &CONFIRMED,
        Some("cancelled") => &CANCELLED,
        Some("completed") => &COMPLETED,
        Some("rescheduled") => &RESCHEDULED,
        _ => &STATUS_OTHER,
    }
}

fn generic_status(kind: &str) -> Option<&'static Row> {
    match kind {
        "appointment_confirmed" => Some(&CONFIRMED),
        "appointment_cancelled" => Some(&CANCELLED),
        "appointment_completed" => Some(&COMPLETED),
        "appointment_rescheduled" => Some(&RESCHEDULED),
        _ => None,
    }
}

fn kind_is_reminder(kind: &str) -> bool {
    kind.ends_with("reminder")
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedTexts {
    pub title: Option<String>,
    pub message: Option<String>,
}

impl ResolvedTexts {
    /// A toast with neither title nor message is suppressed.
    pub fn is_blank(&self) -> bool {
        self.title.is_none() && self.message.is_none()
    }
}

/// Resolution order per field: server literal text, then a server-supplied
/// key, then the computed key, then the literal default. A key whose lookup
/// echoes the key back counts as a miss.
pub fn resolve_texts(
    localizer: &dyn Localizer,
    envelope: &NotificationEnvelope,
    class: &Classification,
) -> ResolvedTexts {
    let params = placeholder_params(envelope);
    ResolvedTexts {
        title: resolve_field(
            localizer,
            envelope.title_override.as_deref(),
            envelope.title_key.as_deref(),
            class.title_key,
            class.default_title,
            &params,
        ),
        message: resolve_field(
            localizer,
            envelope.message_override.as_deref(),
            envelope.message_key.as_deref(),
            class.message_key,
            class.default_message,
            &params,
        ),
    }
}

fn resolve_field(
    localizer: &dyn Localizer,
    literal: Option<&str>,
    server_key: Option<&str>,
    computed_key: Option<&str>,
    default_template: Option<&str>,
    params: &[(&str, String)],
) -> Option<String> {
    if let Some(text) = literal.filter(|t| !t.is_empty()) {
        return Some(text.to_string());
    }
    for key in [server_key, computed_key].into_iter().flatten() {
        let translated = localizer.translate(key, params);
        if translated != key {
            return Some(translated);
        }
    }
    default_template.map(|template| fill_placeholders(template, params))
}

/// Named-placeholder substitution for literal fallback templates, mirroring
/// what the localization collaborator does for catalog strings.
pub fn fill_placeholders(template: &str, params: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

pub fn placeholder_params(envelope: &NotificationEnvelope) -> Vec<(&'static str, String)> {
    let appt = envelope.appointment.as_ref();
    vec![
        (
            "vetName",
            appt.and_then(|a| a.vet_name())
                .unwrap_or("the veterinarian")
                .to_string(),
        ),
        (
            "petName",
            appt.and_then(|a| a.pet_name())
                .unwrap_or("your pet")
                .to_string(),
        ),
        (
            "date",
            appt.and_then(|a| a.date.as_deref())
                .unwrap_or("the scheduled date")
                .to_string(),
        ),
        (
            "time",
            appt.and_then(|a| a.time.as_deref())
                .unwrap_or("the scheduled time")
                .to_string(),
        ),
    ]
}
