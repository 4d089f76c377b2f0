use std::collections::{HashSet, VecDeque};

use crate::engine::events::{EventShape, NotificationEnvelope, StatusChange};

/// Dedup key for one notification: the server id when the channel supplied
/// one, else appointment reference plus event token. Status transitions fold
/// the new status into the token so distinct transitions of one appointment
/// stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn resolve_key(envelope: &NotificationEnvelope) -> NotificationKey {
    if let Some(raw_id) = &envelope.raw_id {
        return NotificationKey(raw_id.clone());
    }
    let reference = envelope
        .appointment_reference()
        .unwrap_or_else(|| "unknown".to_string());
    NotificationKey(format!("{}:{}", reference, event_token(envelope)))
}

/// Token naming what happened, independent of which wire string carried it.
pub fn event_token(envelope: &NotificationEnvelope) -> String {
    if let Some(change) = envelope.status_transition() {
        if let Some(new) = &change.new {
            return format!("status-{}", new);
        }
    }
    match &envelope.shape {
        EventShape::Created => "created".to_string(),
        EventShape::Updated => "updated".to_string(),
        EventShape::Reminder => "reminder".to_string(),
        EventShape::Generic(kind) => kind.clone(),
    }
}

pub fn fingerprint(reference: &str, change: &StatusChange) -> String {
    format!(
        "{}:{}>{}",
        reference,
        change.old.as_deref().unwrap_or("?"),
        change.new.as_deref().unwrap_or("?")
    )
}

/// Insertion-ordered set with a hard cap. Exceeding the cap trims to the
/// newest half, so long sessions stay bounded while recent history keeps
/// suppressing repeats.
pub struct BoundedKeySet {
    cap: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl BoundedKeySet {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(2),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Atomic check-and-insert: returns false when the key was already
    /// present. Callers must not split the check from the insert.
    pub fn insert(&mut self, key: &str) -> bool {
        if !self.seen.insert(key.to_string()) {
            return false;
        }
        self.order.push_back(key.to_string());
        if self.order.len() > self.cap {
            let keep = self.cap / 2;
            while self.order.len() > keep {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn reset(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{AppointmentPayload, SourceChannel};
    use chrono::{TimeZone, Utc};

    fn envelope(shape: EventShape) -> NotificationEnvelope {
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut env = NotificationEnvelope::new(SourceChannel::Push, shape, ts);
        env.appointment = Some(AppointmentPayload {
            uuid: Some("A1".into()),
            ..Default::default()
        });
        env
    }

    #[test]
    fn server_id_wins_over_composite() {
        let mut env = envelope(EventShape::Created);
        env.raw_id = Some("srv-42".into());
        assert_eq!(resolve_key(&env).as_str(), "srv-42");
    }

    #[test]
    fn composite_key_uses_reference_and_token() {
        let env = envelope(EventShape::Created);
        assert_eq!(resolve_key(&env).as_str(), "A1:created");

        let mut env = envelope(EventShape::Updated);
        env.status_change = Some(StatusChange {
            old: Some("scheduled".into()),
            new: Some("confirmed".into()),
        });
        assert_eq!(resolve_key(&env).as_str(), "A1:status-confirmed");
    }

    #[test]
    fn missing_reference_degrades_to_unknown() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let env = NotificationEnvelope::new(SourceChannel::Poll, EventShape::Reminder, ts);
        assert_eq!(resolve_key(&env).as_str(), "unknown:reminder");
    }

    #[test]
    fn insert_reports_duplicates() {
        let mut set = BoundedKeySet::new(10);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.contains("a"));
    }

    #[test]
    fn cap_overflow_trims_to_newest_half() {
        let mut set = BoundedKeySet::new(10);
        for i in 0..11 {
            assert!(set.insert(&format!("k{}", i)));
        }
        assert_eq!(set.len(), 5);
        // Oldest keys were dropped, newest survive.
        assert!(!set.contains("k0"));
        assert!(!set.contains("k5"));
        assert!(set.contains("k6"));
        assert!(set.contains("k10"));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut set = BoundedKeySet::new(10);
        set.insert("a");
        set.reset();
        assert!(set.is_empty());
        assert!(set.insert("a"));
    }

    #[test]
    fn fingerprint_includes_both_endpoints() {
        let change = StatusChange {
            old: Some("scheduled".into()),
            new: Some("confirmed".into()),
        };
        assert_eq!(fingerprint("A1", &change), "A1:scheduled>confirmed");
        let partial = StatusChange {
            old: None,
            new: Some("cancelled".into()),
        };
        assert_eq!(fingerprint("A1", &partial), "A1:?>cancelled");
    }
}
