use chrono::{DateTime, Duration, TimeZone, Utc};
use clinic_notify::engine::dispatch::{Engine, EngineCommand};
use clinic_notify::engine::events::{
    AppointmentPayload, EventShape, NotificationEnvelope, PartyRef, SourceChannel, StatusChange,
};
use clinic_notify::engine::fanout::{FanoutBus, FanoutEvent};
use clinic_notify::engine::feed::FeedBus;
use clinic_notify::engine::poll::{
    envelope_from_persisted, FetchResponse, NotificationData, PersistedNotification, PollState,
};
use clinic_notify::engine::store::AckCommand;
use clinic_notify::engine::classify::NullLocalizer;
use clinic_notify::util::config::EngineConfig;
use crossbeam_channel::Receiver;
use std::sync::Arc;

struct Harness {
    engine: Engine,
    feed: Arc<FeedBus>,
    fanout: Receiver<FanoutEvent>,
    acks: Receiver<AckCommand>,
}

fn harness() -> Harness {
    let config = EngineConfig::default();
    let feed = Arc::new(FeedBus::new());
    let fanout_bus = Arc::new(FanoutBus::new());
    let fanout = fanout_bus.subscribe();
    let (ack_tx, acks) = crossbeam_channel::unbounded();
    let engine = Engine::new(
        &config,
        Arc::new(NullLocalizer),
        Arc::clone(&feed),
        fanout_bus,
        ack_tx,
    );
    Harness {
        engine,
        feed,
        fanout,
        acks,
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn rex_appointment(uuid: &str) -> AppointmentPayload {
    AppointmentPayload {
        uuid: Some(uuid.to_string()),
        pet: Some(PartyRef {
            name: Some("Rex".into()),
        }),
        veterinarian: Some(PartyRef {
            name: Some("Dr. Varga".into()),
        }),
        date: Some("2025-03-12".into()),
        time: Some("10:30".into()),
        ..Default::default()
    }
}

fn confirmed_update(uuid: &str) -> NotificationEnvelope {
    let mut env = NotificationEnvelope::new(SourceChannel::Push, EventShape::Updated, t0());
    env.appointment = Some(rex_appointment(uuid));
    env.status_change = Some(StatusChange {
        old: Some("scheduled".into()),
        new: Some("confirmed".into()),
    });
    env
}

fn persisted(id: &str, uuid: &str, title: &str, secs: i64) -> PersistedNotification {
    PersistedNotification {
        id: id.to_string(),
        data: NotificationData {
            kind: "appointment_confirmed".into(),
            title: title.to_string(),
            message: "Server message".into(),
            appointment: Some(rex_appointment(uuid)),
        },
        created_at: t0() + Duration::seconds(secs),
    }
}

#[test]
fn confirmed_status_change_produces_toast_and_overlay() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 1);
    assert_eq!(snap.toasts.len(), 1);

    let toast = &snap.toasts[0];
    assert_eq!(toast.title, "Appointment confirmed");
    assert_eq!(toast.ttl_ms, 5_000);
    assert!(toast.message.contains("Rex"));
    assert!(toast.message.contains("Dr. Varga"));

    let overlay = &snap.overlays[0];
    assert_eq!(overlay.appointment_uuid.as_deref(), Some("A1"));
    assert_eq!(overlay.id, "A1:status-confirmed");
}

#[test]
fn same_tick_duplicate_status_change_is_suppressed() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 1);
    assert_eq!(snap.toasts.len(), 1);
    assert_eq!(snap.counts.suppressed_duplicates, 1);
}

#[test]
fn repeated_delivery_of_one_server_id_yields_one_overlay() {
    let mut h = harness();
    for channel in [SourceChannel::Push, SourceChannel::Poll, SourceChannel::Push] {
        let mut env = NotificationEnvelope::new(
            channel,
            EventShape::Generic("appointment_reminder_digest".into()),
            t0(),
        );
        env.raw_id = Some("srv-1".into());
        env.title_override = Some("Weekly digest".into());
        env.appointment = Some(rex_appointment("A1"));
        h.engine.handle(EngineCommand::Deliver(env));
    }

    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 1);
    assert_eq!(snap.counts.suppressed_duplicates, 2);
}

#[test]
fn fanout_fires_even_for_suppressed_duplicates() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    let events: Vec<_> = h.fanout.try_iter().collect();
    assert_eq!(events.len(), 2);
    for event in events {
        assert_eq!(event.appointment.uuid.as_deref(), Some("A1"));
    }
}

#[test]
fn push_then_poll_converges_to_the_poll_entry() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    // The persisted copy of the same event arrives later with a server id
    // and the same rendered title.
    let mut state = PollState::new();
    let response = FetchResponse {
        success: true,
        notifications: vec![persisted("srv-9", "A1", "Appointment confirmed", 5)],
    };
    for item in state.take_new(&response) {
        h.engine
            .handle(EngineCommand::Deliver(envelope_from_persisted(&item)));
    }

    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 1);
    let survivor = &snap.overlays[0];
    assert_eq!(survivor.id, "srv-9");
    assert_eq!(survivor.origin, SourceChannel::Poll);
    // The replacement is not a second visible notification.
    assert_eq!(snap.toasts.len(), 1);
}

#[test]
fn poll_snapshots_merge_newest_first_without_duplicates() {
    let mut h = harness();
    let mut state = PollState::new();

    let first = FetchResponse {
        success: true,
        notifications: vec![
            persisted("a", "AA", "Title A", 30),
            persisted("b", "AB", "Title B", 20),
            persisted("c", "AC", "Title C", 10),
        ],
    };
    for item in state.take_new(&first) {
        h.engine
            .handle(EngineCommand::Deliver(envelope_from_persisted(&item)));
    }

    let second = FetchResponse {
        success: true,
        notifications: vec![
            persisted("d", "AD", "Title D", 40),
            persisted("a", "AA", "Title A", 30),
            persisted("b", "AB", "Title B", 20),
        ],
    };
    for item in state.take_new(&second) {
        h.engine
            .handle(EngineCommand::Deliver(envelope_from_persisted(&item)));
    }

    let snap = h.feed.snapshot();
    let ids: Vec<_> = snap.overlays.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["d", "a", "b", "c"]);
}

#[test]
fn toast_expires_between_4999_and_5001_ms() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    h.engine
        .handle(EngineCommand::Tick(t0() + Duration::milliseconds(4_999)));
    assert_eq!(h.feed.snapshot().toasts.len(), 1);

    h.engine
        .handle(EngineCommand::Tick(t0() + Duration::milliseconds(5_001)));
    assert_eq!(h.feed.snapshot().toasts.len(), 0);
    // The overlay is unaffected by toast expiry.
    assert_eq!(h.feed.snapshot().overlays.len(), 1);
}

#[test]
fn sign_out_clears_overlays_and_leaves_toasts() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));

    h.engine.handle(EngineCommand::IdentityChanged(None));
    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 0);
    assert_eq!(snap.toasts.len(), 1);
}

#[test]
fn identity_switch_resets_dedup_state() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    assert_eq!(h.feed.snapshot().overlays.len(), 1);

    h.engine
        .handle(EngineCommand::IdentityChanged(Some("other-user".into())));
    assert_eq!(h.feed.snapshot().overlays.len(), 0);

    // The same event admits again under the new identity.
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    assert_eq!(h.feed.snapshot().overlays.len(), 1);
}

#[test]
fn dismiss_fires_ack_and_failed_ack_does_not_resurrect() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    let id = h.feed.snapshot().overlays[0].id.clone();

    // Simulate the ack path being down entirely.
    drop(h.acks);
    h.engine.handle(EngineCommand::DismissOverlay(id.clone()));

    assert_eq!(h.feed.snapshot().overlays.len(), 0);
    // Dismissing again is a no-op.
    h.engine.handle(EngineCommand::DismissOverlay(id));
    assert_eq!(h.feed.snapshot().overlays.len(), 0);
}

#[test]
fn plain_update_without_text_is_silent_but_fans_out() {
    let mut h = harness();
    let mut env = NotificationEnvelope::new(SourceChannel::Push, EventShape::Updated, t0());
    env.appointment = Some(rex_appointment("A1"));
    h.engine.handle(EngineCommand::Deliver(env));

    let snap = h.feed.snapshot();
    assert_eq!(snap.overlays.len(), 0);
    assert_eq!(snap.toasts.len(), 0);
    assert_eq!(h.fanout.try_iter().count(), 1);
}

#[test]
fn clear_overlays_sends_no_acks() {
    let mut h = harness();
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A1")));
    h.engine
        .handle(EngineCommand::Deliver(confirmed_update("A2")));

    h.engine.handle(EngineCommand::ClearOverlays);
    assert_eq!(h.feed.snapshot().overlays.len(), 0);
    assert!(h.acks.try_recv().is_err());
}
