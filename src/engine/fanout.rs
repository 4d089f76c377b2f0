use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::engine::events::{AppointmentPayload, SourceChannel};
use crate::util::logging::trace;

/// Page-level topic unrelated UI consumers listen on for fresh appointment
/// data, independent of whether a visible notification was produced.
pub const FANOUT_TOPIC: &str = "appointment.updated.local";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FanoutSource {
    #[serde(rename = "notification.poll")]
    Poll,
    #[serde(rename = "notification.ws")]
    Push,
}

impl From<SourceChannel> for FanoutSource {
    fn from(channel: SourceChannel) -> Self {
        match channel {
            SourceChannel::Poll => FanoutSource::Poll,
            SourceChannel::Push => FanoutSource::Push,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutEvent {
    pub appointment: AppointmentPayload,
    pub source: FanoutSource,
}

/// In-process broadcast. Emission never blocks and never depends on the
/// notification dedup state; disconnected subscribers are pruned lazily.
#[derive(Default)]
pub struct FanoutBus {
    subscribers: Mutex<Vec<Sender<FanoutEvent>>>,
}

impl FanoutBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<FanoutEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .expect("fanout subscriber mutex poisoned")
            .push(tx);
        rx
    }

    pub fn emit(&self, event: FanoutEvent) {
        trace!("Fan-out emit on {}: {:?}", FANOUT_TOPIC, event.source);
        self.subscribers
            .lock()
            .expect("fanout subscriber mutex poisoned")
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("fanout subscriber mutex poisoned")
            .len()
    }
}
