pub mod engine;
pub mod util;

// Re-export the surface hosts actually wire against.
pub use crate::engine::classify::{Category, Localizer, NullLocalizer, Severity};
pub use crate::engine::coordinator::{Collaborators, NotifyCoordinator};
pub use crate::engine::dispatch::{Engine, EngineCommand};
pub use crate::engine::error::NotifyError;
pub use crate::engine::events::{
    AppointmentPayload, EventShape, NotificationEnvelope, SourceChannel, StatusChange,
};
pub use crate::engine::fanout::{FanoutEvent, FanoutSource, FANOUT_TOPIC};
pub use crate::engine::feed::{FeedBus, FeedSnapshot};
pub use crate::engine::poll::{FetchResponse, NotificationFetcher};
pub use crate::engine::push::{PushMessage, PushTransport};
pub use crate::engine::store::{Acknowledger, OverlayEntry, ToastEntry};
pub use crate::util::config::EngineConfig;
