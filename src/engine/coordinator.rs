use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::engine::classify::Localizer;
use crate::engine::dispatch::{spawn_dispatcher, Engine, EngineCommand};
use crate::engine::fanout::{FanoutBus, FanoutEvent};
use crate::engine::feed::FeedBus;
use crate::engine::poll::{spawn_poll_loop, NotificationFetcher};
use crate::engine::push::{spawn_push_forwarder, user_topic, PushTransport};
use crate::engine::store::{spawn_ack_worker, AckCommand, Acknowledger};
use crate::util::config::EngineConfig;
use crate::util::logging::{self, info};
use crate::util::threading::{ThreadHandle, ThreadRegistry};

/// External collaborators the engine is wired against. All of them are
/// owned by the host application; the engine only calls through the traits.
pub struct Collaborators {
    pub fetcher: Arc<dyn NotificationFetcher>,
    pub acknowledger: Arc<dyn Acknowledger>,
    pub transport: Arc<dyn PushTransport>,
    pub localizer: Arc<dyn Localizer>,
}

struct SessionChannels {
    user_id: String,
    topic: String,
    poll_stop_tx: Sender<()>,
    poll: ThreadHandle,
    forwarder: ThreadHandle,
}

/// Owns the engine threads and binds delivery channels to the authenticated
/// identity. `unsubscribe` on the transport must close the topic stream;
/// the push forwarder exits when its receiver disconnects.
pub struct NotifyCoordinator {
    config: EngineConfig,
    collaborators: Collaborators,
    threads: ThreadRegistry,
    feed: Arc<FeedBus>,
    fanout: Arc<FanoutBus>,
    command_tx: Sender<EngineCommand>,
    ack_tx: Sender<AckCommand>,
    dispatcher: Option<ThreadHandle>,
    ack_worker: Option<ThreadHandle>,
    session: Option<SessionChannels>,
}

impl NotifyCoordinator {
    pub fn start(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        logging::set_session_id(&session_id[..8]);
        info!("Notification engine starting");

        let threads = ThreadRegistry::new();
        let feed = Arc::new(FeedBus::new());
        let fanout = Arc::new(FanoutBus::new());
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (ack_tx, ack_rx) = crossbeam_channel::unbounded();

        let engine = Engine::new(
            &config,
            Arc::clone(&collaborators.localizer),
            Arc::clone(&feed),
            Arc::clone(&fanout),
            ack_tx.clone(),
        );
        let dispatcher = spawn_dispatcher(&threads, command_rx, engine, config.dispatch_tick_ms)?;
        let ack_worker =
            spawn_ack_worker(&threads, ack_rx, Arc::clone(&collaborators.acknowledger))?;

        Ok(Self {
            config,
            collaborators,
            threads,
            feed,
            fanout,
            command_tx,
            ack_tx,
            dispatcher: Some(dispatcher),
            ack_worker: Some(ack_worker),
            session: None,
        })
    }

    /// Rebinds both delivery channels to the given identity. `None` means
    /// signed out: polling stops, the push topic unbinds, the overlay feed
    /// clears; toasts are left to expire naturally.
    pub fn set_identity(&mut self, user_id: Option<&str>) -> Result<()> {
        self.teardown_session();
        let _ = self
            .command_tx
            .send(EngineCommand::IdentityChanged(user_id.map(str::to_string)));

        if let Some(user_id) = user_id {
            let topic = user_topic(user_id);
            let messages = self.collaborators.transport.subscribe(&topic)?;
            let forwarder =
                spawn_push_forwarder(&self.threads, messages, self.command_tx.clone())?;

            let (poll_stop_tx, poll_stop_rx) = crossbeam_channel::bounded(1);
            let poll = spawn_poll_loop(
                &self.threads,
                Arc::clone(&self.collaborators.fetcher),
                self.config.poll_fetch_limit,
                Duration::from_secs(self.config.poll_interval_secs),
                self.command_tx.clone(),
                poll_stop_rx,
            )?;

            info!("Channels bound for {}", user_id);
            self.session = Some(SessionChannels {
                user_id: user_id.to_string(),
                topic,
                poll_stop_tx,
                poll,
                forwarder,
            });
        }
        Ok(())
    }

    fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unbinding channels for {}", session.user_id);
            let _ = session.poll_stop_tx.send(());
            self.collaborators.transport.unsubscribe(&session.topic);
            let _ = session.poll.join();
            let _ = session.forwarder.join();
        }
    }

    pub fn dismiss_overlay(&self, id: &str) {
        let _ = self
            .command_tx
            .send(EngineCommand::DismissOverlay(id.to_string()));
    }

    pub fn remove_toast(&self, id: &str) {
        let _ = self
            .command_tx
            .send(EngineCommand::RemoveToast(id.to_string()));
    }

    pub fn clear_overlays(&self) {
        let _ = self.command_tx.send(EngineCommand::ClearOverlays);
    }

    pub fn feed(&self) -> &FeedBus {
        &self.feed
    }

    pub fn subscribe_fanout(&self) -> Receiver<FanoutEvent> {
        self.fanout.subscribe()
    }

    /// Clone of the dispatcher queue, for hosts that inject envelopes from
    /// channels this crate does not manage.
    pub fn command_sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    pub fn active_thread_names(&self) -> Vec<String> {
        self.threads.active_thread_names()
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.teardown_session();
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        let _ = self.ack_tx.send(AckCommand::Shutdown);
        if let Some(ack_worker) = self.ack_worker.take() {
            let _ = ack_worker.join();
        }
        info!("Notification engine stopped");
        Ok(())
    }
}
