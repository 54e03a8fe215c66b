// src/engine/runtime.rs

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::backend::{Backend, EventSink};
use crate::errors::Result;
use crate::types::{EventName, WatchEvent};

use super::core::WatcherCore;
use super::{CoreCommand, Envelope, Inbound};

struct Subscriber {
    names: Vec<EventName>,
    sender: mpsc::UnboundedSender<WatchEvent>,
}

impl Subscriber {
    fn wants(&self, event: &WatchEvent) -> bool {
        self.names.iter().any(|name| event.matches(*name))
    }
}

/// Drives the watcher core in response to [`Envelope`]s and carries out the
/// commands it returns against a [`Backend`].
///
/// This is a pure IO shell around [`WatcherCore`], which contains all the
/// watching semantics. This struct handles async IO: reading messages from
/// the channel, arming timers, and fanning events out to subscribers.
///
/// Each step stats and reads directories synchronously, so it runs on the
/// blocking pool; steps never overlap because the loop awaits each one.
pub struct Runtime<B: Backend> {
    core: Arc<Mutex<WatcherCore>>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    /// Handed to backends and timers; only public handles keep the loop alive.
    tx: mpsc::WeakUnboundedSender<Envelope>,
    backend: B,
    subscribers: Vec<Subscriber>,
}

impl<B: Backend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &*self.lock_core())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Runtime<B> {
    pub fn new(
        core: WatcherCore,
        rx: mpsc::UnboundedReceiver<Envelope>,
        tx: mpsc::WeakUnboundedSender<Envelope>,
        backend: B,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            rx,
            tx,
            backend,
            subscribers: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes [`Envelope`]s until the watcher is closed or every handle
    ///   is dropped.
    /// - Feeds core messages into the pure core.
    /// - Executes the commands returned by the core.
    pub async fn run(mut self) -> Result<()> {
        info!("treewatch runtime started");

        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Core(msg) => {
                    trace!(?msg, "runtime received message");
                    if !self.dispatch(msg).await? {
                        info!("core requested exit; stopping runtime");
                        break;
                    }
                }
                Envelope::Subscribe { names, sender } => {
                    debug!(?names, "subscriber attached");
                    self.subscribers.push(Subscriber { names, sender });
                }
                Envelope::GetWatched(reply) => {
                    let _ = reply.send(self.lock_core().get_watched());
                }
                Envelope::Close(reply) => {
                    // Later requests fail fast instead of queueing behind us.
                    self.rx.close();
                    self.dispatch(Inbound::Close).await?;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        if !self.lock_core().is_closed() {
            info!("all watcher handles dropped; closing");
            self.dispatch(Inbound::Close).await?;
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Feed one message into the core and execute the resulting commands.
    async fn dispatch(&mut self, msg: Inbound) -> Result<bool> {
        let now = tokio::time::Instant::now().into_std();
        let core = Arc::clone(&self.core);
        let step = tokio::task::spawn_blocking(move || {
            let mut core = core.lock().unwrap_or_else(|e| e.into_inner());
            core.step(msg, now)
        })
        .await
        .map_err(anyhow::Error::from)?;

        for command in step.commands {
            self.execute(command);
        }
        Ok(step.keep_running)
    }

    fn lock_core(&self) -> MutexGuard<'_, WatcherCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn execute(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Publish(event) => self.publish(event),
            CoreCommand::StartBackend { root, path, mode } => {
                let sink = EventSink::new(self.tx.clone());
                let reply = match self.backend.start_watching(root, &path, mode, sink) {
                    Ok(()) => Inbound::BackendReady { root },
                    Err(error) => Inbound::BackendError {
                        root: Some(root),
                        error,
                    },
                };
                self.post(reply);
            }
            CoreCommand::StopBackend { root } => self.backend.stop_watching(root),
            CoreCommand::Schedule { after, timer } => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(Envelope::Core(Inbound::Timer(timer)));
                    }
                });
            }
            CoreCommand::Defer(msg) => self.post(msg),
            CoreCommand::DetachSubscribers => {
                debug!(count = self.subscribers.len(), "detaching subscribers");
                self.subscribers.clear();
            }
        }
    }

    fn publish(&mut self, event: WatchEvent) {
        self.subscribers.retain(|s| !s.sender.is_closed());
        for subscriber in &self.subscribers {
            if subscriber.wants(&event) {
                let _ = subscriber.sender.send(event.clone());
            }
        }
    }

    /// Queue a message behind everything already in the channel.
    fn post(&self, msg: Inbound) {
        match self.tx.upgrade() {
            Some(tx) => {
                let _ = tx.send(Envelope::Core(msg));
            }
            None => trace!("no live handles; dropping follow-up message"),
        }
    }
}
