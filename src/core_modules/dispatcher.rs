// THEORY:
// The dispatcher decouples the frame loop from the network. The frame loop must
// never wait on the car: a request can take hundreds of milliseconds or time out
// entirely, and the camera keeps producing frames meanwhile.
//
// Key architectural principles:
// 1.  **Single slot, latest wins**: There is no queue. `submit` overwrites the one
//     pending command. A steering intent that was not sent before a newer one
//     arrived is stale and must never be replayed.
// 2.  **Atomic hand-off**: The slot is a mutex around an `Option`. The producer
//     replaces it, the sender takes it; both happen under the lock, so an
//     overwrite and a take can never interleave.
// 3.  **Self-pacing**: After sending, the sender sleeps for the command's
//     hold-duration before looking at the slot again. No command reaches the car
//     sooner than the previous one's declared duration, yet `submit` never blocks.
// 4.  **Park and wake**: With nothing pending the sender waits on a `Notify`, with
//     a short poll interval as a fallback, instead of spinning.
// 5.  **Best effort**: A failed send is logged and dropped. The sender carries on.
//
// A command already taken by the sender cannot be recalled; if a newer command
// arrives during that send, both reach the car in order.

use crate::core_modules::actuator::Actuator;
use crate::core_modules::steering::ActuatorCommand;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(10);

/// Anything that accepts commands from the control loop without blocking it.
pub trait CommandSink {
    fn submit(&self, command: ActuatorCommand);
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Longest the sender waits before re-checking an empty slot.
    pub idle_poll: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }
}

/// The state shared between the producer and the sender.
#[derive(Debug, Default)]
struct DispatchSlot {
    pending: Mutex<Option<ActuatorCommand>>,
    wake: Notify,
}

impl DispatchSlot {
    fn put(&self, command: ActuatorCommand) -> Option<ActuatorCommand> {
        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(command);
        self.wake.notify_one();
        replaced
    }

    fn take(&self) -> Option<ActuatorCommand> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn peek(&self) -> Option<ActuatorCommand> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands commands to a background sender task.
pub struct CommandDispatcher {
    slot: Arc<DispatchSlot>,
    sender: JoinHandle<()>,
}

impl CommandDispatcher {
    /// Starts the sender on `runtime`.
    pub fn spawn<A: Actuator>(actuator: A, config: DispatchConfig, runtime: &Handle) -> Self {
        let slot = Arc::new(DispatchSlot::default());
        let sender = runtime.spawn(run_sender(Arc::clone(&slot), actuator, config));
        Self { slot, sender }
    }

    /// Makes `command` the pending command, replacing any unsent one.
    pub fn submit(&self, command: ActuatorCommand) {
        if let Some(stale) = self.slot.put(command) {
            debug!(%stale, %command, "superseded unsent command");
        }
    }

    /// The command waiting to be sent, if any.
    pub fn pending(&self) -> Option<ActuatorCommand> {
        self.slot.peek()
    }

    /// Stops the sender. A command in flight is abandoned.
    pub fn shutdown(self) {
        self.sender.abort();
    }
}

impl CommandSink for CommandDispatcher {
    fn submit(&self, command: ActuatorCommand) {
        CommandDispatcher::submit(self, command);
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.sender.abort();
    }
}

async fn run_sender<A: Actuator>(slot: Arc<DispatchSlot>, actuator: A, config: DispatchConfig) {
    loop {
        let Some(command) = slot.take() else {
            // Either a submit wakes us or the poll interval runs out; both re-check.
            let _ = timeout(config.idle_poll, slot.wake.notified()).await;
            continue;
        };

        debug!(%command, "sending command");
        if let Err(error) = actuator.send(&command).await {
            warn!(%command, %error, "command dropped");
        }

        sleep(Duration::from_millis(command.duration_ms as u64)).await;
    }
}
