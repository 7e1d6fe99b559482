//! Worker thread between the bus loop and the watcher.
//!
//! The bus loop must keep servicing the MQTT connection while a cycle sleeps
//! through its settle delay and frame sampling, so triggers are queued on a
//! bounded channel and handled one at a time by a single worker that owns
//! the handler.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::watcher::{Trigger, TriggerHandler};

/// Default number of queued triggers before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

pub struct Dispatcher<H> {
    sender: Option<SyncSender<Trigger>>,
    join: Option<JoinHandle<H>>,
}

impl<H: TriggerHandler> Dispatcher<H> {
    pub fn spawn(handler: H, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let join = std::thread::Builder::new()
            .name("watcher".to_string())
            .spawn(move || run_worker(handler, receiver))
            .map_err(|e| anyhow!("failed to spawn watcher thread: {}", e))?;
        Ok(Self {
            sender: Some(sender),
            join: Some(join),
        })
    }

    /// Queue `trigger` without blocking. Returns false if it was dropped.
    pub fn submit(&self, trigger: Trigger) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            return false;
        };
        match sender.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(trigger)) => {
                log::warn!("Watcher queue full, dropping {:?} trigger", trigger);
                false
            }
            Err(TrySendError::Disconnected(trigger)) => {
                log::error!("Watcher thread gone, dropping {:?} trigger", trigger);
                false
            }
        }
    }

    /// Close the queue, let the worker drain it, and hand the handler back.
    pub fn shutdown(mut self) -> Result<H> {
        self.sender.take();
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("watcher thread already joined"))?;
        join.join()
            .map_err(|_| anyhow!("watcher thread panicked"))
    }
}

fn run_worker<H: TriggerHandler>(mut handler: H, receiver: Receiver<Trigger>) -> H {
    for trigger in receiver.iter() {
        let outcome = handler.handle(trigger);
        log::debug!("{:?} trigger handled: {:?}", trigger, outcome);
    }
    log::info!("Watcher queue closed");
    handler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::Outcome;
    use std::sync::{Arc, Barrier};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Trigger>,
    }

    impl TriggerHandler for Recorder {
        fn handle(&mut self, trigger: Trigger) -> Outcome {
            self.seen.push(trigger);
            Outcome::NoWindow
        }
    }

    struct Gate {
        barrier: Arc<Barrier>,
        handled: usize,
    }

    impl TriggerHandler for Gate {
        fn handle(&mut self, _trigger: Trigger) -> Outcome {
            if self.handled == 0 {
                self.barrier.wait();
                self.barrier.wait();
            }
            self.handled += 1;
            Outcome::NoWindow
        }
    }

    #[test]
    fn handles_triggers_in_order_and_drains_on_shutdown() {
        let dispatcher = Dispatcher::spawn(Recorder::default(), 4).unwrap();
        assert!(dispatcher.submit(Trigger::Motion));
        assert!(dispatcher.submit(Trigger::Activity));
        assert!(dispatcher.submit(Trigger::Motion));
        let recorder = dispatcher.shutdown().unwrap();
        assert_eq!(
            recorder.seen,
            vec![Trigger::Motion, Trigger::Activity, Trigger::Motion]
        );
    }

    #[test]
    fn drops_triggers_when_queue_is_full() {
        let barrier = Arc::new(Barrier::new(2));
        let gate = Gate {
            barrier: barrier.clone(),
            handled: 0,
        };
        let dispatcher = Dispatcher::spawn(gate, 1).unwrap();

        assert!(dispatcher.submit(Trigger::Motion));
        // Worker is now blocked inside the first trigger.
        barrier.wait();
        assert!(dispatcher.submit(Trigger::Activity));
        assert!(!dispatcher.submit(Trigger::Activity));
        barrier.wait();

        let gate = dispatcher.shutdown().unwrap();
        assert_eq!(gate.handled, 2);
    }
}
