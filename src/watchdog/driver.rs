//! Monitor Task
//!
//! Runs one [`LivenessMonitor`] against its node's event stream, sleeping
//! until the next watchdog deadline between events.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::LivenessMonitor;
use crate::event::{Emitted, NodeEvent};

pub struct MonitorTask {
    monitor: LivenessMonitor,
    generation: u64,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    effects: mpsc::UnboundedSender<Emitted>,
    cancel: CancellationToken,
}

impl MonitorTask {
    pub fn new(
        monitor: LivenessMonitor,
        generation: u64,
        events: mpsc::UnboundedReceiver<NodeEvent>,
        effects: mpsc::UnboundedSender<Emitted>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            generation,
            events,
            effects,
            cancel,
        }
    }

    /// Run until cancelled or the event stream closes
    pub async fn run(mut self) {
        info!(
            node = %self.monitor.node(),
            probe = ?self.monitor.probe_period(),
            reset = ?self.monitor.reset_period(),
            "Liveness monitor started"
        );

        loop {
            let deadline = self.monitor.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let effects = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.monitor.handle(&event, Instant::now()),
                    None => break,
                },
                _ = timer => self.monitor.poll(Instant::now()),
            };

            for effect in effects {
                let emitted = Emitted {
                    generation: self.generation,
                    effect,
                };
                if self.effects.send(emitted).is_err() {
                    debug!(node = %self.monitor.node(), "Dispatch closed, stopping monitor");
                    return;
                }
            }
        }

        info!(node = %self.monitor.node(), "Liveness monitor stopped");
    }

    /// Spawn the monitor as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
