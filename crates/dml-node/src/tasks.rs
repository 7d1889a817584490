// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - BACKGROUND TASKS
//
// Checkpointing and fork monitoring run on tokio intervals against their own
// clone of the node handle. Both stop when the shutdown signal flips and are
// joined by `BackgroundTasks::shutdown`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::node::LedgerNode;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every task and wait for it to finish its current tick.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            debug!("background tasks already stopped");
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("background task ended abnormally: {}", e);
            }
        }
        info!("background tasks stopped");
    }
}

fn spawn_periodic<F>(name: &'static str, period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("{} task stopped", name);
    })
}

impl LedgerNode {
    /// Start the checkpoint and fork-monitor loops.
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let (shutdown, rx) = watch::channel(false);
        let settings = &self.config().node;

        let checkpointer = self.clone();
        let checkpoint_task = spawn_periodic(
            "checkpoint",
            Duration::from_millis(settings.checkpoint_poll_ms),
            rx.clone(),
            move || match checkpointer.checkpoint_tick() {
                Ok(Some(cp)) => debug!("checkpoint task: #{} signed", cp.block_number),
                Ok(None) => {}
                Err(e) => warn!("checkpoint task: {}", e),
            },
        );

        let monitor = self.clone();
        let fork_task = spawn_periodic(
            "fork-monitor",
            Duration::from_millis(settings.fork_monitor_ms),
            rx,
            move || {
                let handled = monitor.fork_monitor_tick();
                if !handled.is_empty() {
                    debug!("fork monitor: {} competing blocks settled", handled.len());
                }
            },
        );

        BackgroundTasks {
            shutdown,
            handles: vec![checkpoint_task, fork_task],
        }
    }
}
