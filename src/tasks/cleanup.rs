//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from every
//! registered cache, limiter and token store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Sweep;

// == Sweep Handle ==
/// Owns the running sweep task. Dropping the handle without calling
/// [`SweepHandle::shutdown`] aborts the task.
#[derive(Debug)]
pub struct SweepHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Signals the task to stop and waits until it has exited.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "sweep task ended abnormally");
            }
        }
        info!("Sweep task stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runs one sweep pass over `targets`, returning the total removed.
pub fn sweep_once(targets: &[Arc<dyn Sweep>]) -> usize {
    let mut total = 0;
    for target in targets {
        let removed = target.sweep_expired();
        if removed > 0 {
            debug!(structure = target.label(), removed, "swept expired entries");
        }
        total += removed;
    }
    total
}

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task sleeps for `interval` between passes. Each target only locks
/// the shard it is currently purging, so readers of other keys keep going.
///
/// # Returns
/// A [`SweepHandle`] used to stop the task deterministically on shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(vec![cache.clone()], Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.shutdown().await;
/// ```
pub fn spawn_sweep_task(targets: Vec<Arc<dyn Sweep>>, interval: Duration) -> SweepHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {:?} over {} targets",
            interval,
            targets.len()
        );

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let removed = sweep_once(&targets);

            // Log sweep statistics
            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    });

    SweepHandle {
        stop: Some(stop_tx),
        task: Some(task),
    }
}
