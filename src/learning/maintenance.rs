//! Periodic learning maintenance.
//!
//! One named thread per engine waits on a ticker and a shutdown channel.
//! Closing the shutdown channel ends the loop; a cycle already running
//! completes first.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tracing::warn;

use super::engine::EngineInner;

pub(crate) struct MaintenanceWorker {
    shutdown_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    pub(crate) fn spawn(engine: Arc<EngineInner>, interval: Duration) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("adjudicator-maintenance".to_string())
            .spawn(move || worker_loop(&engine, &shutdown_rx, interval))?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// Signals shutdown and waits for the thread to exit.
    pub(crate) fn stop(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        // Dropping the sender disconnects the channel, which wakes the loop.
        drop(self.shutdown_tx.take());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("learning maintenance worker panicked");
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

fn worker_loop(engine: &EngineInner, shutdown: &Receiver<()>, interval: Duration) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                if let Err(e) = engine.run_maintenance() {
                    warn!(error = %e, "learning maintenance cycle failed");
                }
            }
        }
    }
}
