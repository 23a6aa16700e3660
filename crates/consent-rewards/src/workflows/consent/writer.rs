//! Ordered, off-runtime persistence of engine snapshots.
//!
//! The service mutates its in-memory state under its lock and queues a snapshot in the
//! same critical section, so queue order is mutation order. One writer task drains the
//! queue and performs the blocking store writes on the blocking pool. When several
//! snapshots are waiting only the newest is written.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use super::repository::{KeyValueStore, PersistedState, PersistenceAdapter};

type Queued = (u64, PersistedState);

pub struct StateWriter<S> {
    adapter: PersistenceAdapter<S>,
    queue: Option<mpsc::UnboundedSender<Queued>>,
    submitted: AtomicU64,
    written: watch::Receiver<u64>,
}

impl<S> StateWriter<S>
where
    S: KeyValueStore + 'static,
{
    /// Starts the writer task on the current tokio runtime. Without a runtime every
    /// snapshot is written inline by [`StateWriter::submit`].
    pub fn start(adapter: PersistenceAdapter<S>) -> Self {
        let (written_tx, written) = watch::channel(0);
        let queue = match Handle::try_current() {
            Ok(runtime) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                runtime.spawn(drain(adapter.clone(), receiver, written_tx));
                Some(sender)
            }
            Err(_) => {
                debug!("no tokio runtime; engine state is written inline");
                None
            }
        };

        Self {
            adapter,
            queue,
            submitted: AtomicU64::new(0),
            written,
        }
    }

    /// Queue a snapshot. Call with the engine lock held.
    pub fn submit(&self, snapshot: PersistedState) {
        let generation = self.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        let Some(queue) = &self.queue else {
            write(&self.adapter, &snapshot);
            return;
        };
        if let Err(mpsc::error::SendError((_, snapshot))) = queue.send((generation, snapshot)) {
            warn!(generation, "state writer stopped; writing inline");
            write(&self.adapter, &snapshot);
        }
    }

    /// Resolves once every snapshot submitted before the call has been written, or the
    /// writer task is gone.
    pub async fn flushed(&self) {
        if self.queue.is_none() {
            return;
        }
        let target = self.submitted.load(Ordering::Acquire);
        let mut written = self.written.clone();
        if written.wait_for(|done| *done >= target).await.is_err() {
            debug!(target, "state writer stopped before catching up");
        }
    }
}

async fn drain<S>(
    adapter: PersistenceAdapter<S>,
    mut queue: mpsc::UnboundedReceiver<Queued>,
    written: watch::Sender<u64>,
) where
    S: KeyValueStore + 'static,
{
    while let Some(mut next) = queue.recv().await {
        while let Ok(newer) = queue.try_recv() {
            next = newer;
        }
        let (generation, snapshot) = next;
        let adapter = adapter.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || write(&adapter, &snapshot)).await {
            error!(generation, error = %err, "state write task failed");
        }
        written.send_replace(generation);
    }
}

fn write<S>(adapter: &PersistenceAdapter<S>, snapshot: &PersistedState)
where
    S: KeyValueStore,
{
    if let Err(err) = adapter.flush(snapshot) {
        error!(error = %err, "failed to persist engine state");
    }
}
