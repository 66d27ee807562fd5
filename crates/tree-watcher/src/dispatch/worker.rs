use std::{
	sync::Arc,
	thread::{self, JoinHandle},
};

use async_channel as chan;
use tracing::{error, info, info_span, trace, warn};

use super::{
	super::{error::Error, event::Callbacks},
	deliver, DeliveryStats, Message,
};

pub type WorkerId = usize;

/// Fixed set of threads consuming the dispatch queue until they meet the shutdown sentinel.
pub(super) struct ThreadPool {
	handles: Vec<(WorkerId, JoinHandle<()>)>,
}

impl ThreadPool {
	pub(super) fn spawn(
		workers: usize,
		msgs_tx: &chan::Sender<Message>,
		msgs_rx: &chan::Receiver<Message>,
		handler: &Arc<dyn Callbacks>,
		stats: &Arc<DeliveryStats>,
	) -> Result<Self, Error> {
		let mut pool = Self {
			handles: Vec::with_capacity(workers),
		};

		for id in 0..workers {
			let spawned = thread::Builder::new()
				.name(format!("tree-watcher-worker-{id}"))
				.spawn({
					let msgs_tx = msgs_tx.clone();
					let msgs_rx = msgs_rx.clone();
					let handler = Arc::clone(handler);
					let stats = Arc::clone(stats);

					move || run(id, &msgs_tx, &msgs_rx, handler.as_ref(), &stats)
				});

			match spawned {
				Ok(handle) => pool.handles.push((id, handle)),
				Err(e) => {
					error!(worker_id = id, ?e, "Failed to spawn delivery worker;");

					// Workers already running only stop on the sentinel
					if !pool.handles.is_empty() && msgs_tx.try_send(Message::Shutdown).is_ok() {
						pool.join();
					}

					return Err(Error::WorkerSpawn(e));
				}
			}
		}

		trace!(workers, "Thread pool started");

		Ok(pool)
	}

	pub(super) fn join(self) {
		for (id, handle) in self.handles {
			if let Err(e) = handle.join() {
				error!(worker_id = id, ?e, "Delivery worker thread panicked;");
			}
		}
	}
}

fn run(
	id: WorkerId,
	msgs_tx: &chan::Sender<Message>,
	msgs_rx: &chan::Receiver<Message>,
	handler: &dyn Callbacks,
	stats: &DeliveryStats,
) {
	let _span = info_span!("tree_watcher_worker", worker_id = id).entered();

	trace!("Worker message processing loop starting...");

	let mut delivered = 0_u64;

	while let Ok(message) = msgs_rx.recv_blocking() {
		match message {
			Message::Event(event) => {
				deliver(handler, &event, stats);
				delivered += 1;
			}

			Message::Shutdown => {
				// Hand the sentinel over to the next worker
				if msgs_tx.try_send(Message::Shutdown).is_err() {
					warn!("Dispatch queue closed while propagating shutdown;");
				}
				trace!("Worker received shutdown signal and will exit...");
				break;
			}
		}
	}

	info!(delivered, "Worker gracefully shutdown");
}
