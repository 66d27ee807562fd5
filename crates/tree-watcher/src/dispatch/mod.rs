use std::{
	fmt, iter,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

use async_channel as chan;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	error::Error,
	event::{Callbacks, Event},
};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod process;
mod stats;
mod worker;

pub use stats::DeliveryStats;

#[cfg(any(target_os = "linux", target_os = "android"))]
use process::ProcessPool;
use worker::ThreadPool;

/// Where callbacks run, fixed for the lifetime of a [`CallbackSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
	/// On the thread running the monitor, in detection order.
	Immediate,
	/// On a fixed pool of worker threads.
	ThreadPool,
	/// On a fixed pool of forked worker processes. State mutated by callbacks stays in the worker
	/// processes; deliveries are reported back to the parent through [`DeliveryStats`].
	///
	/// Workers are forked from the thread calling [`Monitor::run`](crate::Monitor::run) and only
	/// that thread exists in them. A lock another thread of the parent held at fork time, the
	/// allocator's or one taken inside a callback, stays locked forever in the child, so a
	/// callback touching it hangs its worker and the run with it. Use this mode from a parent
	/// that is single threaded at the time of the run, or keep callbacks away from such locks.
	ProcessPool,
}

impl fmt::Display for DispatchMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Immediate => "immediate",
			Self::ThreadPool => "thread_pool",
			Self::ProcessPool => "process_pool",
		})
	}
}

/// Application callbacks bound to the way they must be run.
#[derive(Clone)]
pub struct CallbackSet {
	handler: Arc<dyn Callbacks>,
	mode: DispatchMode,
}

impl CallbackSet {
	pub fn new<C: Callbacks>(handler: Arc<C>, mode: DispatchMode) -> Self {
		Self { handler, mode }
	}

	pub fn immediate<C: Callbacks>(handler: Arc<C>) -> Self {
		Self::new(handler, DispatchMode::Immediate)
	}

	pub fn threaded<C: Callbacks>(handler: Arc<C>) -> Self {
		Self::new(handler, DispatchMode::ThreadPool)
	}

	pub fn multiprocess<C: Callbacks>(handler: Arc<C>) -> Self {
		Self::new(handler, DispatchMode::ProcessPool)
	}

	#[must_use]
	pub const fn mode(&self) -> DispatchMode {
		self.mode
	}
}

impl fmt::Debug for CallbackSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallbackSet")
			.field("mode", &self.mode)
			.finish_non_exhaustive()
	}
}

#[derive(Debug)]
pub(crate) enum Message {
	Event(Event),
	Shutdown,
}

#[derive(Debug)]
struct Queue {
	tx: chan::Sender<Message>,
	rx: chan::Receiver<Message>,
}

impl Queue {
	fn new() -> Self {
		let (tx, rx) = chan::unbounded();
		Self { tx, rx }
	}
}

enum Pool {
	Threads(ThreadPool),
	#[cfg(any(target_os = "linux", target_os = "android"))]
	Processes(ProcessPool),
}

impl Pool {
	fn join(self) {
		match self {
			Self::Threads(pool) => pool.join(),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			Self::Processes(pool) => pool.join(),
		}
	}
}

/// Runs `event` through `handler`, keeping a panicking callback from taking its worker down.
pub(crate) fn deliver(handler: &dyn Callbacks, event: &Event, stats: &DeliveryStats) {
	if panic::catch_unwind(AssertUnwindSafe(|| event.deliver_to(handler))).is_err() {
		error!(?event, "Event callback panicked;");
	}

	stats.record(event.kind());
}

/// Queue of translated events plus the strategy used to hand them to the callbacks.
pub struct Dispatcher {
	handler: Arc<dyn Callbacks>,
	mode: DispatchMode,
	workers: usize,
	queue: Queue,
	pool: Option<Pool>,
	stats: Arc<DeliveryStats>,
}

impl Dispatcher {
	#[must_use]
	pub fn new(callbacks: CallbackSet, workers: usize) -> Self {
		let CallbackSet { handler, mode } = callbacks;

		let mut dispatcher = Self {
			handler,
			mode,
			workers: 1,
			queue: Queue::new(),
			pool: None,
			stats: Arc::default(),
		};

		dispatcher.configure_workers(workers);

		dispatcher
	}

	/// Sets the pool size used from the next delivery cycle on, ignored in immediate mode.
	pub fn configure_workers(&mut self, workers: usize) {
		self.workers = match self.mode {
			DispatchMode::Immediate => 1,
			DispatchMode::ThreadPool | DispatchMode::ProcessPool => workers.max(1),
		};

		if self.pool.is_some() {
			debug!(
				workers = self.workers,
				"Worker count will change on the next delivery cycle"
			);
		}
	}

	#[must_use]
	pub const fn mode(&self) -> DispatchMode {
		self.mode
	}

	#[must_use]
	pub const fn workers(&self) -> usize {
		self.workers
	}

	#[must_use]
	pub fn stats(&self) -> Arc<DeliveryStats> {
		Arc::clone(&self.stats)
	}

	/// Whether pooled workers are currently alive.
	#[must_use]
	pub const fn is_running(&self) -> bool {
		self.pool.is_some()
	}

	/// Events waiting in the queue.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.queue.rx.len()
	}

	/// Enqueues `event`, never blocking as the queue is unbounded.
	pub fn dispatch(&self, event: Event) {
		if let Err(e) = self.queue.tx.try_send(Message::Event(event)) {
			error!(event = ?e.into_inner(), "Dispatch queue refused an event;");
		}
	}

	/// Immediate mode delivers every queued event before returning, pooled modes make sure
	/// their workers are up and consuming the queue.
	pub fn drain_once(&mut self) -> Result<(), Error> {
		match self.mode {
			DispatchMode::Immediate => {
				self.deliver_pending();
				Ok(())
			}

			DispatchMode::ThreadPool => {
				if self.pool.is_none() {
					let pool = ThreadPool::spawn(
						self.workers,
						&self.queue.tx,
						&self.queue.rx,
						&self.handler,
						&self.stats,
					)?;
					self.pool = Some(Pool::Threads(pool));
				}
				Ok(())
			}

			#[cfg(any(target_os = "linux", target_os = "android"))]
			DispatchMode::ProcessPool => {
				if self.pool.is_none() {
					let pool = ProcessPool::spawn(
						self.workers,
						&self.queue.rx,
						&self.handler,
						&self.stats,
					)?;
					self.pool = Some(Pool::Processes(pool));
				}
				Ok(())
			}

			#[cfg(not(any(target_os = "linux", target_os = "android")))]
			DispatchMode::ProcessPool => Err(Error::UnsupportedMode(self.mode)),
		}
	}

	/// Stops pooled workers once they went through everything queued before this call, then
	/// starts over with an empty queue. Safe to call any number of times.
	#[instrument(skip(self), fields(mode = %self.mode, workers = self.workers))]
	pub fn shutdown(&mut self) {
		if let Some(pool) = self.pool.take() {
			if self.queue.tx.try_send(Message::Shutdown).is_err() {
				warn!("Dispatch queue closed before shutdown sentinel could be sent;");
			}

			pool.join();
			trace!("Delivery workers joined");
		} else if self.mode == DispatchMode::Immediate {
			self.deliver_pending();
		}

		// Only the propagated sentinel is expected to be left over at this point
		let dropped = iter::from_fn(|| self.queue.rx.try_recv().ok())
			.filter(|message| matches!(message, Message::Event(_)))
			.count();
		if dropped > 0 {
			debug!(dropped, "Discarding events queued without running workers");
		}

		self.queue = Queue::new();
	}

	fn deliver_pending(&self) {
		while let Ok(message) = self.queue.rx.try_recv() {
			if let Message::Event(event) = message {
				deliver(self.handler.as_ref(), &event, &self.stats);
			}
		}
	}
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("mode", &self.mode)
			.field("workers", &self.workers)
			.field("pending", &self.pending())
			.field("running", &self.is_running())
			.field("stats", &self.stats)
			.finish_non_exhaustive()
	}
}

impl Drop for Dispatcher {
	fn drop(&mut self) {
		self.shutdown();
	}
}
