use std::{
	fmt, mem,
	path::{self, Path, PathBuf},
	sync::Arc,
};

use tracing::{debug, info, instrument, trace, warn};

use super::{
	config::MonitorConfig,
	dispatch::{CallbackSet, DeliveryStats, Dispatcher},
	error::Error,
	pump::{self, RunOptions},
	registry::WatchRegistry,
	source::EventSource,
};

#[cfg(any(target_os = "linux", target_os = "android"))]
use super::source::InotifySource;

/// Tree monitor backed by the kernel's inotify.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type TreeMonitor = Monitor<InotifySource>;

enum State<S: EventSource> {
	Idle,
	Running {
		registry: WatchRegistry<S>,
		dispatcher: Dispatcher,
	},
	Stopped,
}

/// Owns the raw event source, the watch registry and event delivery, driving them through
/// [`Monitor::run`] calls made on the caller's thread.
///
/// A monitor goes from idle to running on [`Monitor::start`] and is done for good after
/// [`Monitor::stop`].
pub struct Monitor<S: EventSource> {
	config: MonitorConfig,
	callbacks: Option<CallbackSet>,
	workers: usize,
	state: State<S>,
}

impl<S: EventSource> Monitor<S> {
	#[must_use]
	pub fn new(config: MonitorConfig) -> Self {
		Self {
			workers: config.workers.max(1),
			config,
			callbacks: None,
			state: State::Idle,
		}
	}

	#[must_use]
	pub const fn config(&self) -> &MonitorConfig {
		&self.config
	}

	/// Chooses the callbacks and how they are run. Only allowed before [`Monitor::start`].
	pub fn set_callbacks(&mut self, callbacks: CallbackSet) -> Result<(), Error> {
		match self.state {
			State::Idle => {
				debug!(mode = %callbacks.mode(), "Callbacks set");
				self.callbacks = Some(callbacks);
				Ok(())
			}
			State::Running { .. } => Err(Error::AlreadyStarted),
			State::Stopped => Err(Error::MonitorClosed),
		}
	}

	/// Number of workers for pooled dispatch modes, applied from the next [`Monitor::run`] on.
	pub fn set_worker_count(&mut self, workers: usize) -> Result<(), Error> {
		self.workers = workers.max(1);

		match &mut self.state {
			State::Idle => Ok(()),
			State::Running { dispatcher, .. } => {
				dispatcher.configure_workers(self.workers);
				Ok(())
			}
			State::Stopped => Err(Error::MonitorClosed),
		}
	}

	#[instrument(skip(self), fields(workers = self.workers))]
	pub fn start(&mut self) -> Result<(), Error> {
		match self.state {
			State::Idle => {}
			State::Running { .. } => return Err(Error::AlreadyStarted),
			State::Stopped => return Err(Error::MonitorClosed),
		}

		let callbacks = self.callbacks.clone().ok_or(Error::MissingCallbacks)?;
		let source = S::init(&self.config).map_err(Error::SourceInit)?;

		self.state = State::Running {
			registry: WatchRegistry::new(source),
			dispatcher: Dispatcher::new(callbacks, self.workers),
		};

		info!("Tree monitor started");

		Ok(())
	}

	/// Watches `path` and everything below it. Returns `false` when it was already watched or
	/// can't be watched.
	///
	/// When [`MonitorConfig::emit_initial_events`] is set, entries already present are queued as
	/// created, and files as closed after write, for the next [`Monitor::run`] to deliver.
	#[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
	pub fn add_watched_directory(&mut self, path: impl AsRef<Path>) -> Result<bool, Error> {
		let emit_existing = self.config.emit_initial_events;
		let (registry, dispatcher) = self.running_mut()?;

		let path = absolute(path.as_ref());

		let added = registry.add_directory_recursive(&path, emit_existing, &mut |event| {
			dispatcher.dispatch(event);
		});

		if added {
			debug!(watched = registry.len(), "Directory tree added");
		} else {
			trace!("Directory tree not added");
		}

		Ok(added)
	}

	/// Stops watching `path` and every watched directory below it, returning how many watches
	/// were dropped.
	#[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
	pub fn remove_watched_directory(&mut self, path: impl AsRef<Path>) -> Result<usize, Error> {
		let (registry, _) = self.running_mut()?;

		Ok(registry.remove_subtree(&absolute(path.as_ref())))
	}

	/// Processes raw events as described by `options`. Delivery workers are started for the
	/// duration of the call and joined before it returns, errors included.
	pub fn run(&mut self, options: RunOptions<'_>) -> Result<(), Error> {
		let default_poll_interval = self.config.poll_interval();
		let (registry, dispatcher) = self.running_mut()?;

		pump::run(registry, dispatcher, options, default_poll_interval)
	}

	/// Closes the raw event source, for good.
	#[instrument(skip(self))]
	pub fn stop(&mut self) -> Result<(), Error> {
		match mem::replace(&mut self.state, State::Stopped) {
			State::Running {
				mut registry,
				mut dispatcher,
			} => {
				dispatcher.shutdown();
				registry.close()?;
				info!("Tree monitor stopped");
				Ok(())
			}
			State::Idle => {
				self.state = State::Idle;
				Err(Error::NotStarted)
			}
			State::Stopped => Err(Error::MonitorClosed),
		}
	}

	#[must_use]
	pub fn watched_directories(&self) -> Vec<PathBuf> {
		match &self.state {
			State::Running { registry, .. } => registry.paths().map(Path::to_path_buf).collect(),
			State::Idle | State::Stopped => Vec::new(),
		}
	}

	#[must_use]
	pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
		match &self.state {
			State::Running { registry, .. } => registry.contains(&absolute(path.as_ref())),
			State::Idle | State::Stopped => false,
		}
	}

	/// Delivery counters of the running monitor.
	#[must_use]
	pub fn delivery_stats(&self) -> Option<Arc<DeliveryStats>> {
		match &self.state {
			State::Running { dispatcher, .. } => Some(dispatcher.stats()),
			State::Idle | State::Stopped => None,
		}
	}

	/// Whether pooled delivery workers are alive, which only happens inside [`Monitor::run`].
	#[must_use]
	pub fn is_delivering(&self) -> bool {
		matches!(&self.state, State::Running { dispatcher, .. } if dispatcher.is_running())
	}

	/// Events waiting for the next [`Monitor::run`].
	#[must_use]
	pub fn pending_events(&self) -> usize {
		match &self.state {
			State::Running { dispatcher, .. } => dispatcher.pending(),
			State::Idle | State::Stopped => 0,
		}
	}

	fn running_mut(&mut self) -> Result<(&mut WatchRegistry<S>, &mut Dispatcher), Error> {
		match &mut self.state {
			State::Running {
				registry,
				dispatcher,
			} => Ok((registry, dispatcher)),
			State::Idle => Err(Error::NotStarted),
			State::Stopped => Err(Error::MonitorClosed),
		}
	}
}

fn absolute(path: &Path) -> PathBuf {
	path::absolute(path).unwrap_or_else(|e| {
		warn!(?path, ?e, "Failed to make path absolute, using it as is;");
		path.to_path_buf()
	})
}

impl<S: EventSource> fmt::Debug for Monitor<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match &self.state {
			State::Idle => "idle",
			State::Running { .. } => "running",
			State::Stopped => "stopped",
		};

		f.debug_struct("Monitor")
			.field("config", &self.config)
			.field("callbacks", &self.callbacks)
			.field("workers", &self.workers)
			.field("state", &state)
			.finish()
	}
}

impl<S: EventSource> Drop for Monitor<S> {
	fn drop(&mut self) {
		if matches!(self.state, State::Running { .. }) {
			if let Err(e) = self.stop() {
				warn!(?e, "Failed to stop tree monitor on drop;");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::{
		super::{
			event::{Callbacks, EventKind},
			source::{mock::MockSource, RawMask},
		},
		*,
	};

	use std::{
		fs,
		sync::atomic::{AtomicUsize, Ordering},
	};

	use tempfile::tempdir;

	#[derive(Default)]
	struct Creates(AtomicUsize);

	impl Callbacks for Creates {
		fn create(&self, _path: &Path, _is_dir: bool) {
			self.0.fetch_add(1, Ordering::Relaxed);
		}
	}

	fn monitor(callbacks: &Arc<Creates>) -> Monitor<MockSource> {
		let mut monitor = Monitor::new(MonitorConfig::default());
		monitor
			.set_callbacks(CallbackSet::immediate(Arc::clone(callbacks)))
			.unwrap();
		monitor
	}

	#[test]
	fn lifecycle_is_enforced() {
		let creates = Arc::new(Creates::default());

		let mut bare = Monitor::<MockSource>::new(MonitorConfig::default());
		assert!(matches!(bare.start(), Err(Error::MissingCallbacks)));
		assert!(matches!(bare.stop(), Err(Error::NotStarted)));

		let mut monitor = monitor(&creates);
		assert!(matches!(
			monitor.add_watched_directory("/tmp"),
			Err(Error::NotStarted)
		));

		monitor.start().unwrap();
		assert!(matches!(monitor.start(), Err(Error::AlreadyStarted)));
		assert!(matches!(
			monitor.set_callbacks(CallbackSet::immediate(Arc::clone(&creates))),
			Err(Error::AlreadyStarted)
		));

		monitor.stop().unwrap();
		assert!(matches!(monitor.stop(), Err(Error::MonitorClosed)));
		assert!(matches!(monitor.start(), Err(Error::MonitorClosed)));
		assert!(matches!(
			monitor.run(RunOptions::blocking()),
			Err(Error::MonitorClosed)
		));
		assert!(matches!(
			monitor.set_worker_count(2),
			Err(Error::MonitorClosed)
		));
		assert!(monitor.delivery_stats().is_none());
	}

	#[test]
	fn initial_entries_are_delivered_on_next_run() {
		let dir = tempdir().unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		fs::write(dir.path().join("sub").join("file"), b"").unwrap();

		let creates = Arc::new(Creates::default());
		let mut monitor = monitor(&creates);
		monitor.start().unwrap();

		assert!(monitor.add_watched_directory(dir.path()).unwrap());
		assert!(!monitor.add_watched_directory(dir.path()).unwrap());
		assert_eq!(monitor.pending_events(), 3);

		monitor.run(RunOptions::blocking()).unwrap();

		assert_eq!(creates.0.load(Ordering::Relaxed), 2);
		assert_eq!(monitor.pending_events(), 0);
		assert_eq!(
			monitor
				.delivery_stats()
				.unwrap()
				.delivered(EventKind::CloseWrite),
			1
		);
	}

	#[test]
	fn initial_events_can_be_turned_off() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join("file"), b"").unwrap();

		let creates = Arc::new(Creates::default());
		let mut monitor = Monitor::<MockSource>::new(MonitorConfig {
			emit_initial_events: false,
			..MonitorConfig::default()
		});
		monitor
			.set_callbacks(CallbackSet::immediate(Arc::clone(&creates)))
			.unwrap();
		monitor.start().unwrap();

		assert!(monitor.add_watched_directory(dir.path()).unwrap());
		assert_eq!(monitor.pending_events(), 0);
	}

	#[test]
	fn removal_drops_the_whole_subtree() {
		let dir = tempdir().unwrap();
		fs::create_dir_all(dir.path().join("a").join("b")).unwrap();

		let creates = Arc::new(Creates::default());
		let mut monitor = monitor(&creates);
		monitor.start().unwrap();
		monitor.add_watched_directory(dir.path()).unwrap();

		assert_eq!(monitor.watched_directories().len(), 3);
		assert_eq!(
			monitor
				.remove_watched_directory(dir.path().join("a"))
				.unwrap(),
			2
		);
		assert!(monitor.is_watched(dir.path()));
		assert!(!monitor.is_watched(dir.path().join("a").join("b")));
		assert_eq!(monitor.remove_watched_directory(dir.path().join("a")).unwrap(), 0);
	}

	#[test]
	fn run_errors_propagate() {
		let dir = tempdir().unwrap();

		let creates = Arc::new(Creates::default());
		let mut monitor = monitor(&creates);
		monitor.start().unwrap();
		monitor.add_watched_directory(dir.path()).unwrap();

		let State::Running { registry, .. } = &mut monitor.state else {
			unreachable!()
		};
		let handle = registry.source_mut().handle_of(dir.path()).unwrap();
		registry.source_mut().push(handle, RawMask::CLOSE_NOWRITE, None);

		assert!(matches!(
			monitor.run(RunOptions::blocking()),
			Err(Error::UnrecognizedEventKind { mask }) if mask == RawMask::CLOSE_NOWRITE
		));

		// Still usable afterwards
		monitor.run(RunOptions::blocking()).unwrap();
	}
}
