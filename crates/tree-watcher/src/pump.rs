use std::{
	fmt, io, thread,
	time::{Duration, Instant},
};

use tracing::{error, instrument, trace};

use super::{
	dispatch::Dispatcher,
	error::Error,
	registry::WatchRegistry,
	source::EventSource,
	translator::translate,
};

/// How long and how a [`Monitor::run`](crate::Monitor::run) call keeps processing events.
///
/// Without a timeout nor a predicate, a run waits for one batch of raw events, delivers it and
/// returns. Otherwise it polls until the timeout elapses or the predicate holds, whichever comes
/// first.
#[derive(Default)]
pub struct RunOptions<'a> {
	timeout: Option<Duration>,
	until: Option<Box<dyn FnMut() -> bool + 'a>>,
	poll_interval: Option<Duration>,
}

impl<'a> RunOptions<'a> {
	#[must_use]
	pub fn blocking() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn timeout(timeout: Duration) -> Self {
		Self::default().with_timeout(timeout)
	}

	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Stops polling as soon as `predicate` returns `true`, checked before every pass.
	#[must_use]
	pub fn until(mut self, predicate: impl FnMut() -> bool + 'a) -> Self {
		self.until = Some(Box::new(predicate));
		self
	}

	/// Sleep between two polling passes, the monitor's configured interval when unset.
	#[must_use]
	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = Some(interval);
		self
	}

	fn is_blocking(&self) -> bool {
		self.until.is_none() && self.timeout.map_or(true, |timeout| timeout == Duration::MAX)
	}
}

impl fmt::Debug for RunOptions<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RunOptions")
			.field("timeout", &self.timeout)
			.field("until", &self.until.as_ref().map(|_| "<predicate>"))
			.field("poll_interval", &self.poll_interval)
			.finish()
	}
}

/// Processes raw events according to `options`, then shuts delivery down whatever the outcome,
/// so pooled workers never outlive a run.
#[instrument(skip_all, fields(blocking = options.is_blocking(), timeout = ?options.timeout))]
pub(crate) fn run<S: EventSource>(
	registry: &mut WatchRegistry<S>,
	dispatcher: &mut Dispatcher,
	options: RunOptions<'_>,
	default_poll_interval: Duration,
) -> Result<(), Error> {
	let res = pump(registry, dispatcher, options, default_poll_interval);

	// Events translated before a failure still go out, pooled modes need workers for that
	if res.is_err() && dispatcher.pending() > 0 {
		if let Err(e) = dispatcher.drain_once() {
			error!(?e, "Failed to deliver events queued before a fatal error;");
		}
	}

	dispatcher.shutdown();

	res
}

fn pump<S: EventSource>(
	registry: &mut WatchRegistry<S>,
	dispatcher: &mut Dispatcher,
	options: RunOptions<'_>,
	default_poll_interval: Duration,
) -> Result<(), Error> {
	if options.is_blocking() {
		// Events queued since the last run, like initial ones, shouldn't wait for the kernel
		let blocking = dispatcher.pending() == 0;
		process_batch(registry, dispatcher, blocking)?;
		return dispatcher.drain_once();
	}

	let RunOptions {
		timeout,
		mut until,
		poll_interval,
	} = options;

	let timeout = timeout.unwrap_or(Duration::MAX);
	let poll_interval = poll_interval.unwrap_or(default_poll_interval);
	let start = Instant::now();

	while start.elapsed() < timeout && !until.as_mut().is_some_and(|predicate| predicate()) {
		process_batch(registry, dispatcher, false)?;
		dispatcher.drain_once()?;

		thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
	}

	trace!(elapsed = ?start.elapsed(), "Polling run finished");

	Ok(())
}

fn process_batch<S: EventSource>(
	registry: &mut WatchRegistry<S>,
	dispatcher: &Dispatcher,
	blocking: bool,
) -> Result<(), Error> {
	let batch = match registry.source_mut().get_events(blocking) {
		Ok(batch) => batch,
		Err(e) if e.kind() == io::ErrorKind::Interrupted => {
			trace!("Raw event read interrupted");
			return Ok(());
		}
		Err(e) => return Err(Error::Source(e)),
	};

	for raw in batch {
		translate(registry, raw, |event| dispatcher.dispatch(event))?;
	}

	Ok(())
}
