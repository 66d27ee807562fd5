use std::{
	ffi::OsStr,
	io,
	os::{
		fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
		unix::ffi::OsStrExt,
	},
	panic::{self, AssertUnwindSafe},
	path::Path,
	sync::Arc,
	thread::{self, JoinHandle},
};

use async_channel as chan;
use tracing::{error, info, trace, warn};

use super::{
	super::{
		error::Error,
		event::{Callbacks, Event, EventKind},
	},
	DeliveryStats, Message,
};

/// Tag of the frame telling a worker process to leave.
const SENTINEL: u8 = 0xFF;

/// Largest frame exchanged with worker processes, well within a seqpacket socket send buffer.
const FRAME_CAPACITY: usize = 64 * 1024;

/// Fixed set of forked processes delivering events read from a shared seqpacket socket.
///
/// A feeder thread moves events from the dispatch queue into the socket, each worker process
/// acknowledges what it delivered on a second socket, and a collector thread turns those
/// acknowledgements into [`DeliveryStats`] records.
pub(super) struct ProcessPool {
	children: Vec<(usize, libc::pid_t)>,
	feeder: JoinHandle<()>,
	collector: JoinHandle<()>,
}

impl ProcessPool {
	pub(super) fn spawn(
		workers: usize,
		msgs_rx: &chan::Receiver<Message>,
		handler: &Arc<dyn Callbacks>,
		stats: &Arc<DeliveryStats>,
	) -> Result<Self, Error> {
		let (work_tx, work_rx) = socket_pair().map_err(Error::WorkerSpawn)?;
		let (ack_tx, ack_rx) = socket_pair().map_err(Error::WorkerSpawn)?;
		// Still able to reach the workers once the feeder owns `work_tx`
		let sentinel_fd = work_tx.try_clone().map_err(Error::WorkerSpawn)?;

		let mut children = Vec::with_capacity(workers);

		for id in 0..workers {
			// SAFETY: the child never returns from `worker_process`, it only runs the callbacks and
			// leaves through `_exit`
			match unsafe { libc::fork() } {
				-1 => {
					let e = io::Error::last_os_error();
					error!(worker_id = id, ?e, "Failed to fork delivery worker process;");
					abort(work_tx.as_raw_fd(), children);
					return Err(Error::WorkerSpawn(e));
				}

				0 => worker_process(
					work_rx.as_raw_fd(),
					work_tx.as_raw_fd(),
					ack_tx.as_raw_fd(),
					handler.as_ref(),
				),

				pid => {
					trace!(worker_id = id, pid, "Forked delivery worker process");
					children.push((id, pid));
				}
			}
		}

		// Acknowledgements reach EOF once every worker process is gone
		drop(ack_tx);
		drop(work_rx);

		let collector = match thread::Builder::new()
			.name("tree-watcher-ack-collector".to_string())
			.spawn({
				let stats = Arc::clone(stats);
				move || collect(&ack_rx, &stats)
			}) {
			Ok(handle) => handle,
			Err(e) => {
				error!(?e, "Failed to spawn acknowledgement collector;");
				abort(work_tx.as_raw_fd(), children);
				return Err(Error::WorkerSpawn(e));
			}
		};

		let feeder = match thread::Builder::new()
			.name("tree-watcher-feeder".to_string())
			.spawn({
				let msgs_rx = msgs_rx.clone();
				move || feed(&msgs_rx, &work_tx)
			}) {
			Ok(handle) => handle,
			Err(e) => {
				error!(?e, "Failed to spawn worker process feeder;");
				abort(sentinel_fd.as_raw_fd(), children);
				if collector.join().is_err() {
					error!("Acknowledgement collector panicked;");
				}
				return Err(Error::WorkerSpawn(e));
			}
		};

		trace!(workers, "Process pool started");

		Ok(Self {
			children,
			feeder,
			collector,
		})
	}

	pub(super) fn join(self) {
		let Self {
			children,
			feeder,
			collector,
		} = self;

		if feeder.join().is_err() {
			error!("Worker process feeder panicked;");
		}

		reap_all(children);

		if collector.join().is_err() {
			error!("Acknowledgement collector panicked;");
		}
	}
}

fn abort(work_tx: RawFd, children: Vec<(usize, libc::pid_t)>) {
	if children.is_empty() {
		return;
	}

	if let Err(e) = send_frame(work_tx, &[SENTINEL]) {
		error!(?e, "Failed to ask worker processes to leave;");
	}

	reap_all(children);
}

fn reap_all(children: Vec<(usize, libc::pid_t)>) {
	for (id, pid) in children {
		match wait_for(pid) {
			Ok(status) if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 => {
				info!(worker_id = id, pid, "Worker process gracefully shutdown");
			}
			Ok(status) => {
				warn!(worker_id = id, pid, status, "Worker process exited abnormally;");
			}
			Err(e) => {
				error!(worker_id = id, pid, ?e, "Failed to wait for worker process;");
			}
		}
	}
}

fn feed(msgs_rx: &chan::Receiver<Message>, work_tx: &OwnedFd) {
	let mut fed = 0_u64;

	while let Ok(message) = msgs_rx.recv_blocking() {
		match message {
			Message::Event(event) => {
				let frame = encode(&event);

				if frame.len() > FRAME_CAPACITY {
					warn!(?event, "Event too large to be handed to a worker process;");
					continue;
				}

				if let Err(e) = send_frame(work_tx.as_raw_fd(), &frame) {
					error!(?e, "Failed to hand event to worker processes;");
					break;
				}

				fed += 1;
			}

			Message::Shutdown => break,
		}
	}

	trace!(fed, "Feeder received shutdown signal and will exit...");

	if let Err(e) = send_frame(work_tx.as_raw_fd(), &[SENTINEL]) {
		error!(?e, "Failed to ask worker processes to leave;");
	}
}

fn collect(ack_rx: &OwnedFd, stats: &DeliveryStats) {
	let mut buf = [0_u8; 8];

	loop {
		match recv_frame(ack_rx.as_raw_fd(), &mut buf) {
			Ok(0) => break,
			Ok(_) => match EventKind::from_u8(buf[0]) {
				Some(kind) => stats.record(kind),
				None => warn!(tag = buf[0], "Unknown acknowledgement from worker process;"),
			},
			Err(e) => {
				error!(?e, "Failed to read worker process acknowledgements;");
				break;
			}
		}
	}
}

/// Body of a forked worker. Inherits the whole parent, so it steers clear of logging and leaves
/// through `_exit` without running any destructor.
fn worker_process(work_rx: RawFd, work_tx: RawFd, ack_tx: RawFd, handler: &dyn Callbacks) -> ! {
	let mut buf = vec![0_u8; FRAME_CAPACITY];

	while let Ok(len @ 1..) = recv_frame(work_rx, &mut buf) {
		let frame = &buf[..len];

		if frame[0] == SENTINEL {
			// Leave it for the next worker
			let _ = send_frame(work_tx, &[SENTINEL]);
			break;
		}

		let Some(event) = decode(frame) else {
			continue;
		};

		let _ = panic::catch_unwind(AssertUnwindSafe(|| event.deliver_to(handler)));
		let _ = send_frame(ack_tx, &[event.kind() as u8]);
	}

	// SAFETY: terminating the current process is always sound
	unsafe { libc::_exit(0) }
}

fn encode(event: &Event) -> Vec<u8> {
	let path = event.path().as_os_str().as_bytes();

	let mut frame = Vec::with_capacity(path.len() + 2);
	frame.push(event.kind() as u8);
	frame.push(u8::from(event.is_dir()));
	frame.extend_from_slice(path);

	frame
}

fn decode(frame: &[u8]) -> Option<Event> {
	let [tag, is_dir, path @ ..] = frame else {
		return None;
	};

	Some(Event::new(
		EventKind::from_u8(*tag)?,
		Path::new(OsStr::from_bytes(path)),
		*is_dir != 0,
	))
}

fn socket_pair() -> io::Result<(OwnedFd, OwnedFd)> {
	let mut fds: [RawFd; 2] = [-1; 2];

	// SAFETY: `fds` has room for the two descriptors written by the call
	let res = unsafe {
		libc::socketpair(
			libc::AF_UNIX,
			libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
			0,
			fds.as_mut_ptr(),
		)
	};

	if res == -1 {
		return Err(io::Error::last_os_error());
	}

	// SAFETY: both descriptors were just created and nothing else owns them
	Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn send_frame(fd: RawFd, frame: &[u8]) -> io::Result<()> {
	loop {
		// SAFETY: `frame` is valid for reads of its whole length
		let sent = unsafe { libc::send(fd, frame.as_ptr().cast(), frame.len(), libc::MSG_NOSIGNAL) };

		if sent >= 0 {
			return Ok(());
		}

		let e = io::Error::last_os_error();
		if e.kind() != io::ErrorKind::Interrupted {
			return Err(e);
		}
	}
}

fn recv_frame(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
	loop {
		// SAFETY: `buf` is valid for writes of its whole length
		let received = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };

		if let Ok(received) = usize::try_from(received) {
			return Ok(received);
		}

		let e = io::Error::last_os_error();
		if e.kind() != io::ErrorKind::Interrupted {
			return Err(e);
		}
	}
}

fn wait_for(pid: libc::pid_t) -> io::Result<libc::c_int> {
	let mut status = 0;

	loop {
		// SAFETY: `status` outlives the call
		if unsafe { libc::waitpid(pid, &mut status, 0) } != -1 {
			return Ok(status);
		}

		let e = io::Error::last_os_error();
		if e.kind() != io::ErrorKind::Interrupted {
			return Err(e);
		}
	}
}
