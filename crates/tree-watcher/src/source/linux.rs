//! Linux inotify backed raw event source

use std::{ffi::OsStr, io, path::Path};

use inotify::{Event, Inotify, WatchDescriptor, WatchMask};
use tracing::trace;

use super::{
	super::{config::MonitorConfig, error::Error},
	EventSource, RawEvent, RawMask,
};

#[derive(Debug)]
pub struct InotifySource {
	inotify: Option<Inotify>,
	buffer: Vec<u8>,
}

impl InotifySource {
	fn closed() -> io::Error {
		io::Error::new(io::ErrorKind::NotConnected, "inotify instance already closed")
	}
}

fn into_raw(event: Event<&OsStr>) -> RawEvent<WatchDescriptor> {
	RawEvent {
		handle: event.wd,
		mask: RawMask::from_bits_retain(event.mask.bits()),
		name: event.name.map(OsStr::to_os_string),
	}
}

impl EventSource for InotifySource {
	type Handle = WatchDescriptor;

	fn init(config: &MonitorConfig) -> io::Result<Self> {
		Ok(Self {
			inotify: Some(Inotify::init()?),
			buffer: vec![0; config.event_buffer_size],
		})
	}

	fn add_watch(&mut self, path: &Path, mask: RawMask) -> io::Result<WatchDescriptor> {
		self.inotify
			.as_mut()
			.ok_or_else(Self::closed)?
			.watches()
			.add(path, WatchMask::from_bits_truncate(mask.bits()))
	}

	fn remove_watch(&mut self, handle: WatchDescriptor) -> io::Result<()> {
		self.inotify
			.as_mut()
			.ok_or_else(Self::closed)?
			.watches()
			.remove(handle)
	}

	fn get_events(&mut self, blocking: bool) -> io::Result<Vec<RawEvent<WatchDescriptor>>> {
		let Self { inotify, buffer } = self;
		let inotify = inotify.as_mut().ok_or_else(Self::closed)?;

		let mut batch = Vec::new();

		if blocking {
			batch.extend(
				inotify
					.read_events_blocking(buffer.as_mut_slice())?
					.map(into_raw),
			);
		}

		// A single read only fills one buffer, keep going until the kernel queue is empty
		loop {
			match inotify.read_events(buffer.as_mut_slice()) {
				Ok(events) => {
					let before = batch.len();
					batch.extend(events.map(into_raw));
					if batch.len() == before {
						break;
					}
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => return Err(e),
			}
		}

		trace!(count = batch.len(), blocking, "Fetched raw events");

		Ok(batch)
	}

	fn close(&mut self) -> Result<(), Error> {
		self.inotify
			.take()
			.ok_or(Error::MonitorClosed)?
			.close()
			.map_err(Error::Source)
	}
}
