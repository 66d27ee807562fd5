use std::{
	collections::{HashMap, HashSet, VecDeque},
	ffi::OsString,
	io,
	path::{Path, PathBuf},
};

use super::{
	super::{config::MonitorConfig, error::Error},
	EventSource, RawEvent, RawMask,
};

/// In memory source for tests that can't rely on kernel timing. Watches behave like inotify's:
/// watching a path twice hands back the same handle.
#[derive(Debug, Default)]
pub(crate) struct MockSource {
	next_handle: u32,
	watches: HashMap<PathBuf, u32>,
	denied: HashSet<PathBuf>,
	pending: VecDeque<RawEvent<u32>>,
	closed: bool,
}

impl MockSource {
	pub(crate) fn deny(&mut self, path: impl Into<PathBuf>) {
		self.denied.insert(path.into());
	}

	/// Makes `alias` resolve to the same watch as `target`, like two paths to the same inode.
	pub(crate) fn alias(&mut self, alias: impl Into<PathBuf>, target: &Path) {
		if let Some(handle) = self.watches.get(target).copied() {
			self.watches.insert(alias.into(), handle);
		}
	}

	pub(crate) fn handle_of(&self, path: &Path) -> Option<u32> {
		self.watches.get(path).copied()
	}

	pub(crate) fn is_watching(&self, path: &Path) -> bool {
		self.watches.contains_key(path)
	}

	pub(crate) fn push(&mut self, handle: u32, mask: RawMask, name: Option<&str>) {
		self.pending.push_back(RawEvent {
			handle,
			mask,
			name: name.map(OsString::from),
		});
	}
}

impl EventSource for MockSource {
	type Handle = u32;

	fn init(_config: &MonitorConfig) -> io::Result<Self> {
		Ok(Self::default())
	}

	fn add_watch(&mut self, path: &Path, _mask: RawMask) -> io::Result<u32> {
		if self.closed {
			return Err(io::ErrorKind::NotConnected.into());
		}

		if self.denied.contains(path) {
			return Err(io::ErrorKind::PermissionDenied.into());
		}

		if let Some(handle) = self.watches.get(path) {
			return Ok(*handle);
		}

		self.next_handle += 1;
		self.watches.insert(path.to_path_buf(), self.next_handle);

		Ok(self.next_handle)
	}

	fn remove_watch(&mut self, handle: u32) -> io::Result<()> {
		let before = self.watches.len();
		self.watches.retain(|_, watched| *watched != handle);

		if before == self.watches.len() {
			Err(io::ErrorKind::InvalidInput.into())
		} else {
			Ok(())
		}
	}

	fn get_events(&mut self, _blocking: bool) -> io::Result<Vec<RawEvent<u32>>> {
		if self.closed {
			return Err(io::ErrorKind::NotConnected.into());
		}

		Ok(self.pending.drain(..).collect())
	}

	fn close(&mut self) -> Result<(), Error> {
		if self.closed {
			return Err(Error::MonitorClosed);
		}

		self.closed = true;
		self.watches.clear();

		Ok(())
	}
}
