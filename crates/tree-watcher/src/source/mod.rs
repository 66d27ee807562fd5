use std::{ffi::OsString, fmt::Debug, hash::Hash, io, path::Path};

use bitflags::bitflags;

use super::{config::MonitorConfig, error::Error};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::InotifySource;

bitflags! {
	/// Raw notification bits, laid out exactly like the kernel's inotify mask so a real source
	/// can hand its masks over untouched.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct RawMask: u32 {
		const ACCESS = 0x0000_0001;
		const MODIFY = 0x0000_0002;
		const ATTRIB = 0x0000_0004;
		const CLOSE_WRITE = 0x0000_0008;
		const CLOSE_NOWRITE = 0x0000_0010;
		const OPEN = 0x0000_0020;
		const MOVED_FROM = 0x0000_0040;
		const MOVED_TO = 0x0000_0080;
		const CREATE = 0x0000_0100;
		const DELETE = 0x0000_0200;
		const DELETE_SELF = 0x0000_0400;
		const MOVE_SELF = 0x0000_0800;
		const UNMOUNT = 0x0000_2000;
		const Q_OVERFLOW = 0x0000_4000;
		const IGNORED = 0x0000_8000;
		const ISDIR = 0x4000_0000;
	}
}

impl RawMask {
	/// Every kind we ask the source to report for a watched directory. Unmount isn't here as the
	/// kernel always reports it.
	pub const WATCHED: Self = Self::CREATE
		.union(Self::DELETE)
		.union(Self::CLOSE_WRITE)
		.union(Self::MOVED_FROM)
		.union(Self::MOVED_TO)
		.union(Self::MODIFY)
		.union(Self::ATTRIB);
}

/// An unprocessed notification, scoped to the watch it was reported on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<H> {
	pub handle: H,
	pub mask: RawMask,
	/// Name of the affected entry inside the watched directory, absent when the event is about
	/// the watched directory itself.
	pub name: Option<OsString>,
}

/// The OS notification facility, seen as an opaque producer of [`RawEvent`]s.
pub trait EventSource: Sized {
	type Handle: Clone + Eq + Hash + Debug;

	fn init(config: &MonitorConfig) -> io::Result<Self>;

	fn add_watch(&mut self, path: &Path, mask: RawMask) -> io::Result<Self::Handle>;

	fn remove_watch(&mut self, handle: Self::Handle) -> io::Result<()>;

	/// Fetches every raw event currently available. When `blocking` is set, waits until there is
	/// at least one.
	fn get_events(&mut self, blocking: bool) -> io::Result<Vec<RawEvent<Self::Handle>>>;

	/// Releases the source. Closing it a second time fails with [`Error::MonitorClosed`].
	fn close(&mut self) -> Result<(), Error>;
}
