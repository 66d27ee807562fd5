use std::{
	fmt,
	path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
	Create = 0,
	Delete = 1,
	CloseWrite = 2,
	MovedFrom = 3,
	MovedTo = 4,
	Modify = 5,
	Attrib = 6,
	Unmount = 7,
}

impl EventKind {
	pub const ALL: [Self; 8] = [
		Self::Create,
		Self::Delete,
		Self::CloseWrite,
		Self::MovedFrom,
		Self::MovedTo,
		Self::Modify,
		Self::Attrib,
		Self::Unmount,
	];

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Create => "create",
			Self::Delete => "delete",
			Self::CloseWrite => "close_write",
			Self::MovedFrom => "moved_from",
			Self::MovedTo => "moved_to",
			Self::Modify => "modify",
			Self::Attrib => "attrib",
			Self::Unmount => "unmount",
		}
	}

	pub(crate) const fn index(self) -> usize {
		self as usize
	}

	pub(crate) const fn from_u8(tag: u8) -> Option<Self> {
		match tag {
			0 => Some(Self::Create),
			1 => Some(Self::Delete),
			2 => Some(Self::CloseWrite),
			3 => Some(Self::MovedFrom),
			4 => Some(Self::MovedTo),
			5 => Some(Self::Modify),
			6 => Some(Self::Attrib),
			7 => Some(Self::Unmount),
			_ => None,
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A path scoped event, ready to be handed to [`Callbacks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
	kind: EventKind,
	path: PathBuf,
	is_dir: bool,
}

impl Event {
	pub fn new(kind: EventKind, path: impl Into<PathBuf>, is_dir: bool) -> Self {
		Self {
			kind,
			path: path.into(),
			is_dir,
		}
	}

	#[must_use]
	pub const fn kind(&self) -> EventKind {
		self.kind
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	#[must_use]
	pub const fn is_dir(&self) -> bool {
		self.is_dir
	}

	/// Calls the method of `callbacks` matching this event's kind.
	pub fn deliver_to(&self, callbacks: &dyn Callbacks) {
		let Self { kind, path, is_dir } = self;

		match kind {
			EventKind::Create => callbacks.create(path, *is_dir),
			EventKind::Delete => callbacks.delete(path, *is_dir),
			EventKind::CloseWrite => callbacks.close_write(path, *is_dir),
			EventKind::MovedFrom => callbacks.moved_from(path, *is_dir),
			EventKind::MovedTo => callbacks.moved_to(path, *is_dir),
			EventKind::Modify => callbacks.modify(path, *is_dir),
			EventKind::Attrib => callbacks.attrib(path, *is_dir),
			EventKind::Unmount => callbacks.unmount(path, *is_dir),
		}
	}
}

/// Application handlers, one method per [`EventKind`]. Every method defaults to a no-op, so
/// implementors only override what they care about.
///
/// Methods take `&self` as pooled dispatch modes call them from several threads at once; any
/// shared state must be protected by the implementor.
pub trait Callbacks: Send + Sync + 'static {
	fn create(&self, _path: &Path, _is_dir: bool) {}

	fn delete(&self, _path: &Path, _is_dir: bool) {}

	fn close_write(&self, _path: &Path, _is_dir: bool) {}

	fn moved_from(&self, _path: &Path, _is_dir: bool) {}

	fn moved_to(&self, _path: &Path, _is_dir: bool) {}

	fn modify(&self, _path: &Path, _is_dir: bool) {}

	fn attrib(&self, _path: &Path, _is_dir: bool) {}

	fn unmount(&self, _path: &Path, _is_dir: bool) {}
}
