use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
};

use tracing::{debug, trace, warn};

use super::{
	error::Error,
	event::{Event, EventKind},
	source::{EventSource, RawMask},
};

/// Keeps every watched directory bound to exactly one source handle.
///
/// `by_path` is the owning view and `by_handle` its reverse index, both are only ever touched
/// together through [`WatchRegistry::bind`] and [`WatchRegistry::unbind`].
#[derive(Debug)]
pub struct WatchRegistry<S: EventSource> {
	source: S,
	by_path: HashMap<PathBuf, S::Handle>,
	by_handle: HashMap<S::Handle, PathBuf>,
}

impl<S: EventSource> WatchRegistry<S> {
	pub fn new(source: S) -> Self {
		Self {
			source,
			by_path: HashMap::new(),
			by_handle: HashMap::new(),
		}
	}

	/// Starts watching `path`. Returns `false`, leaving the registry untouched, when the path is
	/// already watched, isn't a directory, or the source refuses to watch it.
	pub fn add_directory(&mut self, path: &Path) -> bool {
		if self.by_path.contains_key(path) {
			trace!(?path, "Directory already watched");
			return false;
		}

		if !path.is_dir() {
			trace!(?path, "Not watching, path is missing or not a directory");
			return false;
		}

		let handle = match self.source.add_watch(path, RawMask::WATCHED) {
			Ok(handle) => handle,
			Err(e) => {
				debug!(?path, ?e, "Unable to watch directory;");
				return false;
			}
		};

		// inotify hands back the existing descriptor when the same inode is reached again
		// through another path, binding it twice would break the one to one mapping
		if let Some(existing) = self.by_handle.get(&handle) {
			warn!(?path, ?existing, "Directory is already watched through another path;");
			return false;
		}

		trace!(?path, ?handle, "Watching directory");
		self.bind(path.to_path_buf(), handle);

		true
	}

	/// Watches `path` and every directory below it. When `emit_existing` is set, entries found
	/// while walking are reported through `emit` as created, files also as closed after write.
	///
	/// Returns whether `path` itself became watched.
	pub fn add_directory_recursive<F: FnMut(Event)>(
		&mut self,
		path: &Path,
		emit_existing: bool,
		emit: &mut F,
	) -> bool {
		if !self.add_directory(path) {
			return false;
		}

		let entries = match fs::read_dir(path) {
			Ok(entries) => entries,
			Err(e) => {
				warn!(?path, ?e, "Failed to list watched directory;");
				return true;
			}
		};

		for entry in entries {
			let entry = entry.and_then(|entry| Ok((entry.path(), entry.file_type()?)));
			let (child, file_type) = match entry {
				Ok(child) => child,
				Err(e) => {
					warn!(?path, ?e, "Failed to read an entry of watched directory;");
					break;
				}
			};

			// Symlinks aren't followed, a link to a directory is reported like any other link
			let is_dir = file_type.is_dir();

			if emit_existing {
				emit(Event::new(EventKind::Create, child.clone(), is_dir));
				if file_type.is_file() {
					emit(Event::new(EventKind::CloseWrite, child.clone(), false));
				}
			}

			if is_dir {
				self.add_directory_recursive(&child, emit_existing, emit);
			}
		}

		true
	}

	/// Stops watching exactly `path`, returning whether it was watched.
	pub fn remove_directory(&mut self, path: &Path) -> bool {
		let Some(handle) = self.unbind(path) else {
			return false;
		};

		// The kernel drops watches on its own for deleted directories, so this is allowed to fail
		if let Err(e) = self.source.remove_watch(handle) {
			trace!(?path, ?e, "Watch was already gone on the source side");
		}

		true
	}

	/// Stops watching `root` and every watched directory below it, as the source doesn't cascade
	/// removals to descendants on its own. Returns how many watches were dropped.
	pub fn remove_subtree(&mut self, root: &Path) -> usize {
		let doomed = self
			.by_path
			.keys()
			.filter(|path| path.starts_with(root))
			.cloned()
			.collect::<Vec<_>>();

		for path in &doomed {
			self.remove_directory(path);
		}

		if !doomed.is_empty() {
			debug!(?root, removed = doomed.len(), "Dropped watched subtree");
		}

		doomed.len()
	}

	/// Drops the binding of `path` without touching the source, for watches the source already
	/// dropped on its own.
	pub(crate) fn forget_directory(&mut self, path: &Path) -> bool {
		self.unbind(path).is_some()
	}

	/// Path watched through `handle`, `None` for late events on handles already removed.
	pub fn resolve(&self, handle: &S::Handle) -> Option<&Path> {
		self.by_handle.get(handle).map(PathBuf::as_path)
	}

	pub fn contains(&self, path: &Path) -> bool {
		self.by_path.contains_key(path)
	}

	pub fn paths(&self) -> impl Iterator<Item = &Path> {
		self.by_path.keys().map(PathBuf::as_path)
	}

	pub fn len(&self) -> usize {
		self.by_path.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_path.is_empty()
	}

	pub(crate) fn source_mut(&mut self) -> &mut S {
		&mut self.source
	}

	/// Forgets every watch and closes the underlying source.
	pub fn close(&mut self) -> Result<(), Error> {
		self.by_path.clear();
		self.by_handle.clear();
		self.source.close()
	}

	fn bind(&mut self, path: PathBuf, handle: S::Handle) {
		self.by_handle.insert(handle.clone(), path.clone());
		self.by_path.insert(path, handle);
	}

	fn unbind(&mut self, path: &Path) -> Option<S::Handle> {
		let handle = self.by_path.remove(path)?;
		self.by_handle.remove(&handle);
		Some(handle)
	}
}
