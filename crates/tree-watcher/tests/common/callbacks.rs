use sd_tree_watcher::{Callbacks, EventKind};

use std::{
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
};

/// Counts every delivered event per kind and remembers them in delivery order.
#[derive(Debug, Default)]
pub struct Recorder {
	counts: [AtomicUsize; EventKind::ALL.len()],
	log: Mutex<Vec<(EventKind, PathBuf, bool)>>,
}

impl Recorder {
	fn record(&self, kind: EventKind, path: &Path, is_dir: bool) {
		self.counts[kind as usize].fetch_add(1, Ordering::SeqCst);
		self.log
			.lock()
			.unwrap()
			.push((kind, path.to_path_buf(), is_dir));
	}

	pub fn count(&self, kind: EventKind) -> usize {
		self.counts[kind as usize].load(Ordering::SeqCst)
	}

	pub fn total(&self) -> usize {
		EventKind::ALL.into_iter().map(|kind| self.count(kind)).sum()
	}

	pub fn log(&self) -> Vec<(EventKind, PathBuf, bool)> {
		self.log.lock().unwrap().clone()
	}

	/// Paths that got `kind`, in delivery order.
	pub fn paths(&self, kind: EventKind) -> Vec<PathBuf> {
		self.log
			.lock()
			.unwrap()
			.iter()
			.filter(|(logged, _, _)| *logged == kind)
			.map(|(_, path, _)| path.clone())
			.collect()
	}
}

impl Callbacks for Recorder {
	fn create(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::Create, path, is_dir);
	}

	fn delete(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::Delete, path, is_dir);
	}

	fn close_write(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::CloseWrite, path, is_dir);
	}

	fn moved_from(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::MovedFrom, path, is_dir);
	}

	fn moved_to(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::MovedTo, path, is_dir);
	}

	fn modify(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::Modify, path, is_dir);
	}

	fn attrib(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::Attrib, path, is_dir);
	}

	fn unmount(&self, path: &Path, is_dir: bool) {
		self.record(EventKind::Unmount, path, is_dir);
	}
}
