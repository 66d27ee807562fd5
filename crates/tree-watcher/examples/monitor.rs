//! Prints every event happening under a directory tree.
//!
//! ```sh
//! RUST_LOG=sd_tree_watcher=debug cargo run --example monitor -- /some/dir 4
//! ```

use sd_tree_watcher::{CallbackSet, Callbacks, Error, MonitorConfig, RunOptions, TreeMonitor};

use std::{env, path::Path, process::ExitCode, sync::Arc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Printer;

impl Printer {
	fn print(kind: &str, path: &Path, is_dir: bool) {
		println!(
			"{kind:>12} {}{}",
			path.display(),
			if is_dir { "/" } else { "" }
		);
	}
}

impl Callbacks for Printer {
	fn create(&self, path: &Path, is_dir: bool) {
		Self::print("create", path, is_dir);
	}

	fn delete(&self, path: &Path, is_dir: bool) {
		Self::print("delete", path, is_dir);
	}

	fn close_write(&self, path: &Path, is_dir: bool) {
		Self::print("close_write", path, is_dir);
	}

	fn moved_from(&self, path: &Path, is_dir: bool) {
		Self::print("moved_from", path, is_dir);
	}

	fn moved_to(&self, path: &Path, is_dir: bool) {
		Self::print("moved_to", path, is_dir);
	}

	fn modify(&self, path: &Path, is_dir: bool) {
		Self::print("modify", path, is_dir);
	}

	fn attrib(&self, path: &Path, is_dir: bool) {
		Self::print("attrib", path, is_dir);
	}

	fn unmount(&self, path: &Path, is_dir: bool) {
		Self::print("unmount", path, is_dir);
	}
}

fn watch(root: &str, workers: usize) -> Result<(), Error> {
	let mut monitor = TreeMonitor::new(MonitorConfig {
		workers,
		..MonitorConfig::default()
	});

	let callbacks = if workers > 1 {
		CallbackSet::threaded(Arc::new(Printer))
	} else {
		CallbackSet::immediate(Arc::new(Printer))
	};

	monitor.set_callbacks(callbacks)?;
	monitor.start()?;

	if !monitor.add_watched_directory(root)? {
		error!(%root, "Unable to watch directory;");
		return monitor.stop();
	}

	info!(
		%root,
		workers,
		watched = monitor.watched_directories().len(),
		"Watching directory tree"
	);

	while !monitor.watched_directories().is_empty() {
		monitor.run(RunOptions::blocking())?;
	}

	info!("Nothing left to watch");

	monitor.stop()
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let mut args = env::args().skip(1);

	let Some(root) = args.next() else {
		eprintln!("usage: monitor <directory> [workers]");
		return ExitCode::FAILURE;
	};

	let workers = args.next().and_then(|n| n.parse().ok()).unwrap_or(1);

	match watch(&root, workers) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!(?e, "Tree monitor failed;");
			ExitCode::FAILURE
		}
	}
}
