//!
//! # Tree Watcher
//!
//! Spacedrive's Tree Watcher keeps a whole directory tree under observation on top of inotify,
//! which by itself only watches single directories.
//!
//! Watch handles are added as subdirectories appear and dropped as they are deleted, moved away
//! or unmounted, while raw notifications are translated into a small, fixed vocabulary of events:
//! `create`, `delete`, `close_write`, `moved_from`, `moved_to`, `modify`, `attrib` and `unmount`.
//!
//! Events are queued and delivered to a [`Callbacks`] implementation in one of three ways, chosen
//! once through [`DispatchMode`]:
//! - Immediately, on the thread that runs the monitor;
//! - On a fixed pool of worker threads, trading cross-worker ordering for throughput;
//! - On a fixed pool of forked worker processes, which report every handled event back to the
//!   parent so deliveries can still be counted through [`DeliveryStats`];
//!
//!
//! ## Basic example
//!
//! ```no_run
//! use sd_tree_watcher::{CallbackSet, Callbacks, MonitorConfig, RunOptions, TreeMonitor};
//!
//! use std::{path::Path, sync::Arc, time::Duration};
//!
//! struct Printer;
//!
//! impl Callbacks for Printer {
//!     fn create(&self, path: &Path, is_dir: bool) {
//!         println!("create: {} (dir: {is_dir})", path.display());
//!     }
//! }
//!
//! fn main() -> Result<(), sd_tree_watcher::Error> {
//!     let mut monitor = TreeMonitor::new(MonitorConfig::default());
//!     monitor.set_callbacks(CallbackSet::threaded(Arc::new(Printer)))?;
//!     monitor.set_worker_count(2)?;
//!     monitor.start()?;
//!     monitor.add_watched_directory("/tmp")?;
//!
//!     monitor.run(RunOptions::timeout(Duration::from_secs(10)))?;
//!
//!     monitor.stop()
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod dispatch;
mod error;
mod event;
mod monitor;
mod pump;
mod registry;
mod source;
mod translator;

pub use config::MonitorConfig;
pub use dispatch::{CallbackSet, DeliveryStats, DispatchMode, Dispatcher};
pub use error::{Error, FileIOError, Result};
pub use event::{Callbacks, Event, EventKind};
pub use monitor::Monitor;
pub use pump::RunOptions;
pub use registry::WatchRegistry;
pub use source::{EventSource, RawEvent, RawMask};
pub use translator::translate;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use monitor::TreeMonitor;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use source::InotifySource;
