//! Tree monitor configuration

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{Error, FileIOError};

/// Smallest read buffer able to hold one inotify event carrying a maximum length name
/// (16 bytes of header + `NAME_MAX` + NUL).
const MIN_EVENT_BUFFER_SIZE: usize = 16 + 255 + 1;

/// Main tree monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
	/// Number of delivery workers used by pooled dispatch modes
	pub workers: usize,

	/// Sleep between two passes of a timed run, in milliseconds
	pub poll_interval_ms: u64,

	/// Size in bytes of the buffer raw events are read into
	pub event_buffer_size: usize,

	/// Whether adding a directory reports the entries it already contains as created
	pub emit_initial_events: bool,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			workers: 1,
			poll_interval_ms: 100,
			event_buffer_size: 4096,
			emit_initial_events: true,
		}
	}
}

impl MonitorConfig {
	pub fn from_json(json: &str) -> Result<Self, Error> {
		serde_json::from_str::<Self>(json)
			.map(Self::sanitized)
			.map_err(Into::into)
	}

	/// Load configuration from a JSON file
	pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
		let path = path.as_ref();

		debug!(?path, "Loading tree monitor config");

		let json = fs::read_to_string(path).map_err(|e| {
			FileIOError::from_std_io_err_with_msg(path, e, "failed to read tree monitor config")
		})?;

		Self::from_json(&json)
	}

	#[must_use]
	pub const fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	fn sanitized(self) -> Self {
		Self {
			workers: self.workers.max(1),
			event_buffer_size: self.event_buffer_size.max(MIN_EVENT_BUFFER_SIZE),
			..self
		}
	}
}
