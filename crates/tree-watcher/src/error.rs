use std::{fmt::Display, io, path::Path};

use thiserror::Error;

use super::{dispatch::DispatchMode, source::RawMask};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The raw source produced a mask that none of the known event kinds match. Ignoring it would
	/// let the registry drift away from the real tree, so it aborts the current run.
	#[error("unrecognized raw event kind <mask='{mask:?}'>")]
	UnrecognizedEventKind { mask: RawMask },
	#[error("tree monitor is closed")]
	MonitorClosed,
	#[error("tree monitor was not started")]
	NotStarted,
	#[error("tree monitor is already started")]
	AlreadyStarted,
	#[error("callbacks must be set before starting the tree monitor")]
	MissingCallbacks,

	#[error("failed to initialize raw event source: {0}")]
	SourceInit(#[source] io::Error),
	#[error("raw event source failure: {0}")]
	Source(#[source] io::Error),
	#[error("failed to spawn delivery worker: {0}")]
	WorkerSpawn(#[source] io::Error),
	#[error("dispatch mode <mode='{0}'> is not supported on this platform")]
	UnsupportedMode(DispatchMode),

	#[error("invalid tree monitor configuration: {0}")]
	Config(#[from] serde_json::Error),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<String>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.as_ref()
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl FileIOError {
	pub fn from_std_io_err_with_msg(
		path: impl AsRef<Path>,
		source: io::Error,
		msg: impl Into<String>,
	) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(msg.into()),
		}
	}
}
