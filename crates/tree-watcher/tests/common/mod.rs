#![allow(dead_code)]

pub mod callbacks;

use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Upper bound for waiting on kernel events, generous so loaded machines don't flake.
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Extra polling done after the expected events arrived, to catch surplus ones.
pub const SETTLE: Duration = Duration::from_millis(300);

pub fn init_tracing() {
	// Every test of the binary calls this, only the first one gets to install the subscriber
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}
