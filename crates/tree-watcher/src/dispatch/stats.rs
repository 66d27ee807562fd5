use std::{
	fmt,
	sync::atomic::{AtomicU64, Ordering},
};

use super::super::event::EventKind;

/// Per kind count of events handed to the callbacks, shared between the dispatcher and its
/// workers. Process pool deliveries are counted once the worker process acknowledged them.
#[derive(Default)]
pub struct DeliveryStats {
	delivered: [AtomicU64; EventKind::ALL.len()],
}

impl DeliveryStats {
	pub(crate) fn record(&self, kind: EventKind) {
		self.delivered[kind.index()].fetch_add(1, Ordering::Relaxed);
	}

	#[must_use]
	pub fn delivered(&self, kind: EventKind) -> u64 {
		self.delivered[kind.index()].load(Ordering::Relaxed)
	}

	#[must_use]
	pub fn total(&self) -> u64 {
		EventKind::ALL.into_iter().map(|kind| self.delivered(kind)).sum()
	}
}

impl fmt::Debug for DeliveryStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut map = f.debug_map();
		for kind in EventKind::ALL {
			map.entry(&kind.as_str(), &self.delivered(kind));
		}
		map.finish()
	}
}
