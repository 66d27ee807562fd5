use tracing::{debug, trace, warn};

use super::{
	error::Error,
	event::{Event, EventKind},
	registry::WatchRegistry,
	source::{EventSource, RawEvent, RawMask},
};

/// Mask bits and the event they become, checked in this order so the first match wins.
const CLASSIFICATION: [(RawMask, EventKind); 8] = [
	(RawMask::CREATE, EventKind::Create),
	(RawMask::DELETE, EventKind::Delete),
	(RawMask::CLOSE_WRITE, EventKind::CloseWrite),
	(RawMask::MOVED_FROM, EventKind::MovedFrom),
	(RawMask::MOVED_TO, EventKind::MovedTo),
	(RawMask::MODIFY, EventKind::Modify),
	(RawMask::ATTRIB, EventKind::Attrib),
	(RawMask::UNMOUNT, EventKind::Unmount),
];

fn classify(mask: RawMask) -> Result<Option<EventKind>, Error> {
	if let Some((_, kind)) = CLASSIFICATION.iter().find(|(bit, _)| mask.contains(*bit)) {
		return Ok(Some(*kind));
	}

	if mask.intersects(RawMask::IGNORED | RawMask::Q_OVERFLOW) {
		return Ok(None);
	}

	Err(Error::UnrecognizedEventKind { mask })
}

/// Turns one raw record into at most one path scoped event, handed to `emit`, and keeps the
/// registry in line with the tree: new directories get watched (their existing entries being
/// emitted as well) and deleted, moved away or unmounted ones are dropped with their subtree.
///
/// Late events, on handles no longer registered, are dropped.
pub fn translate<S: EventSource>(
	registry: &mut WatchRegistry<S>,
	raw: RawEvent<S::Handle>,
	mut emit: impl FnMut(Event),
) -> Result<(), Error> {
	let RawEvent { handle, mask, name } = raw;

	// Overflows aren't tied to any watch, so they never resolve
	if mask.contains(RawMask::Q_OVERFLOW) {
		warn!("Raw event queue overflowed, events were probably lost;");
		return Ok(());
	}

	let Some(base) = registry.resolve(&handle) else {
		// Ignored is the expected companion of a watch removal, anything else is late
		if !mask.contains(RawMask::IGNORED) {
			debug!(?handle, ?mask, ?name, "Late event for a watch no longer registered;");
		}
		return Ok(());
	};

	// The source dropped a watch we still hold, as it does once a watched directory is gone
	if mask.contains(RawMask::IGNORED) {
		let base = base.to_path_buf();
		registry.forget_directory(&base);
		let descendants = registry.remove_subtree(&base);
		debug!(?base, descendants, "Watch dropped by the source, forgetting its directory;");
		return Ok(());
	}

	let path = match name {
		Some(name) if !name.is_empty() => base.join(name),
		_ => base.to_path_buf(),
	};

	let Some(kind) = classify(mask)? else {
		trace!(?path, ?mask, "Ignoring raw event");
		return Ok(());
	};

	let is_dir = mask.contains(RawMask::ISDIR);

	trace!(%kind, ?path, is_dir, "Translated raw event");

	emit(Event::new(kind, path.clone(), is_dir));

	match kind {
		// The directory may already hold entries created before its watch was in place
		EventKind::Create if is_dir => {
			registry.add_directory_recursive(&path, true, &mut emit);
		}
		EventKind::Delete | EventKind::MovedFrom if is_dir => {
			registry.remove_subtree(&path);
		}
		EventKind::Unmount if is_dir || registry.contains(&path) => {
			registry.remove_subtree(&path);
		}
		_ => {}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::{super::source::mock::MockSource, *};

	use std::{fs, path::Path};

	use tempfile::{tempdir, TempDir};
	use tracing_test::traced_test;

	struct Fixture {
		dir: TempDir,
		registry: WatchRegistry<MockSource>,
	}

	impl Fixture {
		fn new() -> Self {
			let dir = tempdir().unwrap();
			let mut registry = WatchRegistry::new(MockSource::default());
			assert!(registry.add_directory(dir.path()));

			Self { dir, registry }
		}

		fn root(&self) -> &Path {
			self.dir.path()
		}

		fn handle(&mut self, path: &Path) -> u32 {
			self.registry.source_mut().handle_of(path).unwrap()
		}

		fn translate(
			&mut self,
			handle: u32,
			mask: RawMask,
			name: Option<&str>,
		) -> Result<Vec<Event>, Error> {
			self.registry.source_mut().push(handle, mask, name);

			let pending = self.registry.source_mut().get_events(false).unwrap();

			let mut events = Vec::new();
			for raw in pending {
				translate(&mut self.registry, raw, |event| events.push(event))?;
			}

			Ok(events)
		}
	}

	#[test]
	fn file_events_map_one_to_one() {
		let mut fixture = Fixture::new();
		let root = fixture.root().to_path_buf();
		let handle = fixture.handle(&root);

		for (mask, kind) in [
			(RawMask::CREATE, EventKind::Create),
			(RawMask::MODIFY, EventKind::Modify),
			(RawMask::CLOSE_WRITE, EventKind::CloseWrite),
			(RawMask::ATTRIB, EventKind::Attrib),
			(RawMask::MOVED_FROM, EventKind::MovedFrom),
			(RawMask::MOVED_TO, EventKind::MovedTo),
			(RawMask::DELETE, EventKind::Delete),
		] {
			let events = fixture.translate(handle, mask, Some("file.txt")).unwrap();
			assert_eq!(events, vec![Event::new(kind, root.join("file.txt"), false)]);
		}

		assert_eq!(fixture.registry.len(), 1);
	}

	#[test]
	fn created_directory_is_watched_with_its_content() {
		let mut fixture = Fixture::new();
		let root = fixture.root().to_path_buf();
		let handle = fixture.handle(&root);

		let sub = root.join("sub");
		fs::create_dir(&sub).unwrap();
		fs::write(sub.join("early.txt"), b"already here").unwrap();

		let events = fixture
			.translate(handle, RawMask::CREATE | RawMask::ISDIR, Some("sub"))
			.unwrap();

		assert_eq!(
			events,
			vec![
				Event::new(EventKind::Create, sub.clone(), true),
				Event::new(EventKind::Create, sub.join("early.txt"), false),
				Event::new(EventKind::CloseWrite, sub.join("early.txt"), false),
			]
		);
		assert!(fixture.registry.contains(&sub));

		let sub_handle = fixture.handle(&sub);
		let events = fixture
			.translate(sub_handle, RawMask::CREATE, Some("late.txt"))
			.unwrap();
		assert_eq!(
			events,
			vec![Event::new(EventKind::Create, sub.join("late.txt"), false)]
		);
	}

	#[test]
	fn deleted_or_moved_directories_drop_their_subtree() {
		for mask in [RawMask::DELETE, RawMask::MOVED_FROM] {
			let mut fixture = Fixture::new();
			let root = fixture.root().to_path_buf();
			let handle = fixture.handle(&root);

			let sub = root.join("sub");
			fs::create_dir_all(sub.join("deeper")).unwrap();
			fixture
				.registry
				.add_directory_recursive(&sub, false, &mut |_| {});
			assert_eq!(fixture.registry.len(), 3);

			let events = fixture
				.translate(handle, mask | RawMask::ISDIR, Some("sub"))
				.unwrap();

			assert_eq!(events.len(), 1);
			assert!(events[0].is_dir());
			assert_eq!(
				fixture.registry.paths().collect::<Vec<_>>(),
				vec![root.as_path()]
			);
		}
	}

	#[test]
	fn unmount_of_a_watched_directory_drops_it() {
		let mut fixture = Fixture::new();
		let root = fixture.root().to_path_buf();
		let handle = fixture.handle(&root);

		let events = fixture.translate(handle, RawMask::UNMOUNT, None).unwrap();

		assert_eq!(events, vec![Event::new(EventKind::Unmount, root, false)]);
		assert!(fixture.registry.is_empty());
	}

	#[test]
	#[traced_test]
	fn late_events_are_dropped() {
		let mut fixture = Fixture::new();

		let events = fixture
			.translate(4242, RawMask::CREATE, Some("ghost"))
			.unwrap();

		assert!(events.is_empty());
		assert!(logs_contain("Late event"));
	}

	#[test]
	fn watches_dropped_by_the_source_are_forgotten() {
		let mut fixture = Fixture::new();
		let root = fixture.root().to_path_buf();
		let handle = fixture.handle(&root);

		let sub = root.join("sub");
		fs::create_dir(&sub).unwrap();
		assert!(fixture
			.registry
			.add_directory_recursive(&sub, false, &mut |_| {}));
		assert_eq!(fixture.registry.len(), 2);

		let events = fixture.translate(handle, RawMask::IGNORED, None).unwrap();

		assert!(events.is_empty());
		assert!(fixture.registry.is_empty());
		assert_eq!(fixture.registry.resolve(&handle), None);
		assert!(!fixture.registry.source_mut().is_watching(&sub));

		// Same name, new directory
		assert!(fixture.registry.add_directory(&root));
	}

	#[test]
	#[traced_test]
	fn ignored_and_overflow_produce_nothing() {
		let mut fixture = Fixture::new();

		assert!(fixture
			.translate(4242, RawMask::IGNORED, None)
			.unwrap()
			.is_empty());
		assert!(!logs_contain("Late event"));

		assert!(fixture
			.translate(u32::MAX, RawMask::Q_OVERFLOW, None)
			.unwrap()
			.is_empty());
		assert!(logs_contain("overflowed"));
	}

	#[test]
	fn unrecognized_masks_fail_fast() {
		let mut fixture = Fixture::new();
		let root = fixture.root().to_path_buf();
		let handle = fixture.handle(&root);

		let result = fixture.translate(handle, RawMask::ACCESS, Some("file.txt"));

		assert!(matches!(
			result,
			Err(Error::UnrecognizedEventKind { mask }) if mask == RawMask::ACCESS
		));
	}
}
