use std::collections::HashMap;
use std::rc::Rc;

use tejs_core::{FileStamp, StampSource, StorageEvent};
use tracing::debug;

/// Turns file modification times into storage events by polling.
pub struct StoragePoller {
    stamps: Rc<dyn StampSource>,
    known: HashMap<String, FileStamp>,
}

impl StoragePoller {
    pub fn new(stamps: Rc<dyn StampSource>) -> Self {
        StoragePoller {
            stamps,
            known: HashMap::new(),
        }
    }

    /// Record the current stamps of `identities` without emitting events.
    pub fn prime(&mut self, identities: &[String]) {
        for identity in identities {
            let stamp = self.stamps.stamp(identity);
            self.known.insert(identity.clone(), stamp);
        }
    }

    /// Compare each identity's stamp with the last poll. Identities seen
    /// for the first time are recorded silently.
    pub fn poll(&mut self, identities: &[String]) -> Vec<StorageEvent> {
        let mut events = Vec::new();
        for identity in identities {
            let current = self.stamps.stamp(identity);
            let Some(previous) = self.known.insert(identity.clone(), current) else {
                continue;
            };
            let event = match (previous, current) {
                (FileStamp::Missing, FileStamp::Modified(_)) => StorageEvent::Created(identity.clone()),
                (FileStamp::Modified(_), FileStamp::Missing) => StorageEvent::Deleted(identity.clone()),
                (FileStamp::Modified(before), FileStamp::Modified(now)) if now > before => {
                    StorageEvent::Modified(identity.clone())
                }
                _ => continue,
            };
            debug!(?event, "storage change detected");
            events.push(event);
        }
        self.known.retain(|identity, _| identities.contains(identity));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::cell::RefCell;
    use std::fs;
    use tejs_core::FsStore;

    #[derive(Default)]
    struct FakeStamps(RefCell<HashMap<String, FileStamp>>);

    impl FakeStamps {
        fn set(&self, identity: &str, seconds: i64) {
            let time = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap();
            self.0
                .borrow_mut()
                .insert(identity.to_string(), FileStamp::Modified(time));
        }
    }

    impl StampSource for FakeStamps {
        fn stamp(&self, identity: &str) -> FileStamp {
            self.0.borrow().get(identity).copied().unwrap_or(FileStamp::Missing)
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn newer_stamp_is_a_modification() {
        let stamps = Rc::new(FakeStamps::default());
        stamps.set("a.md", 10);
        let mut poller = StoragePoller::new(stamps.clone());
        let files = names(&["a.md"]);
        poller.prime(&files);
        assert!(poller.poll(&files).is_empty());

        stamps.set("a.md", 20);
        assert_eq!(poller.poll(&files), vec![StorageEvent::Modified("a.md".into())]);
        assert!(poller.poll(&files).is_empty());
    }

    #[test]
    fn first_sighting_is_silent() {
        let stamps = Rc::new(FakeStamps::default());
        stamps.set("new.md", 5);
        let mut poller = StoragePoller::new(stamps);
        assert!(poller.poll(&names(&["new.md"])).is_empty());
    }

    #[test]
    fn creation_and_deletion_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Rc::new(FsStore::new(dir.path()));
        let mut poller = StoragePoller::new(store);
        let files = names(&["s.md"]);
        poller.prime(&files);

        fs::write(dir.path().join("s.md"), "x").unwrap();
        assert_eq!(poller.poll(&files), vec![StorageEvent::Created("s.md".into())]);

        fs::remove_file(dir.path().join("s.md")).unwrap();
        assert_eq!(poller.poll(&files), vec![StorageEvent::Deleted("s.md".into())]);
    }
}
