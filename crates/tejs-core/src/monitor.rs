//! Decides when the rule table must be rebuilt from its backing files.

use crate::storage::{FileStamp, StampSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// When file changes trigger a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPolicy {
    /// Ignore storage events; only forced updates refresh.
    None,
    /// Refresh when a watched file is modified. Edits to the active file
    /// wait until the user leaves it.
    #[default]
    OnModify,
    /// Refresh whenever the user leaves a watched file.
    OnTouch,
}

impl fmt::Display for MonitorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorPolicy::None => "none",
            MonitorPolicy::OnModify => "on_modify",
            MonitorPolicy::OnTouch => "on_touch",
        };
        f.write_str(name)
    }
}

/// Notifications from the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Modified(String),
    Created(String),
    Deleted(String),
    /// The file open in the editor changed. `None` means no file is open.
    ActiveChanged(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredFileRecord {
    pub identity: String,
    pub last_seen: FileStamp,
    /// Position in the watch list; only tracked when order matters.
    pub order: Option<usize>,
}

pub struct FileMonitor {
    records: Vec<MonitoredFileRecord>,
    stamps: Rc<dyn StampSource>,
    on_refresh: Box<dyn FnMut()>,
    on_removed: Box<dyn FnMut(&str)>,
    order_matters: bool,
    policy: MonitorPolicy,
    ready: bool,
    torn_down: bool,
    /// A refresh requested before `layout_ready`; `true` if any was forced.
    pending: Option<bool>,
    active: Option<String>,
    active_dirty: bool,
}

impl FileMonitor {
    pub fn new(
        initial: &[String],
        stamps: Rc<dyn StampSource>,
        on_refresh: impl FnMut() + 'static,
        on_removed: impl FnMut(&str) + 'static,
        order_matters: bool,
    ) -> Self {
        let records = initial
            .iter()
            .enumerate()
            .map(|(index, identity)| MonitoredFileRecord {
                identity: identity.clone(),
                last_seen: FileStamp::Missing,
                order: order_matters.then_some(index),
            })
            .collect();
        FileMonitor {
            records,
            stamps,
            on_refresh: Box::new(on_refresh),
            on_removed: Box::new(on_removed),
            order_matters,
            policy: MonitorPolicy::default(),
            ready: false,
            torn_down: false,
            pending: None,
            active: None,
            active_dirty: false,
        }
    }

    pub fn policy(&self) -> MonitorPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: MonitorPolicy) {
        if self.policy != policy {
            debug!(from = %self.policy, to = %policy, "monitor policy changed");
        }
        self.policy = policy;
        self.active_dirty = false;
    }

    pub fn records(&self) -> &[MonitoredFileRecord] {
        &self.records
    }

    pub fn is_watched(&self, identity: &str) -> bool {
        self.records.iter().any(|r| r.identity == identity)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Replace the watched identities. Additions, removals and reorderings
    /// count as a change; `force` refreshes regardless.
    pub fn update_watch_list(&mut self, identities: &[String], force: bool) {
        if self.torn_down {
            return;
        }
        let mut changed = false;

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|record| identities.contains(&record.identity));
        for record in &removed {
            (self.on_removed)(record.identity.as_str());
            changed = true;
        }

        let old_order: Vec<String> = kept.iter().map(|r| r.identity.clone()).collect();
        let mut kept = kept;
        let mut records: Vec<MonitoredFileRecord> = Vec::with_capacity(identities.len());
        for identity in identities {
            if records.iter().any(|r| &r.identity == identity) {
                continue;
            }
            match kept.iter().position(|r| &r.identity == identity) {
                Some(index) => records.push(kept.swap_remove(index)),
                None => {
                    records.push(MonitoredFileRecord {
                        identity: identity.clone(),
                        last_seen: FileStamp::Missing,
                        order: None,
                    });
                    changed = true;
                }
            }
        }

        if self.order_matters {
            let still_there: Vec<&String> = records
                .iter()
                .map(|r| &r.identity)
                .filter(|id| old_order.contains(*id))
                .collect();
            if still_there.iter().zip(&old_order).any(|(a, b)| *a != b) {
                changed = true;
            }
            for (index, record) in records.iter_mut().enumerate() {
                record.order = Some(index);
            }
        }
        self.records = records;

        if changed || force {
            self.request_refresh(true);
        }
    }

    /// Stop consuming events and drop all records without callbacks.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.records.clear();
        self.pending = None;
        self.active = None;
        self.active_dirty = false;
    }

    /// The host finished starting up. Runs the first stamp pass (forced if
    /// a forced refresh was requested before now). Records start out
    /// `Missing`, so files that exist count as changed on this pass.
    pub fn layout_ready(&mut self) {
        if self.torn_down || self.ready {
            return;
        }
        self.ready = true;
        let forced = self.pending.take().unwrap_or(false);
        self.refresh_now(forced);
    }

    pub fn handle_event(&mut self, event: StorageEvent) {
        if !self.ready || self.torn_down || self.policy == MonitorPolicy::None {
            return;
        }
        trace!(?event, "storage event");
        match event {
            StorageEvent::Modified(identity) => {
                if !self.is_watched(&identity) {
                    return;
                }
                if self.active.as_deref() == Some(identity.as_str()) {
                    self.active_dirty = true;
                } else {
                    self.request_refresh(false);
                }
            }
            StorageEvent::Created(identity) | StorageEvent::Deleted(identity) => {
                if self.is_watched(&identity) {
                    self.request_refresh(false);
                }
            }
            StorageEvent::ActiveChanged(next) => {
                if next == self.active {
                    return;
                }
                let left = std::mem::replace(&mut self.active, next);
                let was_dirty = std::mem::take(&mut self.active_dirty);
                let left_watched = left.as_deref().is_some_and(|id| self.is_watched(id));
                if !left_watched {
                    return;
                }
                match self.policy {
                    MonitorPolicy::OnModify if was_dirty => self.request_refresh(false),
                    MonitorPolicy::OnTouch => self.request_refresh(true),
                    _ => {}
                }
            }
        }
    }

    fn request_refresh(&mut self, force: bool) {
        if !self.ready {
            self.pending = Some(self.pending.unwrap_or(false) || force);
            return;
        }
        self.refresh_now(force);
    }

    fn refresh_now(&mut self, force: bool) {
        // A dirty active file keeps its old stamp until it is left, so
        // leaving it still counts as a change.
        let deferred = match self.policy {
            MonitorPolicy::OnModify if self.active_dirty => self.active.clone(),
            _ => None,
        };
        let mut changed = false;
        for record in &mut self.records {
            if deferred.as_deref() == Some(record.identity.as_str()) {
                continue;
            }
            let current = self.stamps.stamp(&record.identity);
            let updated = match (record.last_seen, current) {
                (FileStamp::Modified(seen), FileStamp::Modified(now)) => now > seen,
                (seen, now) => seen != now,
            };
            if updated {
                debug!(identity = %record.identity, "watched file changed");
                record.last_seen = current;
                changed = true;
            }
        }
        if changed || force {
            (self.on_refresh)();
        }
    }
}

impl fmt::Debug for FileMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMonitor")
            .field("records", &self.records)
            .field("policy", &self.policy)
            .field("ready", &self.ready)
            .field("active", &self.active)
            .field("active_dirty", &self.active_dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeStamps {
        stamps: RefCell<HashMap<String, FileStamp>>,
    }

    impl FakeStamps {
        fn touch(&self, identity: &str, seconds: i64) {
            let time = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap();
            self.stamps
                .borrow_mut()
                .insert(identity.to_string(), FileStamp::Modified(time));
        }
    }

    impl StampSource for FakeStamps {
        fn stamp(&self, identity: &str) -> FileStamp {
            self.stamps
                .borrow()
                .get(identity)
                .copied()
                .unwrap_or(FileStamp::Missing)
        }
    }

    struct Harness {
        monitor: FileMonitor,
        stamps: Rc<FakeStamps>,
        refreshes: Rc<Cell<usize>>,
        removed: Rc<RefCell<Vec<String>>>,
    }

    fn harness(files: &[&str], order_matters: bool) -> Harness {
        let stamps = Rc::new(FakeStamps::default());
        for file in files {
            stamps.touch(file, 100);
        }
        let refreshes = Rc::new(Cell::new(0));
        let removed = Rc::new(RefCell::new(Vec::new()));
        let counter = refreshes.clone();
        let sink = removed.clone();
        let initial: Vec<String> = files.iter().map(|f| f.to_string()).collect();
        let monitor = FileMonitor::new(
            &initial,
            stamps.clone(),
            move || counter.set(counter.get() + 1),
            move |identity| sink.borrow_mut().push(identity.to_string()),
            order_matters,
        );
        Harness {
            monitor,
            stamps,
            refreshes,
            removed,
        }
    }

    fn ready(files: &[&str], policy: MonitorPolicy) -> Harness {
        let mut h = harness(files, false);
        h.monitor.set_policy(policy);
        h.monitor.layout_ready();
        h.refreshes.set(0);
        h
    }

    fn open(h: &mut Harness, identity: &str) {
        h.monitor
            .handle_event(StorageEvent::ActiveChanged(Some(identity.to_string())));
    }

    #[test]
    fn first_pass_after_layout_sees_existing_files() {
        let mut h = harness(&["a.md"], false);
        h.monitor.layout_ready();
        assert_eq!(h.refreshes.get(), 1);
        assert!(h.monitor.records()[0].last_seen.exists());
    }

    #[test]
    fn requests_before_layout_coalesce() {
        let mut h = harness(&[], false);
        h.monitor.update_watch_list(&[], true);
        h.monitor.update_watch_list(&[], true);
        assert_eq!(h.refreshes.get(), 0);
        h.monitor.layout_ready();
        assert_eq!(h.refreshes.get(), 1);
    }

    #[test]
    fn on_modify_defers_edits_to_the_active_file() {
        let mut h = ready(&["a.md", "b.md"], MonitorPolicy::OnModify);
        open(&mut h, "a.md");
        h.stamps.touch("a.md", 200);
        h.monitor.handle_event(StorageEvent::Modified("a.md".into()));
        assert_eq!(h.refreshes.get(), 0);

        open(&mut h, "notes.md");
        assert_eq!(h.refreshes.get(), 1);
    }

    #[test]
    fn on_modify_holds_the_active_stamp_through_other_refreshes() {
        let mut h = ready(&["a.md", "b.md"], MonitorPolicy::OnModify);
        open(&mut h, "a.md");
        h.stamps.touch("a.md", 200);
        h.monitor.handle_event(StorageEvent::Modified("a.md".into()));
        h.stamps.touch("b.md", 200);
        h.monitor.handle_event(StorageEvent::Modified("b.md".into()));
        assert_eq!(h.refreshes.get(), 1);
        assert_ne!(h.monitor.records()[0].last_seen, h.stamps.stamp("a.md"));

        open(&mut h, "b.md");
        assert_eq!(h.refreshes.get(), 2);
        assert_eq!(h.monitor.records()[0].last_seen, h.stamps.stamp("a.md"));
    }

    #[test]
    fn on_modify_refreshes_immediately_for_inactive_files() {
        let mut h = ready(&["a.md", "b.md"], MonitorPolicy::OnModify);
        open(&mut h, "a.md");
        h.stamps.touch("b.md", 200);
        h.monitor.handle_event(StorageEvent::Modified("b.md".into()));
        assert_eq!(h.refreshes.get(), 1);
    }

    #[test]
    fn on_modify_ignores_leaving_an_unmodified_file() {
        let mut h = ready(&["a.md"], MonitorPolicy::OnModify);
        open(&mut h, "a.md");
        open(&mut h, "other.md");
        assert_eq!(h.refreshes.get(), 0);
    }

    #[test]
    fn on_touch_refreshes_when_leaving_an_unmodified_file() {
        let mut h = ready(&["a.md"], MonitorPolicy::OnTouch);
        open(&mut h, "a.md");
        assert_eq!(h.refreshes.get(), 0);
        open(&mut h, "other.md");
        assert_eq!(h.refreshes.get(), 1);
        open(&mut h, "third.md");
        assert_eq!(h.refreshes.get(), 1);
    }

    #[test]
    fn policy_none_ignores_events() {
        let mut h = ready(&["a.md"], MonitorPolicy::None);
        h.stamps.touch("a.md", 300);
        h.monitor.handle_event(StorageEvent::Modified("a.md".into()));
        open(&mut h, "a.md");
        open(&mut h, "b.md");
        assert_eq!(h.refreshes.get(), 0);
        h.monitor.update_watch_list(&["a.md".to_string()], true);
        assert_eq!(h.refreshes.get(), 1);
    }

    #[test]
    fn unchanged_stamps_do_not_refresh() {
        let mut h = ready(&["a.md"], MonitorPolicy::OnModify);
        h.monitor.handle_event(StorageEvent::Modified("a.md".into()));
        assert_eq!(h.refreshes.get(), 0);
        h.monitor.handle_event(StorageEvent::Modified("unwatched.md".into()));
        assert_eq!(h.refreshes.get(), 0);
    }

    #[test]
    fn deletion_and_creation_are_changes() {
        let mut h = ready(&["a.md"], MonitorPolicy::OnModify);
        h.stamps.stamps.borrow_mut().remove("a.md");
        h.monitor.handle_event(StorageEvent::Deleted("a.md".into()));
        assert_eq!(h.refreshes.get(), 1);
        assert_eq!(h.monitor.records()[0].last_seen, FileStamp::Missing);
        h.stamps.touch("a.md", 50);
        h.monitor.handle_event(StorageEvent::Created("a.md".into()));
        assert_eq!(h.refreshes.get(), 2);
    }

    #[test]
    fn watch_list_diff_fires_removals_and_keeps_order_dense() {
        let mut h = harness(&["a.md", "b.md", "c.md"], true);
        h.monitor.layout_ready();
        h.refreshes.set(0);

        let next: Vec<String> = ["c.md", "a.md", "d.md"].iter().map(|s| s.to_string()).collect();
        h.monitor.update_watch_list(&next, false);
        assert_eq!(*h.removed.borrow(), vec!["b.md".to_string()]);
        assert_eq!(h.refreshes.get(), 1);
        let orders: Vec<_> = h
            .monitor
            .records()
            .iter()
            .map(|r| (r.identity.as_str(), r.order))
            .collect();
        assert_eq!(
            orders,
            vec![("c.md", Some(0)), ("a.md", Some(1)), ("d.md", Some(2))]
        );
    }

    #[test]
    fn reordering_counts_as_a_change_only_when_order_matters() {
        let files = ["a.md", "b.md"];
        let swapped: Vec<String> = ["b.md", "a.md"].iter().map(|s| s.to_string()).collect();

        let mut ordered = harness(&files, true);
        ordered.monitor.layout_ready();
        ordered.refreshes.set(0);
        ordered.monitor.update_watch_list(&swapped, false);
        assert_eq!(ordered.refreshes.get(), 1);

        let mut unordered = harness(&files, false);
        unordered.monitor.layout_ready();
        unordered.refreshes.set(0);
        unordered.monitor.update_watch_list(&swapped, false);
        assert_eq!(unordered.refreshes.get(), 0);
        assert!(unordered.monitor.records().iter().all(|r| r.order.is_none()));
    }

    #[test]
    fn teardown_stops_everything() {
        let mut h = ready(&["a.md"], MonitorPolicy::OnTouch);
        h.monitor.teardown();
        open(&mut h, "a.md");
        open(&mut h, "b.md");
        h.monitor.update_watch_list(&["x.md".to_string()], true);
        assert_eq!(h.refreshes.get(), 0);
        assert!(h.removed.borrow().is_empty());
        assert!(h.monitor.records().is_empty());
    }

    #[test]
    fn policy_serialises_in_snake_case() {
        assert_eq!(serde_json::to_string(&MonitorPolicy::OnTouch).unwrap(), "\"on_touch\"");
        let policy: MonitorPolicy = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(policy, MonitorPolicy::None);
    }
}
