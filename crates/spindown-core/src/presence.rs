//! Device add/remove detection from consecutive snapshots.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::error::shielded;
use crate::stats::{DeviceStats, DiskCounters};
use crate::stats_monitor::DiskStatsObserver;

/// Observes presence transitions. Must not panic.
pub trait DiskPresenceObserver {
    fn on_disks_added(&mut self, device_names: &BTreeSet<String>);
    fn on_disks_removed(&mut self, device_names: &BTreeSet<String>);
}

/// Derives disk add/remove events by comparing each snapshot against the set
/// of currently-known devices.
///
/// A device whose counters decreased between samples is treated as likely
/// replaced and reported as removed and re-added in the same update.
pub struct DiskPresenceMonitor {
    observers: Vec<Rc<RefCell<dyn DiskPresenceObserver>>>,
    disks: HashMap<String, DiskCounters>,
}

impl DiskPresenceMonitor {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            disks: HashMap::new(),
        }
    }

    /// Register an observer. If devices are already known, the observer is
    /// immediately told about all of them, so late joiners cannot miss
    /// currently-present disks.
    pub fn add_observer(&mut self, observer: Rc<RefCell<dyn DiskPresenceObserver>>) {
        if !self.disks.is_empty() {
            let known: BTreeSet<String> = self.disks.keys().cloned().collect();
            shielded("disk presence observer", || {
                observer.borrow_mut().on_disks_added(&known)
            });
        }
        self.observers.push(observer);
    }

    /// Fast path: most polls change nothing, so bail out before any set
    /// construction unless a device appeared, vanished, or regressed.
    fn has_changes(&self, snapshot: &[DeviceStats]) -> bool {
        let mut seen = 0usize;
        for stat in snapshot {
            seen += 1;
            match self.disks.get(&stat.device_name) {
                Some(previous) if !is_disk_replaced(previous, &stat.counters) => {}
                _ => return true,
            }
        }
        seen != self.disks.len()
    }

    fn apply_changes(&mut self, snapshot: &[DeviceStats]) {
        let previous: BTreeSet<String> = self.disks.keys().cloned().collect();
        let current: BTreeSet<String> = snapshot
            .iter()
            .map(|stat| stat.device_name.clone())
            .collect();
        let replaced: BTreeSet<String> = snapshot
            .iter()
            .filter(|stat| {
                self.disks
                    .get(&stat.device_name)
                    .is_some_and(|prev| is_disk_replaced(prev, &stat.counters))
            })
            .map(|stat| stat.device_name.clone())
            .collect();

        let removed: BTreeSet<String> = previous
            .difference(&current)
            .chain(replaced.iter())
            .cloned()
            .collect();
        let added: BTreeSet<String> = current
            .difference(&previous)
            .chain(replaced.iter())
            .cloned()
            .collect();

        if !removed.is_empty() {
            for device_name in &removed {
                log::info!("{device_name} is offline");
                self.disks.remove(device_name);
            }
            for observer in &self.observers {
                shielded("disk presence observer", || {
                    observer.borrow_mut().on_disks_removed(&removed)
                });
            }
        }
        if !added.is_empty() {
            for device_name in &added {
                log::info!("{device_name} is online");
                // Counters become tracked in update_counters, after the
                // notification round.
            }
            for observer in &self.observers {
                shielded("disk presence observer", || {
                    observer.borrow_mut().on_disks_added(&added)
                });
            }
        }
    }

    fn update_counters(&mut self, snapshot: &[DeviceStats]) {
        for stat in snapshot {
            self.disks.insert(stat.device_name.clone(), stat.counters);
        }
    }
}

impl Default for DiskPresenceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskStatsObserver for DiskPresenceMonitor {
    fn on_disk_stats_updated(&mut self, snapshot: &[DeviceStats]) {
        if self.has_changes(snapshot) {
            self.apply_changes(snapshot);
        }
        self.update_counters(snapshot);
    }
}

/// Counters are integers that can wrap on long-running systems, so this
/// heuristic can produce false positives.
fn is_disk_replaced(previous: &DiskCounters, current: &DiskCounters) -> bool {
    previous.sectors_read > current.sectors_read
        || previous.sectors_written > current.sectors_written
}
