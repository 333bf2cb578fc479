//! Idle/active edge detection per device.
//!
//! A device is idle when both sector counters are unchanged between two
//! consecutive snapshots. Observers are notified only on edges, never on
//! steady-state repetition, and a device's very first sample is always
//! silent (there is no prior state to compare against).

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::rc::Rc;

use crate::error::shielded;
use crate::presence::DiskPresenceObserver;
use crate::stats::{DeviceStats, DiskCounters};
use crate::stats_monitor::DiskStatsObserver;

/// Observes one device's activity edges. Must not panic.
pub trait DiskActivityObserver {
    fn on_disk_active(&mut self);
    fn on_disk_idle(&mut self);
    fn on_disk_removed(&mut self);
}

struct DiskState {
    last_counters: DiskCounters,
    // Defaults to false until a second sample confirms no change.
    is_idle: bool,
}

type ObserverList = Vec<Rc<RefCell<dyn DiskActivityObserver>>>;

/// Tracks per-device idle state across snapshots and dispatches edge
/// notifications to the observers registered for each device.
pub struct DiskActivityMonitor {
    observers: HashMap<String, ObserverList>,
    disk_state: HashMap<String, DiskState>,
}

impl DiskActivityMonitor {
    pub fn new() -> Self {
        Self {
            observers: HashMap::new(),
            disk_state: HashMap::new(),
        }
    }

    /// Register an observer for one device. `disk_path` may be a full device
    /// path (`/dev/sda`); observers are keyed by its basename.
    ///
    /// If the device is already known, the observer is immediately told its
    /// current state, mirroring the presence monitor's late-join contract.
    pub fn add_observer(
        &mut self,
        disk_path: &str,
        observer: Rc<RefCell<dyn DiskActivityObserver>>,
    ) {
        let device_name = device_name_of(disk_path);
        if let Some(state) = self.disk_state.get(&device_name) {
            let is_idle = state.is_idle;
            shielded("disk activity observer", || {
                let mut observer = observer.borrow_mut();
                if is_idle {
                    observer.on_disk_idle();
                } else {
                    observer.on_disk_active();
                }
            });
        }
        self.observers.entry(device_name).or_default().push(observer);
    }
}

impl Default for DiskActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskStatsObserver for DiskActivityMonitor {
    fn on_disk_stats_updated(&mut self, snapshot: &[DeviceStats]) {
        for stat in snapshot {
            let state = match self.disk_state.entry(stat.device_name.clone()) {
                Entry::Vacant(entry) => {
                    // First sighting: record counters, fire no edge.
                    entry.insert(DiskState {
                        last_counters: stat.counters,
                        is_idle: false,
                    });
                    continue;
                }
                Entry::Occupied(entry) => entry.into_mut(),
            };

            let was_idle = state.is_idle;
            let is_idle = state.last_counters == stat.counters;
            state.last_counters = stat.counters;
            state.is_idle = is_idle;
            if was_idle == is_idle {
                continue;
            }

            log::debug!(
                "{} is {}",
                stat.device_name,
                if is_idle { "idle" } else { "active" }
            );
            if let Some(observers) = self.observers.get(&stat.device_name) {
                for observer in observers {
                    shielded("disk activity observer", || {
                        let mut observer = observer.borrow_mut();
                        if is_idle {
                            observer.on_disk_idle();
                        } else {
                            observer.on_disk_active();
                        }
                    });
                }
            }
        }
    }
}

impl DiskPresenceObserver for DiskActivityMonitor {
    fn on_disks_added(&mut self, _device_names: &BTreeSet<String>) {
        // State is created lazily on the first snapshot naming the device.
    }

    fn on_disks_removed(&mut self, device_names: &BTreeSet<String>) {
        for device_name in device_names {
            self.disk_state.remove(device_name);
            if let Some(observers) = self.observers.remove(device_name) {
                for observer in &observers {
                    shielded("disk activity observer", || {
                        observer.borrow_mut().on_disk_removed()
                    });
                }
            }
        }
    }
}

fn device_name_of(disk_path: &str) -> String {
    Path::new(disk_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(disk_path)
        .to_string()
}
