//! Fixed-interval polling of the stats source, fanned out to observers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::shielded;
use crate::scheduler::Scheduler;
use crate::stats::{DeviceStats, DiskStatsSource};

/// Default polling interval for production use.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);

/// Observes snapshots produced by [`DiskStatsMonitor`]. Must not panic.
pub trait DiskStatsObserver {
    fn on_disk_stats_updated(&mut self, snapshot: &[DeviceStats]);
}

/// Polls a [`DiskStatsSource`] on a fixed interval and delivers the identical
/// snapshot to every registered observer in registration order.
///
/// The first poll is scheduled with zero delay, so the initial snapshot is
/// available immediately at startup.
pub struct DiskStatsMonitor {
    scheduler: Scheduler,
    source: Box<dyn DiskStatsSource>,
    interval: Duration,
    observers: Vec<Rc<RefCell<dyn DiskStatsObserver>>>,
}

impl DiskStatsMonitor {
    pub fn new(
        scheduler: &Scheduler,
        source: Box<dyn DiskStatsSource>,
        interval: Duration,
    ) -> Rc<RefCell<Self>> {
        let monitor = Rc::new(RefCell::new(Self {
            scheduler: scheduler.clone(),
            source,
            interval,
            observers: Vec::new(),
        }));
        Self::set_timer(&monitor, Duration::ZERO);
        monitor
    }

    pub fn add_observer(&mut self, observer: Rc<RefCell<dyn DiskStatsObserver>>) {
        self.observers.push(observer);
    }

    fn set_timer(this: &Rc<RefCell<Self>>, delay: Duration) {
        let weak = Rc::downgrade(this);
        let scheduler = this.borrow().scheduler.clone();
        scheduler.set_timer(
            delay,
            Box::new(move || {
                if let Some(monitor) = weak.upgrade() {
                    Self::on_timer(&monitor);
                }
            }),
        );
    }

    fn on_timer(this: &Rc<RefCell<Self>>) {
        // Re-arm before processing so a slow observer cannot delay the next
        // poll and let polling drift compound.
        let interval = this.borrow().interval;
        Self::set_timer(this, interval);

        let snapshot = match this.borrow_mut().source.poll() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::error!("disk stats poll failed: {error}");
                return;
            }
        };

        let observers = this.borrow().observers.clone();
        for observer in &observers {
            shielded("disk stats observer", || {
                observer.borrow_mut().on_disk_stats_updated(&snapshot)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    use crate::stats::DeviceStats;

    /// Source that replays scripted snapshots and stops the scheduler when
    /// the script runs out.
    struct ScriptedSource {
        snapshots: VecDeque<Vec<DeviceStats>>,
        scheduler: Scheduler,
    }

    impl DiskStatsSource for ScriptedSource {
        fn poll(&mut self) -> io::Result<Vec<DeviceStats>> {
            match self.snapshots.pop_front() {
                Some(snapshot) => Ok(snapshot),
                None => {
                    self.scheduler.stop();
                    Ok(Vec::new())
                }
            }
        }
    }

    struct SnapshotRecorder {
        tag: &'static str,
        log: Rc<RefCell<Vec<(&'static str, Vec<DeviceStats>)>>>,
    }

    impl DiskStatsObserver for SnapshotRecorder {
        fn on_disk_stats_updated(&mut self, snapshot: &[DeviceStats]) {
            self.log.borrow_mut().push((self.tag, snapshot.to_vec()));
        }
    }

    fn scripted(scheduler: &Scheduler, snapshots: Vec<Vec<DeviceStats>>) -> Box<ScriptedSource> {
        Box::new(ScriptedSource {
            snapshots: snapshots.into(),
            scheduler: scheduler.clone(),
        })
    }

    #[test]
    fn delivers_snapshots_in_registration_order() {
        let scheduler = Scheduler::new();
        let snapshot = vec![DeviceStats::new("sda", 1, 2)];
        let monitor = DiskStatsMonitor::new(
            &scheduler,
            scripted(&scheduler, vec![snapshot.clone()]),
            Duration::from_millis(1),
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        monitor.borrow_mut().add_observer(Rc::new(RefCell::new(SnapshotRecorder {
            tag: "a",
            log: Rc::clone(&log),
        })));
        monitor.borrow_mut().add_observer(Rc::new(RefCell::new(SnapshotRecorder {
            tag: "b",
            log: Rc::clone(&log),
        })));

        scheduler.run();

        let log = log.borrow();
        // Two polls happen: the scripted one, then the empty stop poll.
        assert_eq!(log.len(), 4);
        assert_eq!(log[0], ("a", snapshot.clone()));
        assert_eq!(log[1], ("b", snapshot.clone()));
        assert!(log[2].1.is_empty());
    }

    #[test]
    fn polls_repeatedly_on_interval() {
        let scheduler = Scheduler::new();
        let snapshots = vec![
            vec![DeviceStats::new("sda", 1, 1)],
            vec![DeviceStats::new("sda", 2, 1)],
            vec![DeviceStats::new("sda", 3, 1)],
        ];
        let monitor = DiskStatsMonitor::new(
            &scheduler,
            scripted(&scheduler, snapshots),
            Duration::from_millis(1),
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        monitor.borrow_mut().add_observer(Rc::new(RefCell::new(SnapshotRecorder {
            tag: "a",
            log: Rc::clone(&log),
        })));

        scheduler.run();

        let reads: Vec<u64> = log
            .borrow()
            .iter()
            .filter(|(_, snapshot)| !snapshot.is_empty())
            .map(|(_, snapshot)| snapshot[0].counters.sectors_read)
            .collect();
        assert_eq!(reads, vec![1, 2, 3]);
    }

    #[test]
    fn panicking_observer_does_not_starve_later_observers() {
        struct PanickingObserver;
        impl DiskStatsObserver for PanickingObserver {
            fn on_disk_stats_updated(&mut self, _snapshot: &[DeviceStats]) {
                panic!("observer bug");
            }
        }

        let scheduler = Scheduler::new();
        let monitor = DiskStatsMonitor::new(
            &scheduler,
            scripted(&scheduler, vec![vec![DeviceStats::new("sda", 1, 1)]]),
            Duration::from_millis(1),
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        monitor
            .borrow_mut()
            .add_observer(Rc::new(RefCell::new(PanickingObserver)));
        monitor.borrow_mut().add_observer(Rc::new(RefCell::new(SnapshotRecorder {
            tag: "survivor",
            log: Rc::clone(&log),
        })));

        scheduler.run();
        assert!(!log.borrow().is_empty());
    }

    #[test]
    fn polling_stops_when_monitor_dropped() {
        let scheduler = Scheduler::new();
        let monitor = DiskStatsMonitor::new(
            &scheduler,
            scripted(&scheduler, vec![vec![]; 100]),
            Duration::from_millis(1),
        );
        drop(monitor);
        // The armed timer upgrades its weak reference, fails, and never
        // re-arms, so the queue drains on its own.
        scheduler.run();
    }
}
