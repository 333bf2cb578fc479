//! Wires the core pipeline to configured profiles.
//!
//! The service listens for disk arrivals, matches each new device against
//! the profile disk patterns, and attaches a spin-down controller whose
//! actuator runs the profile's shell command with `$disk_path` bound to the
//! resolved device path.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

use spindown_core::shell::{self, ShellError};
use spindown_core::{
    DiskActivityMonitor, DiskPresenceMonitor, DiskPresenceObserver, DiskSpinDownController,
    DiskStatsMonitor, DiskStatsSource, Scheduler, create_strategy, filesystem,
};

use crate::config::{Config, Profile};

pub struct DiskMonitoringService {
    scheduler: Scheduler,
    profiles: BTreeMap<String, Profile>,
    activity_monitor: Rc<RefCell<DiskActivityMonitor>>,
    reported_coverage: bool,
    // Keeps the polling chain alive; the scheduler only holds a weak
    // reference to the stats monitor.
    _stats_monitor: Rc<RefCell<DiskStatsMonitor>>,
}

impl DiskMonitoringService {
    /// Build the full pipeline on `scheduler`. Nothing happens until the
    /// caller drives [`Scheduler::run`].
    pub fn new(
        scheduler: &Scheduler,
        config: Config,
        source: Box<dyn DiskStatsSource>,
        polling_interval: Duration,
    ) -> Rc<RefCell<Self>> {
        let stats_monitor = DiskStatsMonitor::new(scheduler, source, polling_interval);
        let presence_monitor = Rc::new(RefCell::new(DiskPresenceMonitor::new()));
        let activity_monitor = Rc::new(RefCell::new(DiskActivityMonitor::new()));

        stats_monitor
            .borrow_mut()
            .add_observer(presence_monitor.clone());
        stats_monitor
            .borrow_mut()
            .add_observer(activity_monitor.clone());

        let service = Rc::new(RefCell::new(Self {
            scheduler: scheduler.clone(),
            profiles: config.profiles,
            activity_monitor: activity_monitor.clone(),
            reported_coverage: false,
            _stats_monitor: stats_monitor,
        }));
        // The service must be notified before the activity monitor so a
        // freshly-attached controller sees the device's first edges.
        presence_monitor.borrow_mut().add_observer(service.clone());
        presence_monitor.borrow_mut().add_observer(activity_monitor);
        service
    }

    fn attach_profiles(&mut self, device_name: &str) {
        let mut matched = false;
        for (profile_name, profile) in &self.profiles {
            let Some(disk_path) = matching_device_path(profile, device_name) else {
                continue;
            };
            matched = true;

            let Some(spin_down) = &profile.spin_down else {
                log::warn!(
                    "profile \"{profile_name}\" matches {disk_path} but has no spin_down policy"
                );
                continue;
            };
            // Configuration was validated at load time.
            let strategy = match create_strategy(&spin_down.when, &spin_down.options) {
                Ok(strategy) => strategy,
                Err(error) => {
                    log::error!("profile \"{profile_name}\": {error}");
                    continue;
                }
            };

            let command = spin_down.command.clone();
            let actuation_path = disk_path.clone();
            let controller = DiskSpinDownController::new(
                device_name.to_string(),
                strategy,
                Box::new(move || run_spin_down_command(&command, &actuation_path)),
                &self.scheduler,
            );
            self.activity_monitor
                .borrow_mut()
                .add_observer(&disk_path, controller);
            log::info!("watching {disk_path} (profile \"{profile_name}\")");
        }
        if !matched {
            log::debug!("no profile covers {device_name}");
        }
    }

    /// One-time report after the first snapshot, when device files for
    /// everything present at boot exist.
    fn report_uncovered_profiles(&mut self) {
        if self.reported_coverage {
            return;
        }
        self.reported_coverage = true;
        for (profile_name, profile) in &self.profiles {
            if filesystem::find_device_paths(&profile.disks).is_empty() {
                log::warn!("profile \"{profile_name}\" matches no devices");
            }
        }
    }
}

impl DiskPresenceObserver for DiskMonitoringService {
    fn on_disks_added(&mut self, device_names: &BTreeSet<String>) {
        for device_name in device_names {
            self.attach_profiles(device_name);
        }
        self.report_uncovered_profiles();
    }

    fn on_disks_removed(&mut self, _device_names: &BTreeSet<String>) {
        // The activity monitor drops controller registrations itself.
    }
}

/// Expand the profile's patterns and return the path resolving to
/// `device_name`, if any.
fn matching_device_path(profile: &Profile, device_name: &str) -> Option<String> {
    filesystem::find_device_paths(&profile.disks)
        .into_iter()
        .find(|path| {
            path.file_name()
                .is_some_and(|name| name.to_str() == Some(device_name))
        })
        .map(|path| path.to_string_lossy().into_owned())
}

fn run_spin_down_command(command: &str, disk_path: &str) {
    let mut env = HashMap::new();
    env.insert("disk_path".to_string(), disk_path.to_string());
    match shell::run(command, &env) {
        Ok(()) => log::debug!("spin down command finished for {disk_path}"),
        Err(error) => {
            log::error!("spin down command for {disk_path} failed: {error}");
            let output = match &error {
                ShellError::Timeout { output } | ShellError::ExitCode { output, .. } => {
                    output.as_str()
                }
                ShellError::Io(_) => "",
            };
            if !output.is_empty() {
                log::error!("command output:\n{}", output.trim_end());
            }
        }
    }
}
