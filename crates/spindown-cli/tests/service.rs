//! End-to-end daemon test: a scripted stats source drives the full service,
//! and the configured shell command actually runs on sustained idle.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use spindown_cli::config::Config;
use spindown_cli::service::DiskMonitoringService;
use spindown_core::{DeviceStats, DiskStatsSource, Scheduler};

/// Replays scripted snapshots at the polling interval, then stops the loop.
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
                Err(io::Error::other("script exhausted"))
            }
        }
    }
}

fn load_config(text: &str) -> Config {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    Config::load(file.path()).unwrap()
}

fn run_service(config: Config, snapshots: Vec<Vec<DeviceStats>>) {
    let scheduler = Scheduler::new();
    let source = Box::new(ScriptedSource {
        snapshots: snapshots.into(),
        scheduler: scheduler.clone(),
    });
    let _service = DiskMonitoringService::new(
        &scheduler,
        config,
        source,
        Duration::from_millis(10),
    );
    scheduler.run();
}

/// `/dev/null` shows up in the scripted snapshots as the device "null", so
/// the profile pattern resolves against a device file that really exists.
fn idle_null_snapshots(count: usize) -> Vec<Vec<DeviceStats>> {
    vec![vec![DeviceStats::new("null", 7, 7)]; count]
}

#[test]
#[cfg(unix)]
fn sustained_idle_runs_the_configured_command() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spun-down");
    let config = load_config(&format!(
        r#"
profiles:
  test-disk:
    disks: ["/dev/null"]
    spin_down:
      when: idle
      options:
        delay: 40ms
      command: printf %s "$disk_path" > '{}'
"#,
        marker.display()
    ));

    // Idle edge at poll 2 (~10ms), actuation at ~50ms, loop ends ~150ms.
    run_service(config, idle_null_snapshots(15));

    let content = std::fs::read_to_string(&marker).expect("command should have run");
    assert_eq!(content, "/dev/null");
}

#[test]
#[cfg(unix)]
fn activity_resets_the_spin_down_delay() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spun-down");
    let config = load_config(&format!(
        r#"
profiles:
  test-disk:
    disks: ["/dev/null"]
    spin_down:
      when: idle
      options:
        delay: 60ms
      command: touch '{}'
"#,
        marker.display()
    ));

    // Idle at poll 2 arms a 60ms timer, but the counters move on poll 4
    // (~30ms), cancelling it before it can fire.
    run_service(
        config,
        vec![
            vec![DeviceStats::new("null", 0, 0)],
            vec![DeviceStats::new("null", 0, 0)],
            vec![DeviceStats::new("null", 0, 0)],
            vec![DeviceStats::new("null", 3, 0)],
        ],
    );

    assert!(!marker.exists());
}

#[test]
#[cfg(unix)]
fn profile_without_spin_down_never_actuates() {
    let config = load_config(
        r#"
profiles:
  watch-only:
    disks: ["/dev/null"]
"#,
    );
    // Must not panic or spawn anything; the disk is just watched.
    run_service(config, idle_null_snapshots(8));
}

#[test]
fn unmatched_devices_are_ignored() {
    let config = load_config(
        r#"
profiles:
  absent:
    disks: ["/dev/no-such-device-*"]
    spin_down:
      when: idle
      options:
        delay: 10ms
      command: "true"
"#,
    );
    run_service(config, idle_null_snapshots(6));
}
