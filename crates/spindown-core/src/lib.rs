//! # spindown-core
//!
//! Event pipeline and timer scheduler for the spindown daemon: turns raw,
//! periodically-sampled block-device I/O counters into edge-triggered
//! activity and presence notifications, and schedules delayed spin-down
//! actuation.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler ── fires ──> DiskStatsMonitor ── reads ──> DiskStatsSource
//!                              │ snapshot
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//!        DiskPresenceMonitor ── adds/removes ──> DiskActivityMonitor
//!                                                    │ idle/active edges
//!                                                    ▼
//!                                         DiskSpinDownController ── arms
//!                                         timers that invoke the actuator
//! ```
//!
//! Everything runs on one thread inside [`Scheduler::run`]; callbacks and
//! observer notifications execute synchronously, so the pipeline needs no
//! locking. The only cross-thread surface is the scheduler's stop handle,
//! used for graceful shutdown from a signal handler.

pub mod activity;
pub mod duration;
pub mod error;
pub mod filesystem;
pub mod presence;
pub mod scheduler;
pub mod shell;
pub mod spin_down;
pub mod stats;
pub mod stats_monitor;

pub use activity::{DiskActivityMonitor, DiskActivityObserver};
pub use error::Error;
pub use presence::{DiskPresenceMonitor, DiskPresenceObserver};
pub use scheduler::{Callback, Scheduler, SchedulerStopHandle, TimerId};
pub use shell::ShellError;
pub use spin_down::{
    DiskSpinDownController, SpinDownActuator, SpinDownStrategy, StrategyOptions, create_strategy,
};
pub use stats::{DeviceStats, DiskCounters, DiskStatsSource, ProcDiskStatsSource, parse_diskstats};
pub use stats_monitor::{DEFAULT_POLLING_INTERVAL, DiskStatsMonitor, DiskStatsObserver};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
