//! Daemon-side glue for spindownd: configuration loading and the service
//! that wires the core event pipeline to configured spin-down policies.

pub mod config;
pub mod service;
