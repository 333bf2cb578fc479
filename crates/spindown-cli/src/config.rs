//! YAML configuration: named profiles mapping disk path patterns to a
//! spin-down policy.
//!
//! ```yaml
//! profiles:
//!   usb-backup:
//!     disks:
//!       - /dev/disk/by-label/backup*
//!     spin_down:
//!       when: idle
//!       options:
//!         delay: 10m
//!       command: hdparm -y $disk_path
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use spindown_core::{Error, StrategyOptions, create_strategy};

/// Default locations probed when no `--config` is given.
pub const CONFIG_LOCATIONS: &[&str] = &["/etc/spindown.yml", "/etc/spindown.yaml"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Profiles are keyed by a free-form name used only in log output.
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Glob patterns for the device files this profile covers.
    pub disks: Vec<String>,
    pub spin_down: Option<SpinDownConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpinDownConfig {
    /// Strategy name, e.g. `idle`.
    pub when: String,
    #[serde(default)]
    pub options: StrategyOptions,
    /// Shell command run on actuation; `$disk_path` holds the device path.
    pub command: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|error| {
            Error::Configuration(format!("cannot read {}: {error}", path.display()))
        })?;
        let config: Config = serde_yaml::from_str(&text).map_err(|error| {
            Error::Configuration(format!("cannot parse {}: {error}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject broken strategy configuration at startup instead of when the
    /// disk first appears.
    fn validate(&self) -> Result<(), Error> {
        for (name, profile) in &self.profiles {
            if let Some(spin_down) = &profile.spin_down {
                create_strategy(&spin_down.when, &spin_down.options).map_err(|error| {
                    Error::Configuration(format!("profile \"{name}\": {error}"))
                })?;
            }
        }
        Ok(())
    }
}

/// Pick the config file to load: an explicit path wins, otherwise the first
/// existing default location.
pub fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf, Error> {
    if let Some(path) = explicit {
        if !Path::new(path).exists() {
            return Err(Error::Usage(format!("configuration file {path} does not exist")));
        }
        return Ok(PathBuf::from(path));
    }
    for location in CONFIG_LOCATIONS {
        let path = Path::new(location);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }
    Err(Error::Configuration(format!(
        "no configuration file found (looked at {})",
        CONFIG_LOCATIONS.join(", ")
    )))
}
