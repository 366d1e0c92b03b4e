//! Chassis watchdog
//!
//! Two independent timers guard the daemon: the fan CPLD's own watchdog,
//! armed through sysfs, and the kernel watchdog device. The device is never
//! closed with the magic character, so a daemon that dies stops kicking and
//! the hardware takes over. Every failure here is logged, never fatal.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::hw::node::NodeBus;
use crate::{ChassisFanError, Result};

fn open_device(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ChassisFanError::Watchdog(format!("cannot open {}: {}", path.display(), e)))
}

pub struct Watchdog {
    device: Option<File>,
    kicks: u64,
}

impl Watchdog {
    /// Arm the CPLD timer and open the watchdog device
    pub fn start(config: &WatchdogConfig, bus: &NodeBus) -> Self {
        if let Some(node) = &config.enable_node {
            match bus.write_int(node, 1) {
                Ok(()) => info!(node = %node.display(), "WATCHDOG: fan CPLD watchdog enabled"),
                Err(e) => warn!(error = %e, "WATCHDOG: failed to enable fan CPLD watchdog"),
            }
        }
        if let Some(node) = &config.timeout_node {
            if let Err(e) = bus.write_int(node, config.timeout_secs) {
                warn!(error = %e, "WATCHDOG: failed to set fan CPLD watchdog timeout");
            }
        }

        let device = config.device.as_ref().and_then(|path| {
            match open_device(path) {
                Ok(file) => {
                    info!(device = %path.display(), "WATCHDOG: device opened");
                    Some(file)
                }
                Err(e) => {
                    warn!(device = %path.display(), error = %e, "WATCHDOG: device unavailable, running without it");
                    None
                }
            }
        });

        Self { device, kicks: 0 }
    }

    pub fn is_armed(&self) -> bool {
        self.device.is_some()
    }

    pub fn kicks(&self) -> u64 {
        self.kicks
    }

    /// Restart the countdown; call once per healthy cycle
    pub fn kick(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        match device.write_all(b"k").and_then(|()| device.flush()) {
            Ok(()) => {
                self.kicks += 1;
            }
            Err(e) => debug!(error = %e, "WATCHDOG: kick failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_start_arms_cpld_and_kicks_device() {
        let dir = TempDir::new().unwrap();
        let enable = dir.path().join("wdt_en");
        let timeout = dir.path().join("wdt_time");
        let device = dir.path().join("watchdog");
        for p in [&enable, &timeout, &device] {
            fs::write(p, "").unwrap();
        }
        let config = WatchdogConfig {
            enable_node: Some(enable.clone()),
            timeout_node: Some(timeout.clone()),
            device: Some(device.clone()),
            timeout_secs: 60,
        };

        let mut wd = Watchdog::start(&config, &NodeBus::immediate());
        assert!(wd.is_armed());
        wd.kick();
        wd.kick();

        assert_eq!(fs::read_to_string(&enable).unwrap().trim(), "1");
        assert_eq!(fs::read_to_string(&timeout).unwrap().trim(), "60");
        assert_eq!(wd.kicks(), 2);
        assert!(!fs::read_to_string(&device).unwrap().contains('V'));
    }

    #[test]
    fn test_missing_nodes_are_not_fatal() {
        let dir = TempDir::new().unwrap();
        let config = WatchdogConfig {
            enable_node: Some(dir.path().join("missing_en")),
            timeout_node: None,
            device: Some(dir.path().join("missing_dev")),
            timeout_secs: 60,
        };

        let mut wd = Watchdog::start(&config, &NodeBus::immediate());
        assert!(!wd.is_armed());
        wd.kick();
        assert_eq!(wd.kicks(), 0);
    }
}
