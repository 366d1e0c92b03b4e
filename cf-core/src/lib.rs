//! Chassisfan Core Library
//!
//! Control-node access, sensors, thermal policies, redundancy tracking and
//! the platform description used by the `chassisfand` daemon.
//!
//! # Modules
//!
//! - `constants` - magic numbers and default node names
//! - `hw` - control nodes, sensors, actuators, watchdog, airflow detection
//! - `engine` - ramp, PID and level policies, zones and alarms
//! - `redundancy` - fan tray and PSU failure tracking
//! - `config` - platform description and built-in presets
//! - `tuning` - optional tuning file overrides

pub mod config;
pub mod constants;
pub mod engine;
pub mod hw;
pub mod redundancy;
pub mod tuning;

pub use cf_error::{ChassisFanError, Result};

pub use config::{Direction, PlatformConfig, PsuMode};
pub use engine::{AlarmFlags, RampLine, RampPoint, PidGains, LevelTable, ZoneClass};
pub use hw::node::NodeBus;
