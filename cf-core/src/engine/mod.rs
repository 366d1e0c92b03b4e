//! Thermal policy engine
//!
//! Converts each zone's temperature trend into a requested duty and folds
//! the requests into one chassis duty.
//!
//! - `ramp` - two-point line with fall-back hysteresis
//! - `pid` - incremental PID recurrence
//! - `levels` - stepped level table
//! - `psu_curve` - PSU duty when it is not tracking the fans
//! - `policy` - per-zone dispatch and max aggregation
//! - `zone`, `alarm` - zone records and warning thresholds

pub mod alarm;
pub mod levels;
pub mod pid;
pub mod policy;
pub mod psu_curve;
pub mod ramp;
pub mod zone;

pub use alarm::{AlarmEvent, AlarmFlags, AlarmLimits};
pub use levels::{LevelStep, LevelTable};
pub use pid::PidGains;
pub use policy::{aggregate, requested_duty, PolicySet, ZonePolicy};
pub use psu_curve::PsuCurve;
pub use ramp::{RampLine, RampPoint};
pub use zone::{Zone, ZoneClass, ZoneId};
