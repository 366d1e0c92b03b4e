//! Zones: a sensor bound to a policy class for one airflow direction

use serde::{Deserialize, Serialize};

use crate::config::{Direction, ZoneConfig};
use crate::engine::alarm::{AlarmEvent, AlarmFlags, AlarmLimits, AlarmState};
use crate::hw::sensor::SensorId;

/// Stable index of a zone in the platform's zone list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub usize);

/// Which policy turns the zone's temperature into a duty request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneClass {
    /// Ramp line of the active policy set
    RampCritical,
    /// The sensor's PID gains
    Pid,
    /// Level table of the active policy set
    Levels,
    /// Neither sampled nor alarmed
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub config: ZoneConfig,
    pub alarm: AlarmState,
}

impl Zone {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            alarm: AlarmState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn sensor(&self) -> SensorId {
        self.config.sensor
    }

    pub fn class(&self) -> ZoneClass {
        self.config.class
    }

    /// Zone takes part in cycles for this airflow direction
    pub fn is_active(&self, direction: Direction) -> bool {
        self.config.direction == direction && self.config.class != ZoneClass::Disabled
    }

    pub fn has_thresholds(&self) -> bool {
        self.config.low_warn.is_some() || self.config.high_warn.is_some()
    }

    pub fn evaluate_alarm(&mut self, temp: i32, limits: &AlarmLimits) -> Vec<AlarmEvent> {
        self.alarm
            .evaluate(temp, self.config.low_warn, self.config.high_warn, limits)
    }

    pub fn alarms(&self) -> AlarmFlags {
        self.alarm.flags
    }
}
