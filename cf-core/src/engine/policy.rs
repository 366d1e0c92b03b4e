//! Per-zone policy dispatch and chassis-wide aggregation

use serde::{Deserialize, Serialize};

use crate::constants::duty;
use crate::engine::levels::LevelTable;
use crate::engine::pid::PidGains;
use crate::engine::ramp::RampLine;
use crate::engine::zone::ZoneClass;
use crate::hw::sensor::{Samples, Sensor};

/// Policies in force for one airflow direction and failure state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    pub line: RampLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<LevelTable>,
}

/// The policy a zone runs this cycle
#[derive(Debug, Clone, Copy)]
pub enum ZonePolicy<'a> {
    Ramp(&'a RampLine),
    Pid(&'a PidGains),
    Levels(&'a LevelTable),
}

impl<'a> ZonePolicy<'a> {
    /// None for disabled zones, untuned PID gains, or a set without levels
    pub fn select(class: ZoneClass, set: &'a PolicySet, gains: &'a PidGains) -> Option<Self> {
        match class {
            ZoneClass::RampCritical => Some(Self::Ramp(&set.line)),
            ZoneClass::Pid if gains.is_untuned() => None,
            ZoneClass::Pid => Some(Self::Pid(gains)),
            ZoneClass::Levels => set.levels.as_ref().map(Self::Levels),
            ZoneClass::Disabled => None,
        }
    }

    pub fn speed(&self, samples: &Samples, prev_duty: u8) -> u8 {
        match self {
            Self::Ramp(line) => line.speed(samples, prev_duty),
            Self::Pid(gains) => gains.output(prev_duty, samples),
            Self::Levels(table) => table.speed(samples, prev_duty),
        }
    }
}

/// Duty a zone asks for, given the duty applied last cycle
///
/// A lost sensor holds `commanded` until its failure counter reaches the
/// ceiling, then asks for full speed.
pub fn requested_duty(sensor: &mut Sensor, policy: ZonePolicy<'_>, commanded: u8) -> u8 {
    sensor.last_output = commanded;
    if sensor.timed_out() {
        return duty::MAX;
    }
    if sensor.error_count() > 0 {
        return commanded;
    }
    match sensor.samples() {
        Some(samples) => policy.speed(samples, sensor.last_output),
        None => commanded,
    }
}

/// Any hot zone dominates: the chassis duty is the largest request
pub fn aggregate<I: IntoIterator<Item = u8>>(requests: I) -> Option<u8> {
    requests.into_iter().max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::engine::ramp::RampPoint;
    use crate::hw::node::{NodeBus, ReadStrategy};
    use std::fs;
    use tempfile::TempDir;

    fn set() -> PolicySet {
        PolicySet {
            line: RampLine::new(RampPoint::new(25, 115), RampPoint::new(40, 255)).with_hysteresis(2),
            levels: None,
        }
    }

    fn sensor(dir: &TempDir, error_max: u8) -> Sensor {
        Sensor::new(
            SensorConfig {
                name: "u10".into(),
                prefix: dir.path().to_path_buf(),
                suffix: "temp1_input".into(),
                strategy: ReadStrategy::Direct,
                pid: PidGains::default(),
            },
            error_max,
        )
    }

    #[test]
    fn test_select_by_class() {
        let set = set();
        let untuned = PidGains::default();
        let tuned = PidGains { kp: 1.0, ..PidGains::default() };

        assert!(matches!(ZonePolicy::select(ZoneClass::RampCritical, &set, &untuned), Some(ZonePolicy::Ramp(_))));
        assert!(ZonePolicy::select(ZoneClass::Pid, &set, &untuned).is_none());
        assert!(matches!(ZonePolicy::select(ZoneClass::Pid, &set, &tuned), Some(ZonePolicy::Pid(_))));
        assert!(ZonePolicy::select(ZoneClass::Levels, &set, &tuned).is_none());
        assert!(ZonePolicy::select(ZoneClass::Disabled, &set, &tuned).is_none());
    }

    #[test]
    fn test_lost_sensor_holds_then_forces_max() {
        let dir = TempDir::new().unwrap();
        let node = dir.path().join("temp1_input");
        fs::write(&node, "30000").unwrap();
        let bus = NodeBus::immediate();
        let set = set();
        let gains = PidGains::default();
        let policy = ZonePolicy::select(ZoneClass::RampCritical, &set, &gains).unwrap();
        let mut s = sensor(&dir, 3);

        s.sample(&bus, 0);
        let mut duty = requested_duty(&mut s, policy, 150);

        fs::remove_file(&node).unwrap();
        let mut held = Vec::new();
        for _ in 0..3 {
            s.sample(&bus, 0);
            duty = requested_duty(&mut s, policy, duty);
            held.push(duty);
        }
        assert_eq!(held[0], held[1]);
        assert_eq!(held[2], duty::MAX);
        assert_eq!(s.last_output, held[1]);
    }

    #[test]
    fn test_aggregate_is_max() {
        assert_eq!(aggregate([120, 200, 150]), Some(200));
        assert_eq!(aggregate(std::iter::empty()), None);
    }
}
