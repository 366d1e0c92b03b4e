//! Sensor model
//!
//! A sensor is one temperature control node plus what the policies need
//! from it: the last three readings, a consecutive-failure counter and the
//! duty that was actually applied last cycle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::SensorConfig;
use crate::constants::temperature::MILLIDEGREE_DIVISOR;
use crate::hw::node::{NodeBus, PathCache};
use crate::{ChassisFanError, Result};

/// Stable index of a sensor in the platform's sensor list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub usize);

/// The three most recent readings in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Samples {
    pub now: i32,
    pub prev: i32,
    pub prev2: i32,
}

impl Samples {
    /// History after the first good reading: no trend yet
    pub fn seeded(temp: i32) -> Self {
        Self { now: temp, prev: temp, prev2: temp }
    }

    pub fn push(&mut self, temp: i32) {
        self.prev2 = self.prev;
        self.prev = self.now;
        self.now = temp;
    }

    pub fn rising(&self) -> bool {
        self.now > self.prev
    }
}

/// What one sampling attempt did to the sensor's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEvent {
    /// Good reading, sensor was healthy
    Fresh(i32),
    /// Good reading after `after` failed ones
    Recovered { temp: i32, after: u8 },
    /// First failed read
    Lost,
    /// Failure counter just reached its ceiling
    TimedOut,
    /// Another failed read, nothing new to report
    StillLost,
}

impl SampleEvent {
    pub fn temperature(&self) -> Option<i32> {
        match *self {
            Self::Fresh(temp) | Self::Recovered { temp, .. } => Some(temp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sensor {
    pub config: SensorConfig,
    cache: PathCache,
    samples: Option<Samples>,
    error_count: u8,
    error_max: u8,
    /// Duty applied in the previous cycle; anchor of the PID recurrence
    pub last_output: u8,
}

impl Sensor {
    pub fn new(config: SensorConfig, error_max: u8) -> Self {
        Self {
            config,
            cache: PathCache::new(),
            samples: None,
            error_count: 0,
            error_max: error_max.max(1),
            last_output: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Path in use, once resolved
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.cache.cached().map(|p| p.to_path_buf())
    }

    /// Read the node and convert millidegrees to whole degrees
    ///
    /// Values outside the `i16` range of degrees are garbage and fail as
    /// a parse error.
    pub fn read_celsius(&mut self, bus: &NodeBus) -> Result<i32> {
        let path = self.cache.resolve(&self.config.prefix, &self.config.suffix, self.config.strategy)?;
        let millidegrees = bus.read_int(&path)?;
        i16::try_from(millidegrees / MILLIDEGREE_DIVISOR)
            .map(i32::from)
            .map_err(|_| ChassisFanError::NodeParse {
                path,
                raw: millidegrees.to_string(),
            })
    }

    /// Read once and fold the result into history and the failure counter
    ///
    /// `correction` is the zone's calibration offset, added to good readings.
    pub fn sample(&mut self, bus: &NodeBus, correction: i32) -> SampleEvent {
        match self.read_celsius(bus) {
            Ok(raw) => self.record(raw.saturating_add(correction)),
            Err(_) => self.record_failure(),
        }
    }

    fn record(&mut self, temp: i32) -> SampleEvent {
        match self.samples.as_mut() {
            Some(samples) => samples.push(temp),
            None => self.samples = Some(Samples::seeded(temp)),
        }
        let after = std::mem::take(&mut self.error_count);
        if after > 0 {
            SampleEvent::Recovered { temp, after }
        } else {
            SampleEvent::Fresh(temp)
        }
    }

    fn record_failure(&mut self) -> SampleEvent {
        if self.error_count >= self.error_max {
            return SampleEvent::StillLost;
        }
        self.error_count += 1;
        if self.error_count == self.error_max {
            SampleEvent::TimedOut
        } else if self.error_count == 1 {
            SampleEvent::Lost
        } else {
            SampleEvent::StillLost
        }
    }

    pub fn samples(&self) -> Option<&Samples> {
        self.samples.as_ref()
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    /// Failure counter is at its ceiling
    pub fn timed_out(&self) -> bool {
        self.error_count >= self.error_max
    }

    /// Current temperature, only while the sensor is healthy
    pub fn temperature(&self) -> Option<i32> {
        if self.error_count > 0 {
            return None;
        }
        self.samples.map(|s| s.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::node::ReadStrategy;
    use crate::engine::PidGains;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn sensor_at(dir: &Path, strategy: ReadStrategy) -> Sensor {
        Sensor::new(
            SensorConfig {
                name: "inlet".into(),
                prefix: dir.to_path_buf(),
                suffix: "temp1_input".into(),
                strategy,
                pid: PidGains::default(),
            },
            3,
        )
    }

    #[test]
    fn test_sample_divides_millidegrees_and_applies_correction() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("temp1_input"), "41500\n").unwrap();
        let mut sensor = sensor_at(dir.path(), ReadStrategy::Direct);

        assert_eq!(sensor.sample(&NodeBus::immediate(), -2), SampleEvent::Fresh(39));
        assert_eq!(sensor.samples(), Some(&Samples::seeded(39)));
    }

    #[test]
    fn test_out_of_range_reading_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let node = dir.path().join("temp1_input");
        let bus = NodeBus::immediate();
        let mut sensor = sensor_at(dir.path(), ReadStrategy::Direct);

        fs::write(&node, "9000000000000").unwrap();
        assert!(matches!(sensor.read_celsius(&bus), Err(ChassisFanError::NodeParse { .. })));
        assert_eq!(sensor.sample(&bus, 0), SampleEvent::Lost);

        fs::write(&node, "32767999").unwrap();
        assert_eq!(sensor.sample(&bus, i32::MAX), SampleEvent::Recovered { temp: i32::MAX, after: 1 });
    }

    #[test]
    fn test_history_shifts() {
        let dir = TempDir::new().unwrap();
        let node = dir.path().join("temp1_input");
        let bus = NodeBus::immediate();
        let mut sensor = sensor_at(dir.path(), ReadStrategy::Direct);

        for milli in ["30000", "32000", "31000"] {
            fs::write(&node, milli).unwrap();
            sensor.sample(&bus, 0);
        }
        assert_eq!(sensor.samples(), Some(&Samples { now: 31, prev: 32, prev2: 30 }));
        assert!(!sensor.samples().unwrap().rising());
    }

    #[test]
    fn test_failure_counter_saturates_and_reports_once() {
        let dir = TempDir::new().unwrap();
        let bus = NodeBus::immediate();
        let mut sensor = sensor_at(dir.path(), ReadStrategy::Direct);

        let events: Vec<_> = (0..6).map(|_| sensor.sample(&bus, 0)).collect();
        assert_eq!(
            events,
            vec![
                SampleEvent::Lost,
                SampleEvent::StillLost,
                SampleEvent::TimedOut,
                SampleEvent::StillLost,
                SampleEvent::StillLost,
                SampleEvent::StillLost,
            ]
        );
        assert_eq!(sensor.error_count(), 3);
        assert!(sensor.timed_out());

        fs::write(dir.path().join("temp1_input"), "25000").unwrap();
        assert_eq!(sensor.sample(&bus, 0), SampleEvent::Recovered { temp: 25, after: 3 });
        assert_eq!(sensor.error_count(), 0);
        assert_eq!(sensor.temperature(), Some(25));
    }

    #[test]
    fn test_probed_sensor_resolves_hwmon() {
        let dir = TempDir::new().unwrap();
        let hwmon = dir.path().join("hwmon/hwmon4");
        fs::create_dir_all(&hwmon).unwrap();
        fs::write(hwmon.join("temp1_input"), "27000").unwrap();
        let mut sensor = sensor_at(dir.path(), ReadStrategy::Probed);

        assert_eq!(sensor.sample(&NodeBus::immediate(), 0).temperature(), Some(27));
        assert_eq!(sensor.resolved_path(), Some(hwmon.join("temp1_input")));
    }
}
