//! Optional tuning file
//!
//! Line-oriented overrides read once at startup:
//!
//! ```text
//! # comment
//! [PID enable]
//! PID_enable=1
//!
//! [BCM56980_inlet]
//! setpoint=95
//! P=3
//! I=0.5
//! D=0.3
//! min_output=115
//! max_output=255
//!
//! [Inlet control]
//! level1_temp=20
//! level1_pwm=110
//! ```
//!
//! Any other section names a zone; its values go to the zone's sensor.
//! A missing file is not an error.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Direction, PlatformConfig};
use crate::{ChassisFanError, Result};

const PID_ENABLE_SECTION: &str = "PID enable";
const INLET_SECTION: &str = "Inlet control";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidOverride {
    pub setpoint: Option<f64>,
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    pub min_output: Option<f64>,
    pub max_output: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelOverride {
    pub temp: Option<i32>,
    pub duty: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuning {
    pub pid_enabled: Option<bool>,
    pub zones: BTreeMap<String, PidOverride>,
    /// Keyed by 1-based level number
    pub inlet_levels: BTreeMap<usize, LevelOverride>,
}

enum Section {
    PidEnable,
    Inlet,
    Zone(String),
}

fn bad(line: usize, reason: impl Into<String>) -> ChassisFanError {
    ChassisFanError::TuningParse {
        line,
        reason: reason.into(),
    }
}

fn number<T: std::str::FromStr>(line: usize, key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| bad(line, format!("{} has non-numeric value {:?}", key, value)))
}

fn real(line: usize, key: &str, value: &str) -> Result<f64> {
    let v: f64 = number(line, key, value)?;
    if !v.is_finite() {
        return Err(bad(line, format!("{} must be a finite number, got {:?}", key, value)));
    }
    Ok(v)
}

impl Tuning {
    pub fn parse(text: &str) -> Result<Self> {
        let level_key = Regex::new(r"^level(\d+)_(temp|pwm)$")
            .map_err(|e| ChassisFanError::generic(format!("bad level pattern: {}", e)))?;
        let mut tuning = Tuning::default();
        let mut section: Option<Section> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .ok_or_else(|| bad(line_no, "unterminated section header"))?
                    .trim();
                section = Some(match name {
                    PID_ENABLE_SECTION => Section::PidEnable,
                    INLET_SECTION => Section::Inlet,
                    zone => Section::Zone(zone.to_string()),
                });
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| bad(line_no, "expected key=value"))?;

            match section.as_ref() {
                None => return Err(bad(line_no, "value outside of any section")),
                Some(Section::PidEnable) => match key {
                    "PID_enable" => tuning.pid_enabled = Some(number::<i64>(line_no, key, value)? != 0),
                    _ => warn!(line = line_no, key, "TUNING: unknown key in [PID enable]"),
                },
                Some(Section::Inlet) => {
                    let Some(caps) = level_key.captures(key) else {
                        warn!(line = line_no, key, "TUNING: unknown key in [Inlet control]");
                        continue;
                    };
                    let level: usize = number(line_no, key, &caps[1])?;
                    let entry = tuning.inlet_levels.entry(level).or_default();
                    if &caps[2] == "temp" {
                        entry.temp = Some(number(line_no, key, value)?);
                    } else {
                        entry.duty = Some(number(line_no, key, value)?);
                    }
                }
                Some(Section::Zone(zone)) => {
                    let entry = tuning.zones.entry(zone.clone()).or_default();
                    let slot = match key {
                        "setpoint" => &mut entry.setpoint,
                        "P" => &mut entry.kp,
                        "I" => &mut entry.ki,
                        "D" => &mut entry.kd,
                        "min_output" => &mut entry.min_output,
                        "max_output" => &mut entry.max_output,
                        _ => {
                            warn!(line = line_no, zone = %zone, key, "TUNING: unknown key");
                            continue;
                        }
                    };
                    *slot = Some(real(line_no, key, value)?);
                }
            }
        }

        Ok(tuning)
    }

    /// Read a tuning file; `Ok(None)` when it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ChassisFanError::NodeRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply overrides; the configuration is left untouched if the result
    /// does not validate
    pub fn apply(&self, config: &mut PlatformConfig, direction: Direction) -> Result<()> {
        let mut next = config.clone();

        if let Some(enabled) = self.pid_enabled {
            next.pid_enabled = enabled;
        }

        for (name, o) in &self.zones {
            let sensors: Vec<usize> = next
                .zones
                .iter()
                .filter(|z| &z.name == name)
                .map(|z| z.sensor.0)
                .collect();
            if sensors.is_empty() {
                warn!(zone = %name, "TUNING: section names no known zone");
                continue;
            }
            for idx in sensors {
                let Some(sensor) = next.sensors.get_mut(idx) else {
                    continue;
                };
                let pid = &mut sensor.pid;
                let fields = [
                    (&mut pid.setpoint, o.setpoint),
                    (&mut pid.kp, o.kp),
                    (&mut pid.ki, o.ki),
                    (&mut pid.kd, o.kd),
                    (&mut pid.min_output, o.min_output),
                    (&mut pid.max_output, o.max_output),
                ];
                for (slot, value) in fields {
                    if let Some(v) = value {
                        *slot = v;
                    }
                }
                debug!(zone = %name, sensor = %sensor.name, pid = ?sensor.pid, "TUNING: PID gains applied");
            }
        }

        if !self.inlet_levels.is_empty() {
            match next.policies.pair_mut(direction).normal.levels.as_mut() {
                Some(table) => {
                    for (&level, o) in &self.inlet_levels {
                        if !table.set_level(level, o.temp, o.duty) {
                            warn!(level, "TUNING: no such level in the inlet table");
                        }
                    }
                }
                None => warn!(%direction, "TUNING: [Inlet control] given but the platform has no level table"),
            }
        }

        next.validate()?;
        *config = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# tuned on the bench
[PID enable]
PID_enable=1

[BCM56980_inlet]
setpoint=95
P=3
I=0.5
D=0.3
min_output=115
max_output=255

[Inlet control]
level1_temp=5
level1_pwm=110
level3_pwm=160
";

    #[test]
    fn test_parse_sections() {
        let t = Tuning::parse(SAMPLE).unwrap();
        assert_eq!(t.pid_enabled, Some(true));

        let bcm = &t.zones["BCM56980_inlet"];
        assert_eq!(bcm.setpoint, Some(95.0));
        assert_eq!(bcm.kd, Some(0.3));
        assert_eq!(bcm.max_output, Some(255.0));

        assert_eq!(t.inlet_levels[&1], LevelOverride { temp: Some(5), duty: Some(110) });
        assert_eq!(t.inlet_levels[&3], LevelOverride { temp: None, duty: Some(160) });
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = Tuning::parse("[cpu_inlet]\nP=fast\n").unwrap_err();
        assert!(matches!(err, ChassisFanError::TuningParse { line: 2, .. }));

        let err = Tuning::parse("P=1\n").unwrap_err();
        assert!(matches!(err, ChassisFanError::TuningParse { line: 1, .. }));

        assert!(Tuning::parse("[PID enable\n").is_err());

        for value in ["nan", "inf", "-infinity"] {
            let text = format!("[BCM56980_inlet]\nsetpoint=95\nmin_output={}\n", value);
            let err = Tuning::parse(&text).unwrap_err();
            assert!(matches!(err, ChassisFanError::TuningParse { line: 3, .. }));
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Tuning::load(&dir.path().join("pid_config_v2.ini")).unwrap(), None);
    }

    #[test]
    fn test_apply_reaches_shared_sensor() {
        let mut config = PlatformConfig::phalanx_v2();
        Tuning::parse(SAMPLE).unwrap().apply(&mut config, Direction::F2b).unwrap();

        // Both directions' BCM zones read switchboard_onboard_u148
        let pid = config.sensors[2].pid;
        assert_eq!(pid.setpoint, 95.0);
        assert_eq!(pid.kp, 3.0);
        assert!(config.pid_enabled);
    }

    #[test]
    fn test_apply_levels_to_v1() {
        let mut config = PlatformConfig::phalanx_v1();
        Tuning::parse(SAMPLE).unwrap().apply(&mut config, Direction::F2b).unwrap();

        let levels = config.policies.f2b.normal.levels.as_ref().unwrap();
        assert_eq!(levels.steps[0].temp, 5);
        assert_eq!(levels.steps[0].duty, 110);
        assert_eq!(levels.steps[2].duty, 160);
        // Other direction untouched
        assert_eq!(config.policies.b2f.normal.levels.as_ref().unwrap().steps[0].duty, 102);
    }

    #[test]
    fn test_apply_rejects_output_range_outside_duty_scale() {
        let mut config = PlatformConfig::phalanx_v2();
        let before = config.clone();
        let t = Tuning::parse("[BCM56980_inlet]\nmin_output=100\nmax_output=300\n").unwrap();

        assert!(t.apply(&mut config, Direction::F2b).is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn test_apply_rejects_disordered_levels() {
        let mut config = PlatformConfig::phalanx_v1();
        let before = config.clone();
        let t = Tuning::parse("[Inlet control]\nlevel2_temp=50\n").unwrap();

        assert!(t.apply(&mut config, Direction::F2b).is_err());
        assert_eq!(config, before);
    }
}
