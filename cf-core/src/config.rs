//! Platform description
//!
//! Everything the daemon knows about a chassis: which nodes exist, which
//! zones drive the fans, the thresholds and the policy lines. Built-in
//! presets cover both Phalanx fan-controller generations; a JSON file with
//! the same shape replaces the preset wholesale.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{alarm, duty, fan, paths, psu, sensor, timing, watchdog};
use crate::engine::alarm::AlarmLimits;
use crate::engine::levels::LevelTable;
use crate::engine::pid::PidGains;
use crate::engine::policy::PolicySet;
use crate::engine::psu_curve::PsuCurve;
use crate::engine::ramp::{RampLine, RampPoint};
use crate::engine::zone::ZoneClass;
use crate::hw::node::ReadStrategy;
use crate::hw::sensor::SensorId;
use crate::{ChassisFanError, Result};

/// Chassis cooling orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Front to back
    F2b,
    /// Back to front
    B2f,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::F2b => write!(f, "front-to-back"),
            Direction::B2f => write!(f, "back-to-front"),
        }
    }
}

/// How PSU fan duty is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsuMode {
    /// Same duty as the chassis fans
    #[default]
    Tracking,
    /// Own curve over the critical temperature
    Independent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Failed sensor reads before a zone forces full speed
    pub error_temp_max: u8,
    /// Stall threshold for any fan half
    pub fan_fail_rpm: u32,
    /// Consecutive bad tachometer reads before a half counts as failed
    pub fan_fail_count: u8,
    /// Allowed shortfall from rated RPM at full duty, in percent
    pub failure_slop_percent: u32,
    /// Consecutive absent cycles before a missing tray counts as failed
    pub absent_grace_cycles: u32,
    pub alarm: AlarmLimits,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            error_temp_max: sensor::ERROR_TEMP_MAX,
            fan_fail_rpm: fan::FAIL_RPM,
            fan_fail_count: fan::FAIL_COUNT,
            failure_slop_percent: fan::FAILURE_SLOP_PERCENT,
            absent_grace_cycles: fan::ABSENT_GRACE_CYCLES,
            alarm: AlarmLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub io_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub warmup_ms: u64,
    pub report_interval: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            io_delay_ms: timing::IO_DELAY_MS,
            poll_interval_ms: timing::POLL_INTERVAL_MS,
            warmup_ms: timing::WARMUP_MS,
            report_interval: timing::REPORT_INTERVAL,
        }
    }
}

impl Timing {
    /// No sleeps at all; for driving the loop from tests
    pub fn immediate() -> Self {
        Self {
            io_delay_ms: 0,
            poll_interval_ms: 0,
            warmup_ms: 0,
            report_interval: timing::REPORT_INTERVAL,
        }
    }
}

/// Normal and one-unit-failed policies for one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPair {
    pub normal: PolicySet,
    pub one_failed: PolicySet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policies {
    pub f2b: PolicyPair,
    pub b2f: PolicyPair,
}

impl Policies {
    fn pair(&self, direction: Direction) -> &PolicyPair {
        match direction {
            Direction::F2b => &self.f2b,
            Direction::B2f => &self.b2f,
        }
    }

    pub fn pair_mut(&mut self, direction: Direction) -> &mut PolicyPair {
        match direction {
            Direction::F2b => &mut self.f2b,
            Direction::B2f => &mut self.b2f,
        }
    }

    pub fn select(&self, direction: Direction, one_failed: bool) -> &PolicySet {
        let pair = self.pair(direction);
        if one_failed {
            &pair.one_failed
        } else {
            &pair.normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub prefix: PathBuf,
    pub suffix: String,
    #[serde(default)]
    pub strategy: ReadStrategy,
    #[serde(default)]
    pub pid: PidGains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub direction: Direction,
    pub sensor: SensorId,
    #[serde(default)]
    pub correction: i32,
    /// None disables the low alarm
    #[serde(default)]
    pub low_warn: Option<i32>,
    /// None disables the high alarm
    #[serde(default)]
    pub high_warn: Option<i32>,
    pub class: ZoneClass,
}

/// Fan tray nodes, relative to the fan CPLD directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanTrayConfig {
    pub name: String,
    pub cpld: PathBuf,
    pub front_rpm: String,
    pub rear_rpm: String,
    pub pwm: String,
    pub led: String,
    pub present: String,
    #[serde(default)]
    pub eeprom: Option<PathBuf>,
    pub front_max_rpm: u32,
    pub rear_max_rpm: u32,
}

impl FanTrayConfig {
    /// Standard layout: tray N has tachometers 2N-1/2N and `fanN_*` nodes
    pub fn numbered(index: usize, cpld: &Path, eeprom: Option<PathBuf>) -> Self {
        let n = index + 1;
        Self {
            name: format!("Fantray {}", n),
            cpld: cpld.to_path_buf(),
            front_rpm: format!("fan{}_input", 2 * n - 1),
            rear_rpm: format!("fan{}_input", 2 * n),
            pwm: format!("fan{}_pwm", n),
            led: format!("fan{}_led", n),
            present: format!("fan{}_present", n),
            eeprom,
            front_max_rpm: fan::FRONT_SPEED_MAX,
            rear_max_rpm: fan::REAR_SPEED_MAX,
        }
    }
}

/// PSU nodes: presence and status on the system CPLD, fan nodes on the
/// PSU's own device (direct or under hwmon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsuConfig {
    pub name: String,
    pub cpld: PathBuf,
    pub present: String,
    pub status: String,
    pub device: PathBuf,
    pub rpm: String,
    pub percent: String,
    pub speed_ctrl: String,
    pub max_rpm: u32,
}

impl PsuConfig {
    pub fn numbered(index: usize, cpld: &Path, device: PathBuf) -> Self {
        let n = index + 1;
        Self {
            name: format!("PSU {}", n),
            cpld: cpld.to_path_buf(),
            present: format!("psu_{}_present", n),
            status: format!("psu_{}_status", n),
            device,
            rpm: psu::RPM_NODE.to_string(),
            percent: psu::PERCENT_NODE.to_string(),
            speed_ctrl: psu::SPEED_CTRL_NODE.to_string(),
            max_rpm: fan::PSU_SPEED_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub enable_node: Option<PathBuf>,
    #[serde(default)]
    pub timeout_node: Option<PathBuf>,
    #[serde(default)]
    pub device: Option<PathBuf>,
    pub timeout_secs: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enable_node: Some(PathBuf::from(watchdog::ENABLE_NODE)),
            timeout_node: Some(PathBuf::from(watchdog::TIMEOUT_NODE)),
            device: Some(PathBuf::from(watchdog::DEVICE)),
            timeout_secs: watchdog::TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub default_direction: Direction,
    /// EEPROM text identifying a front-to-back fan unit
    pub direction_marker: String,
    #[serde(default)]
    pub psu_mode: PsuMode,
    #[serde(default)]
    pub psu_curve: PsuCurve,
    /// PID zones contribute demand; the tuning file may override
    pub pid_enabled: bool,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub timing: Timing,
    pub policies: Policies,
    pub sensors: Vec<SensorConfig>,
    pub zones: Vec<ZoneConfig>,
    pub fans: Vec<FanTrayConfig>,
    #[serde(default)]
    pub psus: Vec<PsuConfig>,
    /// Indicator shared by all PSUs
    #[serde(default)]
    pub psu_led: Option<PathBuf>,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub tuning_file: Option<PathBuf>,
}

fn fan_eeproms() -> Vec<PathBuf> {
    [36, 35, 34, 33, 32]
        .iter()
        .map(|bus| PathBuf::from(format!("/sys/bus/i2c/devices/{}-0050/eeprom", bus)))
        .collect()
}

fn lm75(name: &str, addr: &str) -> SensorConfig {
    SensorConfig {
        name: name.to_string(),
        prefix: PathBuf::from(format!("/sys/bus/i2c/drivers/lm75/{}", addr)),
        suffix: "temp1_input".to_string(),
        strategy: ReadStrategy::Probed,
        pid: PidGains::default(),
    }
}

fn direct(name: &str, prefix: &str, suffix: &str) -> SensorConfig {
    SensorConfig {
        name: name.to_string(),
        prefix: PathBuf::from(prefix),
        suffix: suffix.to_string(),
        strategy: ReadStrategy::Direct,
        pid: PidGains::default(),
    }
}

fn zone(
    name: &str,
    direction: Direction,
    sensor: usize,
    correction: i32,
    warn: (Option<i32>, Option<i32>),
    class: ZoneClass,
) -> ZoneConfig {
    ZoneConfig {
        name: name.to_string(),
        direction,
        sensor: SensorId(sensor),
        correction,
        low_warn: warn.0,
        high_warn: warn.1,
        class,
    }
}

fn line(low: i32, high: i32, min: u8, max: u8, hysteresis: i32) -> RampLine {
    RampLine::new(RampPoint::new(low, min), RampPoint::new(high, max)).with_hysteresis(hysteresis)
}

impl PlatformConfig {
    /// Second-generation controller: 5 trays, 4 PSUs, ramp plus PID
    pub fn phalanx_v2() -> Self {
        use Direction::{B2f, F2b};
        use ZoneClass::{Disabled, Pid, RampCritical};

        const MIN: u8 = 115;
        const ONE_FAIL_MIN: u8 = duty::MAX;
        const HYST: i32 = 2;

        let normal = PolicySet { line: line(25, 40, MIN, duty::MAX, HYST), levels: None };
        let one_failed = PolicySet { line: line(25, 40, ONE_FAIL_MIN, duty::MAX, HYST), levels: None };
        let pair = PolicyPair { normal, one_failed };

        let mut sensors = vec![
            lm75("pdbboard_onboard_u8", "31-0048"),
            lm75("pdbboard_onboard_u10", "31-0049"),
            direct("switchboard_onboard_u148", "/sys/bus/i2c/drivers/max31730/7-004c", "temp3_input"),
            direct("cpu_inlet", paths::SYS_CPLD, "temp2_input"),
            direct("optical_inlet", paths::SYS_CPLD, "temp3_input"),
        ];
        for s in &mut sensors {
            s.pid = s.pid.with_output_range(MIN, duty::MAX);
        }

        let none = (None, None);
        let zones = vec![
            zone("pdbboard_onboard_u8", B2f, 0, -2, none, Disabled),
            zone("pdbboard_onboard_u10", B2f, 1, -2, none, Disabled),
            zone("BCM56980_inlet", B2f, 2, 17, none, Pid),
            zone("cpu_inlet", B2f, 3, 0, none, Disabled),
            zone("optical_inlet", B2f, 4, 0, none, Disabled),
            zone("pdbboard_onboard_u10", F2b, 1, -4, (Some(40), Some(43)), RampCritical),
            zone("BCM56980_inlet", F2b, 2, 0, (Some(105), Some(110)), Pid),
            zone("cpu_inlet", F2b, 3, 0, (Some(101), Some(103)), Pid),
            zone("optical_inlet", F2b, 4, 0, none, Disabled),
        ];

        let fan_cpld = Path::new(paths::FAN_CPLD);
        let fans = fan_eeproms()
            .into_iter()
            .enumerate()
            .map(|(i, eeprom)| FanTrayConfig::numbered(i, fan_cpld, Some(eeprom)))
            .collect();

        let sys_cpld = Path::new(paths::SYS_CPLD);
        let psus = [24, 25, 28, 29]
            .iter()
            .enumerate()
            .map(|(i, bus)| {
                let device = PathBuf::from(format!("/sys/bus/i2c/devices/i2c-{0}/{0}-0058", bus));
                PsuConfig::numbered(i, sys_cpld, device)
            })
            .collect();

        Self {
            name: "phalanx-v2".to_string(),
            default_direction: F2b,
            direction_marker: paths::F2B_MARKER.to_string(),
            psu_mode: PsuMode::Tracking,
            psu_curve: PsuCurve::default(),
            pid_enabled: true,
            limits: Limits {
                alarm: AlarmLimits {
                    start_report: alarm::START_REPORT,
                    recovery_count: alarm::RECOVERY_COUNT,
                    margin: 1,
                },
                ..Limits::default()
            },
            timing: Timing::default(),
            policies: Policies { f2b: pair.clone(), b2f: pair },
            sensors,
            zones,
            fans,
            psus,
            psu_led: Some(sys_cpld.join(paths::PSU_LED)),
            watchdog: WatchdogConfig::default(),
            tuning_file: Some(PathBuf::from(paths::TUNING_FILE)),
        }
    }

    /// First-generation controller: 5 trays, no PSU control, level tables
    pub fn phalanx_v1() -> Self {
        use Direction::{B2f, F2b};
        use ZoneClass::{Disabled, Levels, Pid};

        const MIN: u8 = 76;
        const ONE_FAIL_MIN: u8 = 153;
        const HYST: i32 = 2;

        let levels = LevelTable::new(&[(0, 102), (20, 128), (25, 153), (30, 178), (35, 204), (40, 230)], HYST);
        let one_fail_levels =
            LevelTable::new(&[(0, 128), (20, 153), (25, 179), (30, 204), (35, 230), (40, 255)], HYST);
        let pair = PolicyPair {
            normal: PolicySet { line: line(26, 47, MIN, duty::MAX, HYST), levels: Some(levels) },
            one_failed: PolicySet {
                line: line(26, 47, ONE_FAIL_MIN, duty::MAX, HYST),
                levels: Some(one_fail_levels),
            },
        };

        let mut sensors = vec![
            lm75("pdbboard_onboard_u8", "31-0048"),
            lm75("pdbboard_onboard_u10", "31-0049"),
            direct("switchboard_onboard_u148", "/sys/bus/i2c/drivers/max31730/7-004c", "temp3_input"),
            direct("cpu_inlet", paths::SYS_CPLD, "temp2_input"),
            direct("optical_inlet", paths::SYS_CPLD, "temp3_input"),
        ];
        for s in &mut sensors {
            s.pid = s.pid.with_output_range(MIN, duty::MAX);
        }

        let none = (None, None);
        let zones = vec![
            zone("pdbboard_onboard_u8", B2f, 0, -2, (Some(45), None), Disabled),
            zone("pdbboard_onboard_u10", B2f, 1, -2, (Some(45), None), Disabled),
            zone("BCM56980_inlet", B2f, 2, 17, (Some(98), Some(104)), Pid),
            zone("cpu_inlet", B2f, 3, 0, (Some(96), Some(100)), Disabled),
            zone("optical_inlet", B2f, 4, 0, none, Disabled),
            zone("pdbboard_onboard_u10", F2b, 1, -4, none, Levels),
            zone("BCM56980_inlet", F2b, 2, 0, (Some(105), Some(110)), Pid),
            zone("cpu_inlet", F2b, 3, 0, (Some(96), Some(100)), Pid),
            zone("optical_inlet", F2b, 4, 0, none, Disabled),
        ];

        let fan_cpld = Path::new(paths::FAN_CPLD);
        let fans = fan_eeproms()
            .into_iter()
            .enumerate()
            .map(|(i, eeprom)| FanTrayConfig::numbered(i, fan_cpld, Some(eeprom)))
            .collect();

        Self {
            name: "phalanx-v1".to_string(),
            default_direction: F2b,
            direction_marker: paths::F2B_MARKER.to_string(),
            psu_mode: PsuMode::Tracking,
            psu_curve: PsuCurve::default(),
            pid_enabled: false,
            limits: Limits {
                fan_fail_count: 3,
                alarm: AlarmLimits {
                    start_report: alarm::START_REPORT,
                    recovery_count: alarm::RECOVERY_COUNT,
                    margin: 3,
                },
                ..Limits::default()
            },
            timing: Timing::default(),
            policies: Policies { f2b: pair.clone(), b2f: pair },
            sensors,
            zones,
            fans,
            psus: Vec::new(),
            psu_led: None,
            watchdog: WatchdogConfig::default(),
            tuning_file: Some(PathBuf::from(paths::TUNING_FILE_V1)),
        }
    }

    /// Built-in preset by short name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "v2" | "phalanx-v2" => Some(Self::phalanx_v2()),
            "v1" | "phalanx-v1" => Some(Self::phalanx_v1()),
            _ => None,
        }
    }

    /// Load and validate a JSON platform description
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ChassisFanError::NodeRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Move every absolute node path under `root`
    ///
    /// Lets a whole chassis be described against a copy of sysfs.
    pub fn rebased(mut self, root: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if let Ok(rel) = p.strip_prefix("/") {
                *p = root.join(rel);
            }
        };
        for s in &mut self.sensors {
            rebase(&mut s.prefix);
        }
        for f in &mut self.fans {
            rebase(&mut f.cpld);
            if let Some(e) = f.eeprom.as_mut() {
                rebase(e);
            }
        }
        for p in &mut self.psus {
            rebase(&mut p.cpld);
            rebase(&mut p.device);
        }
        for p in [
            self.psu_led.as_mut(),
            self.watchdog.enable_node.as_mut(),
            self.watchdog.timeout_node.as_mut(),
            self.watchdog.device.as_mut(),
            self.tuning_file.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            rebase(p);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fans.is_empty() {
            return Err(ChassisFanError::invalid("fans", "at least one fan tray is required"));
        }
        if self.limits.fan_fail_count == 0 {
            return Err(ChassisFanError::invalid("limits.fan_fail_count", "must be at least 1"));
        }
        if self.limits.error_temp_max == 0 {
            return Err(ChassisFanError::invalid("limits.error_temp_max", "must be at least 1"));
        }

        for (dir, pair) in [("f2b", &self.policies.f2b), ("b2f", &self.policies.b2f)] {
            for (state, set) in [("normal", &pair.normal), ("one_failed", &pair.one_failed)] {
                let field = format!("policies.{}.{}", dir, state);
                let l = &set.line;
                if l.end.temp <= l.begin.temp {
                    return Err(ChassisFanError::invalid(field, "line end temperature must exceed begin"));
                }
                if l.end.duty < l.begin.duty {
                    return Err(ChassisFanError::invalid(field, "line end duty is below begin duty"));
                }
                if let Some(levels) = &set.levels {
                    if levels.steps.is_empty() || !levels.is_ordered() {
                        return Err(ChassisFanError::invalid(field, "levels must ascend in temperature"));
                    }
                }
            }
        }

        for (i, s) in self.sensors.iter().enumerate() {
            if !s.pid.is_well_formed() {
                return Err(ChassisFanError::invalid(
                    format!("sensors[{}].pid", i),
                    "gains must be finite with 0 <= min_output <= max_output <= 255",
                ));
            }
        }

        for (i, z) in self.zones.iter().enumerate() {
            if z.sensor.0 >= self.sensors.len() {
                return Err(ChassisFanError::invalid(
                    format!("zones[{}].sensor", i),
                    format!("no sensor {} (have {})", z.sensor.0, self.sensors.len()),
                ));
            }
        }

        Ok(())
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::phalanx_v2()
    }
}
