//! Fan tray and PSU redundancy monitor
//!
//! Each unit has one or two tachometer halves with a consecutive-failure
//! counter. A half fails when it reads under the stall RPM, or under the
//! slop fraction of its rated RPM while commanded to full duty. The monitor
//! decides; writes (LEDs, duties) are left to the actuator.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::{FanTrayConfig, Limits, PsuConfig};
use crate::constants::{duty, fan, led};
use crate::hw::node::{NodeBus, PathCache, ReadStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    Fan(usize),
    Psu(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// Installed but not running; contributes no airflow
    PoweredOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfVerdict {
    Pass,
    Stalled(u32),
    Slow(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Green,
    Red,
}

impl LedColor {
    pub fn value(self) -> i64 {
        match self {
            LedColor::Green => led::GREEN,
            LedColor::Red => led::RED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedTarget {
    Fan(usize),
    PsuBank,
}

/// Outcome of the last tally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    Normal,
    /// Exactly one failed half: use the one-failed policy set
    OneFailed,
    /// Every fan and PSU at full duty
    FailSafe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedundancyReport {
    /// Units with every half failed, plus trays missing past the grace period
    pub unit_failures: u32,
    /// Failed halves across present units
    pub half_failures: u32,
    pub state: FailureState,
    /// Indicator changes to apply
    pub leds: Vec<(LedTarget, LedColor)>,
}

/// Judge one tachometer reading
pub fn judge_rpm(rpm: u32, commanded: u8, max_rpm: u32, limits: &Limits) -> HalfVerdict {
    if rpm < limits.fan_fail_rpm {
        return HalfVerdict::Stalled(rpm);
    }
    let floor = max_rpm * (100 - limits.failure_slop_percent.min(100)) / 100;
    if commanded == duty::MAX && rpm < floor {
        return HalfVerdict::Slow(rpm);
    }
    HalfVerdict::Pass
}

#[derive(Debug, Clone)]
struct Half {
    label: &'static str,
    prefix: PathBuf,
    suffix: String,
    strategy: ReadStrategy,
    cache: PathCache,
    max_rpm: u32,
    count: u8,
}

impl Half {
    fn new(label: &'static str, prefix: PathBuf, suffix: &str, strategy: ReadStrategy, max_rpm: u32) -> Self {
        Self {
            label,
            prefix,
            suffix: suffix.to_string(),
            strategy,
            cache: PathCache::new(),
            max_rpm,
            count: 0,
        }
    }

    fn read_rpm(&mut self, bus: &NodeBus) -> crate::Result<u32> {
        let path = self.cache.resolve(&self.prefix, &self.suffix, self.strategy)?;
        Ok(bus.read_int(&path)?.max(0) as u32)
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    present_node: PathBuf,
    status_node: Option<PathBuf>,
    presence: Presence,
    halves: Vec<Half>,
    failed: bool,
    absent_cycles: u32,
    led: Option<LedColor>,
}

impl Unit {
    fn fan_tray(index: usize, config: &FanTrayConfig) -> Self {
        Self {
            id: UnitId::Fan(index),
            name: config.name.clone(),
            present_node: config.cpld.join(&config.present),
            status_node: None,
            presence: Presence::Present,
            halves: vec![
                Half::new("front", config.cpld.clone(), &config.front_rpm, ReadStrategy::Direct, config.front_max_rpm),
                Half::new("rear", config.cpld.clone(), &config.rear_rpm, ReadStrategy::Direct, config.rear_max_rpm),
            ],
            failed: false,
            absent_cycles: 0,
            led: None,
        }
    }

    fn psu(index: usize, config: &PsuConfig) -> Self {
        Self {
            id: UnitId::Psu(index),
            name: config.name.clone(),
            present_node: config.cpld.join(&config.present),
            status_node: Some(config.cpld.join(&config.status)),
            presence: Presence::Present,
            halves: vec![Half::new(
                "fan",
                config.device.clone(),
                &config.rpm,
                ReadStrategy::DirectOrProbed,
                config.max_rpm,
            )],
            failed: false,
            absent_cycles: 0,
            led: None,
        }
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Consecutive-failure counter per half
    pub fn half_counts(&self) -> Vec<u8> {
        self.halves.iter().map(|h| h.count).collect()
    }

    fn failed_halves(&self, fail_count: u8) -> u32 {
        self.halves.iter().filter(|h| h.count >= fail_count).count() as u32
    }

    fn read_presence(&self, bus: &NodeBus) -> crate::Result<Presence> {
        if bus.read_int(&self.present_node)? != fan::PRESENT {
            return Ok(Presence::Absent);
        }
        if let Some(status) = &self.status_node {
            if bus.read_int(status)? == fan::POWERED_OFF {
                return Ok(Presence::PoweredOff);
            }
        }
        Ok(Presence::Present)
    }

    /// Re-read presence, logging transitions; unreadable nodes keep the last state
    pub fn refresh_presence(&mut self, bus: &NodeBus) -> Presence {
        match self.read_presence(bus) {
            Ok(now) if now != self.presence => {
                match now {
                    Presence::Absent => warn!(unit = %self.name, "REDUNDANCY: unit not present"),
                    Presence::PoweredOff => warn!(unit = %self.name, "REDUNDANCY: unit present but powered off"),
                    Presence::Present => info!(unit = %self.name, "REDUNDANCY: unit present and running"),
                }
                self.presence = now;
            }
            Ok(_) => {}
            Err(e) => debug!(unit = %self.name, error = %e, "REDUNDANCY: presence unreadable, keeping last state"),
        }
        self.presence
    }

    fn reset_halves(&mut self) {
        for half in &mut self.halves {
            half.count = 0;
        }
        self.failed = false;
    }

    /// Read each half's tachometer and update its counter
    fn check_halves(&mut self, bus: &NodeBus, commanded: u8, limits: &Limits) {
        let fail_count = limits.fan_fail_count;
        for half in &mut self.halves {
            let rpm = match half.read_rpm(bus) {
                Ok(rpm) => rpm,
                Err(e) => {
                    debug!(unit = %self.name, half = half.label, error = %e, "REDUNDANCY: tachometer unreadable");
                    continue;
                }
            };

            match judge_rpm(rpm, commanded, half.max_rpm, limits) {
                HalfVerdict::Pass => {
                    if half.count >= fail_count {
                        warn!(unit = %self.name, half = half.label, rpm, "REDUNDANCY: fan speed recovered");
                    } else if half.count > 0 {
                        debug!(unit = %self.name, half = half.label, rpm, "REDUNDANCY: fan speed back in range");
                    }
                    half.count = 0;
                }
                verdict => {
                    if half.count >= fail_count {
                        continue;
                    }
                    half.count += 1;
                    if half.count == fail_count {
                        error!(
                            unit = %self.name, half = half.label, rpm, commanded,
                            "REDUNDANCY: fan speed failure timed out"
                        );
                    } else if half.count == 1 {
                        match verdict {
                            HalfVerdict::Stalled(_) => warn!(
                                unit = %self.name, half = half.label, rpm, threshold = limits.fan_fail_rpm,
                                "REDUNDANCY: fan speed below stall threshold"
                            ),
                            _ => warn!(
                                unit = %self.name, half = half.label, rpm, slop = limits.failure_slop_percent,
                                "REDUNDANCY: fan speed too low at full duty"
                            ),
                        }
                    }
                }
            }
        }

        let failed_halves = self.failed_halves(fail_count) as usize;
        if !self.failed && failed_halves == self.halves.len() {
            self.failed = true;
            error!(unit = %self.name, "REDUNDANCY: unit failed");
        } else if self.failed && self.halves.iter().all(|h| h.count == 0) {
            self.failed = false;
            warn!(unit = %self.name, "REDUNDANCY: unit has recovered");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedundancyMonitor {
    fans: Vec<Unit>,
    psus: Vec<Unit>,
    limits: Limits,
    psu_led: Option<LedColor>,
}

impl RedundancyMonitor {
    pub fn new(fans: &[FanTrayConfig], psus: &[PsuConfig], limits: Limits) -> Self {
        Self {
            fans: fans.iter().enumerate().map(|(i, c)| Unit::fan_tray(i, c)).collect(),
            psus: psus.iter().enumerate().map(|(i, c)| Unit::psu(i, c)).collect(),
            limits,
            psu_led: None,
        }
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        match id {
            UnitId::Fan(i) => self.fans.get(i),
            UnitId::Psu(i) => self.psus.get(i),
        }
    }

    fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        match id {
            UnitId::Fan(i) => self.fans.get_mut(i),
            UnitId::Psu(i) => self.psus.get_mut(i),
        }
    }

    pub fn fan_count(&self) -> usize {
        self.fans.len()
    }

    pub fn psu_count(&self) -> usize {
        self.psus.len()
    }

    /// Re-read one unit's presence; unknown units report absent
    pub fn refresh_presence(&mut self, bus: &NodeBus, id: UnitId) -> Presence {
        self.unit_mut(id)
            .map(|u| u.refresh_presence(bus))
            .unwrap_or(Presence::Absent)
    }

    /// One tachometer pass over every unit, then the system-wide tally
    ///
    /// `fan_duty` and `psu_duty` are what each kind of unit was commanded
    /// this cycle, on the internal scale.
    pub fn evaluate(&mut self, bus: &NodeBus, fan_duty: u8, psu_duty: u8) -> RedundancyReport {
        let limits = self.limits.clone();
        let fail_count = limits.fan_fail_count;
        let mut unit_failures = 0;
        let mut half_failures = 0;
        let mut leds = Vec::new();

        for (index, unit) in self.fans.iter_mut().enumerate() {
            let faulted = match unit.refresh_presence(bus) {
                Presence::Present => {
                    unit.absent_cycles = 0;
                    unit.check_halves(bus, fan_duty, &limits);
                    let failed = unit.failed_halves(fail_count);
                    half_failures += failed;
                    if unit.failed {
                        unit_failures += 1;
                    }
                    failed > 0
                }
                _ => {
                    unit.reset_halves();
                    unit.absent_cycles = unit.absent_cycles.saturating_add(1);
                    let missing = unit.absent_cycles >= limits.absent_grace_cycles;
                    if missing {
                        unit_failures += 1;
                    }
                    missing
                }
            };

            let color = if faulted { LedColor::Red } else { LedColor::Green };
            if unit.led != Some(color) {
                unit.led = Some(color);
                leds.push((LedTarget::Fan(index), color));
            }
        }

        let mut psu_faulted = false;
        for unit in &mut self.psus {
            if unit.refresh_presence(bus) != Presence::Present {
                unit.reset_halves();
                continue;
            }
            unit.check_halves(bus, psu_duty, &limits);
            let failed = unit.failed_halves(fail_count);
            half_failures += failed;
            if unit.failed {
                unit_failures += 1;
            }
            psu_faulted |= failed > 0;
        }
        if !self.psus.is_empty() {
            let color = if psu_faulted { LedColor::Red } else { LedColor::Green };
            if self.psu_led != Some(color) {
                self.psu_led = Some(color);
                leds.push((LedTarget::PsuBank, color));
            }
        }

        let state = if unit_failures > 0 || half_failures >= 2 {
            FailureState::FailSafe
        } else if half_failures == 1 {
            FailureState::OneFailed
        } else {
            FailureState::Normal
        };

        RedundancyReport {
            unit_failures,
            half_failures,
            state,
            leds,
        }
    }
}
