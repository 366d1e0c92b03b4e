/*
 * This file is part of Chassisfan.
 *
 * Copyright (C) 2025 Chassisfan contributors
 *
 * Chassisfan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Chassisfan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Chassisfan. If not, see <https://www.gnu.org/licenses/>.
 */

//! Main control loop
//!
//! One cycle: sample every active zone, evaluate alarms, fold the zone
//! requests into a chassis duty, write it, let the fans settle, then check
//! tachometers and fall back to full speed if units have failed.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use cf_core::config::{PlatformConfig, PsuMode};
use cf_core::constants::duty;
use cf_core::engine::{aggregate, requested_duty, AlarmEvent, AlarmFlags, Zone, ZoneClass, ZonePolicy};
use cf_core::hw::direction;
use cf_core::hw::{Actuator, NodeBus, SampleEvent, Sensor, SensorId, Watchdog};
use cf_core::redundancy::{FailureState, RedundancyMonitor};
use cf_core::tuning::Tuning;
use cf_core::{Direction, Result};

/// What one cycle ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Chassis duty on the internal scale
    pub duty: u8,
    pub psu_percent: u8,
    pub critical_temp: Option<i32>,
    pub high_alarm: bool,
    pub state: FailureState,
}

pub struct ControllerState {
    config: PlatformConfig,
    bus: NodeBus,
    direction: Direction,
    sensors: Vec<Sensor>,
    zones: Vec<Zone>,
    monitor: RedundancyMonitor,
    actuator: Actuator,
    commanded: u8,
    psu_percent: u8,
    /// Last percent actually written to the PSUs
    psu_applied: u8,
    critical_prev: Option<i32>,
    one_failed: bool,
    failsafe: bool,
    failure_counts: (u32, u32),
    cycles: u64,
}

fn apply_tuning(config: &mut PlatformConfig, path: &Path, direction: Direction) {
    match Tuning::load(path) {
        Ok(Some(tuning)) => match tuning.apply(config, direction) {
            Ok(()) => info!(path = %path.display(), pid = config.pid_enabled, "STARTUP: tuning file applied"),
            Err(e) => warn!(path = %path.display(), error = %e, "STARTUP: tuning rejected, using defaults"),
        },
        Ok(None) => info!(path = %path.display(), "STARTUP: no tuning file, using defaults"),
        Err(e) => warn!(path = %path.display(), error = %e, "STARTUP: tuning file ignored, using defaults"),
    }
}

impl ControllerState {
    /// Detect airflow, apply tuning and build the sensor and zone arenas
    ///
    /// `tuning_file` overrides the platform's default tuning path.
    pub fn new(mut config: PlatformConfig, tuning_file: Option<&Path>) -> Result<Self> {
        config.validate()?;
        let bus = NodeBus::new(Duration::from_millis(config.timing.io_delay_ms));
        let direction = direction::detect(&config.fans, &config.direction_marker, config.default_direction);

        let tuning_path = tuning_file.map(Path::to_path_buf).or_else(|| config.tuning_file.clone());
        if let Some(path) = tuning_path {
            apply_tuning(&mut config, &path, direction);
        }

        let error_max = config.limits.error_temp_max;
        let sensors = config.sensors.iter().cloned().map(|s| Sensor::new(s, error_max)).collect();
        let zones: Vec<Zone> = config.zones.iter().cloned().map(Zone::new).collect();
        let monitor = RedundancyMonitor::new(&config.fans, &config.psus, config.limits.clone());
        let actuator = Actuator::new(&config.fans, &config.psus, config.psu_led.clone());
        let psu_percent = match config.psu_mode {
            PsuMode::Tracking => duty::to_percent(duty::MEDIUM),
            PsuMode::Independent => config.psu_curve.low_percent,
        };

        info!(
            platform = %config.name,
            %direction,
            fans = config.fans.len(),
            psus = config.psus.len(),
            zones = zones.iter().filter(|z| z.is_active(direction)).count(),
            pid = config.pid_enabled,
            "STARTUP: controller ready"
        );

        Ok(Self {
            config,
            bus,
            direction,
            sensors,
            zones,
            monitor,
            actuator,
            commanded: duty::MEDIUM,
            psu_percent,
            psu_applied: psu_percent,
            critical_prev: None,
            one_failed: false,
            failsafe: false,
            failure_counts: (0, 0),
            cycles: 0,
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn bus(&self) -> &NodeBus {
        &self.bus
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Chassis duty chosen by the last cycle
    pub fn commanded(&self) -> u8 {
        self.commanded
    }

    pub fn one_failed(&self) -> bool {
        self.one_failed
    }

    pub fn in_failsafe(&self) -> bool {
        self.failsafe
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(id.0)
    }

    pub fn monitor(&self) -> &RedundancyMonitor {
        &self.monitor
    }

    /// Bring every unit to the medium duty and let the fans spin up
    pub fn start(&mut self) {
        info!(duty = duty::MEDIUM, "STARTUP: setting initial fan duty");
        self.write_fans(duty::MEDIUM);
        self.write_psus(self.psu_percent);
        sleep_ms(self.config.timing.warmup_ms);
    }

    /// Run cycles until the process is stopped
    pub fn run(&mut self, watchdog: &mut Watchdog) -> ! {
        info!(
            interval_ms = self.config.timing.poll_interval_ms,
            watchdog = watchdog.is_armed(),
            "CONTROL: entering control loop"
        );
        loop {
            self.run_cycle();
            watchdog.kick();
        }
    }

    pub fn run_cycle(&mut self) -> CycleSummary {
        self.sample();
        if self.check_alarms() {
            self.write_fans(duty::MAX);
        }
        let high_alarm = self.high_alarm();

        if let Some(duty) = self.demand() {
            if duty != self.commanded {
                debug!(from = self.commanded, to = duty, "CONTROL: duty change");
            }
            self.commanded = duty;
        }

        let critical = self.critical_temp();
        match self.config.psu_mode {
            PsuMode::Tracking => self.psu_percent = duty::to_percent(self.commanded),
            PsuMode::Independent => {
                if let Some(temp) = critical {
                    let prev = self.critical_prev.unwrap_or(temp);
                    self.psu_percent = self.config.psu_curve.percent(temp, prev, self.psu_percent);
                    self.critical_prev = Some(temp);
                }
            }
        }

        if !self.failsafe {
            if !high_alarm {
                self.write_fans(self.commanded);
            }
            if self.config.psu_mode == PsuMode::Independent || !high_alarm {
                self.write_psus(self.psu_percent);
            }
        }

        sleep_ms(self.config.timing.poll_interval_ms);

        let state = self.check_redundancy(high_alarm);

        self.cycles += 1;
        let interval = self.config.timing.report_interval;
        if interval > 0 && self.cycles % interval == 0 {
            self.report(critical);
        }

        CycleSummary {
            duty: self.commanded,
            psu_percent: self.psu_percent,
            critical_temp: critical,
            high_alarm,
            state,
        }
    }

    fn sample(&mut self) {
        for zone in &self.zones {
            if !zone.is_active(self.direction) {
                continue;
            }
            let Some(sensor) = self.sensors.get_mut(zone.sensor().0) else {
                continue;
            };
            match sensor.sample(&self.bus, zone.config.correction) {
                SampleEvent::Fresh(temp) => debug!(zone = %zone.name(), temp, "SENSOR: sample"),
                SampleEvent::Recovered { temp, after } => {
                    info!(zone = %zone.name(), temp, failures = after, "SENSOR: read recovered")
                }
                SampleEvent::Lost => {
                    warn!(zone = %zone.name(), sensor = %sensor.name(), "SENSOR: read failed, holding duty")
                }
                SampleEvent::TimedOut => error!(
                    zone = %zone.name(),
                    sensor = %sensor.name(),
                    "SENSOR: read timed out, forcing full speed"
                ),
                SampleEvent::StillLost => {
                    debug!(zone = %zone.name(), failures = sensor.error_count(), "SENSOR: still unreadable")
                }
            }
        }
    }

    /// Fold this cycle's readings into the zone alarms; true when a high
    /// alarm was raised
    fn check_alarms(&mut self) -> bool {
        let limits = self.config.limits.alarm;
        let mut raised = false;
        for zone in &mut self.zones {
            if !zone.is_active(self.direction) || !zone.has_thresholds() {
                continue;
            }
            let Some(temp) = self.sensors.get(zone.sensor().0).and_then(Sensor::temperature) else {
                continue;
            };
            for event in zone.evaluate_alarm(temp, &limits) {
                match event {
                    AlarmEvent::HighRaised { temp, threshold } => {
                        error!(zone = %zone.name(), temp, threshold, "ALARM: critical temperature, forcing full speed");
                        raised = true;
                    }
                    AlarmEvent::HighCleared { temp } => {
                        info!(zone = %zone.name(), temp, "ALARM: critical temperature cleared")
                    }
                    AlarmEvent::LowRaised { temp, threshold } => {
                        warn!(zone = %zone.name(), temp, threshold, "ALARM: warning temperature reached")
                    }
                    AlarmEvent::LowCleared { temp } => {
                        info!(zone = %zone.name(), temp, "ALARM: warning temperature cleared")
                    }
                }
            }
        }
        raised
    }

    pub fn high_alarm(&self) -> bool {
        self.zones
            .iter()
            .any(|z| z.is_active(self.direction) && z.alarms().contains(AlarmFlags::HIGH_WARN))
    }

    /// Largest zone request; None when no zone produced one
    fn demand(&mut self) -> Option<u8> {
        let set = self.config.policies.select(self.direction, self.one_failed);
        let commanded = self.commanded;
        let mut requests = Vec::with_capacity(self.zones.len());

        for zone in &self.zones {
            if !zone.is_active(self.direction) {
                continue;
            }
            if zone.class() == ZoneClass::Pid && !self.config.pid_enabled {
                continue;
            }
            let Some(sensor) = self.sensors.get_mut(zone.sensor().0) else {
                continue;
            };
            let gains = sensor.config.pid;
            let Some(policy) = ZonePolicy::select(zone.class(), set, &gains) else {
                continue;
            };
            let duty = requested_duty(sensor, policy, commanded);
            debug!(zone = %zone.name(), duty, "CONTROL: zone request");
            requests.push(duty);
        }

        aggregate(requests)
    }

    /// Hottest healthy reading among the line and level zones
    fn critical_temp(&self) -> Option<i32> {
        self.zones
            .iter()
            .filter(|z| z.is_active(self.direction))
            .filter(|z| matches!(z.class(), ZoneClass::RampCritical | ZoneClass::Levels))
            .filter_map(|z| self.sensors.get(z.sensor().0).and_then(Sensor::temperature))
            .max()
    }

    fn check_redundancy(&mut self, high_alarm: bool) -> FailureState {
        let fan_duty = if self.failsafe || high_alarm { duty::MAX } else { self.commanded };
        let psu_duty = if self.failsafe { duty::MAX } else { duty::from_percent(self.psu_applied) };
        let report = self.monitor.evaluate(&self.bus, fan_duty, psu_duty);

        for &(target, color) in &report.leds {
            if let Err(e) = self.actuator.set_led(&self.bus, target, color) {
                warn!(?target, error = %e, "REDUNDANCY: LED write failed");
            }
        }

        match report.state {
            FailureState::Normal if self.one_failed => {
                info!("REDUNDANCY: all fans healthy, back to normal policy");
                self.one_failed = false;
            }
            FailureState::OneFailed if !self.one_failed => {
                warn!("REDUNDANCY: one fan failed, switching to one-failed policy");
                self.one_failed = true;
            }
            _ => {}
        }

        let counts = (report.unit_failures, report.half_failures);
        if report.state == FailureState::FailSafe {
            if !self.failsafe {
                error!(units = counts.0, halves = counts.1, "EMERGENCY: fan failure, running everything at full speed");
            } else if counts != self.failure_counts {
                warn!(units = counts.0, halves = counts.1, "REDUNDANCY: failure count changed");
            }
            self.failsafe = true;
            self.failure_counts = counts;
            self.commanded = duty::MAX;
            self.write_fans(duty::MAX);
            self.write_psus(duty::to_percent(duty::MAX));
        } else if self.failsafe {
            info!("REDUNDANCY: failures cleared, leaving fail-safe");
            self.failsafe = false;
            self.failure_counts = (0, 0);
        }

        report.state
    }

    fn report(&self, critical: Option<i32>) {
        info!(
            critical = ?critical,
            duty = self.commanded,
            percent = duty::to_percent(self.commanded),
            psu_percent = self.psu_percent,
            direction = %self.direction,
            policy = if self.one_failed { "one_failed" } else { "normal" },
            failsafe = self.failsafe,
            "CONTROL: status"
        );
    }

    fn write_fans(&mut self, value: u8) {
        for index in 0..self.monitor.fan_count() {
            match self.actuator.set_fan_duty(&self.bus, &mut self.monitor, index, value) {
                Err(e) if e.is_transient() => debug!(fan = index + 1, value, error = %e, "CONTROL: fan duty write failed"),
                Err(e) => warn!(fan = index + 1, value, error = %e, "CONTROL: fan duty write failed"),
                Ok(_) => {}
            }
        }
    }

    fn write_psus(&mut self, percent: u8) {
        for index in 0..self.monitor.psu_count() {
            match self.actuator.set_psu_percent(&self.bus, &mut self.monitor, index, percent) {
                Err(e) if e.is_transient() => debug!(psu = index + 1, percent, error = %e, "CONTROL: PSU duty write failed"),
                Err(e) => warn!(psu = index + 1, percent, error = %e, "CONTROL: PSU duty write failed"),
                Ok(_) => {}
            }
        }
        self.psu_applied = percent;
    }
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
