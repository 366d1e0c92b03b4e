//! Fan and PSU output writes
//!
//! Every write first re-reads the unit's presence; absent or powered-off
//! units are skipped rather than written. Fan trays take the internal
//! 0-255 duty directly, PSUs take a 0-100 percentage and need their
//! speed-control register set before each duty write.

use std::path::PathBuf;

use tracing::debug;

use crate::config::{FanTrayConfig, PsuConfig};
use crate::constants::{duty, psu};
use crate::hw::node::{NodeBus, PathCache, ReadStrategy};
use crate::redundancy::{LedColor, LedTarget, Presence, RedundancyMonitor, UnitId};
use crate::{ChassisFanError, Result};

#[derive(Debug, Clone)]
struct PsuOutput {
    device: PathBuf,
    percent: String,
    speed_ctrl: String,
    percent_cache: PathCache,
    ctrl_cache: PathCache,
}

#[derive(Debug, Clone)]
pub struct Actuator {
    fans: Vec<FanTrayConfig>,
    psus: Vec<PsuOutput>,
    psu_led: Option<PathBuf>,
}

impl Actuator {
    pub fn new(fans: &[FanTrayConfig], psus: &[PsuConfig], psu_led: Option<PathBuf>) -> Self {
        Self {
            fans: fans.to_vec(),
            psus: psus
                .iter()
                .map(|p| PsuOutput {
                    device: p.device.clone(),
                    percent: p.percent.clone(),
                    speed_ctrl: p.speed_ctrl.clone(),
                    percent_cache: PathCache::new(),
                    ctrl_cache: PathCache::new(),
                })
                .collect(),
            psu_led,
        }
    }

    fn fan(&self, index: usize) -> Result<&FanTrayConfig> {
        self.fans
            .get(index)
            .ok_or_else(|| ChassisFanError::generic(format!("no fan tray {}", index + 1)))
    }

    /// Write a tray's duty; returns false when the tray was skipped
    pub fn set_fan_duty(
        &self,
        bus: &NodeBus,
        monitor: &mut RedundancyMonitor,
        index: usize,
        value: u8,
    ) -> Result<bool> {
        let fan = self.fan(index)?;
        if monitor.refresh_presence(bus, UnitId::Fan(index)) != Presence::Present {
            debug!(unit = %fan.name, "CONTROL: tray not present, skipping duty write");
            return Ok(false);
        }
        bus.write_int(&fan.cpld.join(&fan.pwm), value as i64)?;
        Ok(true)
    }

    /// Write a PSU's duty given on the internal scale
    pub fn set_psu_duty(
        &mut self,
        bus: &NodeBus,
        monitor: &mut RedundancyMonitor,
        index: usize,
        value: u8,
    ) -> Result<bool> {
        self.set_psu_percent(bus, monitor, index, duty::to_percent(value))
    }

    /// Write a PSU's duty as a percentage
    pub fn set_psu_percent(
        &mut self,
        bus: &NodeBus,
        monitor: &mut RedundancyMonitor,
        index: usize,
        percent: u8,
    ) -> Result<bool> {
        if monitor.refresh_presence(bus, UnitId::Psu(index)) != Presence::Present {
            debug!(psu = index + 1, "CONTROL: PSU not running, skipping duty write");
            return Ok(false);
        }
        self.enable_psu_speed_control(bus, index)?;
        let out = self.psu_output(index)?;
        let path = out
            .percent_cache
            .resolve(&out.device, &out.percent, ReadStrategy::DirectOrProbed)?;
        bus.write_int(&path, percent.min(100) as i64)?;
        Ok(true)
    }

    /// Put the PSU's fan into host-controlled mode
    pub fn enable_psu_speed_control(&mut self, bus: &NodeBus, index: usize) -> Result<()> {
        let out = self.psu_output(index)?;
        let path = out
            .ctrl_cache
            .resolve(&out.device, &out.speed_ctrl, ReadStrategy::DirectOrProbed)?;
        bus.write_int(&path, psu::SPEED_CTRL_ENABLE)
    }

    fn psu_output(&mut self, index: usize) -> Result<&mut PsuOutput> {
        self.psus
            .get_mut(index)
            .ok_or_else(|| ChassisFanError::generic(format!("no PSU {}", index + 1)))
    }

    /// Set a tray LED or the shared PSU bank LED
    pub fn set_led(&self, bus: &NodeBus, target: LedTarget, color: LedColor) -> Result<()> {
        let path = match target {
            LedTarget::Fan(index) => {
                let fan = self.fan(index)?;
                fan.cpld.join(&fan.led)
            }
            LedTarget::PsuBank => match &self.psu_led {
                Some(path) => path.clone(),
                None => return Ok(()),
            },
        };
        bus.write_int(&path, color.value())
    }
}
