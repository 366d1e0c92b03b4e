//! PSU fan curve for platforms where PSU fans do not track the chassis fans
//!
//! Output is a PSU percentage. Rising and falling temperatures use separate
//! temperature ranges; like the level table, a rising reading never lowers
//! the percentage and a falling one never raises it.

use serde::{Deserialize, Serialize};

use crate::constants::psu;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempRange {
    pub low: i32,
    pub high: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsuCurve {
    pub low_percent: u8,
    pub high_percent: u8,
    pub raising: TempRange,
    pub falling: TempRange,
}

impl Default for PsuCurve {
    fn default() -> Self {
        Self {
            low_percent: psu::INDEPENDENT_LOW_PERCENT,
            high_percent: psu::INDEPENDENT_HIGH_PERCENT,
            raising: TempRange { low: 25, high: 40 },
            falling: TempRange { low: 23, high: 40 },
        }
    }
}

impl PsuCurve {
    fn on_range(&self, range: TempRange, temp: i32) -> u8 {
        if temp < range.low || range.high <= range.low {
            return self.low_percent;
        }
        if temp >= range.high {
            return self.high_percent;
        }
        let span = (self.high_percent as i32 - self.low_percent as i32) * (temp - range.low);
        (self.low_percent as i32 + span / (range.high - range.low)) as u8
    }

    pub fn raising_percent(&self, temp: i32) -> u8 {
        self.on_range(self.raising, temp)
    }

    pub fn falling_percent(&self, temp: i32) -> u8 {
        self.on_range(self.falling, temp)
    }

    /// Next PSU percentage given this and the previous critical temperature
    pub fn percent(&self, temp: i32, prev_temp: i32, prev_percent: u8) -> u8 {
        if prev_temp <= temp {
            self.raising_percent(temp).max(prev_percent)
        } else {
            self.falling_percent(temp).min(prev_percent)
        }
    }
}
