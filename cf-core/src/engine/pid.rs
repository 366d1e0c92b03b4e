//! Incremental PID recurrence
//!
//! `out = last + P*(T - T1) + I*(T - setpoint) + D*(T + T2 - 2*T1)`
//!
//! `last` is the duty that was actually applied, not this controller's own
//! previous output, so the recurrence restarts from what the fans are doing
//! after aggregation with the other zones.

use serde::{Deserialize, Serialize};

use crate::constants::duty;
use crate::hw::sensor::Samples;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub setpoint: f64,
    #[serde(rename = "P")]
    pub kp: f64,
    #[serde(rename = "I")]
    pub ki: f64,
    #[serde(rename = "D")]
    pub kd: f64,
    pub min_output: f64,
    pub max_output: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            setpoint: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            min_output: 0.0,
            max_output: duty::MAX as f64,
        }
    }
}

impl PidGains {
    pub fn with_output_range(mut self, min_output: u8, max_output: u8) -> Self {
        self.min_output = min_output as f64;
        self.max_output = max_output as f64;
        self
    }

    /// All gains zero: the recurrence would only repeat `last`
    pub fn is_untuned(&self) -> bool {
        self.kp == 0.0 && self.ki == 0.0 && self.kd == 0.0
    }

    /// Every field finite and `0 <= min_output <= max_output <= MAX`
    pub fn is_well_formed(&self) -> bool {
        let fields = [self.setpoint, self.kp, self.ki, self.kd, self.min_output, self.max_output];
        fields.iter().all(|v| v.is_finite())
            && 0.0 <= self.min_output
            && self.min_output <= self.max_output
            && self.max_output <= duty::MAX as f64
    }

    pub fn output(&self, last_output: u8, samples: &Samples) -> u8 {
        let now = samples.now as f64;
        let prev = samples.prev as f64;
        let prev2 = samples.prev2 as f64;

        let delta = self.kp * (now - prev)
            + self.ki * (now - self.setpoint)
            + self.kd * (now + prev2 - 2.0 * prev);
        let raw = (last_output as f64 + delta).trunc();

        // NaN bounds fall through max/min instead of panicking in clamp
        raw.max(self.min_output)
            .min(self.max_output)
            .clamp(0.0, duty::MAX as f64) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains() -> PidGains {
        PidGains {
            setpoint: 90.0,
            kp: 3.0,
            ki: 0.5,
            kd: 0.25,
            min_output: 115.0,
            max_output: 255.0,
        }
    }

    #[test]
    fn test_at_setpoint_and_steady_holds_last() {
        let s = Samples::seeded(90);
        assert_eq!(gains().output(150, &s), 150);
    }

    #[test]
    fn test_terms() {
        // P: 3*(94-92)=6, I: 0.5*(94-90)=2, D: 0.25*(94+91-184)=0.25
        let s = Samples { now: 94, prev: 92, prev2: 91 };
        assert_eq!(gains().output(150, &s), 158);
    }

    #[test]
    fn test_clamped_to_output_range() {
        let cold = Samples::seeded(20);
        assert_eq!(gains().output(120, &cold), 115);

        let hot = Samples { now: 120, prev: 100, prev2: 90 };
        assert_eq!(gains().output(250, &hot), 255);
    }

    #[test]
    fn test_well_formed() {
        assert!(gains().is_well_formed());
        assert!(PidGains::default().is_well_formed());

        let nan_floor = PidGains { min_output: f64::NAN, ..gains() };
        assert!(!nan_floor.is_well_formed());
        let infinite_gain = PidGains { ki: f64::INFINITY, ..gains() };
        assert!(!infinite_gain.is_well_formed());
        let inverted = PidGains { min_output: 200.0, max_output: 150.0, ..gains() };
        assert!(!inverted.is_well_formed());
        let above_max = PidGains { max_output: 300.0, ..gains() };
        assert!(!above_max.is_well_formed());
        let negative = PidGains { min_output: -1.0, ..gains() };
        assert!(!negative.is_well_formed());
    }

    #[test]
    fn test_untuned() {
        assert!(PidGains::default().is_untuned());
        assert!(!gains().is_untuned());
    }
}
