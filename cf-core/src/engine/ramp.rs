//! Two-point ramp line
//!
//! Duty is interpolated on the line between `begin` and `end`. On a rising
//! temperature the line is followed directly. On a steady or falling one the
//! line is inverted at the previous duty to get the fall-back temperature,
//! and duty only drops once the reading is more than `hysteresis` degrees
//! below it.

use serde::{Deserialize, Serialize};

use crate::hw::sensor::Samples;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampPoint {
    pub temp: i32,
    pub duty: u8,
}

impl RampPoint {
    pub const fn new(temp: i32, duty: u8) -> Self {
        Self { temp, duty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampLine {
    pub begin: RampPoint,
    pub end: RampPoint,
    #[serde(default)]
    pub hysteresis: i32,
}

impl RampLine {
    pub const fn new(begin: RampPoint, end: RampPoint) -> Self {
        Self { begin, end, hysteresis: 0 }
    }

    pub const fn with_hysteresis(mut self, hysteresis: i32) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Duty per degree; zero for a degenerate line
    pub fn slope(&self) -> f64 {
        let span = self.end.temp - self.begin.temp;
        if span <= 0 {
            return 0.0;
        }
        (self.end.duty as f64 - self.begin.duty as f64) / span as f64
    }

    /// Duty on the line at `temp`, clamped to the line's duty range
    pub fn duty_at(&self, temp: i32) -> u8 {
        let k = self.slope();
        if k == 0.0 {
            return self.begin.duty;
        }
        let raw = (k * (temp - self.begin.temp) as f64 + self.begin.duty as f64) as i64;
        raw.clamp(self.begin.duty as i64, self.end.duty as i64) as u8
    }

    /// Temperature that would have produced `prev_duty`
    pub fn fall_temp(&self, prev_duty: u8) -> i32 {
        let k = self.slope();
        if k == 0.0 {
            return self.begin.temp;
        }
        let raw = ((prev_duty as f64 + 1.0 - self.begin.duty as f64) / k + self.begin.temp as f64) as i32;
        raw.clamp(self.begin.temp, self.end.temp)
    }

    /// Requested duty for the current history and the duty applied last cycle
    pub fn speed(&self, samples: &Samples, prev_duty: u8) -> u8 {
        let temp = if samples.rising() {
            samples.now
        } else {
            let fall = self.fall_temp(prev_duty);
            if fall - samples.now <= self.hysteresis {
                fall
            } else {
                samples.now
            }
        };
        self.duty_at(temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> RampLine {
        RampLine::new(RampPoint::new(25, 115), RampPoint::new(40, 255)).with_hysteresis(2)
    }

    /// Drive the line the way the control loop does: the result of one step
    /// is the previous duty of the next.
    fn run(line: &RampLine, temps: &[i32], start: u8) -> Vec<u8> {
        let mut samples = Samples::seeded(temps[0]);
        let mut duty = start;
        let mut out = Vec::new();
        for (i, &t) in temps.iter().enumerate() {
            if i > 0 {
                samples.push(t);
            }
            duty = line.speed(&samples, duty);
            out.push(duty);
        }
        out
    }

    #[test]
    fn test_duty_at_endpoints_and_clamp() {
        let l = line();
        assert_eq!(l.duty_at(25), 115);
        assert_eq!(l.duty_at(40), 255);
        assert_eq!(l.duty_at(10), 115);
        assert_eq!(l.duty_at(60), 255);
        assert_eq!(l.duty_at(32), 180);
    }

    #[test]
    fn test_duty_monotonic_in_temperature() {
        let l = line();
        let mut last = 0;
        for t in 0..60 {
            let d = l.duty_at(t);
            assert!(d >= last, "duty dropped at {}", t);
            last = d;
        }
    }

    #[test]
    fn test_fall_temp_inverts_the_line() {
        let l = line();
        assert_eq!(l.fall_temp(180), 32);
        assert_eq!(l.duty_at(l.fall_temp(180)), 180);
        assert_eq!(l.fall_temp(0), 25);
        assert_eq!(l.fall_temp(255), 40);
    }

    #[test]
    fn test_small_dip_holds_duty() {
        let duties = run(&line(), &[30, 32, 31], 115);
        assert_eq!(duties[1], 180);
        assert_eq!(duties[2], 180);
    }

    #[test]
    fn test_drop_beyond_hysteresis_follows_line() {
        let duties = run(&line(), &[30, 32, 31, 30, 29], 115);
        assert_eq!(&duties[1..], &[180, 180, 180, 152]);
    }

    #[test]
    fn test_degenerate_line_returns_begin_duty() {
        let flat = RampLine::new(RampPoint::new(30, 200), RampPoint::new(30, 255));
        assert_eq!(flat.speed(&Samples::seeded(50), 100), 200);
    }

    #[test]
    fn test_same_sequence_same_duties() {
        let temps = [26, 29, 35, 34, 31, 27, 40, 41, 38];
        assert_eq!(run(&line(), &temps, 128), run(&line(), &temps, 128));
    }
}
