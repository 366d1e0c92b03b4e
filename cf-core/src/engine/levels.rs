//! Stepped level table
//!
//! An ascending list of (temperature, duty) steps. Rising temperatures pick
//! the highest step reached and never lower the duty; falling temperatures
//! use each step's temperature minus the hysteresis and never raise it.

use serde::{Deserialize, Serialize};

use crate::hw::sensor::Samples;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStep {
    pub temp: i32,
    pub duty: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    pub steps: Vec<LevelStep>,
    #[serde(default)]
    pub hysteresis: i32,
}

impl LevelTable {
    pub fn new(steps: &[(i32, u8)], hysteresis: i32) -> Self {
        Self {
            steps: steps.iter().map(|&(temp, duty)| LevelStep { temp, duty }).collect(),
            hysteresis,
        }
    }

    fn step_for(&self, temp: i32, offset: i32) -> u8 {
        self.steps
            .iter()
            .rev()
            .find(|step| temp >= step.temp - offset)
            .or_else(|| self.steps.first())
            .map(|step| step.duty)
            .unwrap_or(0)
    }

    /// Duty while heating up
    pub fn raising(&self, temp: i32) -> u8 {
        self.step_for(temp, 0)
    }

    /// Duty while cooling down
    pub fn falling(&self, temp: i32) -> u8 {
        self.step_for(temp, self.hysteresis)
    }

    pub fn speed(&self, samples: &Samples, prev_duty: u8) -> u8 {
        if samples.now >= samples.prev {
            self.raising(samples.now).max(prev_duty)
        } else {
            self.falling(samples.now).min(prev_duty)
        }
    }

    /// Strictly ascending temperatures
    pub fn is_ordered(&self) -> bool {
        self.steps.windows(2).all(|w| w[0].temp < w[1].temp)
    }

    /// Override one step, 1-based; out-of-range levels are ignored
    pub fn set_level(&mut self, level: usize, temp: Option<i32>, duty: Option<u8>) -> bool {
        let Some(step) = level.checked_sub(1).and_then(|i| self.steps.get_mut(i)) else {
            return false;
        };
        if let Some(temp) = temp {
            step.temp = temp;
        }
        if let Some(duty) = duty {
            step.duty = duty;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LevelTable {
        LevelTable::new(&[(0, 102), (20, 128), (25, 153), (30, 178), (35, 204), (40, 230)], 2)
    }

    #[test]
    fn test_raising_picks_highest_reached_step() {
        let t = table();
        assert_eq!(t.raising(-5), 102);
        assert_eq!(t.raising(24), 128);
        assert_eq!(t.raising(25), 153);
        assert_eq!(t.raising(99), 230);
    }

    #[test]
    fn test_falling_uses_hysteresis() {
        let t = table();
        assert_eq!(t.falling(28), 178);
        assert_eq!(t.falling(27), 153);
    }

    #[test]
    fn test_speed_never_moves_against_trend() {
        let t = table();
        let warming = Samples { now: 26, prev: 24, prev2: 24 };
        assert_eq!(t.speed(&warming, 204), 204);
        assert_eq!(t.speed(&warming, 128), 153);

        let cooling = Samples { now: 29, prev: 31, prev2: 31 };
        assert_eq!(t.speed(&cooling, 178), 178);
        assert_eq!(t.speed(&cooling, 128), 128);
    }

    #[test]
    fn test_set_level() {
        let mut t = table();
        assert!(t.set_level(1, Some(5), Some(110)));
        assert_eq!(t.steps[0], LevelStep { temp: 5, duty: 110 });
        assert!(!t.set_level(0, Some(1), None));
        assert!(!t.set_level(7, Some(1), None));
        assert!(t.is_ordered());
    }
}
