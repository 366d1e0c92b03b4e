//! Zone warning thresholds
//!
//! A zone raises an alarm after `start_report` consecutive reads at or above
//! its threshold. Once raised, readings within `margin` below the threshold
//! keep it raised. The high alarm clears on the first read under
//! `threshold - margin`; the low alarm needs `recovery_count` such reads.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::constants::alarm;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlarmFlags: u8 {
        const HIGH_WARN = 0b01;
        const LOW_WARN = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmLimits {
    pub start_report: u32,
    pub recovery_count: u32,
    pub margin: i32,
}

impl Default for AlarmLimits {
    fn default() -> Self {
        Self {
            start_report: alarm::START_REPORT,
            recovery_count: alarm::RECOVERY_COUNT,
            margin: alarm::MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmEvent {
    HighRaised { temp: i32, threshold: i32 },
    HighCleared { temp: i32 },
    LowRaised { temp: i32, threshold: i32 },
    LowCleared { temp: i32 },
}

/// Alarm state of one zone
#[derive(Debug, Clone)]
pub struct AlarmState {
    pub flags: AlarmFlags,
    pub warn_streak: u32,
}

impl Default for AlarmState {
    fn default() -> Self {
        Self {
            flags: AlarmFlags::empty(),
            warn_streak: 0,
        }
    }
}

impl AlarmState {
    fn in_band(&self, flag: AlarmFlags, threshold: Option<i32>, temp: i32, margin: i32) -> bool {
        threshold.is_some_and(|t| temp >= t || (self.flags.contains(flag) && t - temp <= margin))
    }

    /// Fold one reading in; returns the transitions it caused
    pub fn evaluate(
        &mut self,
        temp: i32,
        low_warn: Option<i32>,
        high_warn: Option<i32>,
        limits: &AlarmLimits,
    ) -> Vec<AlarmEvent> {
        let mut events = Vec::new();

        if self.in_band(AlarmFlags::HIGH_WARN, high_warn, temp, limits.margin) {
            if self.flags.contains(AlarmFlags::HIGH_WARN) {
                self.warn_streak = 0;
            } else {
                self.warn_streak += 1;
                if self.warn_streak >= limits.start_report {
                    self.flags.insert(AlarmFlags::HIGH_WARN);
                    self.warn_streak = 0;
                    events.push(AlarmEvent::HighRaised {
                        temp,
                        threshold: high_warn.unwrap_or(temp),
                    });
                }
            }
            return events;
        }

        if self.flags.contains(AlarmFlags::HIGH_WARN) {
            self.flags.remove(AlarmFlags::HIGH_WARN);
            self.warn_streak = 0;
            events.push(AlarmEvent::HighCleared { temp });
        }

        if self.in_band(AlarmFlags::LOW_WARN, low_warn, temp, limits.margin) {
            if self.flags.contains(AlarmFlags::LOW_WARN) {
                self.warn_streak = 0;
            } else {
                self.warn_streak += 1;
                if self.warn_streak >= limits.start_report {
                    self.flags.insert(AlarmFlags::LOW_WARN);
                    self.warn_streak = 0;
                    events.push(AlarmEvent::LowRaised {
                        temp,
                        threshold: low_warn.unwrap_or(temp),
                    });
                }
            }
        } else if self.flags.contains(AlarmFlags::LOW_WARN) {
            self.warn_streak += 1;
            if self.warn_streak >= limits.recovery_count {
                self.flags.remove(AlarmFlags::LOW_WARN);
                self.warn_streak = 0;
                events.push(AlarmEvent::LowCleared { temp });
            }
        } else {
            self.warn_streak = 0;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> AlarmLimits {
        AlarmLimits { start_report: 3, recovery_count: 4, margin: 1 }
    }

    fn feed(state: &mut AlarmState, temps: &[i32]) -> Vec<AlarmEvent> {
        temps
            .iter()
            .flat_map(|&t| state.evaluate(t, Some(40), Some(43), &limits()))
            .collect()
    }

    #[test]
    fn test_high_alarm_needs_consecutive_reads() {
        let mut state = AlarmState::default();
        assert!(feed(&mut state, &[43, 44]).is_empty());
        assert_eq!(feed(&mut state, &[45]), vec![AlarmEvent::HighRaised { temp: 45, threshold: 43 }]);
        assert!(state.flags.contains(AlarmFlags::HIGH_WARN));
    }

    #[test]
    fn test_interrupted_streak_starts_over() {
        let mut state = AlarmState::default();
        assert!(feed(&mut state, &[43, 44, 30, 43, 43]).is_empty());
        assert!(state.flags.is_empty());
    }

    #[test]
    fn test_high_alarm_holds_within_margin_then_clears() {
        let mut state = AlarmState::default();
        feed(&mut state, &[43, 43, 43]);
        assert!(feed(&mut state, &[42]).is_empty());
        assert!(state.flags.contains(AlarmFlags::HIGH_WARN));

        let events = feed(&mut state, &[41]);
        assert_eq!(events[0], AlarmEvent::HighCleared { temp: 41 });
        assert!(!state.flags.contains(AlarmFlags::HIGH_WARN));
    }

    #[test]
    fn test_low_alarm_recovery_takes_several_reads() {
        let mut state = AlarmState::default();
        let raised = feed(&mut state, &[40, 41, 40]);
        assert_eq!(raised, vec![AlarmEvent::LowRaised { temp: 40, threshold: 40 }]);

        assert!(feed(&mut state, &[30, 30, 30]).is_empty());
        assert_eq!(feed(&mut state, &[30]), vec![AlarmEvent::LowCleared { temp: 30 }]);
        assert!(state.flags.is_empty());
    }

    #[test]
    fn test_disabled_thresholds_never_alarm() {
        let mut state = AlarmState::default();
        for _ in 0..10 {
            assert!(state.evaluate(150, None, None, &limits()).is_empty());
        }
    }
}
