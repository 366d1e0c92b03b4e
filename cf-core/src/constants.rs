//! Constants and configuration defaults for Chassisfan
//!
//! Centralizes the magic numbers of the control loop. Values that differ
//! between platform generations live in `config` presets; what is here is
//! shared by all of them.

/// Duty cycle scale
pub mod duty {
    /// Full speed on the internal 0-255 scale
    pub const MAX: u8 = 255;

    /// Startup duty written before the first control cycle
    pub const MEDIUM: u8 = 128;

    /// Convert an internal duty to the PSU percentage scale (truncating)
    #[inline]
    pub fn to_percent(duty: u8) -> u8 {
        (duty as u32 * 100 / MAX as u32) as u8
    }

    /// Convert a PSU percentage back to the internal scale (truncating)
    #[inline]
    pub fn from_percent(percent: u8) -> u8 {
        (percent.min(100) as u32 * MAX as u32 / 100) as u8
    }
}

/// Temperature handling
pub mod temperature {
    /// Control nodes report millidegrees
    pub const MILLIDEGREE_DIVISOR: i64 = 1000;
}

/// Sensor loss handling
pub mod sensor {
    /// Consecutive failed reads before a zone forces full speed
    pub const ERROR_TEMP_MAX: u8 = 5;
}

/// Fan and PSU tachometer checks
pub mod fan {
    /// Below this RPM a fan half is considered stalled
    pub const FAIL_RPM: u32 = 1000;

    /// Consecutive bad reads before a half counts as failed (v2)
    pub const FAIL_COUNT: u8 = 10;

    /// Consecutive absent cycles before a missing tray counts as failed
    pub const ABSENT_GRACE_CYCLES: u32 = 3;

    /// At full duty a half must reach (100 - slop)% of its rated RPM
    pub const FAILURE_SLOP_PERCENT: u32 = 30;

    pub const FRONT_SPEED_MAX: u32 = 18000;
    pub const REAR_SPEED_MAX: u32 = 18000;
    pub const PSU_SPEED_MAX: u32 = 26496;

    /// Presence node value meaning "installed"
    pub const PRESENT: i64 = 0;

    /// PSU status node value meaning "powered off"
    pub const POWERED_OFF: i64 = 0;
}

/// Indicator LED values
pub mod led {
    pub const GREEN: i64 = 1;
    pub const RED: i64 = 2;
}

/// PSU speed control register
pub mod psu {
    pub const SPEED_CTRL_NODE: &str = "fan1_cfg";
    pub const SPEED_CTRL_ENABLE: i64 = 0x90;
    pub const RPM_NODE: &str = "fan1_input";
    pub const PERCENT_NODE: &str = "fan1_pct";

    /// Independent PSU curve bounds, in percent
    pub const INDEPENDENT_LOW_PERCENT: u8 = 45;
    pub const INDEPENDENT_HIGH_PERCENT: u8 = 100;
}

/// Alarm thresholds
pub mod alarm {
    /// Consecutive reads over a threshold before the alarm is raised (v2)
    pub const START_REPORT: u32 = 3;

    /// Consecutive reads under threshold minus margin before it clears
    pub const RECOVERY_COUNT: u32 = 100;

    /// Degrees below the threshold a zone must fall to count as recovering
    pub const MARGIN: i32 = 1;
}

/// Loop timing
pub mod timing {
    /// Delay after every control-node access
    pub const IO_DELAY_MS: u64 = 11;

    /// Settling time between actuation and the tachometer check
    pub const POLL_INTERVAL_MS: u64 = 3000;

    /// Warm-up sleep before the first cycle
    pub const WARMUP_MS: u64 = 5000;

    /// Cycles between periodic status lines
    pub const REPORT_INTERVAL: u64 = 720;
}

/// Chassis watchdog
pub mod watchdog {
    pub const TIMEOUT_SECS: i64 = 60;
    pub const ENABLE_NODE: &str = "/sys/bus/i2c/devices/i2c-8/8-000d/wdt_en";
    pub const TIMEOUT_NODE: &str = "/sys/bus/i2c/devices/i2c-8/8-000d/wdt_time";
    pub const DEVICE: &str = "/dev/watchdog";
}

/// Node paths
pub mod paths {
    pub const FAN_CPLD: &str = "/sys/bus/i2c/devices/i2c-8/8-000d";
    pub const SYS_CPLD: &str = "/sys/bus/i2c/devices/i2c-0/0-000d";
    pub const PSU_LED: &str = "psu_led";

    /// Optional tuning file read at startup
    pub const TUNING_FILE: &str = "/mnt/data/pid_config_v2.ini";
    pub const TUNING_FILE_V1: &str = "/mnt/data/pid_config.ini";

    /// Directory entries accepted when probing an hwmon device
    pub const HWMON_DIR_PATTERN: &str = r"^hwmon\d+$";

    /// Fan EEPROM marker identifying front-to-back airflow units
    pub const F2B_MARKER: &str = "R1241-F9001";
}
