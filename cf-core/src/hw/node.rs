//! Control-node accessor
//!
//! A control node holds one text-encoded value. Reads accept the first
//! whitespace-delimited token as decimal or `0x` hex. Writes never create
//! nodes, matching sysfs where a missing attribute cannot be created.
//!
//! hwmon directories are renumbered across boots, so nodes under
//! `<device>/hwmon/hwmonN/` are located by probing and then cached.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::paths;
use crate::{ChassisFanError, Result};

/// How a node path is turned into a readable file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// `<prefix>/<suffix>`, never probed
    #[default]
    Direct,
    /// `<prefix>/hwmon/hwmonN/<suffix>`
    Probed,
    /// Direct if it exists, otherwise probed
    DirectOrProbed,
}

/// Parse a node's content: first token, decimal or `0x` hex
pub fn parse_int(raw: &str) -> Option<i64> {
    let token = raw.split_whitespace().next()?;
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Read one integer from a control node
pub fn read_int(path: &Path) -> Result<i64> {
    let raw = fs::read_to_string(path).map_err(|source| ChassisFanError::NodeRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_int(&raw).ok_or_else(|| ChassisFanError::NodeParse {
        path: path.to_path_buf(),
        raw: raw.trim().to_string(),
    })
}

/// Write one integer to an existing control node
pub fn write_int(path: &Path, value: i64) -> Result<()> {
    let map = |source| ChassisFanError::NodeWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new().write(true).truncate(true).open(path).map_err(map)?;
    file.write_all(value.to_string().as_bytes()).map_err(map)
}

fn hwmon_dir_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(paths::HWMON_DIR_PATTERN))
        .as_ref()
        .map_err(|e| ChassisFanError::generic(format!("bad hwmon pattern: {}", e)))
}

/// Find `<prefix>/hwmon/hwmonN/<suffix>` for the lowest N that provides it
pub fn probe_hwmon(prefix: &Path, suffix: &str) -> Result<PathBuf> {
    let hwmon_root = prefix.join("hwmon");
    let not_found = || ChassisFanError::NodeNotFound {
        prefix: prefix.to_path_buf(),
        suffix: suffix.to_string(),
    };

    let pattern = hwmon_dir_pattern()?;
    let entries = fs::read_dir(&hwmon_root).map_err(|_| not_found())?;
    let mut candidates: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !pattern.is_match(&name) {
                return None;
            }
            let index = name.trim_start_matches("hwmon").parse::<u32>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    candidates.sort_by_key(|(index, _)| *index);

    candidates
        .into_iter()
        .map(|(_, dir)| dir.join(suffix))
        .find(|path| path.exists())
        .ok_or_else(not_found)
}

/// Resolve a node once and keep the answer for the rest of the run
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    resolved: Option<PathBuf>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached path, if one was resolved
    pub fn cached(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    /// Return the cached path, re-resolving only when a probed path vanished
    pub fn resolve(&mut self, prefix: &Path, suffix: &str, strategy: ReadStrategy) -> Result<PathBuf> {
        if let Some(path) = &self.resolved {
            if strategy == ReadStrategy::Direct || path.exists() {
                return Ok(path.clone());
            }
            debug!(path = %path.display(), "NODE: cached path vanished, probing again");
            self.resolved = None;
        }

        let direct = prefix.join(suffix);
        let path = match strategy {
            ReadStrategy::Direct => direct,
            ReadStrategy::Probed => probe_hwmon(prefix, suffix)?,
            ReadStrategy::DirectOrProbed if direct.exists() => direct,
            ReadStrategy::DirectOrProbed => probe_hwmon(prefix, suffix)?,
        };
        self.resolved = Some(path.clone());
        Ok(path)
    }
}

/// Throttled access to the control-node namespace
///
/// Every read or write is followed by a short pause so a full cycle does not
/// saturate the shared I2C bus behind the nodes.
#[derive(Debug, Clone)]
pub struct NodeBus {
    io_delay: Duration,
}

impl NodeBus {
    pub fn new(io_delay: Duration) -> Self {
        Self { io_delay }
    }

    /// A bus without pauses
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn read_int(&self, path: &Path) -> Result<i64> {
        let result = read_int(path);
        if let Err(e) = &result {
            debug!(path = %path.display(), error = %e, "NODE: read failed");
        }
        self.pause();
        result
    }

    pub fn write_int(&self, path: &Path, value: i64) -> Result<()> {
        let result = write_int(path, value);
        if let Err(e) = &result {
            debug!(path = %path.display(), value, error = %e, "NODE: write failed");
        }
        self.pause();
        result
    }

    fn pause(&self) {
        if !self.io_delay.is_zero() {
            thread::sleep(self.io_delay);
        }
    }
}
