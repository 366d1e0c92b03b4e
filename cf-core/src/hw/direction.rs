//! Airflow direction detection from fan tray EEPROMs
//!
//! Front-to-back trays carry a known part number in their EEPROM. Each
//! readable EEPROM casts one vote; unreadable ones abstain. A tie, or no
//! votes at all, falls back to the given default.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::{Direction, FanTrayConfig};
use crate::{ChassisFanError, Result};

/// Whether an EEPROM image names the front-to-back part
fn eeprom_vote(path: &Path, marker: &str) -> Result<Direction> {
    let bytes = fs::read(path).map_err(|e| ChassisFanError::NodeRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let needle = marker.as_bytes();
    let found = !needle.is_empty() && bytes.windows(needle.len()).any(|w| w == needle);
    Ok(if found { Direction::F2b } else { Direction::B2f })
}

/// Majority vote over all trays with an EEPROM
pub fn detect(fans: &[FanTrayConfig], marker: &str, default: Direction) -> Direction {
    let mut f2b = 0usize;
    let mut b2f = 0usize;

    for tray in fans {
        let Some(eeprom) = &tray.eeprom else {
            continue;
        };
        match eeprom_vote(eeprom, marker) {
            Ok(Direction::F2b) => f2b += 1,
            Ok(Direction::B2f) => b2f += 1,
            Err(e) => warn!(tray = %tray.name, error = %e, "STARTUP: fan EEPROM unreadable, skipping vote"),
        }
    }

    let direction = if f2b > b2f {
        Direction::F2b
    } else if b2f > f2b {
        Direction::B2f
    } else {
        default
    };
    info!(f2b, b2f, %direction, "STARTUP: airflow direction detected");
    direction
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MARKER: &str = "R1241-F9001";

    fn trays(dir: &Path, images: &[Option<&[u8]>]) -> Vec<FanTrayConfig> {
        images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                let path = dir.join(format!("eeprom{}", i));
                if let Some(bytes) = image {
                    fs::write(&path, bytes).unwrap();
                }
                FanTrayConfig::numbered(i, dir, Some(path))
            })
            .collect()
    }

    #[test]
    fn test_majority_wins() {
        let dir = TempDir::new().unwrap();
        let f2b: &[u8] = b"\x00\x01CLS R1241-F9001 fan\xff";
        let b2f: &[u8] = b"\x00\x01CLS R1241-F9002 fan\xff";
        let fans = trays(dir.path(), &[Some(b2f), Some(b2f), Some(f2b)]);
        assert_eq!(detect(&fans, MARKER, Direction::F2b), Direction::B2f);
    }

    #[test]
    fn test_unreadable_eeproms_abstain() {
        let dir = TempDir::new().unwrap();
        let f2b: &[u8] = b"R1241-F9001";
        let fans = trays(dir.path(), &[Some(f2b), None, Some(f2b), None, Some(f2b)]);
        assert_eq!(detect(&fans, MARKER, Direction::B2f), Direction::F2b);
    }

    #[test]
    fn test_tie_uses_default() {
        let dir = TempDir::new().unwrap();
        let f2b: &[u8] = b"R1241-F9001";
        let b2f: &[u8] = b"other";
        let fans = trays(dir.path(), &[Some(f2b), Some(b2f)]);
        assert_eq!(detect(&fans, MARKER, Direction::F2b), Direction::F2b);

        let empty = TempDir::new().unwrap();
        let none = trays(empty.path(), &[None, None]);
        assert_eq!(detect(&none, MARKER, Direction::F2b), Direction::F2b);
    }

    #[test]
    fn test_trays_without_eeprom_are_ignored() {
        let fans = vec![FanTrayConfig::numbered(0, &PathBuf::from("/nonexistent"), None)];
        assert_eq!(detect(&fans, MARKER, Direction::B2f), Direction::B2f);
    }
}
