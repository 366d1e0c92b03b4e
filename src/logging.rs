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

//! Log subscriber setup
//!
//! systemd journal when its socket is present, stdout otherwise. The filter
//! comes from `CHASSISFAN_LOG` (default `info`).

use std::path::Path;

use tracing_subscriber::prelude::*;

pub const LOG_ENV: &str = "CHASSISFAN_LOG";
const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

fn init_stdout(level: &str) {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(level)
        .init();
}

/// Install the global subscriber; returns true when logging to the journal
pub fn init() -> bool {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if !Path::new(JOURNAL_SOCKET).exists() {
        init_stdout(&level);
        return false;
    }

    match tracing_journald::layer() {
        Ok(journald) => {
            tracing_subscriber::registry()
                .with(journald)
                .with(tracing_subscriber::EnvFilter::new(&level))
                .init();
            true
        }
        Err(e) => {
            eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            init_stdout(&level);
            false
        }
    }
}
