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

//! Command-line handling for `chassisfand`

use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub foreground: bool,
    pub config: Option<PathBuf>,
    pub preset: String,
    pub tuning: Option<PathBuf>,
    pub print_config: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            foreground: false,
            config: None,
            preset: "v2".to_string(),
            tuning: None,
            print_config: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(Options),
    Help,
    Version,
}

/// Parse arguments, program name excluded
pub fn parse_args(args: &[&str]) -> Result<Action, String> {
    let mut options = Options::default();
    let mut iter = args.iter().copied();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .map(str::to_string)
                .ok_or_else(|| format!("{} requires an argument", flag))
        };
        match arg {
            "-h" | "--help" => return Ok(Action::Help),
            "-v" | "--version" => return Ok(Action::Version),
            "-f" | "--foreground" => options.foreground = true,
            "-c" | "--config" => options.config = Some(PathBuf::from(value(arg)?)),
            "-t" | "--tuning" => options.tuning = Some(PathBuf::from(value(arg)?)),
            "--preset" => options.preset = value(arg)?,
            "--print-config" => options.print_config = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(Action::Run(options))
}

pub fn print_help() {
    eprintln!("chassisfand {} - chassis thermal and fan control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    chassisfand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -f, --foreground      Run in foreground (don't daemonize)");
    eprintln!("    -c, --config PATH     Platform description (JSON) replacing the preset");
    eprintln!("        --preset NAME     Built-in platform: v2 (default) or v1");
    eprintln!("    -t, --tuning PATH     Tuning file (default depends on the platform)");
    eprintln!("        --print-config    Print the selected platform as JSON and exit");
    eprintln!("    -v, --version         Print version");
    eprintln!("    -h, --help            Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    CHASSISFAN_LOG        Log level (trace, debug, info, warn, error)");
}
