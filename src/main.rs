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

//! Chassisfan daemon (chassisfand)
//!
//! Reads chassis temperatures, drives fan tray and PSU duty, and falls back
//! to full speed when sensors or fans fail. Runs detached unless started
//! with `--foreground`.

use anyhow::{anyhow, Context};
use tracing::info;

use cf_core::hw::Watchdog;
use cf_core::PlatformConfig;
use chassisfan::cli::{self, Action, Options, VERSION};
use chassisfan::{logging, ControllerState};

fn load_platform(options: &Options) -> anyhow::Result<PlatformConfig> {
    if let Some(path) = &options.config {
        return PlatformConfig::load(path)
            .with_context(|| format!("failed to load platform description {}", path.display()));
    }
    PlatformConfig::preset(&options.preset)
        .ok_or_else(|| anyhow!("unknown preset '{}' (expected v1 or v2)", options.preset))
}

fn daemonize() -> anyhow::Result<()> {
    // SAFETY: daemon(3) forks and detaches; no other threads exist yet and
    // nothing has been opened that the child must not inherit.
    if unsafe { libc::daemon(1, 0) } != 0 {
        return Err(std::io::Error::last_os_error()).context("failed to daemonize");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let options = match cli::parse_args(&args) {
        Ok(Action::Run(options)) => options,
        Ok(Action::Help) => {
            cli::print_help();
            return Ok(());
        }
        Ok(Action::Version) => {
            println!("chassisfand {}", VERSION);
            return Ok(());
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            cli::print_help();
            std::process::exit(1);
        }
    };

    let config = load_platform(&options)?;
    if options.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    if !options.foreground {
        daemonize()?;
    }

    let journald = logging::init();
    info!("STARTUP: chassisfand {} starting", VERSION);
    info!("STARTUP: logging to {}", if journald { "systemd journal" } else { "stdout" });

    ctrlc::set_handler(|| {
        info!("SIGNAL: termination requested, exiting with watchdog still armed");
        std::process::exit(0);
    })
    .context("failed to install signal handler")?;

    let mut controller = ControllerState::new(config, options.tuning.as_deref())
        .context("failed to initialise controller")?;
    let mut watchdog = Watchdog::start(&controller.config().watchdog, controller.bus());
    controller.start();
    controller.run(&mut watchdog)
}
