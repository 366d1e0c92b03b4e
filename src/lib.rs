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

//! Chassisfan daemon library
//!
//! The control loop, command-line handling and log setup behind the
//! `chassisfand` binary. Hardware access and policies live in `cf-core`.

pub mod cli;
pub mod controller;
pub mod logging;

pub use controller::{ControllerState, CycleSummary};
