// This file is part of rackmond, a Modbus/RS-485 rack power-shelf monitoring service.
//
// Copyright 2026 The rackmond authors.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// rackmond is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// rackmond is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Rack power-shelf monitoring over Modbus/RS-485.
//!
//! The daemon scans configured serial buses for power shelf devices
//! described by JSON register maps, polls their holding registers on an
//! interval, and exposes the collected data and raw bus access over
//! D-Bus.

pub mod comm;
pub mod config;
pub mod device;
pub mod error;
pub mod modbus;
pub mod rackmon;
pub mod regmap;
pub mod transport;
