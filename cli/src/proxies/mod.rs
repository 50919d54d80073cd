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

//! DBus proxy interfaces for the rackmond daemon.
//!
//! Auto-generated proxy traits for talking to rackmond over the system
//! DBus, built with the `zbus` crate's `#[proxy]` macro.
//!
//! # DBus Service Information
//!
//! - **Service Name**: `org.openbmc.rackmond`
//! - **Status Interface**: `org.openbmc.rackmond.status` at `/org/openbmc/rackmond/status`
//! - **Control Interface**: `org.openbmc.rackmond.control` at `/org/openbmc/rackmond/control`

pub mod control_proxy;
pub mod status_proxy;
