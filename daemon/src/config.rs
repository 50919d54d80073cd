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

use std::time::Duration;

/// Directory scanned for register map description files (`*.json`), one per
/// supported device family. Override with `RACKMOND_CONF_DIR`.
pub static DEFAULT_CONF_DIR: &str = "/etc/rackmon.d";

/// The RS-485 tty the rack power shelves hang off on most BMC boards.
/// Override with `RACKMOND_TTYS` (comma-separated, one bus per path).
pub static DEFAULT_TTY: &str = "/dev/ttyS3";

/// How long to wait for a device to answer a request before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Check for newly connected (or recovered) devices this often.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(120);

/// Refresh monitored register data this often.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime service configuration, assembled from environment overrides on
/// top of the defaults above. Mirrors the `RACKMOND_*` variables the
/// daemon has always honored.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub conf_dir: String,
    pub ttys: Vec<String>,
    pub timeout: Duration,
    pub min_delay: Duration,
    pub scan_interval: Duration,
    pub monitor_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            conf_dir: DEFAULT_CONF_DIR.to_string(),
            ttys: vec![DEFAULT_TTY.to_string()],
            timeout: DEFAULT_TIMEOUT,
            min_delay: Duration::ZERO,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from the process environment.
    ///
    /// Recognized variables:
    /// - `RACKMOND_CONF_DIR` - register map directory
    /// - `RACKMOND_TTYS` - comma-separated serial device paths
    /// - `RACKMOND_TIMEOUT_MS` - per-command response timeout
    /// - `RACKMOND_MIN_DELAY_MS` - minimum delay between bus commands
    /// - `RACKMOND_SCAN_INTERVAL_S` - device scan period
    /// - `RACKMOND_MONITOR_INTERVAL_S` - data refresh period
    ///
    /// Unparseable values fall back to the default for that field.
    pub fn from_env() -> Self {
        let mut cfg = ServiceConfig::default();
        if let Ok(dir) = std::env::var("RACKMOND_CONF_DIR") {
            cfg.conf_dir = dir;
        }
        if let Ok(ttys) = std::env::var("RACKMOND_TTYS") {
            let paths: Vec<String> = ttys
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !paths.is_empty() {
                cfg.ttys = paths;
            }
        }
        if let Some(ms) = env_u64("RACKMOND_TIMEOUT_MS") {
            cfg.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("RACKMOND_MIN_DELAY_MS") {
            cfg.min_delay = Duration::from_millis(ms);
        }
        if let Some(s) = env_u64("RACKMOND_SCAN_INTERVAL_S") {
            cfg.scan_interval = Duration::from_secs(s.max(1));
        }
        if let Some(s) = env_u64("RACKMOND_MONITOR_INTERVAL_S") {
            cfg.monitor_interval = Duration::from_secs(s.max(1));
        }
        cfg
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
