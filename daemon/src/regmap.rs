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

//! Register map descriptions.
//!
//! Each JSON file in the configuration directory describes one device
//! model: which Modbus address range it claims, how to probe for it,
//! its baud rates, and the register blocks to poll. The database loads
//! every map at startup and answers "which map owns address X".

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RackmonError;

/// Interpretation of a register block's raw words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterFormat {
    #[default]
    Hex,
    String,
    Integer,
    Float,
    Flags,
}

/// One named bit within a flags-format register block.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagDescriptor(pub u8, pub String);

/// One contiguous block of holding registers to monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDescriptor {
    pub begin: u16,
    pub length: u16,
    /// History depth; 1 keeps only the latest reading.
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(default)]
    pub format: RegisterFormat,
    pub name: String,
    /// For float format: value = raw / 2^scale.
    #[serde(default)]
    pub scale: u32,
    #[serde(default)]
    pub flags: Vec<FlagDescriptor>,
}

fn default_keep() -> usize {
    1
}

/// How to change a device's baud rate: write one of `baud_value_map`'s
/// values to register `reg`.
#[derive(Debug, Clone, Deserialize)]
pub struct BaudConfig {
    pub reg: u16,
    /// Pairs of (baudrate, register value).
    pub baud_value_map: Vec<(u32, u16)>,
}

impl BaudConfig {
    pub fn value_for(&self, baudrate: u32) -> Option<u16> {
        self.baud_value_map
            .iter()
            .find(|(baud, _)| *baud == baudrate)
            .map(|(_, value)| *value)
    }
}

/// One device model's register map.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMap {
    pub name: String,
    /// Inclusive range of Modbus addresses this model may answer at.
    pub address_range: (u8, u8),
    /// Register read to decide whether a device is present.
    pub probe_register: u16,
    pub default_baudrate: u32,
    #[serde(default)]
    pub preferred_baudrate: u32,
    pub baud_config: Option<BaudConfig>,
    pub registers: Vec<RegisterDescriptor>,
}

impl RegisterMap {
    pub fn contains(&self, addr: u8) -> bool {
        addr >= self.address_range.0 && addr <= self.address_range.1
    }

    fn validate(&self) -> Result<(), String> {
        if self.address_range.0 > self.address_range.1 {
            return Err(format!(
                "map '{}': address_range [{}, {}] is inverted",
                self.name, self.address_range.0, self.address_range.1
            ));
        }
        for desc in &self.registers {
            if desc.length == 0 {
                return Err(format!(
                    "map '{}': register block '{}' has zero length",
                    self.name, desc.name
                ));
            }
            if desc.keep == 0 {
                return Err(format!(
                    "map '{}': register block '{}' keeps no history",
                    self.name, desc.name
                ));
            }
        }
        Ok(())
    }
}

/// All loaded register maps, indexed by the low end of each map's
/// address range.
#[derive(Debug, Default)]
pub struct RegisterMapDatabase {
    maps: BTreeMap<u8, Arc<RegisterMap>>,
}

impl RegisterMapDatabase {
    /// Load every `*.json` file under `dir`. A missing or empty
    /// directory yields an empty database; a malformed map file is an
    /// error.
    pub fn load(dir: &Path) -> Result<Self, RackmonError> {
        let mut db = Self::default();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("register map directory {} does not exist", dir.display());
                return Ok(db);
            }
            Err(e) => {
                return Err(RackmonError::ConfigRead {
                    file: dir.to_path_buf(),
                    e,
                });
            }
        };
        for entry in entries {
            let path = entry
                .map_err(|e| RackmonError::ConfigRead {
                    file: dir.to_path_buf(),
                    e,
                })?
                .path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let contents = fs::read_to_string(&path).map_err(|e| RackmonError::ConfigRead {
                file: path.clone(),
                e,
            })?;
            let map: RegisterMap =
                serde_json::from_str(&contents).map_err(|e| RackmonError::ConfigParse {
                    file: path.clone(),
                    e,
                })?;
            map.validate().map_err(RackmonError::Argument)?;
            db.insert(map)?;
            info!("loaded register map from {}", path.display());
        }
        Ok(db)
    }

    fn insert(&mut self, map: RegisterMap) -> Result<(), RackmonError> {
        for existing in self.maps.values() {
            if map.address_range.0 <= existing.address_range.1
                && existing.address_range.0 <= map.address_range.1
            {
                return Err(RackmonError::Argument(format!(
                    "map '{}' address range [{}, {}] overlaps map '{}'",
                    map.name, map.address_range.0, map.address_range.1, existing.name
                )));
            }
        }
        self.maps.insert(map.address_range.0, Arc::new(map));
        Ok(())
    }

    /// The map claiming `addr`, if any.
    pub fn find(&self, addr: u8) -> Option<Arc<RegisterMap>> {
        self.maps
            .values()
            .find(|map| map.contains(addr))
            .cloned()
    }

    /// Every address any map claims, ascending. This is the probe scan
    /// order.
    pub fn all_addresses(&self) -> Vec<u8> {
        self.maps
            .values()
            .flat_map(|map| map.address_range.0..=map.address_range.1)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
