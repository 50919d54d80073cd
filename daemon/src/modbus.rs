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

//! One Modbus bus: a serial transport plus the request/response
//! discipline of an RTU master.
//!
//! Only one exchange can be in flight per bus, so the transport sits
//! behind a mutex and every command holds the lock for the full
//! send/recv cycle.

use std::sync::Mutex;
use std::time::Duration;

use log::debug;

use crate::error::RackmonError;
use crate::transport::Transport;

pub mod wire;

struct TransportState {
    io: Box<dyn Transport>,
    baudrate: u32,
}

/// A single RS-485 bus shared by many devices.
pub struct Modbus {
    state: Mutex<TransportState>,
    default_timeout: Duration,
    /// Quiet time after each exchange, for devices that need a gap
    /// before the next frame.
    min_delay: Duration,
}

impl Modbus {
    pub fn new(
        io: Box<dyn Transport>,
        baudrate: u32,
        default_timeout: Duration,
        min_delay: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(TransportState { io, baudrate }),
            default_timeout,
            min_delay,
        }
    }

    pub fn path(&self) -> String {
        match self.state.lock() {
            Ok(state) => state.io.path().to_string(),
            Err(_) => String::from("<poisoned>"),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send `req` (without CRC), wait for `expected_len` on-wire bytes,
    /// and return the CRC-checked payload.
    ///
    /// The bus is switched to `baudrate` first if it is not already
    /// there; the setting is sticky so consecutive commands to devices
    /// at the same rate do not retune the port.
    pub fn command(
        &self,
        req: Vec<u8>,
        expected_len: usize,
        timeout: Option<Duration>,
        baudrate: u32,
    ) -> Result<Vec<u8>, RackmonError> {
        let addr = req.first().copied().unwrap_or(0);
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut state = self
            .state
            .lock()
            .map_err(|_| RackmonError::Internal(String::from("bus transport lock poisoned")))?;
        if state.baudrate != baudrate {
            debug!(
                "{}: switching bus from {} to {} baud",
                state.io.path(),
                state.baudrate,
                baudrate
            );
            state.io.set_baud_rate(baudrate)?;
            state.baudrate = baudrate;
        }
        let frame = wire::finalize(req);
        state.io.send(&frame)?;
        let mut buf = vec![0u8; expected_len];
        let n = state.io.recv(&mut buf, timeout)?;
        if !self.min_delay.is_zero() {
            std::thread::sleep(self.min_delay);
        }
        if n < wire::MIN_FRAME_LEN {
            return Err(RackmonError::Timeout { addr, timeout });
        }
        buf.truncate(n);
        Ok(wire::verify(&buf)?.to_vec())
    }
}
