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

//! Byte-level access to an RS-485 bus.
//!
//! [`Transport`] abstracts the serial line so the Modbus layer and the
//! tests can share one code path; [`SerialTransport`] is the production
//! implementation over a tty.

use std::io::Read;
use std::io::Write;
use std::time::Duration;
use std::time::Instant;

use log::trace;
use serialport::ClearBuffer;
use serialport::DataBits;
use serialport::Parity;
use serialport::SerialPort;
use serialport::StopBits;

use crate::error::RackmonError;

/// A half-duplex byte pipe to a Modbus bus.
///
/// `recv` returns the number of bytes read before `timeout` expired; a
/// return of 0 means the device never answered.
pub trait Transport: Send {
    fn path(&self) -> &str;
    fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), RackmonError>;
    fn send(&mut self, frame: &[u8]) -> Result<(), RackmonError>;
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, RackmonError>;
}

/// Serial port transport, 8 data bits, even parity, 1 stop bit.
pub struct SerialTransport {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baudrate: u32) -> Result<Self, RackmonError> {
        let port = serialport::new(path, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| RackmonError::Serial {
                path: path.to_string(),
                e,
            })?;
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    fn serial_err(&self, e: serialport::Error) -> RackmonError {
        RackmonError::Serial {
            path: self.path.clone(),
            e,
        }
    }

    fn io_err(&self, e: std::io::Error) -> RackmonError {
        RackmonError::IO {
            path: self.path.clone(),
            e,
        }
    }
}

impl Transport for SerialTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), RackmonError> {
        self.port
            .set_baud_rate(baudrate)
            .map_err(|e| self.serial_err(e))
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RackmonError> {
        // Drop any stale bytes from a previous exchange so the next
        // recv starts at this frame's response.
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| self.serial_err(e))?;
        trace!("{}: tx {} bytes", self.path, frame.len());
        self.port.write_all(frame).map_err(|e| self.io_err(e))?;
        self.port.flush().map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, RackmonError> {
        let deadline = Instant::now() + timeout;
        let mut read = 0;
        while read < buf.len() {
            match self.port.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // The port timeout is short so we can poll against
                    // the caller's deadline; stop once data has started
                    // arriving and then dried up.
                    if read > 0 || Instant::now() >= deadline {
                        break;
                    }
                }
                Err(e) => return Err(self.io_err(e)),
            }
        }
        trace!("{}: rx {read} bytes", self.path);
        Ok(read)
    }
}
