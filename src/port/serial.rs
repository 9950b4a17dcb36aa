// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io::{self, Read as _, Write as _},
    time::Duration,
};

use serialport::{ClearBuffer, SerialPort};

use super::{Timeouts, Transport, TransportKind};
use crate::{Error, FlowControl, Parity, Result, SerialSettings, Settings, StopBits};

/// Serial line used by the RTU and ASCII framings.
pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    #[must_use]
    pub const fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

fn unsupported(what: &str, value: impl std::fmt::Display) -> Error {
    Error::SerialOpen(format!("unsupported {what}: {value}"))
}

fn data_bits(bits: u8) -> Result<serialport::DataBits> {
    use serialport::DataBits::*;

    match bits {
        5 => Ok(Five),
        6 => Ok(Six),
        7 => Ok(Seven),
        8 => Ok(Eight),
        _ => Err(unsupported("data bits", bits)),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::No => Ok(serialport::Parity::None),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Space | Parity::Mark => Err(unsupported("parity", parity)),
    }
}

fn stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OneAndHalf => Err(unsupported("stop bits", stop_bits)),
    }
}

const fn flow_control(flow_control: FlowControl) -> serialport::FlowControl {
    match flow_control {
        FlowControl::No => serialport::FlowControl::None,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
        FlowControl::Software => serialport::FlowControl::Software,
    }
}

const fn is_pending(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn name(&self) -> String {
        self.settings.port_name.clone()
    }

    fn configure(&mut self, settings: &Settings) -> bool {
        if self.settings == settings.serial {
            return false;
        }
        self.settings = settings.serial.clone();
        true
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            first_byte: self.settings.timeout_first_byte,
            inter_byte: self.settings.timeout_inter_byte,
        }
    }

    fn open(&mut self) -> Result<Option<()>> {
        if self.port.is_some() {
            return Ok(Some(()));
        }
        let s = &self.settings;
        let port = serialport::new(s.port_name.as_str(), s.baud_rate)
            .data_bits(data_bits(s.data_bits)?)
            .parity(parity(s.parity)?)
            .stop_bits(stop_bits(s.stop_bits)?)
            .flow_control(flow_control(s.flow_control))
            .timeout(Duration::ZERO)
            .open()
            .map_err(|err| Error::SerialOpen(err.to_string()))?;
        self.port = Some(port);
        Ok(Some(()))
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let Some(port) = &mut self.port else {
            return Err(Error::SerialWrite("port is not open".into()));
        };
        match port.write(data) {
            Ok(n) => Ok(n),
            Err(err) if is_pending(err.kind()) => Ok(0),
            Err(err) => Err(Error::SerialWrite(err.to_string())),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(port) = &mut self.port else {
            return Err(Error::SerialRead("port is not open".into()));
        };
        let available = port
            .bytes_to_read()
            .map_err(|err| Error::SerialRead(err.to_string()))?;
        let len = buf.len().min(available as usize);
        if len == 0 {
            return Ok(None);
        }
        match port.read(&mut buf[..len]) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(err) if is_pending(err.kind()) => Ok(None),
            Err(err) => Err(Error::SerialRead(err.to_string())),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        if let Some(port) = &self.port {
            port.clear(ClearBuffer::Input)
                .map_err(|err| Error::SerialWrite(err.to_string()))?;
        }
        Ok(())
    }
}
