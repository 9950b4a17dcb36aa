// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port settings
//!
//! Settings arrive as plain key/value maps, see [`Settings::from_map`].

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use crate::{Error, ProtocolType, Result, STANDARD_TCP_PORT};

pub const KEY_TYPE: &str = "type";
pub const KEY_HOST: &str = "host";
pub const KEY_PORT: &str = "port";
pub const KEY_TIMEOUT: &str = "timeout";
pub const KEY_SERIAL_PORT_NAME: &str = "serialPortName";
pub const KEY_BAUD_RATE: &str = "baudRate";
pub const KEY_DATA_BITS: &str = "dataBits";
pub const KEY_PARITY: &str = "parity";
pub const KEY_STOP_BITS: &str = "stopBits";
pub const KEY_FLOW_CONTROL: &str = "flowControl";
pub const KEY_TIMEOUT_FIRST_BYTE: &str = "timeoutFirstByte";
pub const KEY_TIMEOUT_INTER_BYTE: &str = "timeoutInterByte";
pub const KEY_REPEAT_COUNT: &str = "repeatCount";

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidSetting {
        key: key.into(),
        value: value.into(),
    }
}

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident, $key:expr, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $text),+
                })
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(invalid($key, s)),
                }
            }
        }
    };
}

named_enum!(
    /// Serial parity
    Parity, KEY_PARITY, {
        No => "NoParity",
        Even => "EvenParity",
        Odd => "OddParity",
        Space => "SpaceParity",
        Mark => "MarkParity",
    }
);

named_enum!(
    /// Serial stop bits
    StopBits, KEY_STOP_BITS, {
        One => "OneStop",
        OneAndHalf => "OneAndHalfStop",
        Two => "TwoStop",
    }
);

named_enum!(
    /// Serial flow control
    FlowControl, KEY_FLOW_CONTROL, {
        No => "NoFlowControl",
        Hardware => "HardwareControl",
        Software => "SoftwareControl",
    }
);

/// Settings of a TCP connection or listener.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    /// Connect timeout and read timeout
    pub timeout: Duration,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: STANDARD_TCP_PORT,
            timeout: Duration::from_millis(3000),
        }
    }
}

/// Settings of a serial line.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Time to wait for the first byte of a response
    pub timeout_first_byte: Duration,
    /// Silence that ends a frame
    pub timeout_inter_byte: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyS0".into(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::No,
            stop_bits: StopBits::One,
            flow_control: FlowControl::No,
            timeout_first_byte: Duration::from_millis(1000),
            timeout_inter_byte: Duration::from_millis(50),
        }
    }
}

/// Complete settings of a client or server port.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub protocol: ProtocolType,
    pub tcp: TcpSettings,
    pub serial: SerialSettings,
    repeat_count: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: ProtocolType::Tcp,
            tcp: TcpSettings::default(),
            serial: SerialSettings::default(),
            repeat_count: 1,
        }
    }
}

impl Settings {
    /// Number of attempts of a client request.
    #[must_use]
    pub const fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Set the number of attempts. `0` is ignored.
    pub fn set_repeat_count(&mut self, repeat_count: u32) {
        if repeat_count > 0 {
            self.repeat_count = repeat_count;
        }
    }

    /// Parse settings from a key/value map.
    ///
    /// Missing keys keep their defaults, unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(v) = parse(map, KEY_TYPE)? {
            settings.protocol = v;
        }
        if let Some(v) = map.get(KEY_HOST) {
            settings.tcp.host.clone_from(v);
        }
        if let Some(v) = parse(map, KEY_PORT)? {
            settings.tcp.port = v;
        }
        if let Some(v) = parse_millis(map, KEY_TIMEOUT)? {
            settings.tcp.timeout = v;
        }
        if let Some(v) = map.get(KEY_SERIAL_PORT_NAME) {
            settings.serial.port_name.clone_from(v);
        }
        if let Some(v) = parse(map, KEY_BAUD_RATE)? {
            settings.serial.baud_rate = v;
        }
        if let Some(v) = parse(map, KEY_DATA_BITS)? {
            settings.serial.data_bits = v;
        }
        if let Some(v) = parse(map, KEY_PARITY)? {
            settings.serial.parity = v;
        }
        if let Some(v) = parse(map, KEY_STOP_BITS)? {
            settings.serial.stop_bits = v;
        }
        if let Some(v) = parse(map, KEY_FLOW_CONTROL)? {
            settings.serial.flow_control = v;
        }
        if let Some(v) = parse_millis(map, KEY_TIMEOUT_FIRST_BYTE)? {
            settings.serial.timeout_first_byte = v;
        }
        if let Some(v) = parse_millis(map, KEY_TIMEOUT_INTER_BYTE)? {
            settings.serial.timeout_inter_byte = v;
        }
        if let Some(v) = parse(map, KEY_REPEAT_COUNT)? {
            settings.set_repeat_count(v);
        }
        Ok(settings)
    }

    /// Render all settings as a key/value map.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        let Self {
            protocol,
            tcp,
            serial,
            repeat_count,
        } = self;
        [
            (KEY_TYPE, protocol.to_string()),
            (KEY_HOST, tcp.host.clone()),
            (KEY_PORT, tcp.port.to_string()),
            (KEY_TIMEOUT, tcp.timeout.as_millis().to_string()),
            (KEY_SERIAL_PORT_NAME, serial.port_name.clone()),
            (KEY_BAUD_RATE, serial.baud_rate.to_string()),
            (KEY_DATA_BITS, serial.data_bits.to_string()),
            (KEY_PARITY, serial.parity.to_string()),
            (KEY_STOP_BITS, serial.stop_bits.to_string()),
            (KEY_FLOW_CONTROL, serial.flow_control.to_string()),
            (
                KEY_TIMEOUT_FIRST_BYTE,
                serial.timeout_first_byte.as_millis().to_string(),
            ),
            (
                KEY_TIMEOUT_INTER_BYTE,
                serial.timeout_inter_byte.as_millis().to_string(),
            ),
            (KEY_REPEAT_COUNT, repeat_count.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }
}

fn parse<T: FromStr>(map: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    map.get(key)
        .map(|v| v.trim().parse().map_err(|_| invalid(key, v)))
        .transpose()
}

fn parse_millis(map: &HashMap<String, String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(map, key)?.map(Duration::from_millis))
}
