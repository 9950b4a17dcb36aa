// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Numeric status codes

use core::fmt;

use crate::Result;

/// Status of a (possibly unfinished) operation.
///
/// The value is a bit mask: the `BAD` bit marks errors, the `PROCESSING`
/// bit marks operations that need to be polled again. The numeric values
/// are stable and can be shown to users or stored in logs.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u32);

impl StatusCode {
    pub const PROCESSING: Self = Self(0x8000_0000);
    /// A request frame was written, the response is pending.
    pub const PROCESSING_BEGIN: Self = Self(0x8000_0001);
    pub const GOOD: Self = Self(0x0000_0000);
    pub const BAD: Self = Self(0x0100_0000);
    pub const UNCERTAIN: Self = Self(0x0200_0000);

    // Modbus exceptions
    pub const BAD_ILLEGAL_FUNCTION: Self = Self(0x0100_0001);
    pub const BAD_ILLEGAL_DATA_ADDRESS: Self = Self(0x0100_0002);
    pub const BAD_ILLEGAL_DATA_VALUE: Self = Self(0x0100_0003);
    pub const BAD_SERVER_DEVICE_FAILURE: Self = Self(0x0100_0004);
    pub const BAD_ACKNOWLEDGE: Self = Self(0x0100_0005);
    pub const BAD_SERVER_DEVICE_BUSY: Self = Self(0x0100_0006);
    pub const BAD_NEGATIVE_ACKNOWLEDGE: Self = Self(0x0100_0007);
    pub const BAD_MEMORY_PARITY_ERROR: Self = Self(0x0100_0008);
    pub const BAD_GATEWAY_PATH_UNAVAILABLE: Self = Self(0x0100_000A);
    pub const BAD_GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: Self = Self(0x0100_000B);

    // General
    pub const BAD_EMPTY_RESPONSE: Self = Self(0x0100_0101);
    pub const BAD_NOT_CORRECT_REQUEST: Self = Self(0x0100_0102);
    pub const BAD_NOT_CORRECT_RESPONSE: Self = Self(0x0100_0103);
    pub const BAD_WRITE_BUFFER_OVERFLOW: Self = Self(0x0100_0104);
    pub const BAD_READ_BUFFER_OVERFLOW: Self = Self(0x0100_0105);

    // Serial port
    pub const BAD_SERIAL_OPEN: Self = Self(0x0100_0201);
    pub const BAD_SERIAL_WRITE: Self = Self(0x0100_0202);
    pub const BAD_SERIAL_READ: Self = Self(0x0100_0203);

    // ASCII framing
    pub const BAD_ASC_MISS_COLON: Self = Self(0x0100_0301);
    pub const BAD_ASC_MISS_CR_LF: Self = Self(0x0100_0302);
    pub const BAD_ASC_CHAR: Self = Self(0x0100_0303);
    pub const BAD_LRC: Self = Self(0x0100_0304);

    // RTU framing
    pub const BAD_CRC: Self = Self(0x0100_0401);

    // TCP
    pub const BAD_TCP_CREATE: Self = Self(0x0100_0501);
    pub const BAD_TCP_CONNECT: Self = Self(0x0100_0502);
    pub const BAD_TCP_WRITE: Self = Self(0x0100_0503);
    pub const BAD_TCP_READ: Self = Self(0x0100_0504);
    pub const BAD_TCP_BIND: Self = Self(0x0100_0505);
    pub const BAD_TCP_LISTEN: Self = Self(0x0100_0506);
    pub const BAD_TCP_ACCEPT: Self = Self(0x0100_0507);
    pub const BAD_TCP_DISCONNECT: Self = Self(0x0100_0508);

    /// Create a status from its raw numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw [`u32`] value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Status of a Modbus exception response with the given code.
    #[must_use]
    pub const fn from_exception_code(code: u8) -> Self {
        Self(Self::BAD.0 | code as u32)
    }

    /// Fold the outcome of a polled operation into a status.
    pub fn of<T>(res: &Result<Option<T>>) -> Self {
        match res {
            Ok(Some(_)) => Self::GOOD,
            Ok(None) => Self::PROCESSING,
            Err(err) => err.status(),
        }
    }

    #[must_use]
    pub const fn is_good(self) -> bool {
        self.0 == Self::GOOD.0
    }

    #[must_use]
    pub const fn is_bad(self) -> bool {
        self.0 & Self::BAD.0 != 0
    }

    #[must_use]
    pub const fn is_uncertain(self) -> bool {
        self.0 & Self::UNCERTAIN.0 != 0
    }

    #[must_use]
    pub const fn is_processing(self) -> bool {
        self.0 & Self::PROCESSING.0 != 0
    }

    #[must_use]
    pub const fn is_processing_begin(self) -> bool {
        self.0 == Self::PROCESSING_BEGIN.0
    }

    /// Bad status that can be answered with a Modbus exception response.
    #[must_use]
    pub const fn is_standard_error(self) -> bool {
        self.is_bad() && self.0 & 0xFF00 == 0
    }

    /// The Modbus exception code of a standard error.
    #[must_use]
    pub const fn exception_code(self) -> Option<u8> {
        if self.is_standard_error() {
            Some((self.0 & 0xFF) as u8)
        } else {
            None
        }
    }

    const fn get_name(self) -> Option<&'static str> {
        let name = match self {
            Self::PROCESSING => "Processing",
            Self::PROCESSING_BEGIN => "ProcessingBegin",
            Self::GOOD => "Good",
            Self::BAD => "Bad",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD_ILLEGAL_FUNCTION => "BadIllegalFunction",
            Self::BAD_ILLEGAL_DATA_ADDRESS => "BadIllegalDataAddress",
            Self::BAD_ILLEGAL_DATA_VALUE => "BadIllegalDataValue",
            Self::BAD_SERVER_DEVICE_FAILURE => "BadServerDeviceFailure",
            Self::BAD_ACKNOWLEDGE => "BadAcknowledge",
            Self::BAD_SERVER_DEVICE_BUSY => "BadServerDeviceBusy",
            Self::BAD_NEGATIVE_ACKNOWLEDGE => "BadNegativeAcknowledge",
            Self::BAD_MEMORY_PARITY_ERROR => "BadMemoryParityError",
            Self::BAD_GATEWAY_PATH_UNAVAILABLE => "BadGatewayPathUnavailable",
            Self::BAD_GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND => {
                "BadGatewayTargetDeviceFailedToRespond"
            }
            Self::BAD_EMPTY_RESPONSE => "BadEmptyResponse",
            Self::BAD_NOT_CORRECT_REQUEST => "BadNotCorrectRequest",
            Self::BAD_NOT_CORRECT_RESPONSE => "BadNotCorrectResponse",
            Self::BAD_WRITE_BUFFER_OVERFLOW => "BadWriteBufferOverflow",
            Self::BAD_READ_BUFFER_OVERFLOW => "BadReadBufferOverflow",
            Self::BAD_SERIAL_OPEN => "BadSerialOpen",
            Self::BAD_SERIAL_WRITE => "BadSerialWrite",
            Self::BAD_SERIAL_READ => "BadSerialRead",
            Self::BAD_ASC_MISS_COLON => "BadAscMissColon",
            Self::BAD_ASC_MISS_CR_LF => "BadAscMissCrLf",
            Self::BAD_ASC_CHAR => "BadAscChar",
            Self::BAD_LRC => "BadLrc",
            Self::BAD_CRC => "BadCrc",
            Self::BAD_TCP_CREATE => "BadTcpCreate",
            Self::BAD_TCP_CONNECT => "BadTcpConnect",
            Self::BAD_TCP_WRITE => "BadTcpWrite",
            Self::BAD_TCP_READ => "BadTcpRead",
            Self::BAD_TCP_BIND => "BadTcpBind",
            Self::BAD_TCP_LISTEN => "BadTcpListen",
            Self::BAD_TCP_ACCEPT => "BadTcpAccept",
            Self::BAD_TCP_DISCONNECT => "BadTcpDisconnect",
            _ => return None,
        };
        Some(name)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::GOOD
    }
}

impl From<StatusCode> for u32 {
    fn from(status: StatusCode) -> Self {
        status.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:0>8X}", self.0),
        }
    }
}
