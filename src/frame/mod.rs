// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::{Error, Result};

/// Maximum count of data bytes in a PDU.
pub const MAX_BYTES: usize = 255;

/// Maximum count of registers of a single read or write request.
pub const MAX_REGISTERS: u16 = 127;

/// Maximum count of coils or discrete inputs of a single request.
pub const MAX_DISCRETS: u16 = 2040;

/// Size of the value buffer of a server resource.
pub const VALUE_BUFF_SZ: usize = 255;

/// Maximum count of registers read by [`FunctionCode::ReadWriteMultipleRegisters`].
pub const MAX_READ_WRITE_READ_REGISTERS: u16 = 125;

/// Maximum count of registers written by [`FunctionCode::ReadWriteMultipleRegisters`].
pub const MAX_READ_WRITE_WRITE_REGISTERS: u16 = 121;

/// Lowest valid unit (slave) address.
pub const VALID_UNIT_BEGIN: UnitId = 1;

/// Highest valid unit (slave) address.
pub const VALID_UNIT_END: UnitId = 247;

/// Well-known Modbus TCP port.
pub const STANDARD_TCP_PORT: u16 = 502;

/// Bit that marks an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Unit (slave) address
pub type UnitId = u8;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// MBAP transaction identifier
pub type TransactionId = u16;

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `07` (`0x07`).
    ReadExceptionStatus,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `17` (`0x11`).
    ReportServerId,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Modbus Function Code: `23` (`0x17`).
    ReadWriteMultipleRegisters,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x07 => Self::ReadExceptionStatus,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportServerId,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            code => FunctionCode::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::ReadExceptionStatus => 0x07,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportServerId => 0x11,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A server (slave) exception.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

impl TryFrom<u8> for Exception {
    type Error = u8;

    fn try_from(code: u8) -> core::result::Result<Self, u8> {
        use Exception::*;

        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => return Err(code),
        };
        Ok(ex)
    }
}

/// An extracted frame: unit address, function code and PDU data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub unit: UnitId,
    pub function: u8,
    pub data: &'a [u8],
}

impl DecodedFrame<'_> {
    /// Check that a response answers the outstanding request.
    ///
    /// Exception responses are turned into the matching [`Error`].
    pub fn check_response(&self, unit: UnitId, function: u8) -> Result<()> {
        if self.unit != unit {
            return Err(Error::NotCorrectResponse(
                "Requested unit (slave) address is not equal to responsed".into(),
            ));
        }
        if self.function & EXCEPTION_BIT != 0 {
            let Some(&code) = self.data.first() else {
                return Err(Error::NotCorrectResponse("Exception status missed".into()));
            };
            return Err(Error::from_exception_code(code));
        }
        if self.function != function {
            return Err(Error::NotCorrectResponse(
                "Requested function is not equal to responsed".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn function_code_into_u8() {
        let x: u8 = FunctionCode::WriteMultipleCoils.value();
        assert_eq!(x, 15);
        let x: u8 = FunctionCode::Custom(0xBB).value();
        assert_eq!(x, 0xBB);
    }

    #[test]
    fn function_code_from_u8() {
        assert_eq!(FunctionCode::new(15), FunctionCode::WriteMultipleCoils);
        assert_eq!(FunctionCode::new(0x07), FunctionCode::ReadExceptionStatus);
        assert_eq!(FunctionCode::new(0x11), FunctionCode::ReportServerId);
        assert_eq!(FunctionCode::new(0xBB), FunctionCode::Custom(0xBB));
    }

    #[test]
    fn exception_from_u8() {
        assert_eq!(Exception::try_from(0x02), Ok(Exception::IllegalDataAddress));
        assert_eq!(Exception::try_from(0x07), Ok(Exception::NegativeAcknowledge));
        assert_eq!(Exception::try_from(0x09), Err(0x09));
        assert_eq!(Exception::try_from(0x00), Err(0x00));
    }

    mod response_check {

        use super::*;

        #[test]
        fn accept_matching_response() {
            let frame = DecodedFrame {
                unit: 0x01,
                function: 0x03,
                data: &[0x02, 0x00, 0x0A],
            };
            assert!(frame.check_response(0x01, 0x03).is_ok());
        }

        #[test]
        fn reject_wrong_unit() {
            let frame = DecodedFrame {
                unit: 0x02,
                function: 0x03,
                data: &[],
            };
            let err = frame.check_response(0x01, 0x03).err().unwrap();
            assert!(matches!(err, Error::NotCorrectResponse(_)));
        }

        #[test]
        fn reject_wrong_function() {
            let frame = DecodedFrame {
                unit: 0x01,
                function: 0x04,
                data: &[],
            };
            let err = frame.check_response(0x01, 0x03).err().unwrap();
            assert!(matches!(err, Error::NotCorrectResponse(_)));
        }

        #[test]
        fn decode_exception_response() {
            let frame = DecodedFrame {
                unit: 0x01,
                function: 0x83,
                data: &[0x02],
            };
            let err = frame.check_response(0x01, 0x03).err().unwrap();
            assert_eq!(err, Error::Exception(Exception::IllegalDataAddress));
        }

        #[test]
        fn exception_without_code() {
            let frame = DecodedFrame {
                unit: 0x01,
                function: 0x83,
                data: &[],
            };
            let err = frame.check_response(0x01, 0x03).err().unwrap();
            assert!(matches!(err, Error::NotCorrectResponse(_)));
        }
    }
}
