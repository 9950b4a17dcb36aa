// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus client
//!
//! A [`Client`] addresses one remote unit through a shared [`ClientPort`].
//! All operations are polled: call them again with the same arguments
//! while they return `Ok(None)`.

use byteorder::{BigEndian, ByteOrder};

use crate::{
    Address, Error, FunctionCode, MAX_DISCRETS, MAX_READ_WRITE_READ_REGISTERS,
    MAX_READ_WRITE_WRITE_REGISTERS, MAX_REGISTERS, Quantity, Result, UnitId, Word,
    codec::tcp::MAX_PAYLOAD,
    util::{bool_to_u16_coil, pack_coils, packed_coils_len, unpack_coils},
};

mod port;

pub use self::port::{ClientId, ClientPort, RequestStatus};

/// A logical client for one remote unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    unit: UnitId,
}

fn not_correct_request(text: String) -> Error {
    Error::NotCorrectRequest(text)
}

fn not_correct_response() -> Error {
    Error::NotCorrectResponse("Not correct response".into())
}

fn check_count(what: &str, count: Quantity, max: Quantity) -> Result<()> {
    if count > max {
        return Err(not_correct_request(format!(
            "Requested count of {what} ({count}) is too large"
        )));
    }
    Ok(())
}

fn check_len(what: &str, len: usize, required: usize) -> Result<()> {
    if len < required {
        return Err(not_correct_request(format!(
            "Buffer for {what} is too small ({len} < {required})"
        )));
    }
    Ok(())
}

fn write_request_header(buf: &mut [u8], offset: Address, count: Quantity) {
    BigEndian::write_u16(&mut buf[0..2], offset);
    BigEndian::write_u16(&mut buf[2..4], count);
}

impl Client {
    /// Create a client for `unit` on `port`.
    pub fn new(port: &mut ClientPort, unit: UnitId) -> Self {
        Self {
            id: port.new_client_id(),
            unit,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub const fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn set_unit(&mut self, unit: UnitId) {
        self.unit = unit;
    }

    /// Read coils (FC 1) into packed bits.
    pub fn read_coils(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [u8],
    ) -> Result<Option<()>> {
        self.read_bits(port, FunctionCode::ReadCoils, offset, count, values)
    }

    /// Read discrete inputs (FC 2) into packed bits.
    pub fn read_discrete_inputs(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [u8],
    ) -> Result<Option<()>> {
        self.read_bits(port, FunctionCode::ReadDiscreteInputs, offset, count, values)
    }

    pub fn read_coils_as_bool_array(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [bool],
    ) -> Result<Option<()>> {
        self.read_bools(port, FunctionCode::ReadCoils, offset, count, values)
    }

    pub fn read_discrete_inputs_as_bool_array(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [bool],
    ) -> Result<Option<()>> {
        self.read_bools(port, FunctionCode::ReadDiscreteInputs, offset, count, values)
    }

    /// Read holding registers (FC 3).
    pub fn read_holding_registers(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [Word],
    ) -> Result<Option<()>> {
        self.read_registers(port, FunctionCode::ReadHoldingRegisters, offset, count, values)
    }

    /// Read input registers (FC 4).
    pub fn read_input_registers(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &mut [Word],
    ) -> Result<Option<()>> {
        self.read_registers(port, FunctionCode::ReadInputRegisters, offset, count, values)
    }

    /// Write a single coil (FC 5).
    pub fn write_single_coil(
        &self,
        port: &mut ClientPort,
        offset: Address,
        value: bool,
    ) -> Result<Option<()>> {
        self.write_single(
            port,
            FunctionCode::WriteSingleCoil,
            offset,
            bool_to_u16_coil(value),
        )
    }

    /// Write a single holding register (FC 6).
    pub fn write_single_register(
        &self,
        port: &mut ClientPort,
        offset: Address,
        value: Word,
    ) -> Result<Option<()>> {
        self.write_single(port, FunctionCode::WriteSingleRegister, offset, value)
    }

    /// Read the exception status byte (FC 7).
    pub fn read_exception_status(&self, port: &mut ClientPort) -> Result<Option<u8>> {
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) =
            self.request(port, FunctionCode::ReadExceptionStatus, &[], &mut buf, Ok(()))?
        else {
            return Ok(None);
        };
        if len != 1 {
            return Err(port.set_error(not_correct_response()));
        }
        Ok(Some(buf[0]))
    }

    /// Write packed coils (FC 15).
    pub fn write_multiple_coils(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &[u8],
    ) -> Result<Option<()>> {
        let bytes = packed_coils_len(count.into());
        let valid = check_count("coils", count, MAX_DISCRETS)
            .and_then(|()| check_len("coils", values.len(), bytes));
        let mut payload = [0; MAX_PAYLOAD];
        let mut len = 0;
        if valid.is_ok() {
            write_request_header(&mut payload, offset, count);
            payload[4] = bytes as u8;
            payload[5..5 + bytes].copy_from_slice(&values[..bytes]);
            len = 5 + bytes;
        }
        self.write_multiple(
            port,
            FunctionCode::WriteMultipleCoils,
            offset,
            &payload[..len],
            valid,
        )
    }

    pub fn write_multiple_coils_as_bool_array(
        &self,
        port: &mut ClientPort,
        offset: Address,
        values: &[bool],
    ) -> Result<Option<()>> {
        let count = Quantity::try_from(values.len()).unwrap_or(Quantity::MAX);
        let mut packed = [0; MAX_PAYLOAD];
        let n = values.len().min(MAX_DISCRETS.into());
        pack_coils(&values[..n], &mut packed)?;
        self.write_multiple_coils(port, offset, count, &packed[..packed_coils_len(n)])
    }

    /// Write holding registers (FC 16).
    pub fn write_multiple_registers(
        &self,
        port: &mut ClientPort,
        offset: Address,
        count: Quantity,
        values: &[Word],
    ) -> Result<Option<()>> {
        let valid = check_count("registers", count, MAX_REGISTERS)
            .and_then(|()| check_len("registers", values.len(), count.into()));
        let mut payload = [0; MAX_PAYLOAD];
        let mut len = 0;
        if valid.is_ok() {
            let n = usize::from(count);
            write_request_header(&mut payload, offset, count);
            payload[4] = (n * 2) as u8;
            BigEndian::write_u16_into(&values[..n], &mut payload[5..5 + n * 2]);
            len = 5 + n * 2;
        }
        self.write_multiple(
            port,
            FunctionCode::WriteMultipleRegisters,
            offset,
            &payload[..len],
            valid,
        )
    }

    /// Modify a holding register with `(value & and_mask) | (or_mask & !and_mask)` (FC 22).
    pub fn mask_write_register(
        &self,
        port: &mut ClientPort,
        offset: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<Option<()>> {
        let mut payload = [0; 6];
        BigEndian::write_u16(&mut payload[0..2], offset);
        BigEndian::write_u16(&mut payload[2..4], and_mask);
        BigEndian::write_u16(&mut payload[4..6], or_mask);
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) =
            self.request(port, FunctionCode::MaskWriteRegister, &payload, &mut buf, Ok(()))?
        else {
            return Ok(None);
        };
        if buf[..len] != payload {
            return Err(port.set_error(not_correct_response()));
        }
        Ok(Some(()))
    }

    /// Write and then read holding registers in one transaction (FC 23).
    #[allow(clippy::too_many_arguments)]
    pub fn read_write_multiple_registers(
        &self,
        port: &mut ClientPort,
        read_offset: Address,
        read_count: Quantity,
        read_values: &mut [Word],
        write_offset: Address,
        write_count: Quantity,
        write_values: &[Word],
    ) -> Result<Option<()>> {
        let valid = check_count("registers to read", read_count, MAX_READ_WRITE_READ_REGISTERS)
            .and_then(|()| {
                check_count(
                    "registers to write",
                    write_count,
                    MAX_READ_WRITE_WRITE_REGISTERS,
                )
            })
            .and_then(|()| check_len("registers to read", read_values.len(), read_count.into()))
            .and_then(|()| {
                check_len("registers to write", write_values.len(), write_count.into())
            });
        let mut payload = [0; MAX_PAYLOAD];
        let mut len = 0;
        if valid.is_ok() {
            let count = usize::from(write_count);
            write_request_header(&mut payload, read_offset, read_count);
            write_request_header(&mut payload[4..], write_offset, write_count);
            payload[8] = (count * 2) as u8;
            BigEndian::write_u16_into(&write_values[..count], &mut payload[9..9 + count * 2]);
            len = 9 + count * 2;
        }
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) = self.request(
            port,
            FunctionCode::ReadWriteMultipleRegisters,
            &payload[..len],
            &mut buf,
            valid,
        )?
        else {
            return Ok(None);
        };
        let count = usize::from(read_count);
        if len == 0 || usize::from(buf[0]) != len - 1 || usize::from(buf[0]) != count * 2 {
            return Err(port.set_error(not_correct_response()));
        }
        BigEndian::read_u16_into(&buf[1..len], &mut read_values[..count]);
        Ok(Some(()))
    }

    /// Read the server identification (FC 17).
    ///
    /// Returns the number of bytes copied into `data`.
    pub fn report_server_id(&self, port: &mut ClientPort, data: &mut [u8]) -> Result<Option<usize>> {
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) =
            self.request(port, FunctionCode::ReportServerId, &[], &mut buf, Ok(()))?
        else {
            return Ok(None);
        };
        if len == 0 || usize::from(buf[0]) != len - 1 {
            return Err(port.set_error(not_correct_response()));
        }
        let Some(dst) = data.get_mut(..len - 1) else {
            return Err(port.set_error(Error::ReadBufferOverflow));
        };
        dst.copy_from_slice(&buf[1..len]);
        Ok(Some(len - 1))
    }

    // Claim the port and drive the request. An invalid request is rejected
    // before anything is sent.
    fn request(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        payload: &[u8],
        out: &mut [u8],
        valid: Result<()>,
    ) -> Result<Option<usize>> {
        match port.request_status(self.id) {
            RequestStatus::Disable => return Ok(None),
            RequestStatus::Enable => {
                if let Err(err) = valid {
                    port.cancel_request(self.id);
                    return Err(port.set_error(err));
                }
            }
            RequestStatus::Process => {}
        }
        port.request(self.id, self.unit, function.value(), payload, out)
    }

    fn read_bits(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        offset: Address,
        count: Quantity,
        values: &mut [u8],
    ) -> Result<Option<()>> {
        let bytes = packed_coils_len(count.into());
        let valid = check_count("discretes", count, MAX_DISCRETS)
            .and_then(|()| check_len("discretes", values.len(), bytes));
        let mut payload = [0; 4];
        write_request_header(&mut payload, offset, count);
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) = self.request(port, function, &payload, &mut buf, valid)? else {
            return Ok(None);
        };
        if len == 0 || usize::from(buf[0]) != len - 1 || usize::from(buf[0]) != bytes {
            return Err(port.set_error(not_correct_response()));
        }
        values[..bytes].copy_from_slice(&buf[1..len]);
        Ok(Some(()))
    }

    fn read_bools(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        offset: Address,
        count: Quantity,
        values: &mut [bool],
    ) -> Result<Option<()>> {
        let mut packed = [0; MAX_PAYLOAD];
        // size checks happen on the packed buffer
        let packed_len = if values.len() < usize::from(count) {
            0
        } else {
            packed_coils_len(count.into()).min(packed.len())
        };
        if self
            .read_bits(port, function, offset, count, &mut packed[..packed_len])?
            .is_none()
        {
            return Ok(None);
        }
        unpack_coils(&packed, &mut values[..usize::from(count)])?;
        Ok(Some(()))
    }

    fn read_registers(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        offset: Address,
        count: Quantity,
        values: &mut [Word],
    ) -> Result<Option<()>> {
        let valid = check_count("registers", count, MAX_REGISTERS)
            .and_then(|()| check_len("registers", values.len(), count.into()));
        let mut payload = [0; 4];
        write_request_header(&mut payload, offset, count);
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) = self.request(port, function, &payload, &mut buf, valid)? else {
            return Ok(None);
        };
        let count = usize::from(count);
        if len == 0 || usize::from(buf[0]) != len - 1 || usize::from(buf[0]) != count * 2 {
            return Err(port.set_error(not_correct_response()));
        }
        BigEndian::read_u16_into(&buf[1..len], &mut values[..count]);
        Ok(Some(()))
    }

    fn write_single(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        offset: Address,
        value: Word,
    ) -> Result<Option<()>> {
        let mut payload = [0; 4];
        write_request_header(&mut payload, offset, value);
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) = self.request(port, function, &payload, &mut buf, Ok(()))? else {
            return Ok(None);
        };
        if len != 4 || BigEndian::read_u16(&buf[0..2]) != offset {
            return Err(port.set_error(not_correct_response()));
        }
        Ok(Some(()))
    }

    fn write_multiple(
        &self,
        port: &mut ClientPort,
        function: FunctionCode,
        offset: Address,
        payload: &[u8],
        valid: Result<()>,
    ) -> Result<Option<()>> {
        let mut buf = [0; MAX_PAYLOAD];
        let Some(len) = self.request(port, function, payload, &mut buf, valid)? else {
            return Ok(None);
        };
        if len != 4 || BigEndian::read_u16(&buf[0..2]) != offset {
            return Err(port.set_error(not_correct_response()));
        }
        Ok(Some(()))
    }
}
