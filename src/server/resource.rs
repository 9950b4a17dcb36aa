// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use byteorder::{BigEndian, ByteOrder};

use super::{ServerPort, SharedDevice};
use crate::{
    Address, EXCEPTION_BIT, Error, Exception, FunctionCode, MAX_DISCRETS,
    MAX_READ_WRITE_READ_REGISTERS, MAX_READ_WRITE_WRITE_REGISTERS, MAX_REGISTERS,
    ProtocolType, Quantity, Result, UnitId, VALUE_BUFF_SZ, Word,
    codec::tcp::MAX_PAYLOAD,
    port::Port,
    signal::{Event, Signals},
    util::{packed_coils_len, u16_coil_to_bool},
};

// PDU size minus function code and byte count
const MAX_SERVER_ID_LEN: usize = 251;

/// A decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    ReadCoils {
        offset: Address,
        count: Quantity,
    },
    ReadDiscreteInputs {
        offset: Address,
        count: Quantity,
    },
    ReadHoldingRegisters {
        offset: Address,
        count: Quantity,
    },
    ReadInputRegisters {
        offset: Address,
        count: Quantity,
    },
    WriteSingleCoil {
        offset: Address,
        value: bool,
    },
    WriteSingleRegister {
        offset: Address,
        value: Word,
    },
    ReadExceptionStatus,
    /// Values are in [`Values::bits`]
    WriteMultipleCoils {
        offset: Address,
        count: Quantity,
    },
    /// Values are in [`Values::words`]
    WriteMultipleRegisters {
        offset: Address,
        count: Quantity,
    },
    ReportServerId,
    MaskWriteRegister {
        offset: Address,
        and_mask: Word,
        or_mask: Word,
    },
    /// Values to write are in [`Values::write_words`]
    ReadWriteMultipleRegisters {
        read_offset: Address,
        read_count: Quantity,
        write_offset: Address,
        write_count: Quantity,
    },
}

/// Value buffers shared between the request and its response.
#[derive(Debug)]
struct Values {
    bits: [u8; VALUE_BUFF_SZ],
    words: [Word; MAX_REGISTERS as usize],
    write_words: [Word; MAX_READ_WRITE_WRITE_REGISTERS as usize],
    exception_status: u8,
    server_id_len: usize,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            bits: [0; VALUE_BUFF_SZ],
            words: [0; MAX_REGISTERS as usize],
            write_words: [0; MAX_READ_WRITE_WRITE_REGISTERS as usize],
            exception_status: 0,
            server_id_len: 0,
        }
    }
}

fn malformed(text: &str) -> Error {
    log::debug!("Malformed request: {text}");
    Exception::IllegalDataValue.into()
}

fn check_size(data: &[u8], len: usize) -> Result<()> {
    if data.len() != len {
        return Err(malformed("not correct data size"));
    }
    Ok(())
}

fn check_max(count: Quantity, max: Quantity) -> Result<()> {
    if count > max {
        return Err(malformed("count is too large"));
    }
    Ok(())
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    BigEndian::read_u16(&data[pos..pos + 2])
}

fn parse_request(function: u8, data: &[u8], values: &mut Values) -> Result<Request> {
    let req = match FunctionCode::new(function) {
        FunctionCode::ReadCoils
        | FunctionCode::ReadDiscreteInputs
        | FunctionCode::ReadHoldingRegisters
        | FunctionCode::ReadInputRegisters => {
            check_size(data, 4)?;
            let offset = read_u16(data, 0);
            let count = read_u16(data, 2);
            match FunctionCode::new(function) {
                FunctionCode::ReadCoils => {
                    check_max(count, MAX_DISCRETS)?;
                    Request::ReadCoils { offset, count }
                }
                FunctionCode::ReadDiscreteInputs => {
                    check_max(count, MAX_DISCRETS)?;
                    Request::ReadDiscreteInputs { offset, count }
                }
                FunctionCode::ReadHoldingRegisters => {
                    check_max(count, MAX_REGISTERS)?;
                    Request::ReadHoldingRegisters { offset, count }
                }
                _ => {
                    check_max(count, MAX_REGISTERS)?;
                    Request::ReadInputRegisters { offset, count }
                }
            }
        }
        FunctionCode::WriteSingleCoil => {
            check_size(data, 4)?;
            let value = u16_coil_to_bool(read_u16(data, 2))?;
            Request::WriteSingleCoil {
                offset: read_u16(data, 0),
                value,
            }
        }
        FunctionCode::WriteSingleRegister => {
            check_size(data, 4)?;
            Request::WriteSingleRegister {
                offset: read_u16(data, 0),
                value: read_u16(data, 2),
            }
        }
        FunctionCode::ReadExceptionStatus => {
            check_size(data, 0)?;
            Request::ReadExceptionStatus
        }
        FunctionCode::WriteMultipleCoils => {
            if data.len() < 5 {
                return Err(malformed("not correct data size"));
            }
            let bytes = usize::from(data[4]);
            check_size(data, 5 + bytes)?;
            let offset = read_u16(data, 0);
            let count = read_u16(data, 2);
            check_max(count, MAX_DISCRETS)?;
            if packed_coils_len(count.into()) != bytes {
                return Err(malformed("byte count does not match the count of coils"));
            }
            values.bits[..bytes].copy_from_slice(&data[5..]);
            Request::WriteMultipleCoils { offset, count }
        }
        FunctionCode::WriteMultipleRegisters => {
            if data.len() < 5 {
                return Err(malformed("not correct data size"));
            }
            let bytes = usize::from(data[4]);
            check_size(data, 5 + bytes)?;
            let offset = read_u16(data, 0);
            let count = read_u16(data, 2);
            check_max(count, MAX_REGISTERS)?;
            if usize::from(count) * 2 != bytes {
                return Err(malformed("byte count does not match the count of registers"));
            }
            BigEndian::read_u16_into(&data[5..], &mut values.words[..usize::from(count)]);
            Request::WriteMultipleRegisters { offset, count }
        }
        FunctionCode::ReportServerId => {
            check_size(data, 0)?;
            Request::ReportServerId
        }
        FunctionCode::MaskWriteRegister => {
            check_size(data, 6)?;
            Request::MaskWriteRegister {
                offset: read_u16(data, 0),
                and_mask: read_u16(data, 2),
                or_mask: read_u16(data, 4),
            }
        }
        FunctionCode::ReadWriteMultipleRegisters => {
            if data.len() < 9 {
                return Err(malformed("not correct data size"));
            }
            let bytes = usize::from(data[8]);
            check_size(data, 9 + bytes)?;
            let read_count = read_u16(data, 2);
            let write_count = read_u16(data, 6);
            check_max(read_count, MAX_READ_WRITE_READ_REGISTERS)?;
            check_max(write_count, MAX_READ_WRITE_WRITE_REGISTERS)?;
            if usize::from(write_count) * 2 != bytes {
                return Err(malformed("byte count does not match the count of registers"));
            }
            BigEndian::read_u16_into(&data[9..], &mut values.write_words[..usize::from(write_count)]);
            Request::ReadWriteMultipleRegisters {
                read_offset: read_u16(data, 0),
                read_count,
                write_offset: read_u16(data, 4),
                write_count,
            }
        }
        FunctionCode::Custom(_) => return Err(Exception::IllegalFunction.into()),
    };
    Ok(req)
}

/// Encode the response payload of a processed request into `buf`.
fn encode_response(req: Request, values: &Values, buf: &mut [u8]) -> usize {
    fn echo(buf: &mut [u8], fields: &[u16]) -> usize {
        BigEndian::write_u16_into(fields, &mut buf[..fields.len() * 2]);
        fields.len() * 2
    }

    fn registers(buf: &mut [u8], words: &[Word]) -> usize {
        let bytes = words.len() * 2;
        buf[0] = bytes as u8;
        BigEndian::write_u16_into(words, &mut buf[1..=bytes]);
        bytes + 1
    }

    match req {
        Request::ReadCoils { count, .. } | Request::ReadDiscreteInputs { count, .. } => {
            let bytes = packed_coils_len(count.into());
            buf[0] = bytes as u8;
            buf[1..=bytes].copy_from_slice(&values.bits[..bytes]);
            bytes + 1
        }
        Request::ReadHoldingRegisters { count, .. } | Request::ReadInputRegisters { count, .. } => {
            registers(buf, &values.words[..usize::from(count)])
        }
        Request::WriteSingleCoil { offset, value } => {
            echo(buf, &[offset, crate::util::bool_to_u16_coil(value)])
        }
        Request::WriteSingleRegister { offset, value } => echo(buf, &[offset, value]),
        Request::ReadExceptionStatus => {
            buf[0] = values.exception_status;
            1
        }
        Request::WriteMultipleCoils { offset, count }
        | Request::WriteMultipleRegisters { offset, count } => echo(buf, &[offset, count]),
        Request::ReportServerId => {
            let len = values.server_id_len;
            buf[0] = len as u8;
            buf[1..=len].copy_from_slice(&values.bits[..len]);
            len + 1
        }
        Request::MaskWriteRegister {
            offset,
            and_mask,
            or_mask,
        } => echo(buf, &[offset, and_mask, or_mask]),
        Request::ReadWriteMultipleRegisters { read_count, .. } => {
            registers(buf, &values.words[..usize::from(read_count)])
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    WaitForOpen,
    Opened,
    BeginRead,
    Read,
    ProcessDevice,
    Write,
    BeginWrite,
    WaitForClose,
}

/// Serves requests arriving on one [`Port`].
///
/// Used directly for serial lines and once per accepted TCP connection.
pub struct ServerResource {
    port: Port,
    device: SharedDevice,
    name: String,
    state: State,
    cmd_close: bool,
    unit: UnitId,
    function: u8,
    request: Option<Request>,
    values: Box<Values>,
    // the error answered with an exception response
    failure: Option<Error>,
    last_error: Option<Error>,
    signals: Signals,
}

impl ServerResource {
    #[must_use]
    pub fn new(port: Port, device: SharedDevice) -> Self {
        Self::with_signals(port, device, Signals::new())
    }

    /// Create a resource that reports through existing `signals`.
    #[must_use]
    pub fn with_signals(mut port: Port, device: SharedDevice, signals: Signals) -> Self {
        port.set_server_mode(true);
        let name = port.name();
        Self {
            port,
            device,
            name,
            state: State::Closed,
            cmd_close: false,
            unit: 0,
            function: 0,
            request: None,
            values: Box::default(),
            failure: None,
            last_error: None,
            signals,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub const fn port(&self) -> &Port {
        &self.port
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The resource is closed and stays closed until [`ServerPort::open`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed && self.cmd_close
    }

    fn set_error(&mut self, err: Error) -> Error {
        let text = err.to_string();
        log::warn!("{}: {text}", self.name);
        self.last_error = Some(err.clone());
        self.signals.emit(&Event::Error {
            source: &self.name,
            status: err.status(),
            text: &text,
        });
        err
    }

    fn decode_request(&mut self) -> Result<()> {
        let Self {
            port,
            unit,
            function,
            request,
            values,
            ..
        } = self;
        *request = None;
        let frame = port.read_buffer()?;
        *unit = frame.unit;
        *function = frame.function;
        *request = Some(parse_request(frame.function, frame.data, values)?);
        Ok(())
    }

    fn call_device(&mut self) -> Result<Option<()>> {
        let Some(request) = self.request else {
            return Err(Exception::IllegalFunction.into());
        };
        let unit = self.unit;
        let values = &mut *self.values;
        let mut device = self.device.borrow_mut();
        match request {
            Request::ReadCoils { offset, count } => {
                device.read_coils(unit, offset, count, &mut values.bits)
            }
            Request::ReadDiscreteInputs { offset, count } => {
                device.read_discrete_inputs(unit, offset, count, &mut values.bits)
            }
            Request::ReadHoldingRegisters { offset, count } => device.read_holding_registers(
                unit,
                offset,
                count,
                &mut values.words[..usize::from(count)],
            ),
            Request::ReadInputRegisters { offset, count } => device.read_input_registers(
                unit,
                offset,
                count,
                &mut values.words[..usize::from(count)],
            ),
            Request::WriteSingleCoil { offset, value } => {
                device.write_single_coil(unit, offset, value)
            }
            Request::WriteSingleRegister { offset, value } => {
                device.write_single_register(unit, offset, value)
            }
            Request::ReadExceptionStatus => {
                let status = device.read_exception_status(unit)?;
                Ok(status.map(|status| values.exception_status = status))
            }
            Request::WriteMultipleCoils { offset, count } => {
                device.write_multiple_coils(unit, offset, count, &values.bits)
            }
            Request::WriteMultipleRegisters { offset, count } => device.write_multiple_registers(
                unit,
                offset,
                count,
                &values.words[..usize::from(count)],
            ),
            Request::ReportServerId => {
                let data = &mut values.bits[..MAX_SERVER_ID_LEN];
                let len = device.report_server_id(unit, data)?;
                Ok(len.map(|len| values.server_id_len = len.min(MAX_SERVER_ID_LEN)))
            }
            Request::MaskWriteRegister {
                offset,
                and_mask,
                or_mask,
            } => device.mask_write_register(unit, offset, and_mask, or_mask),
            Request::ReadWriteMultipleRegisters {
                read_offset,
                read_count,
                write_offset,
                write_count,
            } => device.read_write_multiple_registers(
                unit,
                read_offset,
                read_count,
                &mut values.words[..usize::from(read_count)],
                write_offset,
                write_count,
                &values.write_words[..usize::from(write_count)],
            ),
        }
    }

    fn write_response(&mut self) -> Result<()> {
        let mut buf = [0; MAX_PAYLOAD];
        match self.failure.take() {
            Some(err) => {
                self.set_error(err.clone());
                let code = err
                    .status()
                    .exception_code()
                    .unwrap_or(Exception::ServerDeviceFailure as u8);
                buf[0] = code;
                self.port
                    .write_buffer(self.unit, self.function | EXCEPTION_BIT, &buf[..1])
            }
            None => {
                let Some(request) = self.request else {
                    return Err(Exception::IllegalFunction.into());
                };
                let len = encode_response(request, &self.values, &mut buf);
                self.port.write_buffer(self.unit, self.function, &buf[..len])
            }
        }
    }
}

impl ServerPort for ServerResource {
    fn protocol(&self) -> ProtocolType {
        self.port.protocol()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }

    fn is_open(&self) -> bool {
        self.port.is_open()
    }

    fn open(&mut self) {
        self.cmd_close = false;
    }

    fn close(&mut self) {
        self.cmd_close = true;
    }

    fn process(&mut self) -> Result<Option<()>> {
        loop {
            match self.state {
                State::Closed => {
                    if self.cmd_close {
                        return Ok(Some(()));
                    }
                    self.state = State::WaitForOpen;
                }
                State::WaitForOpen => {
                    if self.cmd_close {
                        self.state = State::WaitForClose;
                        continue;
                    }
                    match self.port.open() {
                        Ok(None) => return Ok(None),
                        Ok(Some(())) => {
                            self.state = State::Opened;
                            self.signals.emit(&Event::Opened { source: &self.name });
                        }
                        Err(err) => {
                            self.state = State::Closed;
                            return Err(self.set_error(err));
                        }
                    }
                }
                State::WaitForClose => {
                    let was_open = self.port.is_open();
                    self.port.close()?;
                    self.state = State::Closed;
                    if was_open {
                        self.signals.emit(&Event::Closed { source: &self.name });
                    }
                }
                State::Opened => self.state = State::BeginRead,
                State::BeginRead => {
                    if self.cmd_close {
                        self.state = State::WaitForClose;
                        continue;
                    }
                    match self.port.read() {
                        Ok(None) => return Ok(None),
                        Ok(Some(())) => {
                            self.signals.emit(&Event::Rx {
                                source: &self.name,
                                bytes: self.port.read_buffer_data(),
                            });
                            self.state = State::Read;
                        }
                        Err(Error::TcpDisconnect) => {
                            log::debug!("{}: remote connection closed", self.name);
                            self.state = State::Closed;
                            return Ok(None);
                        }
                        Err(err) => {
                            if !self.port.is_open() {
                                self.state = State::Closed;
                            }
                            return Err(self.set_error(err));
                        }
                    }
                }
                State::Read => match self.decode_request() {
                    Ok(()) => self.state = State::ProcessDevice,
                    // answered with an exception response
                    Err(err) if err.status().is_standard_error() => {
                        self.failure = Some(err);
                        self.state = State::Write;
                    }
                    Err(err) => {
                        self.state = State::BeginRead;
                        return Err(self.set_error(err));
                    }
                },
                State::ProcessDevice => {
                    match self.call_device() {
                        Ok(None) => return Ok(None),
                        Ok(Some(())) => self.failure = None,
                        Err(Error::Exception(Exception::GatewayPathUnavailable)) => {
                            log::trace!("{}: no device for unit {}", self.name, self.unit);
                            self.state = State::BeginRead;
                            return Ok(None);
                        }
                        Err(err) => self.failure = Some(err),
                    }
                    self.state = State::Write;
                }
                State::Write => {
                    if let Err(err) = self.write_response() {
                        self.state = State::BeginRead;
                        return Err(self.set_error(err));
                    }
                    self.state = State::BeginWrite;
                }
                State::BeginWrite => match self.port.write() {
                    Ok(None) => return Ok(None),
                    Ok(Some(())) => {
                        self.signals.emit(&Event::Tx {
                            source: &self.name,
                            bytes: self.port.write_buffer_data(),
                        });
                        self.state = State::BeginRead;
                        return Ok(None);
                    }
                    Err(err) => {
                        self.state = if self.port.is_open() {
                            State::BeginRead
                        } else {
                            State::Closed
                        };
                        return Err(self.set_error(err));
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for ServerResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResource")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("cmd_close", &self.cmd_close)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{
        StatusCode,
        port::mock::{Link, MockTransport},
        server::ModbusInterface,
        signal::EventKind,
        util::{crc16, read_mem_bits, read_mem_regs, write_mem_bits, write_mem_regs},
    };

    #[derive(Default)]
    struct Memory {
        coils: [u8; 2],
        registers: [u16; 8],
        single_coil_writes: Vec<(UnitId, Address, bool)>,
        busy_polls: usize,
    }

    impl ModbusInterface for Memory {
        fn read_coils(
            &mut self,
            unit: UnitId,
            offset: Address,
            count: Quantity,
            values: &mut [u8],
        ) -> Result<Option<()>> {
            if unit != 1 {
                return Err(Exception::GatewayPathUnavailable.into());
            }
            read_mem_bits(offset, count, values, &self.coils, 16)?;
            Ok(Some(()))
        }

        fn read_holding_registers(
            &mut self,
            _: UnitId,
            offset: Address,
            count: Quantity,
            values: &mut [Word],
        ) -> Result<Option<()>> {
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                return Ok(None);
            }
            read_mem_regs(offset, count, values, &self.registers)?;
            Ok(Some(()))
        }

        fn write_single_coil(
            &mut self,
            unit: UnitId,
            offset: Address,
            value: bool,
        ) -> Result<Option<()>> {
            self.single_coil_writes.push((unit, offset, value));
            write_mem_bits(offset, 1, &[u8::from(value)], &mut self.coils, 16)?;
            Ok(Some(()))
        }

        fn write_multiple_coils(
            &mut self,
            _: UnitId,
            offset: Address,
            count: Quantity,
            values: &[u8],
        ) -> Result<Option<()>> {
            write_mem_bits(offset, count, values, &mut self.coils, 16)?;
            Ok(Some(()))
        }

        fn write_multiple_registers(
            &mut self,
            _: UnitId,
            offset: Address,
            count: Quantity,
            values: &[Word],
        ) -> Result<Option<()>> {
            write_mem_regs(offset, count, values, &mut self.registers)?;
            Ok(Some(()))
        }

        fn read_exception_status(&mut self, _: UnitId) -> Result<Option<u8>> {
            Err(Error::EmptyResponse)
        }

        fn report_server_id(&mut self, _: UnitId, data: &mut [u8]) -> Result<Option<usize>> {
            data[..2].copy_from_slice(&[0x2A, 0xFF]);
            Ok(Some(2))
        }

        fn read_write_multiple_registers(
            &mut self,
            _: UnitId,
            read_offset: Address,
            read_count: Quantity,
            read_values: &mut [Word],
            write_offset: Address,
            write_count: Quantity,
            write_values: &[Word],
        ) -> Result<Option<()>> {
            write_mem_regs(write_offset, write_count, write_values, &mut self.registers)?;
            read_mem_regs(read_offset, read_count, read_values, &self.registers)?;
            Ok(Some(()))
        }
    }

    fn rtu_frame(bytes: &[u8]) -> Vec<u8> {
        let mut frame = bytes.to_vec();
        frame.extend_from_slice(&crc16(bytes).to_le_bytes());
        frame
    }

    fn server() -> (ServerResource, Rc<RefCell<Memory>>, Rc<RefCell<Link>>) {
        let (transport, link) = MockTransport::serial();
        let memory = Rc::new(RefCell::new(Memory::default()));
        let device: SharedDevice = memory.clone();
        let port = Port::new(ProtocolType::Rtu, Box::new(transport));
        (ServerResource::new(port, device), memory, link)
    }

    /// Feed one request and return the response frame without its CRC.
    fn serve(server: &mut ServerResource, link: &Rc<RefCell<Link>>, request: &[u8]) -> Vec<u8> {
        link.borrow_mut().push(rtu_frame(request));
        let before = link.borrow().sent.len();
        for _ in 0..4 {
            let _ = server.process();
        }
        let link = link.borrow();
        assert_eq!(link.sent.len(), before + 1, "no response");
        let frame = link.sent[before].clone();
        assert_eq!(crc16(&frame[..frame.len() - 2]).to_le_bytes(), frame[frame.len() - 2..]);
        frame[..frame.len() - 2].to_vec()
    }

    #[test]
    fn dispatch_write_single_coil() {
        let (mut server, memory, link) = server();
        let response = serve(&mut server, &link, &[0x01, 0x05, 0x00, 0x05, 0xFF, 0x00]);
        assert_eq!(memory.borrow().single_coil_writes, vec![(1, 5, true)]);
        assert_eq!(response, vec![0x01, 0x05, 0x00, 0x05, 0xFF, 0x00]);
        assert_eq!(memory.borrow().coils, [0b0010_0000, 0]);
    }

    #[test]
    fn device_error_is_answered_with_exception() {
        let (mut server, _memory, link) = server();
        let errors = Rc::new(RefCell::new(Vec::new()));
        {
            let errors = Rc::clone(&errors);
            server.signals().connect(EventKind::Error, move |event| {
                if let Event::Error { status, .. } = event {
                    errors.borrow_mut().push(*status);
                }
            });
        }
        // register 7 and 8: the second one is out of range
        let response = serve(&mut server, &link, &[0x01, 0x03, 0x00, 0x07, 0x00, 0x02]);
        assert_eq!(response, vec![0x01, 0x83, 0x02]);
        assert_eq!(*errors.borrow(), vec![StatusCode::BAD_ILLEGAL_DATA_ADDRESS]);
    }

    #[test]
    fn non_standard_device_error_is_a_device_failure() {
        let (mut server, _memory, link) = server();
        let response = serve(&mut server, &link, &[0x01, 0x07]);
        assert_eq!(response, vec![0x01, 0x87, 0x04]);
    }

    #[test]
    fn unimplemented_function_is_illegal() {
        let (mut server, _memory, link) = server();
        let response = serve(&mut server, &link, &[0x01, 0x04, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(response, vec![0x01, 0x84, 0x01]);
        let response = serve(&mut server, &link, &[0x01, 0x2B, 0x0E, 0x01, 0x00]);
        assert_eq!(response, vec![0x01, 0xAB, 0x01]);
    }

    #[test]
    fn malformed_request_is_answered() {
        let (mut server, _memory, link) = server();
        let response = serve(&mut server, &link, &[0x01, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(response, vec![0x01, 0x81, 0x03]);
        // coil value must be 0xFF00 or 0x0000
        let response = serve(&mut server, &link, &[0x01, 0x05, 0x00, 0x00, 0x12, 0x34]);
        assert_eq!(response, vec![0x01, 0x85, 0x03]);
        // too many registers
        let response = serve(&mut server, &link, &[0x01, 0x03, 0x00, 0x00, 0x00, 0x80]);
        assert_eq!(response, vec![0x01, 0x83, 0x03]);
    }

    #[test]
    fn bad_crc_is_not_answered() {
        let (mut server, memory, link) = server();
        let errors = Rc::new(RefCell::new(0));
        {
            let errors = Rc::clone(&errors);
            server
                .signals()
                .connect(EventKind::Error, move |_| *errors.borrow_mut() += 1);
        }
        link.borrow_mut()
            .push(vec![0x01, 0x05, 0x00, 0x05, 0xFF, 0x00, 0x00, 0x00]);
        for _ in 0..4 {
            let _ = server.process();
        }
        assert!(link.borrow().sent.is_empty());
        assert_eq!(*errors.borrow(), 1);
        assert!(memory.borrow().single_coil_writes.is_empty());

        // the next request is served
        let response = serve(&mut server, &link, &[0x01, 0x05, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(response, vec![0x01, 0x05, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn unknown_unit_is_not_answered() {
        let (mut server, _memory, link) = server();
        link.borrow_mut()
            .push(rtu_frame(&[0x02, 0x01, 0x00, 0x00, 0x00, 0x08]));
        for _ in 0..4 {
            assert_eq!(server.process(), Ok(None));
        }
        assert!(link.borrow().sent.is_empty());
    }

    #[test]
    fn busy_device_is_polled_again() {
        let (mut server, memory, link) = server();
        memory.borrow_mut().registers[0] = 0x1234;
        memory.borrow_mut().busy_polls = 2;
        link.borrow_mut()
            .push(rtu_frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(server.process(), Ok(None));
        assert_eq!(server.process(), Ok(None));
        assert!(link.borrow().sent.is_empty());
        assert_eq!(server.process(), Ok(None));
        assert_eq!(
            link.borrow().sent[0][..5],
            [0x01, 0x03, 0x02, 0x12, 0x34]
        );
    }

    #[test]
    fn write_multiple_echoes_offset_and_count() {
        let (mut server, memory, link) = server();
        let response = serve(
            &mut server,
            &link,
            &[
                0x01, // unit
                0x10, // function code
                0x00, 0x02, // offset
                0x00, 0x02, // count
                0x04, // byte count
                0x12, 0x34, 0xAB, 0xCD,
            ],
        );
        assert_eq!(response, vec![0x01, 0x10, 0x00, 0x02, 0x00, 0x02]);
        assert_eq!(memory.borrow().registers[2..4], [0x1234, 0xABCD]);

        let response = serve(
            &mut server,
            &link,
            &[0x01, 0x0F, 0x00, 0x03, 0x00, 0x0A, 0x02, 0xFF, 0x03],
        );
        assert_eq!(response, vec![0x01, 0x0F, 0x00, 0x03, 0x00, 0x0A]);
        assert_eq!(memory.borrow().coils, [0b1111_1000, 0b0001_1111]);
    }

    #[test]
    fn read_write_multiple_registers() {
        let (mut server, _memory, link) = server();
        let response = serve(
            &mut server,
            &link,
            &[
                0x01, 0x17, // unit, function code
                0x00, 0x00, 0x00, 0x02, // read offset, count
                0x00, 0x01, 0x00, 0x01, // write offset, count
                0x02, 0x00, 0x2A, // byte count, value
            ],
        );
        assert_eq!(response, vec![0x01, 0x17, 0x04, 0x00, 0x00, 0x00, 0x2A]);
    }

    #[test]
    fn report_server_id() {
        let (mut server, _memory, link) = server();
        let response = serve(&mut server, &link, &[0x01, 0x11]);
        assert_eq!(response, vec![0x01, 0x11, 0x02, 0x2A, 0xFF]);
    }

    #[test]
    fn close_command() {
        let (mut server, _memory, link) = server();
        let closed = Rc::new(RefCell::new(0));
        {
            let closed = Rc::clone(&closed);
            server
                .signals()
                .connect(EventKind::Closed, move |_| *closed.borrow_mut() += 1);
        }
        assert_eq!(server.process(), Ok(None));
        assert!(server.is_open());
        server.close();
        assert_eq!(server.process(), Ok(Some(())));
        assert!(server.is_closed());
        assert!(!server.is_open());
        assert_eq!(*closed.borrow(), 1);
        assert_eq!(link.borrow().close_count, 1);

        server.open();
        assert_eq!(server.process(), Ok(None));
        assert!(server.is_open());
    }

    #[test]
    fn tcp_response_echoes_the_transaction_id() {
        let (transport, link) = MockTransport::tcp(Duration::from_secs(10));
        let device: SharedDevice = Rc::new(RefCell::new(Memory::default()));
        let port = Port::new(ProtocolType::Tcp, Box::new(transport));
        let mut server = ServerResource::new(port, device);
        link.borrow_mut().push(vec![
            0x12, 0x34, // transaction id
            0x00, 0x00, // protocol id
            0x00, 0x06, // length
            0x01, // unit
            0x05, // function code
            0x00, 0x00, // offset
            0xFF, 0x00, // value
        ]);
        assert_eq!(server.process(), Ok(None));
        assert_eq!(
            link.borrow().sent,
            vec![vec![
                0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00
            ]]
        );

        link.borrow_mut().peer_closed = true;
        assert_eq!(server.process(), Ok(None));
        assert!(!server.is_open());
    }
}
